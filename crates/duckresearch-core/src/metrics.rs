use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct DriverMetrics {
    refreshes: Counter<u64>,
    probes: Counter<u64>,
    rounds: Counter<u64>,
    outcomes: Counter<u64>,
}

static METRICS: OnceCell<DriverMetrics> = OnceCell::new();

fn handles() -> &'static DriverMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("duckresearch.driver");
        DriverMetrics {
            refreshes: meter
                .u64_counter("proxy_refresh_total")
                .with_description("Proxy pool refresh cycles by outcome")
                .init(),
            probes: meter
                .u64_counter("proxy_probe_total")
                .with_description("Proxy liveness probes by result")
                .init(),
            rounds: meter
                .u64_counter("research_rounds_total")
                .with_description("Executed research rounds by acceptance")
                .init(),
            outcomes: meter
                .u64_counter("research_outcome_total")
                .with_description("Finished research sessions by answer path")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("DUCKRESEARCH_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "DUCKRESEARCH_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export driver metrics."
        );
    }
}

pub(crate) fn record_refresh(outcome: &'static str, verified: usize) {
    handles().refreshes.add(
        1,
        &[
            KeyValue::new("outcome", outcome),
            KeyValue::new("verified", verified as i64),
        ],
    );
}

pub(crate) fn record_probe(alive: bool) {
    handles()
        .probes
        .add(1, &[KeyValue::new("alive", alive)]);
}

pub(crate) fn record_round(accepted: bool) {
    handles()
        .rounds
        .add(1, &[KeyValue::new("accepted", accepted)]);
}

pub(crate) fn record_outcome(path: &'static str, rounds: usize) {
    handles().outcomes.add(
        1,
        &[
            KeyValue::new("path", path),
            KeyValue::new("rounds", rounds as i64),
        ],
    );
}
