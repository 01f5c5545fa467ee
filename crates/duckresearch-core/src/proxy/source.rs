use super::ProxyCandidate;
use crate::DuckResearchError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);
const SCRAPE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const SPYS_DE_URL: &str = "https://spys.one/free-proxy-list/DE/";
const SPYS_DE_CAP: usize = 20;
const FREE_PROXY_LIST_URL: &str = "https://free-proxy-list.net/";
const FREE_PROXY_LIST_CAP: usize = 15;

const FALLBACK_PROXIES: &[&str] = &[
    "http://8.210.83.33:80",
    "http://47.74.152.29:8888",
    "http://43.134.68.153:3128",
    "http://103.149.162.194:80",
    "http://185.15.172.212:3128",
];

/// `ip:port` anywhere in the document.
static HOST_PORT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{2,5})").expect("invalid host:port regex")
});

/// `ip` and `port` in adjacent table cells.
static TABLE_CELL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})</td><td>(\d{2,5})")
        .expect("invalid table cell regex")
});

/// A place proxy candidates can be discovered.
///
/// Fetching never fails from the caller's point of view: an unreachable or
/// unparseable source yields no candidates.
#[async_trait]
pub trait ProxySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Vec<ProxyCandidate>;
}

#[derive(Debug, Error)]
enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Scrapes `ip:port` tokens out of an HTML or text document.
pub struct HttpScrapeSource {
    name: String,
    url: String,
    pattern: Regex,
    cap: usize,
    client: reqwest::Client,
}

impl HttpScrapeSource {
    /// `pattern` must capture the IPv4 address and the port as groups 1 and 2.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        pattern: Regex,
        cap: usize,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            pattern,
            cap,
            client,
        }
    }

    async fn try_fetch(&self) -> Result<Vec<ProxyCandidate>, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let body = response.text().await?;
        Ok(extract_candidates(&body, &self.pattern, self.cap))
    }
}

#[async_trait]
impl ProxySource for HttpScrapeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Vec<ProxyCandidate> {
        match self.try_fetch().await {
            Ok(candidates) => {
                info!(source = %self.name, count = candidates.len(), "scraped proxy candidates");
                candidates
            }
            Err(err) => {
                warn!(source = %self.name, error = %err, "proxy source failed");
                Vec::new()
            }
        }
    }
}

/// Hard-coded list used when every live source comes up empty.
pub struct StaticSource {
    name: String,
    addresses: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(name: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fallback() -> Self {
        Self::new("fallback", FALLBACK_PROXIES.iter().copied())
    }
}

#[async_trait]
impl ProxySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Vec<ProxyCandidate> {
        info!(source = %self.name, count = self.addresses.len(), "using static proxies");
        self.addresses.iter().map(ProxyCandidate::new).collect()
    }
}

/// Pull up to `cap` well-formed `http://ip:port` candidates out of `text`.
pub fn extract_candidates(text: &str, pattern: &Regex, cap: usize) -> Vec<ProxyCandidate> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let ip: Ipv4Addr = caps.get(1)?.as_str().parse().ok()?;
            let port: u16 = caps.get(2)?.as_str().parse().ok()?;
            (port != 0).then(|| ProxyCandidate::new(format!("http://{ip}:{port}")))
        })
        .take(cap)
        .collect()
}

/// Built-in sources in priority order, live scrapers first.
pub fn default_sources() -> Result<Vec<Arc<dyn ProxySource>>, DuckResearchError> {
    let client = reqwest::Client::builder()
        .user_agent(SCRAPE_USER_AGENT)
        .timeout(SOURCE_TIMEOUT)
        .build()?;

    Ok(vec![
        Arc::new(HttpScrapeSource::new(
            "spys_one_de",
            SPYS_DE_URL,
            HOST_PORT_PATTERN.clone(),
            SPYS_DE_CAP,
            client.clone(),
        )),
        Arc::new(HttpScrapeSource::new(
            "free_proxy_list",
            FREE_PROXY_LIST_URL,
            TABLE_CELL_PATTERN.clone(),
            FREE_PROXY_LIST_CAP,
            client,
        )),
        Arc::new(StaticSource::fallback()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extracts_and_drops_malformed_tokens() {
        let text = "1.2.3.4:8080 bogus 999.1.1.1:80 5.6.7.8:3128 9.9.9.9:99999 10.0.0.1:00";
        let candidates = extract_candidates(text, &HOST_PORT_PATTERN, 20);
        let addresses: Vec<_> = candidates.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["http://1.2.3.4:8080", "http://5.6.7.8:3128"]);
    }

    #[test]
    fn extraction_respects_cap() {
        let text = (1..=30)
            .map(|i| format!("10.0.0.{i}:80"))
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(extract_candidates(&text, &HOST_PORT_PATTERN, 20).len(), 20);
    }

    #[test]
    fn table_pattern_matches_adjacent_cells() {
        let html = "<tr><td>4.3.2.1</td><td>3128</td><td>DE</td></tr>";
        let candidates = extract_candidates(html, &TABLE_CELL_PATTERN, 15);
        assert_eq!(candidates, vec![ProxyCandidate::new("http://4.3.2.1:3128")]);
    }

    #[tokio::test]
    async fn static_fallback_lists_five_addresses() {
        let candidates = StaticSource::fallback().fetch().await;
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0].address, "http://8.210.83.33:80");
    }

    #[tokio::test]
    async fn scrape_source_parses_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<pre>1.1.1.1:80\n2.2.2.2:8080</pre>"),
            )
            .mount(&server)
            .await;

        let source = HttpScrapeSource::new(
            "mock",
            format!("{}/list", server.uri()),
            HOST_PORT_PATTERN.clone(),
            20,
            reqwest::Client::new(),
        );
        let candidates = source.fetch().await;
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].address, "http://2.2.2.2:8080");
    }

    #[tokio::test]
    async fn non_success_status_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("1.1.1.1:80"))
            .mount(&server)
            .await;

        let source = HttpScrapeSource::new(
            "down",
            server.uri(),
            HOST_PORT_PATTERN.clone(),
            20,
            reqwest::Client::new(),
        );
        assert!(source.fetch().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_source_yields_nothing() {
        let source = HttpScrapeSource::new(
            "unreachable",
            "http://127.0.0.1:9/",
            HOST_PORT_PATTERN.clone(),
            20,
            reqwest::Client::new(),
        );
        assert!(source.fetch().await.is_empty());
    }
}
