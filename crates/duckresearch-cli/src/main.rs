use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use duckresearch_core::metrics::init_metrics_from_env;
use duckresearch_core::{
    Agent, AgentFactory, AgentRole, CommandAgent, Config, ConfigLoader, DuckResearchError,
    EventCollector, NetworkSettings, ProgressTracker, ProxyPool, ResearchConfig, ResearchDriver,
    StatusEvent, TelemetryOptions, init_telemetry, report, workspace,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Parser, Debug)]
#[command(
    name = "duckresearch",
    version,
    about = "Multi-round web research driven by a search and a manager agent"
)]
struct Cli {
    /// Configuration file (defaults to `duckresearch.toml` or `DUCKRESEARCH_CONFIG`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a question and print the report.
    Run(RunArgs),
    /// Refresh the proxy pool and list the verified proxies.
    Proxies(ProxiesArgs),
    /// Empty the downloads folder.
    Clean,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Question to research.
    #[arg(long)]
    question: String,

    /// Command line of the search agent program.
    #[arg(long)]
    search_cmd: String,

    /// Command line of the manager agent program.
    #[arg(long)]
    manager_cmd: String,

    /// Route agent traffic through the rotating proxy pool.
    #[arg(long)]
    proxy: bool,

    /// Override the maximum number of research rounds.
    #[arg(long)]
    rounds: Option<u32>,

    /// Write the report here (`.md` for Markdown, anything else for plain text).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the full outcome as JSON instead of Markdown.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ProxiesArgs {
    /// Number of proxies to draw from the rotation after the refresh.
    #[arg(long, default_value_t = 3)]
    count: usize,
}

/// Builds [`CommandAgent`]s from the command lines given on the CLI.
struct CommandAgentFactory {
    search_cmd: String,
    manager_cmd: String,
    research: ResearchConfig,
}

impl AgentFactory for CommandAgentFactory {
    fn build(
        &self,
        role: AgentRole,
        network: &NetworkSettings,
    ) -> Result<Arc<dyn Agent>, DuckResearchError> {
        let (command_line, max_steps) = match role {
            AgentRole::Search => (&self.search_cmd, self.research.max_steps_per_agent_run),
            AgentRole::Manager => (&self.manager_cmd, self.research.manager_max_steps),
        };
        let agent = CommandAgent::from_command_line(role.as_str(), command_line)
            .ok_or_else(|| {
                DuckResearchError::InvalidConfiguration(format!(
                    "{} command line is empty or has unbalanced quotes",
                    role.display_name()
                ))
            })?
            .with_max_steps(max_steps)
            .with_timeout(self.research.agent_timeout())
            .with_network(network);
        Ok(Arc::new(agent))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::load(cli.config.clone()).context("failed to load configuration")?;

    init_telemetry(TelemetryOptions::default().with_default_level(config.logging.level.clone()))?;
    init_metrics_from_env("duckresearch-cli");

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Run(args) => {
                if args.proxy {
                    config.proxy.enabled = true;
                }
                if let Some(rounds) = args.rounds {
                    config.research.max_search_rounds = rounds;
                }
                ConfigLoader::validate(&config)?;
                run_command(config, args).await?
            }
            Command::Proxies(args) => proxies_command(config, args).await?,
            Command::Clean => clean_command(&config),
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn run_command(config: Config, args: RunArgs) -> Result<()> {
    let question = args.question.trim();
    anyhow::ensure!(!question.is_empty(), "question must not be empty");

    info!(
        rounds = config.research.max_search_rounds,
        proxy = config.proxy.enabled,
        "starting research"
    );

    let (events, receiver) = EventCollector::new();
    let progress = tokio::spawn(render_progress(receiver));

    let factory = CommandAgentFactory {
        search_cmd: args.search_cmd,
        manager_cmd: args.manager_cmd,
        research: config.research.clone(),
    };
    let driver = ResearchDriver::new(config, factory, events);
    let result = driver.run(question).await;

    // Closing the last sender ends the progress stream.
    drop(driver);
    if let Err(err) = progress.await {
        warn!(error = %err, "progress renderer stopped unexpectedly");
    }
    let outcome = result.context("research run failed")?;

    if let Some(path) = &args.output {
        report::write_report(path, &outcome)?;
        info!(path = %path.display(), "report written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", report::render_markdown(&outcome));
    }
    Ok(())
}

async fn render_progress(mut receiver: UnboundedReceiver<StatusEvent>) {
    let mut tracker = ProgressTracker::new();
    let mut stderr = std::io::stderr();
    while let Some(event) = receiver.recv().await {
        let fraction = tracker.observe(&event);
        let filled = (fraction * PROGRESS_BAR_WIDTH as f64).round() as usize;
        let _ = writeln!(
            stderr,
            "[{}{}] {:>3}% {}",
            "#".repeat(filled),
            "-".repeat(PROGRESS_BAR_WIDTH - filled),
            (fraction * 100.0).round() as u32,
            event.message
        );
    }
}

async fn proxies_command(config: Config, args: ProxiesArgs) -> Result<()> {
    let pool = ProxyPool::from_config(&config.proxy)?;
    let size = pool.refresh().await;
    if size == 0 {
        println!("No working proxies found; requests would use a direct connection.");
        return Ok(());
    }

    println!("{size} verified proxies:");
    for address in pool.snapshot().await {
        println!("  {address}");
    }

    println!("Rotation:");
    for _ in 0..args.count {
        if let Some(address) = pool.get().await {
            println!("  {address}");
        }
    }
    Ok(())
}

fn clean_command(config: &Config) {
    let downloads = &config.browser.downloads_folder;
    let before = workspace::folder_size(downloads);
    workspace::reset_dirs(std::slice::from_ref(downloads), true);
    println!(
        "Emptied {} (freed {}, now {})",
        downloads.display(),
        workspace::format_size(before),
        workspace::format_size(workspace::folder_size(downloads))
    );
}
