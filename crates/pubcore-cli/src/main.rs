//! Command-line front end for the publishing orchestration core.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pubcore::config::Settings;
use pubcore::metrics::Registry;
use pubcore::model::PublishRequest;
use pubcore::orchestrator::{Orchestrator, ProviderPair};
use pubcore::perf::{PerformanceTracker, SelectorCache};
use pubcore::provider::dom::DomProvider;
use pubcore::provider::vision::VisionProvider;
use pubcore::provider::PublishingProvider;
use pubcore::templating::defaults::{vision_instruction_bundle, wordpress_selector_bundle};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pubcore", version, about = "Publishing orchestration core CLI")]
struct Cli {
    /// Path to a TOML config file. Defaults to `~/.pubcore/config.toml`.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging below error level.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish an article described by a JSON `PublishRequest` file.
    Publish {
        /// Path to a JSON file containing a `PublishRequest`.
        request: String,

        /// Drive the run with the vision provider instead of the DOM provider.
        #[arg(long)]
        vision: bool,

        /// Anthropic API key for the vision provider (or fallback). Defaults
        /// to the `ANTHROPIC_API_KEY` environment variable.
        #[arg(long)]
        anthropic_api_key: Option<String>,
    },

    /// Load and validate the effective configuration, then exit.
    ValidateConfig,

    /// Serve the Prometheus metrics exposition endpoint.
    MetricsServe {
        /// Address to bind, e.g. `0.0.0.0:9090`.
        #[arg(long, default_value = "127.0.0.1:9090")]
        bind: String,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if let Ok(env) = std::env::var("RUST_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Publish {
            request,
            vision,
            anthropic_api_key,
        } => run_publish(cli.config.as_deref(), &request, vision, anthropic_api_key).await,
        Commands::ValidateConfig => run_validate_config(cli.config.as_deref()),
        Commands::MetricsServe { bind } => run_metrics_serve(&bind).await,
    }
}

async fn run_publish(
    config_path: Option<&str>,
    request_path: &str,
    vision: bool,
    anthropic_api_key: Option<String>,
) -> Result<()> {
    let settings = Arc::new(Settings::load(config_path).context("loading config")?);
    settings.validate().context("validating config")?;

    let body = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading publish request from {request_path}"))?;
    let request: PublishRequest =
        serde_json::from_str(&body).context("parsing publish request JSON")?;

    let metrics = Registry::new();

    let kind = request.target_cms.kind;
    let use_vision = vision || settings.default_provider() == "vision";

    let mut dom_instrumentation: Option<(Arc<SelectorCache>, Arc<PerformanceTracker>)> = None;

    let (primary, fallback): (Box<dyn PublishingProvider>, Option<Box<dyn PublishingProvider>>) =
        if use_vision {
            let llm = build_llm_provider(anthropic_api_key)?;
            let instructions = Arc::new(vision_instruction_bundle());
            let vision_provider = VisionProvider::new(settings.clone(), instructions, llm, kind);
            (Box::new(vision_provider), None)
        } else {
            let selectors = Arc::new(wordpress_selector_bundle());
            let cache = Arc::new(SelectorCache::new(settings.selector_cache_ttl()));
            let perf = Arc::new(PerformanceTracker::new());
            dom_instrumentation = Some((cache.clone(), perf.clone()));
            let dom_provider = DomProvider::new(settings.clone(), selectors, cache, perf, kind);

            let fallback: Option<Box<dyn PublishingProvider>> = if settings.fallback_enabled() {
                let llm = build_llm_provider(anthropic_api_key)?;
                let instructions = Arc::new(vision_instruction_bundle());
                Some(Box::new(VisionProvider::new(
                    settings.clone(),
                    instructions,
                    llm,
                    kind,
                )))
            } else {
                None
            };

            (Box::new(dom_provider), fallback)
        };

    let orchestrator = Orchestrator::new(settings, Some(metrics.clone()))?;
    let now = chrono::Utc::now().timestamp();
    let result = orchestrator
        .publish(request, ProviderPair { primary, fallback }, now)
        .await;

    if let Some((cache, perf)) = dom_instrumentation {
        metrics.report_cache_stats(cache.stats());
        metrics.report_performance_summary(perf.summary());
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        Ok(())
    } else {
        anyhow::bail!(
            "publish failed: {}",
            result
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string())
        )
    }
}

fn build_llm_provider(api_key: Option<String>) -> Result<Arc<dyn pubcore::llm::LlmProvider>> {
    let api_key = api_key
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
        .context("no Anthropic API key given (--anthropic-api-key or ANTHROPIC_API_KEY)")?;
    Ok(Arc::new(pubcore::llm::anthropic::AnthropicProvider::new(
        api_key,
        "claude-sonnet-4-5".to_string(),
    )))
}

fn run_validate_config(config_path: Option<&str>) -> Result<()> {
    let settings = Settings::load(config_path).context("loading config")?;
    settings.validate().context("validating config")?;
    println!("{}", toml::to_string_pretty(&settings)?);
    eprintln!("config is valid");
    Ok(())
}

async fn run_metrics_serve(bind: &str) -> Result<()> {
    let registry = Registry::new();
    let app = pubcore::metrics::serve::router(registry, "/metrics");
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "serving metrics");
    axum::serve(listener, app).await.context("metrics server")?;
    Ok(())
}
