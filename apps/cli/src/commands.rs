//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use confbot_core::{
    BatchReport, ChatRequest, ChatResponder, ChatSettings, DailyOutcome, ExtractionSettings,
    LlmExtractor, Orchestrator, ProgressReporter, Retry, RetryPolicy, Scheduler, UrlOutcome,
    chat::addressed_to_bot,
};
use confbot_crawler::{FeedFetcher, RawFetcher, http_client};
use confbot_provider::{ChatProvider, provider_for_config};
use confbot_shared::{
    AppConfig, init_config, load_config, load_config_from, resolve_api_key,
};
use confbot_storage::{Caches, Clock, SystemClock};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// confbot — conference assistant backed by cached, LLM-cleaned page content.
#[derive(Parser)]
#[command(
    name = "confbot",
    version,
    about = "Keep conference page and schedule caches fresh, and answer questions from them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.confbot/confbot.toml).
    #[arg(long, global = true, env = "CONFBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the crawl/extract batch if it is due.
    Run {
        /// Run even if the last batch is recent.
        #[arg(long)]
        force: bool,
    },

    /// Ask the assistant one question.
    Ask {
        /// The chat message.
        message: String,

        /// Name recorded in the interaction log.
        #[arg(long, default_value = "cli")]
        user: String,

        /// Bot user id. When set, the message must mention `<@id>` to be answered.
        #[arg(long)]
        bot_id: Option<String>,
    },

    /// Show cache and schedule state.
    Status,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "confbot=info",
        1 => "confbot=debug",
        _ => "confbot=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { force } => cmd_run(cli.config, force).await,
        Command::Ask {
            message,
            user,
            bot_id,
        } => cmd_ask(cli.config, &message, &user, bot_id.as_deref()).await,
        Command::Status => cmd_status(cli.config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config).await,
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything the commands share, built once from the config.
struct Runtime {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    caches: Caches,
}

impl Runtime {
    fn new(config: AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let caches = Caches::from_config(&config, clock.clone());
        Self {
            config,
            clock,
            caches,
        }
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.caches.run_state.clone(),
            self.clock.clone(),
            self.config.schedule.interval(),
        )
    }

    fn feed_fetcher(&self) -> Result<FeedFetcher> {
        let client = http_client(Duration::from_secs(self.config.sources.fetch_timeout_secs))?;
        Ok(FeedFetcher::new(
            client,
            &self.config.sources.feed_url,
            self.caches.feed.clone(),
        )?)
    }

    fn provider(&self) -> Result<Arc<dyn ChatProvider>> {
        let api_key = resolve_api_key(&self.config)?;
        Ok(provider_for_config(&self.config, api_key)?)
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let client = http_client(Duration::from_secs(self.config.sources.fetch_timeout_secs))?;
        let extractor = LlmExtractor::new(
            self.provider()?,
            Retry::new(RetryPolicy::default()),
            self.config.llm.extraction_max_tokens,
        );

        Ok(Orchestrator::new(
            RawFetcher::new(client, self.caches.raw.clone(), self.config.cache.raw_max_age()),
            Arc::new(extractor),
            self.caches.cleaned.clone(),
            self.feed_fetcher()?,
            self.caches.extraction_log.clone(),
            self.scheduler(),
            ExtractionSettings {
                exclude_sections: self.config.sources.exclude_sections.clone(),
                input_price_per_million: self.config.llm.input_price_per_million,
                output_price_per_million: self.config.llm.output_price_per_million,
            },
        ))
    }

    fn responder(&self) -> Result<ChatResponder> {
        Ok(ChatResponder::new(
            self.provider()?,
            Retry::new(RetryPolicy::default()),
            self.caches.cleaned.clone(),
            self.feed_fetcher()?,
            self.caches.interaction_log.clone(),
            self.clock.clone(),
            ChatSettings {
                system_prompt_path: self.config.chat.system_prompt_path.clone(),
                event_name: self.config.chat.event_name.clone(),
                max_tokens: self.config.llm.chat_max_tokens,
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    config.require_sources()?;
    let runtime = Runtime::new(config);
    let orchestrator = runtime.orchestrator()?;

    info!(
        urls = runtime.config.sources.urls.len(),
        force,
        "starting scheduled run"
    );

    let reporter = CliProgress::new();
    let outcome = orchestrator
        .run_daily(
            &runtime.config.sources.urls,
            &runtime.config.sources.faq_url,
            force,
            &reporter,
        )
        .await;
    reporter.spinner.finish_and_clear();

    match outcome? {
        DailyOutcome::Skipped => {
            let next = orchestrator.scheduler().next_due().await;
            println!();
            println!("  Batch not due yet.");
            if let Some(next) = next {
                println!("  Next run: {}", next.to_rfc3339());
            }
            println!("  Use --force to run anyway.");
            println!();
        }
        DailyOutcome::Completed(report) => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    println!();
    println!("  Batch complete.");
    println!("  Run:        {}", report.run_id);
    println!("  Extracted:  {}", report.extracted());
    println!("  Fresh:      {}", report.fresh());
    println!("  Fetch fail: {}", report.fetch_failed());
    println!("  Extr. fail: {}", report.extract_failed());
    println!(
        "  Feed:       {}",
        if report.feed_refreshed { "refreshed" } else { "kept previous snapshot" }
    );
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());

    let failures: Vec<_> = report
        .urls
        .iter()
        .filter(|u| matches!(u.outcome, UrlOutcome::FetchFailed | UrlOutcome::ExtractFailed(_)))
        .collect();
    if !failures.is_empty() {
        println!();
        for failure in failures {
            match &failure.outcome {
                UrlOutcome::ExtractFailed(reason) => {
                    println!("  ✗ {} (extraction: {reason})", failure.url)
                }
                _ => println!("  ✗ {} (fetch failed)", failure.url),
            }
        }
    }
    println!();
}

async fn cmd_ask(
    config_path: Option<PathBuf>,
    message: &str,
    user: &str,
    bot_id: Option<&str>,
) -> Result<()> {
    let message = match bot_id {
        Some(id) => match addressed_to_bot(message, id, false) {
            Some(stripped) => stripped,
            None => {
                info!("message does not mention the bot, not answering");
                return Ok(());
            }
        },
        None => message.trim().to_string(),
    };
    if message.is_empty() {
        return Err(eyre!("message is empty"));
    }

    let config = resolve_config(config_path)?;
    if config.sources.feed_url.is_empty() {
        return Err(eyre!("sources.feed_url is not set"));
    }
    let runtime = Runtime::new(config);
    let responder = runtime.responder()?;

    let reply = responder
        .respond(&ChatRequest {
            user: user.to_string(),
            message,
            reply_chain: Vec::new(),
        })
        .await;

    println!("{}", reply.text);
    Ok(())
}

async fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let runtime = Runtime::new(config);
    let scheduler = runtime.scheduler();
    let caches = &runtime.caches;

    let last_run = scheduler.last_run().await;
    let due = scheduler.is_due().await;
    let raw_count = caches.raw.count().await?;
    let cleaned_count = caches.cleaned.count().await?;
    let feed = caches.feed.snapshot().await;
    let feed_at = caches.feed.stored_at().await;

    println!();
    println!("  Cache root:  {}", runtime.config.cache.root.display());
    println!(
        "  Last run:    {}",
        last_run.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    println!("  Due:         {}", if due { "yes" } else { "no" });
    println!("  Raw pages:   {raw_count}");
    println!("  Cleaned:     {cleaned_count}");
    println!(
        "  Feed:        {} sessions, {} speakers, {} rooms (updated {})",
        feed.sessions.len(),
        feed.speakers.len(),
        feed.rooms.len(),
        feed_at.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn url_started(&self, url: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("[{current}/{total}] {url}"));
    }

    fn url_finished(&self, url: &str, outcome: &UrlOutcome) {
        if let UrlOutcome::ExtractFailed(_) | UrlOutcome::FetchFailed = outcome {
            self.spinner.println(format!("  ✗ {url}"));
        }
    }

    fn done(&self, _report: &BatchReport) {
        self.spinner.finish_and_clear();
    }
}
