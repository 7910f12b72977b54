//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leadharvest_core::{
    Collaborators, EnrichOptions, EnrichmentReport, ExportLog, HarvestReport, HttpEmbedder,
    Pipeline, PipelineConfig, ProgressReporter, RecordSink,
};
use leadharvest_crawler::{HttpBrowser, SessionStore, parse_session_export};
use leadharvest_shared::{
    AppConfig, EmbeddingConfig, KeyMode, Session, expand_home, init_config, load_config,
};
use leadharvest_storage::{LeadStore, Storage};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadHarvest — harvest organizations and find their contact emails.
#[derive(Parser)]
#[command(
    name = "leadharvest",
    version,
    about = "Harvest organization profiles from a search, find contact emails and store embedded leads.",
    long_about = None,
)]
pub(crate) struct Cli {
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

/// Deduplication key for a harvest run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum KeyModeArg {
    /// Platform profile URL.
    Source,
    /// Organization website.
    Website,
}

impl From<KeyModeArg> for KeyMode {
    fn from(arg: KeyModeArg) -> Self {
        match arg {
            KeyModeArg::Source => KeyMode::Source,
            KeyModeArg::Website => KeyMode::Website,
        }
    }
}

/// Scheduling overrides shared by `harvest` and `enrich`.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct ScheduleArgs {
    /// Concurrent units per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Minimum cool-down between batches, in seconds.
    #[arg(long)]
    pub min_delay: Option<u64>,

    /// Maximum cool-down between batches, in seconds.
    #[arg(long)]
    pub max_delay: Option<u64>,

    /// Do not append discovered emails to the CSV export.
    #[arg(long)]
    pub no_export: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search the platform and store every new organization found.
    Harvest {
        /// Search query (e.g. "fintech").
        query: String,

        /// Deduplicate by profile URL (source) or by website.
        #[arg(long, value_enum)]
        key_mode: Option<KeyModeArg>,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Hunt emails for stored leads that do not have one yet.
    Enrich {
        /// Also retry leads whose website was crawled without finding an email.
        #[arg(long)]
        retry_not_found: bool,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Authenticated session management.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Show lead counts.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Service catalog management.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Session subcommands.
#[derive(Subcommand)]
pub(crate) enum SessionAction {
    /// Import a session from a cookie header or a JSON cookie export file.
    Import {
        /// Path to a cookie export, or a `name=value; name2=value2` header.
        source: String,
    },
    /// Show the stored session (capture time and cookie names).
    Show,
    /// Log in manually, then paste the resulting cookie header.
    Login {
        /// Seconds to wait before asking for the cookie header.
        #[arg(long, default_value = "60")]
        wait: u64,
    },
}

/// Service subcommands.
#[derive(Subcommand)]
pub(crate) enum ServiceAction {
    /// Embed and store a catalog service.
    Add {
        /// Service name.
        name: String,
        /// Service description (embedded for matching).
        description: String,
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

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = [
        "leadharvest",
        "leadharvest_core",
        "leadharvest_crawler",
        "leadharvest_storage",
        "leadharvest_shared",
    ]
    .iter()
    .map(|target| format!("{target}={level}"))
    .collect::<Vec<_>>()
    .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
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
        Command::Harvest {
            query,
            key_mode,
            schedule,
        } => cmd_harvest(&query, key_mode, &schedule).await,
        Command::Enrich {
            retry_not_found,
            schedule,
        } => cmd_enrich(retry_not_found, &schedule).await,
        Command::Session { action } => match action {
            SessionAction::Import { source } => cmd_session_import(&source).await,
            SessionAction::Show => cmd_session_show().await,
            SessionAction::Login { wait } => cmd_session_login(wait).await,
        },
        Command::Stats { json } => cmd_stats(json).await,
        Command::Service { action } => match action {
            ServiceAction::Add { name, description } => {
                cmd_service_add(&name, &description).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared wiring
// ---------------------------------------------------------------------------

/// Pipeline configuration with command-line overrides applied.
fn pipeline_config(
    config: &AppConfig,
    key_mode: Option<KeyModeArg>,
    schedule: &ScheduleArgs,
) -> Result<PipelineConfig> {
    let mut pipeline = PipelineConfig::from(config);
    if let Some(mode) = key_mode {
        pipeline.harvest.key_mode = mode.into();
    }
    if let Some(size) = schedule.batch_size {
        pipeline.schedule.batch_size = size;
    }
    if let Some(secs) = schedule.min_delay {
        pipeline.schedule.min_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = schedule.max_delay {
        pipeline.schedule.max_delay = Duration::from_secs(secs);
    }
    pipeline.schedule.validate()?;
    Ok(pipeline)
}

fn session_store(config: &AppConfig) -> Result<SessionStore> {
    Ok(SessionStore::new(expand_home(&config.defaults.session_path)?))
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.defaults.database_path)?;
    Ok(Arc::new(Storage::open(&path).await?))
}

fn export_log(config: &AppConfig, schedule: &ScheduleArgs) -> Result<Option<Arc<ExportLog>>> {
    let path = config.defaults.export_path.trim();
    if schedule.no_export || path.is_empty() {
        return Ok(None);
    }
    Ok(Some(Arc::new(ExportLog::new(expand_home(path)?))))
}

fn embedder(config: &AppConfig) -> Result<Arc<HttpEmbedder>> {
    Ok(Arc::new(HttpEmbedder::new(&EmbeddingConfig::from(config))?))
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_harvest(query: &str, key_mode: Option<KeyModeArg>, schedule: &ScheduleArgs) -> Result<()> {
    if query.trim().is_empty() {
        return Err(eyre!("search query must not be empty"));
    }

    let config = load_config()?;
    let pipeline_config = pipeline_config(&config, key_mode, schedule)?;

    // Restored once; nothing below refreshes it.
    let session = session_store(&config)?.restore()?;
    let browser = Arc::new(HttpBrowser::new(Some(&session), &config.platform)?);

    info!(
        query,
        key_mode = ?pipeline_config.harvest.key_mode,
        session_captured = %session.captured_at,
        "starting harvest"
    );

    let pipeline = Pipeline::new(
        Collaborators {
            browser,
            store: open_storage(&config).await?,
            embedder: embedder(&config)?,
            export: export_log(&config, schedule)?,
        },
        pipeline_config,
    )?;

    let reporter = CliProgress::new();
    let report = pipeline.run_harvest(query, &reporter).await?;

    println!();
    println!("  Harvest complete: \"{}\"", report.query);
    println!("  Found:       {}", report.found);
    println!("  Known:       {}", report.known);
    println!("  Stored:      {}", report.stored);
    println!("    email:     {}", report.with_email);
    println!("    pending:   {}", report.pending);
    println!("    not found: {}", report.not_found);
    println!("  Duplicates:  {}", report.duplicates);
    println!("  Failed:      {}", report.failed);
    println!("  Time:        {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_enrich(retry_not_found: bool, schedule: &ScheduleArgs) -> Result<()> {
    let config = load_config()?;
    let pipeline_config = pipeline_config(&config, None, schedule)?;

    // Only organizations' own websites are visited; no platform session needed.
    let browser = Arc::new(HttpBrowser::new(None, &config.platform)?);

    let pipeline = Pipeline::new(
        Collaborators {
            browser,
            store: open_storage(&config).await?,
            embedder: embedder(&config)?,
            export: export_log(&config, schedule)?,
        },
        pipeline_config,
    )?;

    info!(retry_not_found, "starting enrichment");

    let reporter = CliProgress::new();
    let report = pipeline
        .run_enrichment(EnrichOptions { retry_not_found }, &reporter)
        .await?;

    println!();
    println!("  Enrichment complete");
    println!("  Targeted:   {}", report.targeted);
    println!("  Websites:   {}", report.websites);
    println!("  Discovered: {}", report.discovered);
    println!("  Not found:  {}", report.not_found);
    println!("  Unchanged:  {}", report.unchanged);
    println!("  Failed:     {}", report.failed);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Session commands
// ---------------------------------------------------------------------------

/// Read a session from a cookie export file, or treat `source` as a cookie header.
fn session_from_source(source: &str, domain: &str) -> Result<Session> {
    let path = Path::new(source);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
        return Ok(parse_session_export(&content)?);
    }
    Ok(Session::from_cookie_header(source, domain)?)
}

async fn cmd_session_import(source: &str) -> Result<()> {
    let config = load_config()?;
    let session = session_from_source(source, &config.platform.domain)?;
    let store = session_store(&config)?;
    store.persist(&session)?;

    println!(
        "Session with {} cookie(s) saved to: {}",
        session.cookies.len(),
        store.path().display()
    );
    Ok(())
}

async fn cmd_session_show() -> Result<()> {
    let config = load_config()?;
    let store = session_store(&config)?;
    let session = store.restore()?;

    println!("  Path:     {}", store.path().display());
    println!("  Captured: {}", session.captured_at.to_rfc3339());
    println!("  Cookies:");
    for cookie in &session.cookies {
        println!("    {} ({})", cookie.name, cookie.domain);
    }
    Ok(())
}

async fn cmd_session_login(wait: u64) -> Result<()> {
    let config = load_config()?;
    let login_url = Url::parse(&config.platform.base_url)
        .and_then(|base| base.join(&config.platform.login_path))
        .map_err(|e| eyre!("invalid platform login URL: {e}"))?;

    println!("Open {login_url} in your browser and log in.");
    println!("Waiting {wait}s before asking for the session cookies...");
    tokio::time::sleep(Duration::from_secs(wait)).await;

    print!("Paste the Cookie header for {}: ", config.platform.domain);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    let session = Session::from_cookie_header(line.trim(), &config.platform.domain)?;
    let store = session_store(&config)?;
    store.persist(&session)?;

    println!(
        "Session with {} cookie(s) saved to: {}",
        session.cookies.len(),
        store.path().display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Reporting and catalog commands
// ---------------------------------------------------------------------------

async fn cmd_stats(json: bool) -> Result<()> {
    let config = load_config()?;
    let path: PathBuf = expand_home(&config.defaults.database_path)?;
    let storage = Storage::open_readonly(&path).await?;
    let stats = storage.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  Total leads:   {}", stats.total);
    println!("  With email:    {}", stats.with_email);
    println!("  Missing email: {}", stats.missing_email());
    println!("    pending:     {}", stats.pending);
    println!("    not found:   {}", stats.not_found);
    println!("  Drafted:       {}", stats.pitched);
    println!("  To draft:      {}", stats.remaining_to_draft());
    println!();
    Ok(())
}

async fn cmd_service_add(name: &str, description: &str) -> Result<()> {
    if name.trim().is_empty() || description.trim().is_empty() {
        return Err(eyre!("service name and description must not be empty"));
    }

    let config = load_config()?;
    let sink = RecordSink::new(
        open_storage(&config).await?,
        embedder(&config)?,
        config.harvest.embed_template,
        None,
    );
    let service = sink.store_service(name.trim(), description.trim()).await?;

    println!("Service '{}' stored (id {}).", service.name, service.id);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn unit_settled(&self, label: &str, status: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}: {status}"));
    }

    fn harvest_done(&self, _report: &HarvestReport) {
        self.spinner.finish_and_clear();
    }

    fn enrichment_done(&self, _report: &EnrichmentReport) {
        self.spinner.finish_and_clear();
    }
}
