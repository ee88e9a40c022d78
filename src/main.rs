use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tinv::api::client::ApiClient;
use tinv::api::http::format_api_error;
use tinv::api::profile;
use tinv::config::Config;
use tinv::discovery::errors::DEFAULT_ERROR_CAP;
use tinv::discovery::orchestrator::DEFAULT_MAX_CONCURRENCY;
use tinv::discovery::retry::DEFAULT_MAX_ATTEMPTS;
use tinv::discovery::{
    self, CompartmentNameCache, Discoverer, Discovery, DiscoveryOptions, FilterConfig,
    RetryPolicy,
};
use tinv::inventory::{get_all_category_tags, get_category, AdapterRegistry};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Inventory every resource across the compartments of a tenancy
#[derive(Parser, Debug)]
#[command(name = "tinv", version = tinv::VERSION, about, long_about = None)]
struct Args {
    /// Tenancy OCID
    #[arg(short, long)]
    tenancy: Option<String>,

    /// Region, e.g. us-ashburn-1
    #[arg(short, long)]
    region: Option<String>,

    /// Endpoint template with {service} and {region} placeholders
    #[arg(long)]
    endpoint: Option<String>,

    /// Config file (defaults to <config dir>/tinv/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist the effective tenancy and region to the config file
    #[arg(long)]
    save: bool,

    /// Run deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Compartments processed simultaneously
    #[arg(long)]
    concurrency: Option<usize>,

    /// Retries for transient failures
    #[arg(long)]
    max_retries: Option<u32>,

    /// Only these compartment OCIDs (repeatable)
    #[arg(long = "include-compartment")]
    include_compartments: Vec<String>,

    /// Skip these compartment OCIDs (repeatable)
    #[arg(long = "exclude-compartment")]
    exclude_compartments: Vec<String>,

    /// Only these categories (repeatable)
    #[arg(long = "include-category")]
    include_categories: Vec<String>,

    /// Skip these categories (repeatable)
    #[arg(long = "exclude-category")]
    exclude_categories: Vec<String>,

    /// Keep resources whose name matches this regex
    #[arg(long)]
    name_pattern: Option<String>,

    /// Drop resources whose name matches this regex
    #[arg(long)]
    exclude_name_pattern: Option<String>,

    /// Do not draw the progress line
    #[arg(long)]
    no_progress: bool,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List known categories and exit
    #[arg(long)]
    list_categories: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("tinv {} started with log level: {:?}", tinv::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("tinv").join("tinv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".tinv").join("tinv.log");
    }
    PathBuf::from("tinv.log")
}

/// CLI filters extend the config file's lists; CLI patterns replace its patterns
fn merge_filters(mut filters: FilterConfig, args: &Args) -> FilterConfig {
    filters
        .include_compartments
        .extend(args.include_compartments.iter().cloned());
    filters
        .exclude_compartments
        .extend(args.exclude_compartments.iter().cloned());
    filters
        .include_categories
        .extend(args.include_categories.iter().cloned());
    filters
        .exclude_categories
        .extend(args.exclude_categories.iter().cloned());
    if args.name_pattern.is_some() {
        filters.name_pattern = args.name_pattern.clone();
    }
    if args.exclude_name_pattern.is_some() {
        filters.exclude_name_pattern = args.exclude_name_pattern.clone();
    }
    filters
}

fn print_categories() {
    for tag in get_all_category_tags() {
        let display = get_category(tag).map(|c| c.display_name.as_str()).unwrap_or("-");
        println!("{:<24} {}", tag, display);
    }
}

fn write_output(discovery: &Discovery, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, discovery)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, discovery)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn print_summary(discovery: &Discovery) {
    eprintln!(
        "{} records from {}/{} units ({} retries, {} errors){}",
        discovery.records.len(),
        discovery.progress.processed_units,
        discovery.progress.total_units,
        discovery.progress.retries,
        discovery.errors.total,
        if discovery.timed_out { ", deadline reached" } else { "" }
    );
    for error in &discovery.errors.errors {
        let friendly = format_api_error(&anyhow::anyhow!(error.message.clone()));
        eprintln!(
            "  {}/{}: {}",
            error.compartment_name, error.category, friendly
        );
    }
    if discovery.errors.truncated() > 0 {
        eprintln!("  ... and {} more", discovery.errors.truncated());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if args.list_categories {
        print_categories();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    let tenancy = args
        .tenancy
        .clone()
        .unwrap_or_else(|| config.effective_tenancy());
    if tenancy.is_empty() {
        return Err(anyhow::anyhow!(
            "No tenancy configured. Set OCI_TENANCY, add it to ~/.oci/config or use --tenancy"
        ));
    }
    if !profile::validate_tenancy_id(&tenancy) {
        return Err(anyhow::anyhow!("Invalid tenancy OCID: {}", tenancy));
    }
    let region = args.region.clone().unwrap_or_else(|| config.effective_region());

    if args.save {
        config.tenancy_id = Some(tenancy.clone());
        config.region = Some(region.clone());
        config.save().context("Failed to save config")?;
    }

    tracing::info!("Using tenancy: {}, region: {}", tenancy, region);

    let endpoint = args.endpoint.clone().or_else(|| config.endpoint.clone());
    let client = Arc::new(ApiClient::new(&region, endpoint.as_deref(), profile::get_token())?);

    let adapters = AdapterRegistry::from_definitions(Arc::clone(&client), &tenancy);
    let cache = Arc::new(CompartmentNameCache::new(client.clone()));
    let options = DiscoveryOptions {
        max_concurrency: args
            .concurrency
            .or(config.concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY),
        retry: RetryPolicy::with_max_attempts(
            args.max_retries
                .or(config.max_retries)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        ),
        error_cap: DEFAULT_ERROR_CAP,
        show_progress: !args.no_progress,
    };
    let discoverer = Discoverer::new(&tenancy, client, adapters, cache).with_options(options);

    let filters = merge_filters(config.filters.clone(), &args);
    let timeout = Duration::from_secs(args.timeout.unwrap_or_else(|| config.effective_timeout_secs()));

    let cancel = discovery::deadline(timeout);
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, winding down");
            on_interrupt.cancel();
        }
    });

    let result = discoverer.discover(&cancel, &filters).await;
    // Stops the deadline timer
    cancel.cancel();
    let discovery = result?;

    write_output(&discovery, args.output.as_ref())?;
    print_summary(&discovery);

    Ok(())
}
