/*!
BrowserBytes CLI - export, import and transfer browser tab snapshots.

A tab is described by a profile file (URL, title, Web Storage and cookie
jar). Snapshots of it can be written to export files, restored from them, or
moved through the remote record store by passphrase.
*/

use anyhow::Context;
use browserbytes_core::{
    browser::{ProfileBrowser, TabProfile},
    codec::ExportFormat,
    engine::read_import,
    BrowserBytesError, BytesConfig, ExportOptions, ImportOptions, RestoreReport, Snapshot,
    TabContext, TransferEngine,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "browserbytes")]
#[command(about = "Export, import and transfer browser tab storage and cookies")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Profile file describing the tab
    #[arg(
        short,
        long,
        global = true,
        env = "BROWSERBYTES_PROFILE",
        default_value = "tab.json"
    )]
    profile: PathBuf,

    /// Record store base URL
    #[arg(long, global = true, env = "BROWSERBYTES_REMOTE_URL")]
    remote_url: Option<String>,

    /// Record store collection
    #[arg(long, global = true, env = "BROWSERBYTES_COLLECTION")]
    collection: Option<String>,

    /// Capture sessionStorage as well
    #[arg(long, global = true)]
    session_storage: bool,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile file for a tab
    Init {
        /// Tab URL
        #[arg(long)]
        url: String,
        /// Tab title
        #[arg(long, default_value = "")]
        title: String,
        /// Overwrite an existing profile
        #[arg(short, long)]
        force: bool,
    },
    /// Capture the tab and write an export file
    Export {
        /// Output format (json or base64)
        #[arg(short, long)]
        format: Option<ExportFormat>,
        /// Encrypt the export with this key
        #[arg(short, long, env = "BROWSERBYTES_KEY", hide_env_values = true)]
        key: Option<String>,
        /// Directory the export file is written to
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Restore the tab from an export file
    Import {
        /// Export file to read
        #[arg(short, long)]
        input: PathBuf,
        /// Input format (json or base64)
        #[arg(short, long)]
        format: Option<ExportFormat>,
        /// Decryption key for encrypted exports
        #[arg(short, long, env = "BROWSERBYTES_KEY", hide_env_values = true)]
        key: Option<String>,
        /// Print the restore report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture the tab and save it to the record store
    Save {
        /// Label for the saved record
        #[arg(short, long)]
        name: String,
        /// Encrypt the record with this key
        #[arg(short, long, env = "BROWSERBYTES_KEY", hide_env_values = true)]
        key: Option<String>,
    },
    /// Fetch a record by passphrase and restore it into the tab
    Retrieve {
        /// Passphrase printed by `save`
        #[arg(long)]
        passphrase: String,
        /// Decryption key for encrypted records
        #[arg(short, long, env = "BROWSERBYTES_KEY", hide_env_values = true)]
        key: Option<String>,
        /// Print the restore report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what an export file contains without restoring it
    Inspect {
        /// Export file to read
        #[arg(short, long)]
        input: PathBuf,
        /// Input format (json or base64)
        #[arg(short, long)]
        format: Option<ExportFormat>,
        /// Decryption key for encrypted exports
        #[arg(short, long, env = "BROWSERBYTES_KEY", hide_env_values = true)]
        key: Option<String>,
    },
}

#[derive(Tabled)]
struct CookieRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Secure")]
    secure: bool,
    #[tabled(rename = "HttpOnly")]
    http_only: bool,
    #[tabled(rename = "SameSite")]
    same_site: String,
    #[tabled(rename = "Expires")]
    expires: String,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Item")]
    item: &'static str,
    #[tabled(rename = "Count")]
    count: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    let config = create_config(&cli)?;

    let result = run(&cli, config).await;

    if cli.metrics {
        print_metrics();
    }

    if let Err(e) = result {
        error!("{}", failure_message(&e));
        std::process::exit(1);
    }
    Ok(())
}

/// User-facing text for a failed command
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BrowserBytesError>() {
        Some(err) => err.user_message(),
        None => format!("{err:#}"),
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<(), anyhow::Error> {
    if json {
        browserbytes_core::observability::init_observability(true)?;
        return Ok(());
    }

    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn create_config(cli: &Cli) -> Result<BytesConfig, anyhow::Error> {
    let mut config = BytesConfig::from_env().context("Invalid BROWSERBYTES_* environment")?;

    if let Some(url) = &cli.remote_url {
        config.remote.base_url = url.clone();
    }
    if let Some(collection) = &cli.collection {
        config.remote.collection = collection.clone();
    }
    if cli.session_storage {
        config.include_session_storage = true;
    }

    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: BytesConfig) -> Result<(), anyhow::Error> {
    match &cli.command {
        Commands::Init { url, title, force } => init_profile(&cli.profile, url, title, *force),
        Commands::Export {
            format,
            key,
            out_dir,
        } => {
            let format = format.unwrap_or(config.export.format);
            export(&cli.profile, config, format, key.as_deref(), out_dir).await
        }
        Commands::Import {
            input,
            format,
            key,
            json,
        } => {
            let format = format.unwrap_or(config.export.format);
            import(&cli.profile, config, input, format, key.as_deref(), *json).await
        }
        Commands::Save { name, key } => save(&cli.profile, config, name, key.as_deref()).await,
        Commands::Retrieve {
            passphrase,
            key,
            json,
        } => retrieve(&cli.profile, config, passphrase, key.as_deref(), *json).await,
        Commands::Inspect { input, format, key } => {
            let format = format.unwrap_or(config.export.format);
            inspect(input, format, key.as_deref())
        }
    }
}

fn init_profile(path: &Path, url: &str, title: &str, force: bool) -> Result<(), anyhow::Error> {
    if path.exists() && !force {
        return Err(anyhow::anyhow!(
            "Profile {} already exists (use --force to overwrite)",
            path.display()
        ));
    }

    TabContext::parse(1, url, title)?;
    ProfileBrowser::create(path, &TabProfile::new(url, title))?;

    println!("✓ Created profile {}", path.display());
    Ok(())
}

fn open_engine(
    profile: &Path,
    config: BytesConfig,
) -> Result<TransferEngine<ProfileBrowser>, anyhow::Error> {
    let browser = ProfileBrowser::open(profile)?;
    Ok(TransferEngine::new(browser, config))
}

fn open_cloud_engine(
    profile: &Path,
    config: BytesConfig,
) -> Result<TransferEngine<ProfileBrowser>, anyhow::Error> {
    let browser = ProfileBrowser::open(profile)?;
    Ok(TransferEngine::from_config(browser, config)?)
}

async fn export(
    profile: &Path,
    config: BytesConfig,
    format: ExportFormat,
    key: Option<&str>,
    out_dir: &Path,
) -> Result<(), anyhow::Error> {
    let engine = open_engine(profile, config)?;
    let tab = engine.browser().tab()?;

    let mut options = ExportOptions::new(format);
    if let Some(key) = key {
        options = options.with_encryption_key(key);
    }

    let artifact = engine.export(&tab, &options).await?;
    let path = artifact.write_to(out_dir)?;

    if artifact.encrypted {
        println!("✓ Exported encrypted snapshot to {}", path.display());
    } else {
        println!("✓ Exported snapshot to {}", path.display());
    }
    Ok(())
}

fn import_options(format: ExportFormat, key: Option<&str>) -> ImportOptions {
    let options = ImportOptions::new(format);
    match key {
        Some(key) => options.with_decryption_key(key),
        None => options,
    }
}

async fn import(
    profile: &Path,
    config: BytesConfig,
    input: &Path,
    format: ExportFormat,
    key: Option<&str>,
    json: bool,
) -> Result<(), anyhow::Error> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let engine = open_engine(profile, config)?;
    let tab = engine.browser().tab()?;
    info!("Importing {} into {}", input.display(), tab.url);

    let report = engine
        .import_text(&tab, &text, &import_options(format, key))
        .await?;
    print_report(&report, json)
}

async fn save(
    profile: &Path,
    config: BytesConfig,
    name: &str,
    key: Option<&str>,
) -> Result<(), anyhow::Error> {
    let engine = open_cloud_engine(profile, config)?;
    let tab = engine.browser().tab()?;

    let receipt = engine.save_to_cloud(&tab, name, key).await?;

    println!("✓ Data saved successfully");
    println!("  Passphrase: {}", receipt.passphrase);
    println!("  Record ID: {}", receipt.record_id);
    println!("Keep the passphrase safe: it is all that is needed to fetch this data.");
    Ok(())
}

async fn retrieve(
    profile: &Path,
    config: BytesConfig,
    passphrase: &str,
    key: Option<&str>,
    json: bool,
) -> Result<(), anyhow::Error> {
    let engine = open_cloud_engine(profile, config)?;
    let tab = engine.browser().tab()?;

    let report = engine.retrieve_from_cloud(&tab, passphrase, key).await?;
    print_report(&report, json)
}

fn inspect(input: &Path, format: ExportFormat, key: Option<&str>) -> Result<(), anyhow::Error> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let snapshot = read_import(&text, &import_options(format, key))?;
    print_snapshot(&snapshot);
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("localStorage entries: {}", snapshot.local_storage().len());
    if let Some(session) = snapshot.session_storage() {
        println!("sessionStorage entries: {}", session.len());
    }

    let rows: Vec<CookieRow> = snapshot
        .cookies()
        .values()
        .map(|c| CookieRow {
            name: c.name.clone(),
            domain: c.domain.clone(),
            path: c.path.clone(),
            secure: c.secure,
            http_only: c.http_only,
            same_site: c
                .same_site
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "-".to_string()),
            expires: c
                .expiration_date
                .map(format_expiry)
                .unwrap_or_else(|| "session".to_string()),
        })
        .collect();

    if rows.is_empty() {
        println!("No cookies");
    } else {
        println!("{}", Table::new(rows));
    }
}

fn print_report(report: &RestoreReport, json: bool) -> Result<(), anyhow::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mut rows = vec![ReportRow {
        item: "localStorage entries",
        count: report.storage_count.to_string(),
    }];
    if let Some(session) = report.session_count {
        rows.push(ReportRow {
            item: "sessionStorage entries",
            count: session.to_string(),
        });
    }
    rows.push(ReportRow {
        item: "Cookies restored",
        count: format!("{}/{}", report.cookies_restored, report.cookies_attempted()),
    });

    println!("✓ Data imported successfully");
    println!("{}", Table::new(rows));

    if report.is_partial() {
        warn!(
            "Some cookies could not be restored: {}",
            report.cookies_failed.join(", ")
        );
    }
    Ok(())
}

fn format_expiry(epoch_seconds: f64) -> String {
    match chrono::DateTime::from_timestamp(epoch_seconds as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{epoch_seconds}"),
    }
}

#[cfg(feature = "metrics")]
fn print_metrics() {
    match browserbytes_core::observability::gather_metrics() {
        Ok(text) => println!("{text}"),
        Err(e) => warn!("Failed to gather metrics: {}", e),
    }
}

#[cfg(not(feature = "metrics"))]
fn print_metrics() {
    warn!("Metrics support not enabled");
}
