use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use leadglue::base::config::TrackingConfig;
use leadglue::base::identifier::TrackingIdentifier;
use leadglue::decorate::{LinkDecorator, MemorySessionStorage};
use leadglue::dom::{Anchor, AnchorElement};
use leadglue::extract::{ConnectionInfo, LeadSourceExtractor};
use std::path::PathBuf;
use time::{Duration, OffsetDateTime};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_LOG_LEVEL: &str = "info";

/// Inspect how lead-source tracking treats a request or a set of links.
#[derive(Debug, Parser)]
#[command(name = "leadglue", version)]
struct Cli {
    /// JSON configuration file; defaults apply to missing fields.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the identifier and Set-Cookie header a request would produce.
    Extract {
        /// Request URL or path with query, e.g. `/homes?switch_cls[id]=X`.
        request: String,

        /// Treat the connection as TLS.
        #[arg(long)]
        tls: bool,
    },
    /// Show how links on a page would be decorated.
    Decorate {
        /// Absolute URL of the page.
        page: String,

        /// Link hrefs found on the page.
        #[arg(required = true)]
        hrefs: Vec<String>,

        /// Identifier already held in session memory.
        #[arg(long)]
        stored: Option<String>,

        /// Hours left before the stored identifier expires.
        #[arg(long, default_value_t = 24)]
        stored_hours_left: i64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level.as_deref())?;

    let config = match &cli.config {
        Some(path) => TrackingConfig::from_path(path)
            .with_context(|| format!("load configuration from {}", path.display()))?,
        None => TrackingConfig::default(),
    };

    match cli.command {
        Command::Extract { request, tls } => run_extract(config, &request, tls),
        Command::Decorate {
            page,
            hrefs,
            stored,
            stored_hours_left,
        } => run_decorate(config, &page, &hrefs, stored.as_deref(), stored_hours_left),
    }
}

fn init_logging(format: LogFormat, level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log level `{level}`"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .map_err(|err| anyhow::anyhow!("initialize logging subscriber: {err}"))
}

fn run_extract(config: TrackingConfig, request: &str, tls: bool) -> anyhow::Result<()> {
    let extractor = LeadSourceExtractor::new(config);
    let mut req = http::Request::get(request)
        .body(())
        .with_context(|| format!("invalid request target `{request}`"))?;
    if tls {
        req.extensions_mut().insert(ConnectionInfo { tls: true });
    }

    let outcome = extractor.on_request_start(&mut req);
    match (outcome.identifier(), outcome.cookie()) {
        (Some(identifier), Some(cookie)) => {
            println!("identifier: {identifier}");
            println!("Set-Cookie: {}", cookie.header_value());
        }
        _ => println!("no identifier"),
    }
    Ok(())
}

fn run_decorate(
    config: TrackingConfig,
    page: &str,
    hrefs: &[String],
    stored: Option<&str>,
    stored_hours_left: i64,
) -> anyhow::Result<()> {
    let page = Url::parse(page).with_context(|| format!("invalid page URL `{page}`"))?;
    let now = OffsetDateTime::now_utc();
    let session_ttl = config.session_ttl();
    let decorator = LinkDecorator::new(config, MemorySessionStorage::new());

    if let Some(value) = stored {
        let Some(identifier) = TrackingIdentifier::new(value) else {
            bail!("stored identifier must not be empty");
        };
        // Back-date the write so the requested amount of time remains.
        let written_at = now - session_ttl + Duration::hours(stored_hours_left);
        decorator.memory().store(&identifier, written_at);
    }

    let Some(identifier) = decorator.resolve_identifier(&page, now) else {
        println!("no identifier: links left unchanged");
        return Ok(());
    };
    println!("identifier: {identifier}");

    for href in hrefs {
        let mut anchor = Anchor::new(href.as_str());
        let verdict = decorator.process_anchor(&mut anchor, &page, &identifier);
        println!(
            "{:<18} {} -> {}",
            format!("{verdict:?}"),
            href,
            anchor.href().unwrap_or_default()
        );
    }
    Ok(())
}
