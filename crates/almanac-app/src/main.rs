use std::path::{Path, PathBuf};

use almanac_core::config::load_config;
use almanac_rfc::rfc::caldav::{CalendarFilter, TimeRange};
use almanac_rfc::rfc::validation::validate_calendar_filter;
use almanac_service::caldav::service::report::{
    EngineOptions, calendar_expand, calendar_limit_recurrence_set, calendar_multiget,
    calendar_query,
};
use almanac_service::storage::FsStore;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "almanac")]
#[command(about = "Run CalDAV calendar-query and multiget reports over a directory of .ics files")]
struct Cli {
    /// Calendar root; overrides `storage.root`
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URIs of objects matching a filter
    Query {
        calendar: String,

        /// JSON filter document; matches everything when omitted
        #[arg(short, long)]
        filter: Option<PathBuf>,
    },
    /// Print matching objects with their occurrences materialized
    Expand {
        calendar: String,

        #[arg(short, long)]
        filter: Option<PathBuf>,

        /// Window start (RFC 3339); defaults to the filter's time-range
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Keep masters and overlapping overrides instead of expanding
        #[arg(long)]
        limit_recurrence_set: bool,
    },
    /// Print stored objects by URI
    Multiget {
        calendar: String,

        #[arg(required = true)]
        uris: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config()?;

    tracing::debug!(config = ?config, "Configuration loaded");

    if let Ok(filter) = EnvFilter::try_new(config.logging.level.as_str()) {
        if let Err(e) = filter_handle.modify(|current| *current = filter) {
            tracing::warn!(error = %e, "Failed to update log filter from config");
        }
    } else {
        tracing::warn!(level = %config.logging.level, "Invalid log level in config, keeping debug");
    }

    let options = EngineOptions::from_settings(&config.engine)?;
    let store = FsStore::new(cli.root.unwrap_or(config.storage.root));

    let output = match cli.command {
        Commands::Query { calendar, filter } => {
            let filter = read_filter(filter.as_deref()).await?;
            let uris = calendar_query(&store, &calendar, &filter, &options).await?;
            serde_json::to_string_pretty(&uris)?
        }
        Commands::Expand {
            calendar,
            filter,
            start,
            end,
            limit_recurrence_set,
        } => {
            let filter = read_filter(filter.as_deref()).await?;
            let window = window(&filter, start, end)?;
            let results = if limit_recurrence_set {
                calendar_limit_recurrence_set(&store, &calendar, &filter, &window, &options).await?
            } else {
                calendar_expand(&store, &calendar, &filter, &window, &options).await?
            };
            serde_json::to_string_pretty(&results)?
        }
        Commands::Multiget { calendar, uris } => {
            let result = calendar_multiget(&store, &calendar, &uris, &options).await?;
            serde_json::to_string_pretty(&result)?
        }
    };

    println!("{output}");
    Ok(())
}

/// Reads and checks a JSON filter document.
async fn read_filter(path: Option<&Path>) -> anyhow::Result<CalendarFilter> {
    let Some(path) = path else {
        return Ok(CalendarFilter::match_all());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("reading filter {}: {e}", path.display()))?;
    let filter: CalendarFilter = serde_json::from_str(&text)?;
    if let Err(unsupported) = validate_calendar_filter(&filter) {
        anyhow::bail!("{unsupported}");
    }
    Ok(filter)
}

/// Explicit bounds win; otherwise the filter's component time-range.
fn window(
    filter: &CalendarFilter,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> anyhow::Result<TimeRange> {
    let window = match (start, end) {
        (None, None) => filter.component_time_range().ok_or_else(|| {
            anyhow::anyhow!("expand needs --start/--end or a filter with a time-range")
        })?,
        (start, end) => TimeRange { start, end },
    };
    if let (Some(start), Some(end)) = (window.start, window.end)
        && end <= start
    {
        anyhow::bail!("window end {end} is not after start {start}");
    }
    Ok(window)
}
