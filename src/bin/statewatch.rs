//! Command-line front end over a JSON-lines sample log

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use statewatch_rs::{
    AccumulationRequest, ActiveColumn, ActiveFilter, CounterUnit, EngineConfig, HistoryColumn,
    HistoryQuery, InMemorySampleLog, SampleKind, SampleLog, Scalar, SortDirection, SortSpec,
    StateEngine, Timestamp, Window,
};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "statewatch")]
#[command(about = "Query current state, counters and activity history of a sample log", long_about = None)]
struct Cli {
    /// JSON-lines sample log
    #[arg(short, long)]
    log: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Latest value of each key
    Current {
        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Communication and machine indicators of a station
    Station {
        /// Communication indicator key
        #[arg(long)]
        communication: String,
        /// Machine indicator key
        #[arg(long)]
        machine: String,
    },
    /// Keys whose latest value is true
    Active {
        /// Only keys of this kind
        #[arg(long)]
        kind: Option<SampleKind>,
        /// Only keys of this category
        #[arg(long)]
        category: Option<String>,
        /// Print the short preview instead of a page
        #[arg(long, requires = "kind")]
        preview: bool,
        #[command(flatten)]
        paging: Paging,
    },
    /// Time a key held a value since an anchor
    Counter {
        /// Key to time
        #[arg(long)]
        key: String,
        /// Value that counts, as JSON (`true`, `false`, `3`)
        #[arg(long, default_value = "true")]
        reference: String,
        /// Anchor instant, RFC 3339
        #[arg(long)]
        anchor: DateTime<Utc>,
        /// minute, hour, day or all
        #[arg(long, default_value = "minute")]
        unit: String,
    },
    /// Latest value of a key read as hours
    Gauge {
        /// Key holding the gauge
        #[arg(long)]
        key: String,
        /// minute, hour, day or all
        #[arg(long, default_value = "minute")]
        unit: String,
    },
    /// Reconstructed activity intervals
    History {
        /// Window start, RFC 3339
        #[arg(long)]
        from: DateTime<Utc>,
        /// Window end, RFC 3339; defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Category, or "all"
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive text the key must contain
        #[arg(long)]
        search: Option<String>,
        /// Kinds to include (default: default and alert)
        #[arg(long = "kind")]
        kinds: Vec<SampleKind>,
        #[command(flatten)]
        paging: Paging,
    },
    /// Samples of one key for charting
    Series {
        /// Key to read
        #[arg(long)]
        key: String,
        /// Window start, RFC 3339
        #[arg(long)]
        from: DateTime<Utc>,
        /// Window end, RFC 3339; defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
}

#[derive(clap::Args)]
struct Paging {
    /// 1-based page number
    #[arg(long)]
    page: Option<usize>,
    /// Rows per page
    #[arg(long)]
    limit: Option<usize>,
    /// Column to sort the page by
    #[arg(long)]
    sort: Option<String>,
    /// 1/asc or -1/desc
    #[arg(long, default_value = "desc")]
    direction: String,
}

impl Paging {
    fn direction(&self) -> anyhow::Result<SortDirection> {
        SortDirection::parse(&self.direction)
            .ok_or_else(|| anyhow!("invalid sort direction '{}'", self.direction))
    }
}

fn window(from: Timestamp, to: Option<Timestamp>, now: Timestamp) -> anyhow::Result<Window> {
    Ok(Window::new(from, to.unwrap_or(now))?)
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    Ok(config.apply_env()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        statewatch_rs::init_tracing();
    }

    let config = load_config(cli.config.as_ref())?;
    let file = File::open(&cli.log).with_context(|| format!("opening {}", cli.log.display()))?;
    let log = InMemorySampleLog::from_jsonl(BufReader::new(file))?
        .with_batch_size(config.cursor_batch_size);
    info!(samples = log.len(), path = %cli.log.display(), "sample log loaded");

    let store = Arc::new(log);
    let engine = StateEngine::builder()
        .store(store.clone())
        .config(config)
        .build()?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling query");
            on_signal.cancel();
        }
    });

    let outcome = run(&engine, cli.command, &cancel).await;
    store.shutdown().await?;
    outcome
}

async fn run(
    engine: &StateEngine<InMemorySampleLog>,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let now = engine.now();
    match command {
        Command::Current { keys } => print(&engine.get_current_state(&keys).await?),
        Command::Station {
            communication,
            machine,
        } => print(&engine.station_state(&communication, &machine).await?),
        Command::Active {
            kind,
            category,
            preview,
            paging,
        } => {
            if let (true, Some(kind)) = (preview, kind) {
                return print(&engine.active_preview(kind, cancel).await?);
            }
            let filter = ActiveFilter {
                kind,
                category,
                keys: None,
            };
            let page = engine.config().resolve_page(paging.page, paging.limit)?;
            let column = match &paging.sort {
                Some(raw) => raw.parse::<ActiveColumn>().map_err(|e| anyhow!(e))?,
                None => ActiveColumn::default(),
            };
            let sort = SortSpec {
                column,
                direction: paging.direction()?,
            };
            print(&engine.get_active_now(&filter, page, sort, cancel).await?)
        }
        Command::Counter {
            key,
            reference,
            anchor,
            unit,
        } => {
            let reference: Scalar = serde_json::from_str(&reference)
                .with_context(|| format!("reference value '{}'", reference))?;
            let request =
                AccumulationRequest::new(key, reference, anchor, CounterUnit::parse_lossy(&unit));
            print(&engine.get_accumulated_duration(&request, cancel).await?)
        }
        Command::Gauge { key, unit } => {
            print(&engine.gauge_counter(&key, CounterUnit::parse_lossy(&unit)).await?)
        }
        Command::History {
            from,
            to,
            category,
            search,
            kinds,
            paging,
        } => {
            let mut query = HistoryQuery::new(window(from, to, now)?);
            query.category = category;
            query.search = search;
            if !kinds.is_empty() {
                query = query.kinds(kinds);
            }
            let page = engine.config().resolve_page(paging.page, paging.limit)?;
            let column = match &paging.sort {
                Some(raw) => raw.parse::<HistoryColumn>().map_err(|e| anyhow!(e))?,
                None => HistoryColumn::default(),
            };
            let sort = SortSpec {
                column,
                direction: paging.direction()?,
            };
            print(&engine.get_history(&query, page, sort, cancel).await?)
        }
        Command::Series { key, from, to } => {
            print(&engine.series(&key, window(from, to, now)?, cancel).await?)
        }
    }
}
