//! `warden`: maintenance CLI for a relay's event and control stores.
//!
//! Reads `warden.toml` (or the path given with `--config`) and `WARDEN_*`
//! environment variables, then runs one operation and exits. Results go to
//! stdout as JSON; logs go to stderr.
//!
//! ```
//! warden stats --days 30
//! warden export --kind 1 --since 1700000000 > notes.ndjson
//! warden retention set --days 90 --exception kind:0 --exception pubkey:operator
//! warden deletions collect
//! warden deletions process
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_core::{deletion::DeletionStatus, filter::EventFilter};
use warden_store_sqlite::Stores;

use crate::config::WardenConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "warden", version, about = "Relay event store maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "warden.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Dashboard numbers: overview, daily histogram, kinds and top authors.
  Stats {
    /// Days covered by the histogram, ending today.
    #[arg(long, default_value_t = 7)]
    days:   u32,
    /// Number of top authors to show.
    #[arg(long, default_value_t = 10)]
    top:    usize,
    /// Show today's hourly histogram instead of a daily one.
    #[arg(long)]
    hourly: bool,
  },
  /// Print one page of matching events, newest first.
  Query {
    #[command(flatten)]
    filter: FilterArgs,
    /// Print only the number of matching events.
    #[arg(long)]
    count:  bool,
  },
  /// Stream every matching event as NDJSON, oldest first. Ctrl-C stops.
  Export {
    #[command(flatten)]
    filter: FilterArgs,
  },
  /// Inspect, change or apply the retention policy.
  #[command(subcommand)]
  Retention(RetentionCommand),
  /// The deletion request queue.
  #[command(subcommand)]
  Deletions(DeletionsCommand),
  /// Space reclamation and health checks on the event store.
  #[command(subcommand)]
  Maintenance(MaintenanceCommand),
  /// Sync job history.
  #[command(subcommand)]
  Jobs(JobsCommand),
}

#[derive(Subcommand)]
enum RetentionCommand {
  /// Print the stored policy.
  Show,
  /// Apply the stored policy now.
  Run,
  /// Change the stored policy; unspecified fields keep their value.
  Set {
    /// Retention period in days; 0 disables retention.
    #[arg(long)]
    days:             Option<u32>,
    /// Exception rule (`kind:<N>`, `pubkey:<hex>` or `pubkey:operator`).
    /// Replaces the stored list when given.
    #[arg(long = "exception", value_name = "RULE")]
    exceptions:       Vec<String>,
    /// Remove every exception rule.
    #[arg(long, conflicts_with = "exceptions")]
    clear_exceptions: bool,
    /// Whether protocol deletion requests are carried out.
    #[arg(long)]
    honor_requests:   Option<bool>,
  },
}

#[derive(Subcommand)]
enum DeletionsCommand {
  /// List requests, newest first, or oldest first for one status.
  List {
    #[arg(long, value_parser = parse_status)]
    status: Option<DeletionStatus>,
    #[arg(long, default_value_t = 50)]
    limit:  usize,
  },
  /// Queue an admin request to delete one event.
  Request {
    /// Hex id of the event to delete.
    id:     String,
    #[arg(long)]
    reason: Option<String>,
  },
  /// Queue a request for every kind-5 deletion event in the event store.
  Collect {
    /// Only scan deletion events created at or after this time, unix seconds.
    #[arg(long)]
    since: Option<i64>,
  },
  /// Carry out every pending request.
  Process,
}

#[derive(Subcommand)]
enum MaintenanceCommand {
  /// Rebuild the event store file to reclaim deleted space.
  Vacuum,
  /// Run the engine's integrity check.
  Integrity,
}

#[derive(Subcommand)]
enum JobsCommand {
  /// Recent sync jobs, newest first.
  List {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
}

/// Flags shared by `query` and `export`.
#[derive(Args)]
struct FilterArgs {
  /// Event id (hex); repeatable.
  #[arg(long = "id", value_name = "HEX")]
  ids:      Vec<String>,
  /// Author pubkey (hex); repeatable.
  #[arg(long = "author", value_name = "HEX")]
  authors:  Vec<String>,
  /// Event kind; repeatable.
  #[arg(long = "kind", value_name = "N")]
  kinds:    Vec<u32>,
  /// Inclusive lower bound, unix seconds.
  #[arg(long)]
  since:    Option<i64>,
  /// Inclusive upper bound, unix seconds.
  #[arg(long)]
  until:    Option<i64>,
  /// Substring of the event content.
  #[arg(long)]
  search:   Option<String>,
  /// Pubkey referenced by a `p` tag.
  #[arg(long, value_name = "HEX")]
  mentions: Option<String>,
  #[arg(long)]
  limit:    Option<i64>,
  #[arg(long)]
  offset:   Option<i64>,
}

impl From<FilterArgs> for EventFilter {
  fn from(a: FilterArgs) -> Self {
    EventFilter {
      ids:      a.ids,
      authors:  a.authors,
      kinds:    a.kinds,
      since:    a.since,
      until:    a.until,
      search:   a.search,
      mentions: a.mentions,
      limit:    a.limit,
      offset:   a.offset,
    }
  }
}

fn parse_status(s: &str) -> Result<DeletionStatus, String> {
  s.parse().map_err(|e: warden_core::Error| e.to_string())
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs on stderr keep stdout clean for exported data.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = WardenConfig::load(&cli.config)?;
  let tz = cfg.timezone()?;

  let stores = Stores::open(&cfg.control_path, &cfg.event_path, cfg.store_options())
    .await
    .with_context(|| {
      format!(
        "failed to open stores at {:?} and {:?}",
        cfg.control_path, cfg.event_path
      )
    })?;

  match cli.command {
    Command::Stats { days, top, hourly } => commands::stats(&stores, &tz, days, top, hourly).await,
    Command::Query { filter, count } => commands::query(&stores, filter.into(), count).await,
    Command::Export { filter } => commands::export(&stores, filter.into()).await,
    Command::Retention(RetentionCommand::Show) => commands::retention_show(&stores).await,
    Command::Retention(RetentionCommand::Run) => commands::retention_run(&stores).await,
    Command::Retention(RetentionCommand::Set {
      days,
      exceptions,
      clear_exceptions,
      honor_requests,
    }) => {
      let exceptions = if clear_exceptions {
        Some(Vec::new())
      } else {
        (!exceptions.is_empty()).then_some(exceptions)
      };
      commands::retention_set(&stores, days, exceptions, honor_requests).await
    }
    Command::Deletions(DeletionsCommand::List { status, limit }) => {
      commands::deletions_list(&stores, status, limit).await
    }
    Command::Deletions(DeletionsCommand::Request { id, reason }) => {
      commands::deletions_request(&stores, id, reason).await
    }
    Command::Deletions(DeletionsCommand::Collect { since }) => {
      commands::deletions_collect(&stores, since).await
    }
    Command::Deletions(DeletionsCommand::Process) => commands::deletions_process(&stores).await,
    Command::Maintenance(MaintenanceCommand::Vacuum) => commands::vacuum(&stores).await,
    Command::Maintenance(MaintenanceCommand::Integrity) => commands::integrity(&stores).await,
    Command::Jobs(JobsCommand::List { limit }) => commands::jobs_list(&stores, limit).await,
  }
}
