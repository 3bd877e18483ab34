//! mam-admin - inspect and maintain account message archives.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jid::Jid;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use waddle_mam::erasure::ArchiveEraser;
use waddle_mam::executor::QueryExecutor;
use waddle_mam::telemetry::{self, LogFormat};
use waddle_mam::{Filters, LibSqlArchiveStore, MamConfig, MamHooks, PageRequest};

/// Waddle MAM administration tool
#[derive(Parser)]
#[command(name = "mam-admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogArg::Pretty)]
    log_format: LogArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogArg {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the oldest and newest archived message of an account
    Metadata {
        /// Account local part
        user: String,
    },
    /// List archived messages of an account
    List {
        /// Account local part
        user: String,

        /// Page size (1-250)
        #[arg(short, long)]
        max: Option<usize>,

        /// Page after this archive id
        #[arg(long, conflicts_with_all = ["before", "index"])]
        after: Option<String>,

        /// Page before this archive id
        #[arg(long, conflicts_with = "index")]
        before: Option<String>,

        /// Page starting at this offset
        #[arg(long)]
        index: Option<usize>,

        /// Only messages exchanged with this address
        #[arg(short, long)]
        with: Option<String>,

        /// Return the page in reverse order
        #[arg(long)]
        flip: bool,
    },
    /// Delete the whole archive of an account
    Erase {
        /// Account local part
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format {
        LogArg::Pretty => LogFormat::Pretty,
        LogArg::Json => LogFormat::Json,
    };
    telemetry::init(format).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let config = MamConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.log_config();

    let Some(path) = config.database_path.as_ref() else {
        bail!("No database configured, set database_path or WADDLE_MAM_DB_PATH");
    };
    let store = Arc::new(
        LibSqlArchiveStore::open_local(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?,
    );
    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Metadata { user } => {
            let executor = QueryExecutor::new(store, Arc::new(MamHooks::new()));
            let metadata = executor.metadata(&user, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "archive": user, "metadata": metadata }))?);
        }
        Commands::List {
            user,
            max,
            after,
            before,
            index,
            with,
            flip,
        } => {
            let page = match (after, before, index) {
                (Some(after), _, _) => PageRequest::after(max, after),
                (_, Some(before), _) => PageRequest::before(max, before),
                (_, _, Some(index)) => PageRequest::index(max, index),
                _ => PageRequest::first(max),
            };
            let filters = Filters {
                with: with
                    .map(|w| w.parse::<Jid>())
                    .transpose()
                    .context("Invalid --with address")?,
                ..Default::default()
            };

            let executor = QueryExecutor::new(store, Arc::new(MamHooks::new()));
            let page = executor.execute(&user, &filters, &page, flip, &cancel).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "archive": user,
                    "page": page.result,
                    "messages": page.items,
                }))?
            );
        }
        Commands::Erase { user } => {
            let eraser = ArchiveEraser::new(store, false);
            eraser.on_user_deleted(&user, &cancel).await?;
            info!(archive = %user, "Archive erased");
            println!("{}", json!({ "archive": user, "erased": true }));
        }
    }

    Ok(())
}
