use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_core::Environment;
use harvest_runner::{Harvester, Overrides};
use harvest_storage::ItemQuery;

#[derive(Parser)]
#[command(name = "harvest", version)]
struct Cli {
    /// Item database environment (prod, test, dev, local); overrides the config file
    #[arg(long, global = true)]
    env: Option<Environment>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the harvester in the current directory (creates .harvest/, config, db)
    Init,

    /// Show item counts per harvest state
    Status,

    /// Load items from a JSON or YAML list into the local backend
    ItemImport { file: PathBuf },

    /// Process every item matching the query
    HarvestAll {
        /// Stop after this many items (0 = no limit)
        #[arg(long, default_value_t = 0)]
        count: usize,
        /// JSON `where` object selecting items
        #[arg(long, default_value = "")]
        query_where: String,
        /// Download only; write nothing back
        #[arg(long)]
        read_only: bool,
    },

    /// List items that carry warnings
    Warnings,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    let mut overrides = Overrides { environment: cli.env, read_only: None };

    match cli.cmd {
        Command::Init => {
            Harvester::init_repo(&repo_root)?;
            println!("Initialized harvester in {}", repo_root.display());
        }
        Command::Status => {
            let h = Harvester::open(repo_root, &overrides)?;
            let counts = h.status()?;
            println!("Worker: {} ({})", h.cfg.worker.id, h.orchestrator.options().environment);
            println!("Items: {}", counts.values().sum::<usize>());
            for (state, n) in counts {
                println!("- {}: {}", state, n);
            }
        }
        Command::ItemImport { file } => {
            let h = Harvester::open(repo_root, &overrides)?;
            let n = h.import_items(&file)?;
            println!("Imported {} items", n);
        }
        Command::HarvestAll { count, query_where, read_only } => {
            if read_only {
                overrides.read_only = Some(true);
            }
            let h = Harvester::open(repo_root, &overrides)?;
            let query = ItemQuery::parse_where(&query_where)?;
            info!(count, query = %query_where, read_only, "harvest-all");
            let summary = h.orchestrator.harvest_all(count, &query)?;
            println!(
                "done: {}, failed: {}, skipped: {}, downloaded only: {}",
                summary.done,
                summary.failed(),
                summary.skipped,
                summary.downloaded
            );
            for failure in &summary.failures {
                println!("- {}: {:#}", failure.item, failure.primary);
            }
            if summary.failed() > 0 {
                bail!("{} item(s) failed", summary.failed());
            }
        }
        Command::Warnings => {
            let h = Harvester::open(repo_root, &overrides)?;
            for line in h.orchestrator.harvest_warnings()? {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
