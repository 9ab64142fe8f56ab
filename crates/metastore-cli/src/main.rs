//! `metastore`: apply and inspect split metastore schema migrations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use metastore_core::config::{CliOverrides, MetastoreConfig, MissingNodeIdMode};
use metastore_core::errors::MetastoreErrorCode;
use metastore_core::model::NodeId;
use metastore_storage::migrations::{self, Direction, MigrationOptions};
use metastore_storage::queries::splits;
use metastore_storage::{verify, DatabaseManager};

#[derive(Parser)]
#[command(name = "metastore")]
#[command(about = "Schema migrations and consistency checks for the split metastore", long_about = None)]
struct Args {
    /// Directory holding `metastore.toml`.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Database file; overrides config and environment.
    #[arg(long)]
    database: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations, or step down to an older version.
    Migrate {
        /// Target schema version. Default: latest.
        #[arg(long)]
        to: Option<u32>,
        /// What to do with splits whose metadata has no node_id.
        #[arg(long, value_parser = parse_mode)]
        missing_node_id: Option<MissingNodeIdMode>,
        /// Node id written when `--missing-node-id sentinel` is used.
        #[arg(long)]
        sentinel_node_id: Option<String>,
    },
    /// Print the schema version, applied and pending migrations.
    Status,
    /// Check the node_id invariant over every split.
    Verify,
    /// List the splits produced by a node.
    Splits {
        #[arg(long)]
        node_id: String,
    },
}

fn parse_mode(s: &str) -> Result<MissingNodeIdMode, String> {
    s.parse().map_err(|e: metastore_core::errors::ConfigError| e.to_string())
}

fn main() -> ExitCode {
    metastore_core::tracing::init_tracing();
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut overrides = CliOverrides {
        database_path: args.database.clone(),
        ..Default::default()
    };
    if let Command::Migrate {
        to,
        missing_node_id,
        sentinel_node_id,
    } = &args.command
    {
        overrides.target_version = *to;
        overrides.missing_node_id = *missing_node_id;
        overrides.sentinel_node_id = sentinel_node_id.clone();
    }

    let config = MetastoreConfig::load(&args.root, Some(&overrides))
        .with_context(|| format!("loading config from {}", args.root.display()))?;
    let path = PathBuf::from(config.storage.effective_database_path());
    let db = DatabaseManager::open(&path, &config.storage)
        .with_context(|| format!("opening {}", path.display()))?;

    match args.command {
        Command::Migrate { .. } => {
            let options = MigrationOptions::with_policy(config.migration.policy()?);
            let target = config
                .migration
                .target_version
                .unwrap_or_else(migrations::latest_version);
            let report = match db.migrate_to(target, &options) {
                Ok(report) => report,
                Err(e) => anyhow::bail!("{}", e.coded_string()),
            };
            if report.is_noop() {
                println!("schema already at version {}", report.to_version);
            }
            for step in &report.steps {
                let verb = match step.direction {
                    Direction::Up => "applied",
                    Direction::Down => "reverted",
                };
                println!(
                    "{verb} v{:03} {} ({} rows, {} ms)",
                    step.version, step.name, step.rows_affected, step.duration_ms
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let (version, applied, pending) = db.with_writer(|conn| {
                Ok((
                    migrations::current_version(conn)?,
                    migrations::applied_migrations(conn)?,
                    migrations::pending_migrations(conn)?,
                ))
            })?;
            println!("schema version: {version}");
            for record in applied {
                println!(
                    "  applied v{:03} {} at {} ({} rows)",
                    record.version, record.name, record.applied_at, record.rows_affected
                );
            }
            for migration in pending {
                println!("  pending v{:03} {}", migration.version, migration.name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify => {
            let (report, index_used) = db.with_reader(|conn| {
                Ok((
                    verify::verify_node_id_invariant(conn)?,
                    verify::node_id_index_used(conn)?,
                ))
            })?;
            println!(
                "{}",
                serde_json::json!({
                    "total_rows": report.total_rows,
                    "null_node_ids": report.null_node_ids,
                    "over_length": report.over_length,
                    "mismatched": report.mismatched,
                    "missing_in_document": report.missing_in_document,
                    "column_not_null": report.column_not_null,
                    "index_present": report.index_present,
                    "index_used": index_used,
                    "consistent": report.is_consistent(),
                })
            );
            Ok(if report.is_consistent() && index_used {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Splits { node_id } => {
            let node_id = NodeId::new(node_id)?;
            let rows = db.with_reader(|conn| splits::list_splits_by_node(conn, &node_id))?;
            for row in rows {
                println!("{}\t{}\t{}", row.index_uid, row.split_id, row.split_state);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
