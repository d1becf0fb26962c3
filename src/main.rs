use std::sync::Arc;

use anyhow::{Context, Result};
use catalog_migrate::config::{MigrationConfig, OPTIONAL_KEYS, REQUIRED_KEYS};
use catalog_migrate::database_ops::memory::{MemoryStorage, MemoryStore};
use catalog_migrate::database_ops::supabase::{SupabaseRest, SupabaseStorage};
use catalog_migrate::migration::HttpImageFetcher;
use catalog_migrate::orchestrator::{fetch_source, run_migration, Backends, RunOptions};
use catalog_migrate::telemetry::init_tracing;
use catalog_migrate::util::env;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "catalog-migrate",
    version,
    about = "Move the product catalog from the old Supabase project to the new one"
)]
struct Cli {
    /// Debug logging for this crate (RUST_LOG still wins)
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Extract, reset the destination, then migrate categories, brands and products
    Run {
        /// Keep existing destination rows and objects
        #[arg(long, default_value_t = false)]
        skip_clean: bool,
        /// Write into in-memory stores instead of the new project (images are still downloaded)
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Rows per source page, at most 1000 (defaults to MIGRATION_PAGE_SIZE or 1000)
        #[arg(long)]
        page_size: Option<usize>,
    },
    /// Validate configuration and log a redacted snapshot
    Preflight,
    /// Extract the source tables and print their row counts
    SourceCounts {
        #[arg(long)]
        page_size: Option<usize>,
    },
}

fn load_config(page_size: Option<usize>) -> Result<MigrationConfig> {
    let config = MigrationConfig::from_env().context("invalid configuration")?;
    Ok(config.with_page_size(page_size))
}

fn live_source(config: &MigrationConfig) -> Result<SupabaseRest> {
    SupabaseRest::new(&config.source, config.http_timeout)
}

fn backends(config: &MigrationConfig, dry_run: bool) -> Result<Backends> {
    let source = Arc::new(live_source(config)?);
    let fetcher = Arc::new(HttpImageFetcher::new(config.image_timeout)?);
    if dry_run {
        return Ok(Backends {
            source,
            destination: Arc::new(MemoryStore::new()),
            storage: Arc::new(MemoryStorage::new()),
            fetcher,
        });
    }
    Ok(Backends {
        source,
        destination: Arc::new(
            SupabaseRest::new(&config.destination, config.http_timeout)?
                .with_select_page_size(config.page_size),
        ),
        storage: Arc::new(SupabaseStorage::new(&config.destination, config.http_timeout)?),
        fetcher,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env::init_env();
    let cli = Cli::parse();
    init_tracing("info", cli.verbose)?;

    match cli.command {
        Commands::Preflight => {
            env::preflight_check("catalog-migrate", &REQUIRED_KEYS, &OPTIONAL_KEYS)?;
            let config = load_config(None)?;
            println!(
                "configuration ok: {} -> {} (page size {}, buckets {}/{})",
                config.source.base_url,
                config.destination.base_url,
                config.page_size,
                config.product_bucket,
                config.category_bucket
            );
        }
        Commands::SourceCounts { page_size } => {
            let config = load_config(page_size)?;
            let source = live_source(&config)?;
            let snapshot = fetch_source(&source, config.page_size).await?;
            println!("product  : {}", snapshot.products.len());
            println!("pricing  : {}", snapshot.pricing.len());
            println!("category : {}", snapshot.categories.len());
            if snapshot.rejected > 0 {
                println!("rejected : {}", snapshot.rejected);
            }
        }
        Commands::Run {
            skip_clean,
            dry_run,
            page_size,
        } => {
            env::preflight_check("catalog-migrate", &REQUIRED_KEYS, &OPTIONAL_KEYS)?;
            let config = load_config(page_size)?;
            let backends = backends(&config, dry_run)?;
            let options = RunOptions {
                skip_clean,
                ..RunOptions::from_config(&config)
            };
            if dry_run {
                warn!("dry run: destination writes go to in-memory stores");
            }
            info!(
                source = %config.source.base_url,
                destination = %config.destination.base_url,
                skip_clean,
                dry_run,
                "migration starting"
            );
            let report = match run_migration(&backends, &options).await {
                Ok(report) => report,
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(error = %message, "migration aborted");
                    return Err(e);
                }
            };
            println!("{report}");
            if report.has_partial_failures() {
                warn!("migration finished with partial failures");
            } else {
                info!("migration finished");
            }
        }
    }
    Ok(())
}
