//! ChatForge Indexer
//!
//! Offline counterpart of `POST /update-db/{tenant_id}`:
//! rebuilds the document index of one tenant or of every ready tenant.

use chatforge_common::{
    config::AppConfig, embeddings::create_embedder, TenantRegistry, VERSION,
};
use chatforge_indexer::{BuildOutcome, ChunkingConfig, IndexBuilder};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer", version = VERSION, about = "Build tenant document indexes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index of a tenant
    Build {
        /// Tenant identifier
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        tenant: Option<String>,

        /// Rebuild every fully configured tenant
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let fmt = tracing_subscriber::fmt::layer().with_target(true);
    if config.observability.json_logging {
        tracing_subscriber::registry().with(filter).with(fmt.json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting ChatForge Indexer v{}", VERSION
    );

    let tenants = TenantRegistry::from_process_env(&config.storage.data_dir);
    let embedder = create_embedder(&config.embedding)?;
    let builder = IndexBuilder::new(embedder, ChunkingConfig::from(&config.indexing));

    let Command::Build { tenant, all } = cli.command;
    let targets = if all {
        tenants.ready_tenants()
    } else {
        let id = tenant.unwrap_or_default();
        vec![tenants.resolve(&id)?]
    };

    let mut failures = 0;
    for tenant in targets {
        match builder.build(&tenant).await {
            Ok(BuildOutcome::Built(summary)) => info!(
                tenant_id = %tenant.tenant_id,
                files = summary.files,
                chunks = summary.chunks,
                "Index written"
            ),
            Ok(BuildOutcome::Empty) => {
                info!(tenant_id = %tenant.tenant_id, "No documents to index")
            }
            Err(e) => {
                error!(tenant_id = %tenant.tenant_id, error = %e, "Index build failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} index build(s) failed", failures);
    }
    Ok(())
}
