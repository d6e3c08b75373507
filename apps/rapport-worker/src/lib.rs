pub mod worker;

use clap::Parser;

use rapport_service::RapportService;
use rapport_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = rapport_cli::VERSION,
	rename_all = "kebab",
	styles = rapport_cli::styles(),
)]
pub struct Args {
	#[command(flatten)]
	pub config: rapport_cli::ConfigArgs,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = rapport_config::load(&args.config.config)?;

	rapport_cli::init_tracing(&config.service.log_level);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema(config.storage.qdrant.vector_dim).await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	let service = RapportService::new(config, db, qdrant);

	worker::run_worker(worker::WorkerState { service }).await
}
