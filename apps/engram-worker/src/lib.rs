use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use engram_providers::Embedder;
use engram_service::{EngramService, ReindexManager, ReindexQueue};
use engram_storage::VectorStore;

pub mod worker;

pub use worker::{StoredTextBuilder, WorkerState};

#[derive(Debug, Parser)]
#[command(rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = engram_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let embedder = Embedder::from_config(&config.provider)?;
	let store = VectorStore::from_config(&config.storage, config.provider.dimensions).await?;
	let service = Arc::new(EngramService::new(config, store, embedder));
	let queue = Arc::new(ReindexQueue::from_config(&service.cfg.reindex.queue));
	let manager = Arc::new(ReindexManager::new(service.clone(), queue));
	let builder = Arc::new(StoredTextBuilder::new(service));
	let state = WorkerState::new(manager, builder);

	worker::run_worker(state).await
}
