use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = ember_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let queue = ember_queue::TaskQueue::connect(&config.storage.postgres).await?;

	queue.ensure_schema().await?;

	let namespaces = ember_vector::Namespaces::new(
		&config.namespaces,
		config.storage.qdrant.vector_dim,
		&config.storage.qdrant.distance,
	)?;
	let vectors = ember_vector::VectorStore::connect(&config.storage.qdrant, namespaces).await?;

	vectors.ensure_collections().await?;
	tracing::info!(
		namespaces = vectors.namespaces().len(),
		"Vector collections ready."
	);

	let selector = ember_providers::ModelSelector::new(config.provider.clone());
	let selection = selector.refresh_catalog().await?;
	let Some(primary) = selection.primary.as_ref() else {
		return Err(eyre::eyre!("The provider lists no embedding-capable models."));
	};

	tracing::info!(
		primary = %primary.id,
		secondary = selection.secondary.as_ref().map(|model| model.id.as_str()).unwrap_or("none"),
		tertiary = selection.tertiary.as_ref().map(|model| model.id.as_str()).unwrap_or("none"),
		"Embedding catalog refreshed."
	);

	let mut pipeline =
		ember_pipeline::Pipeline::new(config, queue, vectors, Arc::new(selector));

	for analyzer in ember_pipeline::default_analyzers() {
		pipeline.register_analyzer(analyzer);
	}

	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Failed to listen for ctrl-c.");

			return;
		}

		tracing::info!("Shutdown requested; finishing the task in flight.");

		let _ = shutdown_tx.send(true);
	});

	pipeline.run(shutdown_rx).await?;

	Ok(())
}
