use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	ember_worker::run(ember_worker::Args::parse()).await
}
