use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	engram_worker::run(engram_worker::Args::parse()).await
}
