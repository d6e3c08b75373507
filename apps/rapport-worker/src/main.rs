use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = rapport_worker::Args::parse();

	rapport_worker::run(args).await
}
