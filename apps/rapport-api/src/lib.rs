pub mod routes;
pub mod state;

use std::net::SocketAddr;

use clap::Parser;
use color_eyre::eyre;
use tokio::net::TcpListener;

use crate::state::AppState;

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

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let admin_addr: SocketAddr = config.service.admin_bind.parse()?;

	check_binds(config.service.bind_localhost_only, http_addr, admin_addr)?;

	let state = AppState::new(config).await?;
	let app = routes::router(state.clone());
	let admin_app = routes::admin_router(state);
	let http_listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	let http_server = axum::serve(http_listener, app);
	let admin_listener = TcpListener::bind(admin_addr).await?;

	tracing::info!(%admin_addr, "Admin server listening.");

	let admin_server = axum::serve(admin_listener, admin_app);

	tokio::try_join!(http_server, admin_server)?;

	Ok(())
}

/// The admin surface is never exposed beyond loopback.
fn check_binds(
	bind_localhost_only: bool,
	http_addr: SocketAddr,
	admin_addr: SocketAddr,
) -> color_eyre::Result<()> {
	if bind_localhost_only && !http_addr.ip().is_loopback() {
		return Err(eyre::eyre!(
			"http_bind must be a loopback address when bind_localhost_only is true."
		));
	}
	if !admin_addr.ip().is_loopback() {
		return Err(eyre::eyre!("admin_bind must be a loopback address."));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(raw: &str) -> SocketAddr {
		raw.parse().expect("Invalid socket address.")
	}

	#[test]
	fn admin_bind_must_stay_on_loopback() {
		assert!(check_binds(false, addr("0.0.0.0:8080"), addr("127.0.0.1:8081")).is_ok());
		assert!(check_binds(false, addr("127.0.0.1:8080"), addr("0.0.0.0:8081")).is_err());
		assert!(check_binds(true, addr("0.0.0.0:8080"), addr("127.0.0.1:8081")).is_err());
		assert!(check_binds(true, addr("[::1]:8080"), addr("[::1]:8081")).is_ok());
	}
}
