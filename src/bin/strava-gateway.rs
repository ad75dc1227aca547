//! Gateway server entry point.
//!
//! `strava-gateway serve` (the default) loads configuration from the environment and a `.env`
//! file, then serves the forwarding routes until Ctrl-C or SIGTERM. `strava-gateway seed` writes
//! the initial token triple into the database so the first request has something to refresh.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use clap::{Parser, Subcommand};
use color_eyre::Result;
use tokio::net::TcpListener;
// self
use strava_gateway::{
	auth::TokenRecord,
	config::Config,
	gateway::{self, AppState},
	manager::ReqwestTokenManager,
	obs::{self, LogFormat},
	store::{SqlStore, TokenStore},
};

#[derive(Debug, Parser)]
#[command(name = "strava-gateway", version, about = "Pass-through Strava API gateway")]
struct Cli {
	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Serve the gateway routes.
	Serve,
	/// Store the initial token triple.
	Seed {
		/// Database connection string.
		#[arg(long, env = "DATABASE_URL", hide_env_values = true)]
		database_url: String,
		/// Access token issued by the authorization flow.
		#[arg(long)]
		access_token: String,
		/// Refresh token issued alongside it.
		#[arg(long)]
		refresh_token: String,
		/// Access token expiry, in Unix seconds.
		#[arg(long)]
		expires_at: i64,
		/// Replace an existing record instead of keeping it.
		#[arg(long)]
		overwrite: bool,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let _ = dotenvy::dotenv();
	let cli = Cli::parse();

	match cli.command.unwrap_or(Command::Serve) {
		Command::Serve => serve().await,
		Command::Seed { database_url, access_token, refresh_token, expires_at, overwrite } => {
			obs::init_tracing(LogFormat::Pretty);

			let record = TokenRecord::from_unix(access_token, refresh_token, expires_at)?;
			let store = SqlStore::connect(&database_url, Duration::from_secs(10)).await?;

			store.migrate().await?;

			if store.seed(&record, overwrite).await? {
				tracing::info!(expires_at = %record.expires_at, "Token record seeded.");
			} else {
				tracing::warn!("A token record already exists; pass --overwrite to replace it.");
			}

			Ok(())
		},
	}
}

async fn serve() -> Result<()> {
	let config = Config::from_env()?;

	obs::init_tracing(config.log_format);
	tracing::info!(version = env!("CARGO_PKG_VERSION"), ?config, "Starting strava-gateway.");

	let store = SqlStore::connect(&config.database_url, config.request_timeout).await?;

	store.migrate().await?;

	let store: Arc<dyn TokenStore> = Arc::new(store);
	let manager = ReqwestTokenManager::new(
		store,
		config.endpoints.token.clone(),
		config.client_id.clone(),
		config.request_timeout,
	)?
	.with_client_secret(config.client_secret.clone())
	.with_skew(config.token_skew);
	let state = AppState::new(Arc::new(manager), config.endpoints.clone(), config.request_timeout)?;
	let addr = config.bind_addr()?;
	let listener = TcpListener::bind(addr).await?;

	tracing::info!(%addr, "Listening.");

	axum::serve(listener, gateway::router(state)).with_graceful_shutdown(shutdown_signal()).await?;

	tracing::info!("Shut down.");

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to listen for Ctrl-C: {e}.");
		}
	};
	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			},
			Err(e) => {
				tracing::error!("Failed to listen for SIGTERM: {e}.");
				std::future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
