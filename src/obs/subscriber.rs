// crates.io
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
// self
use crate::_prelude::*;

const DEFAULT_DIRECTIVES: &str = "strava_gateway=info,tower_http=info";

/// Log line rendering for the process-wide subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
	/// Human-oriented multi-line output.
	#[default]
	Pretty,
	/// One JSON object per event, for log shippers.
	Json,
}
impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"pretty" | "text" => Ok(Self::Pretty),
			"json" => Ok(Self::Json),
			other => Err(format!("unknown log format `{other}`")),
		}
	}
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` overrides the default `strava_gateway=info` filter. Calling this more than once
/// is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(format: LogFormat) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
	let registry = tracing_subscriber::registry().with(filter);
	let result = match format {
		LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
		LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).try_init(),
	};

	if let Err(e) = result {
		tracing::debug!("Tracing subscriber already installed: {e}.");
	}
}
