//! Environment-driven gateway configuration.

// std
use std::{env, net::SocketAddr, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::ConfigError, obs::LogFormat};

/// Default Strava OAuth base; the token endpoint is `{base}/token`.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://www.strava.com/oauth";
/// Default Strava REST API base.
pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Resolved upstream endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamEndpoints {
	/// Token endpoint used for refresh exchanges.
	pub token: Url,
	/// Base of the REST API that requests are forwarded to, without a trailing slash.
	pub api: Url,
}
impl UpstreamEndpoints {
	/// Derives the endpoints from the authorization and API base URLs.
	pub fn new(auth_base: &str, api_base: &str) -> Result<Self, ConfigError> {
		let token = parse_url(&format!("{}/token", auth_base.trim_end_matches('/')))?;
		let api = parse_url(api_base.trim_end_matches('/'))?;

		Ok(Self { token, api })
	}

	/// Builds the upstream URL for an API `path` such as `/athlete`.
	pub fn api_url(&self, path: &str, query: Option<&str>) -> Result<Url, ConfigError> {
		let mut raw = format!("{}/{}", self.api.as_str().trim_end_matches('/'), path.trim_start_matches('/'));

		if let Some(query) = query.filter(|q| !q.is_empty()) {
			raw.push('?');
			raw.push_str(query);
		}

		parse_url(&raw)
	}
}

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
	/// Interface the HTTP server binds to.
	pub host: String,
	/// Listening port.
	pub port: u16,
	/// Database connection string (`postgres://...` or `sqlite://...`).
	pub database_url: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: String,
	/// Upstream authorization and API endpoints.
	pub endpoints: UpstreamEndpoints,
	/// Bound applied to every store and upstream call.
	pub request_timeout: StdDuration,
	/// Safety margin before expiry at which tokens are refreshed.
	pub token_skew: Duration,
	/// Log line rendering.
	pub log_format: LogFormat,
}
impl Config {
	/// Default listening port.
	pub const DEFAULT_PORT: u16 = 3000;
	/// Default bound for store and upstream calls, in seconds.
	pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
	/// Default refresh safety margin, in seconds.
	pub const DEFAULT_SKEW_SECS: i64 = 60;

	/// Loads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Loads the configuration from an arbitrary variable source.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |name: &'static str| {
			lookup(name).filter(|v| !v.trim().is_empty()).ok_or(ConfigError::MissingVar(name))
		};
		let optional = |name: &'static str, default: &str| {
			lookup(name).filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_owned())
		};
		let endpoints = UpstreamEndpoints::new(
			&optional("STRAVA_AUTH_BASE_URL", DEFAULT_AUTH_BASE_URL),
			&optional("STRAVA_API_BASE_URL", DEFAULT_API_BASE_URL),
		)?;
		let timeout_secs: u64 = parse_var(
			"REQUEST_TIMEOUT_SECS",
			optional("REQUEST_TIMEOUT_SECS", &Self::DEFAULT_TIMEOUT_SECS.to_string()),
		)?;
		let skew_secs: i64 = parse_var(
			"TOKEN_SKEW_SECS",
			optional("TOKEN_SKEW_SECS", &Self::DEFAULT_SKEW_SECS.to_string()),
		)?;

		if timeout_secs == 0 {
			return Err(ConfigError::InvalidVar { name: "REQUEST_TIMEOUT_SECS", value: "0".into() });
		}
		if skew_secs < 0 {
			return Err(ConfigError::InvalidVar {
				name: "TOKEN_SKEW_SECS",
				value: skew_secs.to_string(),
			});
		}

		Ok(Self {
			host: optional("HOST", "0.0.0.0"),
			port: parse_var("PORT", optional("PORT", &Self::DEFAULT_PORT.to_string()))?,
			database_url: required("DATABASE_URL")?,
			client_id: required("STRAVA_CLIENT_ID")?,
			client_secret: required("STRAVA_CLIENT_SECRET")?,
			endpoints,
			request_timeout: StdDuration::from_secs(timeout_secs),
			token_skew: Duration::seconds(skew_secs),
			log_format: parse_var("LOG_FORMAT", optional("LOG_FORMAT", "pretty"))?,
		})
	}

	/// Socket address the server binds to.
	pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
		let raw = format!("{}:{}", self.host, self.port);

		raw.parse().map_err(|_| ConfigError::InvalidVar { name: "HOST", value: raw })
	}
}
impl Debug for Config {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Config")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("endpoints", &self.endpoints)
			.field("request_timeout", &self.request_timeout)
			.field("token_skew", &self.token_skew)
			.field("log_format", &self.log_format)
			.finish_non_exhaustive()
	}
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { value: raw.to_owned(), source })
}

fn parse_var<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
	T: FromStr,
{
	value.trim().parse().map_err(|_| ConfigError::InvalidVar { name, value })
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> =
			pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();

		move |name: &str| vars.get(name).cloned()
	}

	const REQUIRED: [(&str, &str); 3] = [
		("DATABASE_URL", "postgres://localhost/strava"),
		("STRAVA_CLIENT_ID", "1234"),
		("STRAVA_CLIENT_SECRET", "shh"),
	];

	#[test]
	fn defaults_apply_when_optional_vars_are_absent() {
		let config = Config::from_lookup(lookup(&REQUIRED)).expect("Minimal config should load.");

		assert_eq!(config.port, 3000);
		assert_eq!(config.request_timeout, StdDuration::from_secs(10));
		assert_eq!(config.token_skew, Duration::seconds(60));
		assert_eq!(config.endpoints.token.as_str(), "https://www.strava.com/oauth/token");
		assert_eq!(config.log_format, LogFormat::Pretty);
		assert!(!format!("{config:?}").contains("shh"));
	}

	#[test]
	fn missing_client_secret_is_reported() {
		let err = Config::from_lookup(lookup(&REQUIRED[..2]))
			.expect_err("Config without a client secret should fail.");

		assert!(matches!(err, ConfigError::MissingVar("STRAVA_CLIENT_SECRET")));
	}

	#[test]
	fn invalid_port_is_reported() {
		let mut pairs = REQUIRED.to_vec();

		pairs.push(("PORT", "eighty"));

		let err = Config::from_lookup(lookup(&pairs)).expect_err("Non-numeric port should fail.");

		assert!(matches!(err, ConfigError::InvalidVar { name: "PORT", .. }));
	}

	#[test]
	fn api_urls_keep_the_version_prefix() {
		let endpoints = UpstreamEndpoints::new("http://127.0.0.1:9/oauth/", "http://127.0.0.1:9/api/v3/")
			.expect("Endpoints should parse.");

		assert_eq!(endpoints.token.as_str(), "http://127.0.0.1:9/oauth/token");
		assert_eq!(
			endpoints.api_url("/activities/42/comments", None).expect("URL should build.").as_str(),
			"http://127.0.0.1:9/api/v3/activities/42/comments"
		);
		assert_eq!(
			endpoints.api_url("/athlete/activities", Some("page=2")).expect("URL should build.").as_str(),
			"http://127.0.0.1:9/api/v3/athlete/activities?page=2"
		);
	}
}
