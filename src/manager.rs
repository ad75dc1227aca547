//! Token lifecycle orchestration with a single in-flight refresh.
//!
//! [`TokenManager::get_usable_token`] returns the stored access token while it is outside the
//! skew window. Once it is stale, callers serialize on one flight lock: the first one performs
//! the `grant_type=refresh_token` exchange and commits the rotated triple, everyone queued
//! behind it re-reads the store and reuses that result. A failed flight is reported to the
//! callers that waited on it instead of being retried by each of them.
//!
//! The exchange and the commit run on a detached task that owns the flight lock. Dropping the
//! request that started a flight therefore never abandons a rotated triple before it is stored.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration as StdDuration,
};
// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	error::AuthenticationError,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::RefreshClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{StoreError, TokenStore},
};

/// Token manager specialized for the crate's reqwest transport.
pub type ReqwestTokenManager = TokenManager<ReqwestHttpClient>;

/// Keeps the singleton token record usable and hands out its access token.
pub struct TokenManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// HTTP client wrapper used for refresh exchanges.
	pub http_client: Arc<C>,
	/// Store holding the singleton token record.
	pub store: Arc<dyn TokenStore>,
	/// Token endpoint refresh exchanges are posted to.
	pub token_endpoint: Url,
	/// OAuth client identifier sent with every exchange.
	pub client_id: String,
	/// OAuth client secret sent in the request body.
	pub client_secret: Option<String>,
	/// Shared counters for token resolutions.
	pub refresh_metrics: Arc<RefreshMetrics>,
	skew: Duration,
	timeout: StdDuration,
	flight: Arc<AsyncMutex<FlightState>>,
	completed_flights: Arc<AtomicU64>,
}
impl<C> TokenManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Default safety margin before expiry at which a token counts as stale.
	pub const DEFAULT_SKEW: Duration = Duration::seconds(60);
	/// Default bound for each store call and refresh exchange.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

	/// Creates a manager that reuses the caller-provided transport.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		token_endpoint: Url,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			store,
			token_endpoint,
			client_id: client_id.into(),
			client_secret: None,
			refresh_metrics: Default::default(),
			skew: Self::DEFAULT_SKEW,
			timeout: Self::DEFAULT_TIMEOUT,
			flight: Default::default(),
			completed_flights: Default::default(),
		}
	}

	/// Sets or replaces the client secret sent with refresh exchanges.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the staleness margin.
	pub fn with_skew(mut self, skew: Duration) -> Self {
		self.skew = skew;

		self
	}

	/// Overrides the bound applied to store calls and refresh exchanges.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Returns an access token that stays valid for at least the configured skew.
	///
	/// The stored token is returned as-is while fresh. A stale token triggers exactly one
	/// refresh exchange across all concurrent callers; the rotated triple is persisted before
	/// its access token is handed out. A stale token is never returned.
	pub async fn get_usable_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "get_usable_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span.instrument(self.resolve()).await;

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(e) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				tracing::warn!(code = e.code(), error = %e, "Could not provide a usable access token.");
			},
		}

		result.map(|record| record.access_token)
	}

	/// Exchanges `refresh_token` for a new token triple without touching the store.
	pub async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
		let client = <RefreshClient<C>>::new(
			&self.token_endpoint,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
		)?;

		self.refresh_metrics.record_exchange();

		let record = tokio::time::timeout(self.timeout, client.refresh(refresh_token))
			.await
			.map_err(|_| AuthenticationError::Timeout(self.timeout))??;

		Ok(record)
	}

	async fn resolve(&self) -> Result<TokenRecord> {
		let current = self.read_store().await?;

		if self.is_usable(&current) {
			return Ok(current);
		}

		let observed = self.completed_flights.load(Ordering::Acquire);
		let flight = self.flight.lock_arc().await;

		if self.completed_flights.load(Ordering::Acquire) != observed {
			if let Some(failure) = &flight.last_failure {
				return Err(failure.to_error());
			}
		}

		// Another flight may have committed while this caller queued.
		let current = self.read_store().await?;

		if self.is_usable(&current) {
			return Ok(current);
		}

		tracing::info!(expires_at = %current.expires_at, "Access token is stale, refreshing.");

		let manager = self.clone();
		let task = tokio::spawn(tracing::Instrument::in_current_span(async move {
			manager.fly(flight, current).await
		}));

		task.await.map_err(|source| AuthenticationError::Interrupted { source })?
	}

	/// Runs one flight to completion while holding the flight lock.
	async fn fly(
		&self,
		mut flight: MutexGuardArc<FlightState>,
		current: TokenRecord,
	) -> Result<TokenRecord> {
		let outcome = self.rotate(&current).await;

		flight.last_failure = outcome.as_ref().err().map(FlightFailure::from_error);
		self.completed_flights.fetch_add(1, Ordering::Release);

		outcome
	}

	async fn rotate(&self, current: &TokenRecord) -> Result<TokenRecord> {
		let refreshed = self.refresh(current.refresh_token.expose()).await?;

		self.write_store(refreshed.clone()).await?;
		tracing::info!(expires_at = %refreshed.expires_at, "Access token refreshed.");

		Ok(refreshed)
	}

	async fn read_store(&self) -> Result<TokenRecord> {
		let record = tokio::time::timeout(self.timeout, self.store.read())
			.await
			.map_err(|_| StoreError::unavailable("read timed out"))??;

		Ok(record)
	}

	async fn write_store(&self, record: TokenRecord) -> Result<()> {
		tokio::time::timeout(self.timeout, self.store.write(record))
			.await
			.map_err(|_| StoreError::unavailable("write timed out"))??;

		Ok(())
	}

	fn is_usable(&self, record: &TokenRecord) -> bool {
		!record.is_stale_at(OffsetDateTime::now_utc(), self.skew)
	}
}
impl ReqwestTokenManager {
	/// Creates a manager with its own reqwest transport bounded by `timeout`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		token_endpoint: Url,
		client_id: impl Into<String>,
		timeout: StdDuration,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(timeout)?;

		Ok(Self::with_http_client(store, token_endpoint, client_id, http_client).with_timeout(timeout))
	}
}
impl<C> Clone for TokenManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			store: self.store.clone(),
			token_endpoint: self.token_endpoint.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			skew: self.skew,
			timeout: self.timeout,
			flight: self.flight.clone(),
			completed_flights: self.completed_flights.clone(),
		}
	}
}
impl<C> Debug for TokenManager<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("skew", &self.skew)
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[derive(Debug, Default)]
struct FlightState {
	last_failure: Option<FlightFailure>,
}

#[derive(Clone, Debug)]
enum FlightFailure {
	Storage(StoreError),
	Authentication(String),
}
impl FlightFailure {
	fn from_error(e: &Error) -> Self {
		match e {
			Error::Storage(inner) => Self::Storage(inner.clone()),
			other => Self::Authentication(other.to_string()),
		}
	}

	fn to_error(&self) -> Error {
		match self {
			Self::Storage(inner) => inner.clone().into(),
			Self::Authentication(reason) =>
				AuthenticationError::SharedFlight { reason: reason.clone() }.into(),
		}
	}
}
