//! Pass-through Strava API gateway that keeps a single OAuth bearer token fresh.
//!
//! Every inbound request asks the [`manager::TokenManager`] for a usable access token. The
//! manager reads the persisted token triple from a [`store::TokenStore`], refreshes it through
//! the upstream token endpoint when it is about to expire (at most one exchange in flight), and
//! commits the rotated triple before the [`gateway`] decorates the forwarded request with it.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod manager;
pub mod oauth;
pub mod obs;
pub mod store;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::TokenRecord,
		config::UpstreamEndpoints,
		http::ReqwestHttpClient,
		manager::{ReqwestTokenManager, TokenManager},
		store::{MemoryStore, TokenStore},
	};

	/// Client identifier used by test fixtures.
	pub const TEST_CLIENT_ID: &str = "client-test";
	/// Client secret used by test fixtures.
	pub const TEST_CLIENT_SECRET: &str = "secret-test";

	/// Builds a record that expires `expires_in` from now.
	pub fn record_expiring_in(access: &str, refresh: &str, expires_in: Duration) -> TokenRecord {
		TokenRecord::new(access, refresh, now_truncated() + expires_in)
	}

	/// Current UTC instant truncated to whole seconds, matching what stores persist.
	pub fn now_truncated() -> OffsetDateTime {
		let now = OffsetDateTime::now_utc();

		now.replace_nanosecond(0).unwrap_or(now)
	}

	/// Upstream endpoints that point both the token exchange and the API at `base`.
	///
	/// The token endpoint resolves to `{base}/oauth/token` and the API to `{base}/api/v3`.
	pub fn test_endpoints(base: &str) -> UpstreamEndpoints {
		UpstreamEndpoints::new(&format!("{base}/oauth"), &format!("{base}/api/v3"))
			.expect("Mock endpoints should parse successfully.")
	}

	/// Constructs a [`TokenManager`] backed by an in-memory store seeded with `record`.
	pub async fn build_test_manager(
		base: &str,
		record: Option<TokenRecord>,
	) -> (ReqwestTokenManager, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());

		if let Some(record) = record {
			store_backend.write(record).await.expect("Failed to seed the memory store.");
		}

		let store: Arc<dyn TokenStore> = store_backend.clone();
		let manager = TokenManager::with_http_client(
			store,
			test_endpoints(base).token,
			TEST_CLIENT_ID,
			ReqwestHttpClient::default(),
		)
		.with_client_secret(TEST_CLIENT_SECRET);

		(manager, store_backend)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
use {clap as _, color_eyre as _, dotenvy as _};
#[cfg(test)] use {tempfile as _, tower as _};
