//! The persisted token triple and its freshness rules.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Freshness of a token record relative to an instant and a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Access token can be used for upstream calls.
	Valid,
	/// Access token is expired or expires within the safety margin.
	Stale,
}

/// The single token triple the gateway works with.
///
/// Records are replaced as a whole; there is no partial update path.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Bearer token attached to upstream API calls; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Secret exchanged for a new access token once this one goes stale.
	pub refresh_token: TokenSecret,
	/// Instant after which the access token must not be used.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
}
impl TokenRecord {
	/// Creates a record from its three fields.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at,
		}
	}

	/// Creates a record whose expiry is given in Unix seconds, as stores and Strava encode it.
	pub fn from_unix(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: i64,
	) -> Result<Self, time::error::ComponentRange> {
		Ok(Self::new(access_token, refresh_token, OffsetDateTime::from_unix_timestamp(expires_at)?))
	}

	/// Expiry in whole Unix seconds.
	pub fn expires_at_unix(&self) -> i64 {
		self.expires_at.unix_timestamp()
	}

	/// Computes freshness at `now`, treating tokens within `skew` of expiry as stale.
	///
	/// A refresh deadline that falls outside the representable range counts as stale.
	pub fn status_at(&self, now: OffsetDateTime, skew: Duration) -> TokenStatus {
		match self.expires_at.checked_sub(skew) {
			Some(deadline) if now <= deadline => TokenStatus::Valid,
			_ => TokenStatus::Stale,
		}
	}

	/// Returns `true` when the record must be refreshed before use.
	pub fn is_stale_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		matches!(self.status_at(now, skew), TokenStatus::Stale)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
