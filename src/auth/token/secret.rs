//! Redacting wrapper for access and refresh token strings.

// self
use crate::_prelude::*;

/// Opaque token string that never leaks through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value for bearer use.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
