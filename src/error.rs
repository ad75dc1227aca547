//! Gateway-level error types shared across the token manager, stores, and HTTP surface.

// crates.io
use axum::{
	Json,
	extract::rejection::{JsonRejection, PathRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
};
// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token store failure (unreachable backend or missing record).
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Upstream authorization server rejected or failed the refresh exchange.
	#[error(transparent)]
	AuthenticationFailed(#[from] AuthenticationError),
	/// Forwarded request failed at the upstream API.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Inbound request could not be extracted (malformed path parameter or JSON body).
	#[error("Invalid request: {reason}")]
	InvalidRequest {
		/// Extractor rejection text.
		reason: String,
	},
}
impl Error {
	/// Stable, machine-readable label for the error class.
	pub fn code(&self) -> &'static str {
		match self {
			Self::Storage(crate::store::StoreError::NotFound) => "token_not_found",
			Self::Storage(_) => "store_unavailable",
			Self::AuthenticationFailed(_) => "authentication_failed",
			Self::Upstream(_) => "upstream_error",
			Self::Config(_) => "configuration_error",
			Self::InvalidRequest { .. } => "invalid_request",
		}
	}

	/// HTTP status rendered for the error; only malformed inbound requests are not a 500.
	pub fn status(&self) -> StatusCode {
		match self {
			Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}
impl From<PathRejection> for Error {
	fn from(rejection: PathRejection) -> Self {
		Self::InvalidRequest { reason: rejection.body_text() }
	}
}
impl From<JsonRejection> for Error {
	fn from(rejection: JsonRejection) -> Self {
		Self::InvalidRequest { reason: rejection.body_text() }
	}
}
impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status = self.status();
		let message = if status == StatusCode::BAD_REQUEST {
			tracing::warn!(code = self.code(), error = %self, "Request rejected.");

			"Invalid request."
		} else {
			tracing::error!(code = self.code(), error = %self, "Request failed.");

			"Internal server error."
		};
		let body = serde_json::json!({
			"error": {
				"code": self.code(),
				"message": message,
			}
		});

		(status, Json(body)).into_response()
	}
}

/// Failures of the refresh-token exchange; the stored record is never touched when one occurs.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// Token endpoint answered with an OAuth error or a non-success status.
	#[error("Token endpoint rejected the refresh exchange: {reason}.")]
	Rejected {
		/// Provider- or gateway-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response carried neither `expires_at` nor `expires_in`.
	#[error("Token endpoint response is missing an expiry.")]
	MissingExpiry,
	/// Token endpoint returned an expiry outside the representable range.
	#[error("Token endpoint returned an expiry outside the supported range.")]
	ExpiryOutOfRange,
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The exchange did not complete within the configured timeout.
	#[error("Token endpoint did not answer within {0:?}.")]
	Timeout(std::time::Duration),
	/// The task running the refresh ended without producing an outcome.
	#[error("Refresh task ended before completing.")]
	Interrupted {
		/// Join failure of the refresh task.
		#[source]
		source: tokio::task::JoinError,
	},
	/// A concurrent refresh this caller waited on failed.
	#[error("The in-flight refresh this request waited on failed: {reason}")]
	SharedFlight {
		/// Rendered failure of the in-flight refresh.
		reason: String,
	},
}
impl AuthenticationError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Failures of a request forwarded to the upstream API.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Upstream API answered with a client or server error status.
	#[error("Upstream API answered {method} {path} with status {status}.")]
	Status {
		/// HTTP method of the forwarded request.
		method: String,
		/// Upstream path of the forwarded request.
		path: String,
		/// Status code returned by the upstream API.
		status: u16,
	},
	/// Underlying HTTP client reported a network failure or timeout.
	#[error("Network error occurred while calling the upstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: ReqwestError,
	},
	/// Request body could not be encoded as JSON.
	#[error("Request body could not be encoded.")]
	Encode {
		/// Serialization failure.
		#[source]
		source: serde_json::Error,
	},
}
impl From<ReqwestError> for UpstreamError {
	fn from(e: ReqwestError) -> Self {
		Self::Network { source: e }
	}
}

/// Configuration and validation failures raised while booting the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured endpoint is not a valid URL.
	#[error("Endpoint `{value}` is not a valid URL.")]
	InvalidEndpoint {
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A required environment variable is not set.
	#[error("Environment variable `{0}` is required.")]
	MissingVar(&'static str),
	/// An environment variable holds a value that cannot be parsed.
	#[error("Environment variable `{name}` has an invalid value `{value}`.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Raw value.
		value: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::body;
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn codes_distinguish_missing_record_from_unavailable_store() {
		let missing: Error = StoreError::NotFound.into();
		let down: Error = StoreError::Unavailable { message: "connection refused".into() }.into();

		assert_eq!(missing.code(), "token_not_found");
		assert_eq!(down.code(), "store_unavailable");
		assert_eq!(Error::from(AuthenticationError::MissingExpiry).code(), "authentication_failed");
	}

	#[tokio::test]
	async fn responses_are_generic_500s() {
		let err: Error = AuthenticationError::Rejected {
			reason: "invalid refresh token".into(),
			status: Some(400),
		}
		.into();
		let response = err.into_response();

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let bytes = body::to_bytes(response.into_body(), usize::MAX)
			.await
			.expect("Error body should be readable.");
		let payload: serde_json::Value =
			serde_json::from_slice(&bytes).expect("Error body should be JSON.");

		assert_eq!(payload["error"]["code"], "authentication_failed");
		assert_eq!(payload["error"]["message"], "Internal server error.");
		assert!(!String::from_utf8_lossy(&bytes).contains("invalid refresh token"));
	}

	#[tokio::test]
	async fn invalid_requests_are_400s_with_the_same_body_shape() {
		let err = Error::InvalidRequest { reason: "Cannot parse `abc` to a `u64`".into() };

		assert_eq!(err.code(), "invalid_request");

		let response = err.into_response();

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);

		let bytes = body::to_bytes(response.into_body(), usize::MAX)
			.await
			.expect("Error body should be readable.");
		let payload: serde_json::Value =
			serde_json::from_slice(&bytes).expect("Error body should be JSON.");

		assert_eq!(
			payload,
			serde_json::json!({
				"error": { "code": "invalid_request", "message": "Invalid request." }
			})
		);
	}
}
