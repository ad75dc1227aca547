//! Refresh-token exchange against the upstream authorization server.
//!
//! The exchange is a `grant_type=refresh_token` form POST carrying the client credentials in
//! the request body. Strava reports the new expiry as absolute Unix seconds (`expires_at`);
//! `expires_in` is honoured as a fallback for token endpoints that only send a lifetime.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RefreshToken, RequestTokenError, StandardRevocableToken,
	StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	error::{AuthenticationError, ConfigError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Extra fields Strava adds to the standard OAuth token response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExpiryFields {
	/// Absolute expiry of the issued access token, in Unix seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<i64>,
}
impl ExtraTokenFields for ExpiryFields {}

type ExchangeTokenResponse = StandardTokenResponse<ExpiryFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	ExchangeTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthenticationError>> + 'a + Send>>;

/// Performs refresh-token exchanges with a fixed client identity.
pub struct RefreshClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	token_endpoint: Url,
}
impl<C> RefreshClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Builds an exchange client posting to `token_endpoint`.
	pub fn new(
		token_endpoint: &Url,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_endpoint.to_string()).map_err(|source| {
			ConfigError::InvalidEndpoint { value: token_endpoint.to_string(), source }
		})?;
		let mut oauth_client: ConfiguredClient = Client::new(ClientId::new(client_id.to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			token_endpoint: token_endpoint.to_owned(),
		})
	}

	/// Exchanges `refresh_token` for a new token triple.
	///
	/// A provider that omits a rotated refresh token keeps the presented one valid, so the
	/// returned record reuses it in that case. A single attempt is made.
	pub fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| map_request_error(meta.take(), err))?;

			map_refresh_token_response(refresh_token, response, OffsetDateTime::now_utc())
		})
	}
}
impl<C> Debug for RefreshClient<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshClient").field("token_endpoint", &self.token_endpoint.as_str()).finish()
	}
}

fn map_refresh_token_response(
	presented_refresh: &str,
	response: ExchangeTokenResponse,
	now: OffsetDateTime,
) -> Result<TokenRecord, AuthenticationError> {
	let expires_at = match (response.extra_fields().expires_at, response.expires_in()) {
		(Some(unix), _) => OffsetDateTime::from_unix_timestamp(unix)
			.map_err(|_| AuthenticationError::ExpiryOutOfRange)?,
		(None, Some(lifetime)) => {
			let secs =
				i64::try_from(lifetime.as_secs()).map_err(|_| AuthenticationError::ExpiryOutOfRange)?;

			now.checked_add(Duration::seconds(secs)).ok_or(AuthenticationError::ExpiryOutOfRange)?
		},
		(None, None) => return Err(AuthenticationError::MissingExpiry),
	};
	let refresh = response
		.refresh_token()
		.map(|token| token.secret().to_owned())
		.unwrap_or_else(|| presented_refresh.to_owned());

	Ok(TokenRecord::new(response.access_token().secret().to_owned(), refresh, expires_at))
}

fn map_request_error<E>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> AuthenticationError
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			AuthenticationError::Rejected { reason, status }
		},
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(source, _body) =>
			AuthenticationError::MalformedResponse { source, status },
		RequestTokenError::Other(message) => AuthenticationError::Rejected { reason: message, status },
	}
}

fn map_transport_error<E>(status: Option<u16>, err: HttpClientError<E>) -> AuthenticationError
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => AuthenticationError::Network { source: inner },
		HttpClientError::Io(inner) => AuthenticationError::network(inner),
		HttpClientError::Http(inner) => AuthenticationError::network(inner),
		HttpClientError::Other(message) => AuthenticationError::Rejected {
			reason: format!("HTTP client error: {message}"),
			status,
		},
		_ => AuthenticationError::Rejected { reason: "Unknown HTTP client error".into(), status },
	}
}
