//! Transport primitives for the refresh-token exchange.
//!
//! [`TokenHttpClient`] is the token manager's only dependency on an HTTP stack. Each exchange
//! gets a fresh [`ResponseMetadataSlot`] so the status code of a failed response can be attached
//! to the resulting [`AuthenticationError`](crate::error::AuthenticationError).

// std
use std::{ops::Deref, time::Duration as StdDuration};
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::redirect::Policy;
// self
use crate::{_prelude::*, error::ConfigError};

/// Abstraction over HTTP transports capable of executing the token exchange while reporting
/// response metadata.
///
/// Implementations must be `Send + Sync + 'static` so one instance can be shared by every
/// request the gateway serves, and the futures of the handles they return must be `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// Call [`ResponseMetadataSlot::take`] before submitting the request and
	/// [`ResponseMetadataSlot::store`] once a status is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] used for token exchanges.
///
/// Token endpoints answer directly, so the client built by [`ReqwestHttpClient::with_timeout`]
/// never follows redirects.
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client whose requests fail after `timeout`.
	pub fn with_timeout(timeout: StdDuration) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(timeout).redirect(Policy::none()).build()?;

		Ok(Self(client))
	}

	pub(crate) fn instrumented(&self, slot: ResponseMetadataSlot) -> InstrumentedHandle {
		InstrumentedHandle::new(self.0.clone(), slot)
	}
}
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		self.instrumented(slot)
	}
}

struct InstrumentedHttpClient {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records the response status.
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
impl InstrumentedHandle {
	fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(InstrumentedHttpClient { client, slot }))
	}
}
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = Arc::clone(&self.0);

		Box::pin(async move {
			client.slot.take();

			let response = client
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			client.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}
