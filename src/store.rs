//! Storage contract and built-in backends for the singleton token record.

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

// self
use crate::{_prelude::*, auth::TokenRecord};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Fixed key of the only token row the gateway reads and writes.
pub const SINGLETON_ID: i64 = 1;

/// Durable single-record storage for the gateway's [`TokenRecord`].
///
/// Implementations must hit the backing storage on every call; the token manager relies on
/// [`read`](TokenStore::read) observing the latest successful [`write`](TokenStore::write).
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the current record, or [`StoreError::NotFound`] when none was seeded.
	fn read(&self) -> StoreFuture<'_, TokenRecord>;

	/// Replaces the record with `record` in a single atomic step.
	fn write(&self, record: TokenRecord) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Backing storage could not be reached or rejected the operation.
	#[error("Token store is unavailable: {message}.")]
	Unavailable {
		/// Human-readable error payload.
		message: String,
	},
	/// No token record has been seeded.
	#[error("No token record is stored; seed one before serving requests.")]
	NotFound,
}
impl StoreError {
	/// Wraps any backend failure as [`StoreError::Unavailable`].
	pub fn unavailable(message: impl Display) -> Self {
		Self::Unavailable { message: message.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::unavailable("database unreachable");
		let gateway_error: Error = store_error.clone().into();

		assert!(matches!(gateway_error, Error::Storage(_)));
		assert!(gateway_error.to_string().contains("database unreachable"));

		let source = StdError::source(&gateway_error)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
