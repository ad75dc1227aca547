//! Thread-safe in-memory [`TokenStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{StoreError, StoreFuture, TokenStore},
};

type Slot = Arc<Mutex<Option<TokenRecord>>>;

/// Keeps the token record in-process; contents are lost on restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store already holding `record`.
	pub fn seeded(record: TokenRecord) -> Self {
		Self(Arc::new(Mutex::new(Some(record))))
	}

	/// Returns the stored record without going through the async contract.
	pub fn snapshot(&self) -> Option<TokenRecord> {
		self.0.lock().clone()
	}

	fn read_now(slot: Slot) -> Result<TokenRecord, StoreError> {
		slot.lock().clone().ok_or(StoreError::NotFound)
	}

	fn write_now(slot: Slot, record: TokenRecord) -> Result<(), StoreError> {
		*slot.lock() = Some(record);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn read(&self) -> StoreFuture<'_, TokenRecord> {
		let slot = self.0.clone();

		Box::pin(async move { Self::read_now(slot) })
	}

	fn write(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::write_now(slot, record) })
	}
}
