//! Relational [`TokenStore`] backed by `sqlx`'s driver-agnostic pool.
//!
//! Postgres is the production target; SQLite URLs work as well, which keeps local runs and
//! tests free of a database server. The record lives in a single row of `strava_tokens`
//! keyed by [`SINGLETON_ID`], and every write is one upsert statement.

// std
use std::time::Duration as StdDuration;
// crates.io
use sqlx::{
	AnyPool, Row,
	any::{self, AnyPoolOptions, AnyRow},
};
// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	store::{SINGLETON_ID, StoreError, StoreFuture, TokenStore},
};

const CREATE_TABLE: &str = r"
	CREATE TABLE IF NOT EXISTS strava_tokens (
		id            BIGINT PRIMARY KEY,
		access_token  TEXT NOT NULL,
		refresh_token TEXT NOT NULL,
		expires_at    BIGINT NOT NULL
	)
";
const SELECT_RECORD: &str =
	"SELECT access_token, refresh_token, expires_at FROM strava_tokens WHERE id = $1";
const UPSERT_RECORD: &str = r"
	INSERT INTO strava_tokens (id, access_token, refresh_token, expires_at)
	VALUES ($1, $2, $3, $4)
	ON CONFLICT (id) DO UPDATE SET
		access_token = excluded.access_token,
		refresh_token = excluded.refresh_token,
		expires_at = excluded.expires_at
";
const INSERT_IF_ABSENT: &str = r"
	INSERT INTO strava_tokens (id, access_token, refresh_token, expires_at)
	VALUES ($1, $2, $3, $4)
	ON CONFLICT (id) DO NOTHING
";

/// Token store persisting the singleton record in a relational database.
#[derive(Clone, Debug)]
pub struct SqlStore {
	pool: AnyPool,
}
impl SqlStore {
	const MAX_CONNECTIONS: u32 = 5;

	/// Connects to `database_url`, failing after `acquire_timeout` when the server is unreachable.
	pub async fn connect(database_url: &str, acquire_timeout: StdDuration) -> Result<Self, StoreError> {
		any::install_default_drivers();

		let pool = AnyPoolOptions::new()
			.max_connections(Self::MAX_CONNECTIONS)
			.acquire_timeout(acquire_timeout)
			.connect(database_url)
			.await
			.map_err(|e| StoreError::unavailable(format!("Failed to connect to the database: {e}")))?;

		Ok(Self { pool })
	}

	/// Wraps an existing pool.
	pub fn with_pool(pool: AnyPool) -> Self {
		Self { pool }
	}

	/// Creates the `strava_tokens` table when it does not exist yet.
	pub async fn migrate(&self) -> Result<(), StoreError> {
		sqlx::query(CREATE_TABLE)
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::unavailable(format!("Failed to create token table: {e}")))?;

		Ok(())
	}

	/// Stores the initial record.
	///
	/// An existing record is kept unless `overwrite` is set. Returns whether `record` was
	/// written.
	pub async fn seed(&self, record: &TokenRecord, overwrite: bool) -> Result<bool, StoreError> {
		if overwrite {
			self.upsert(record).await?;

			return Ok(true);
		}

		let result = sqlx::query(INSERT_IF_ABSENT)
			.bind(SINGLETON_ID)
			.bind(record.access_token.expose())
			.bind(record.refresh_token.expose())
			.bind(record.expires_at_unix())
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::unavailable(format!("Failed to seed token record: {e}")))?;

		Ok(result.rows_affected() > 0)
	}

	async fn fetch(&self) -> Result<TokenRecord, StoreError> {
		let row = sqlx::query(SELECT_RECORD)
			.bind(SINGLETON_ID)
			.fetch_optional(&self.pool)
			.await
			.map_err(|e| StoreError::unavailable(format!("Failed to query token record: {e}")))?
			.ok_or(StoreError::NotFound)?;

		Self::decode(&row)
	}

	async fn upsert(&self, record: &TokenRecord) -> Result<(), StoreError> {
		sqlx::query(UPSERT_RECORD)
			.bind(SINGLETON_ID)
			.bind(record.access_token.expose())
			.bind(record.refresh_token.expose())
			.bind(record.expires_at_unix())
			.execute(&self.pool)
			.await
			.map_err(|e| StoreError::unavailable(format!("Failed to update token record: {e}")))?;

		Ok(())
	}

	fn decode(row: &AnyRow) -> Result<TokenRecord, StoreError> {
		let column = |e: sqlx::Error| StoreError::unavailable(format!("Malformed token row: {e}"));
		let access: String = row.try_get("access_token").map_err(column)?;
		let refresh: String = row.try_get("refresh_token").map_err(column)?;
		let expires_at: i64 = row.try_get("expires_at").map_err(column)?;

		TokenRecord::from_unix(access, refresh, expires_at).map_err(|e| {
			StoreError::unavailable(format!("Stored expiry {expires_at} is out of range: {e}"))
		})
	}
}
impl TokenStore for SqlStore {
	fn read(&self) -> StoreFuture<'_, TokenRecord> {
		Box::pin(self.fetch())
	}

	fn write(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.upsert(&record).await })
	}
}
