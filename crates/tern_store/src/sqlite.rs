//! SQLite persistence via sqlx.
//!
//! One table per entity, mirroring the in-memory stores, plus a one-row
//! pre-key allocation counter. Every write is an upsert-on-conflict; the
//! `load_*` reads happen once per open, so there is no query-per-lookup
//! path to optimise.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use tern_crypto::{IdentityKey, LocalIdentity, PreKeyRecord, SignedPreKeyRecord};
use tern_proto::DeviceAddress;

use crate::backend::StorageBackend;
use crate::error::StoreError;
use crate::trust::RemoteIdentity;

/// sqlx-backed store. Cheap to clone (the pool is Arc internally).
#[derive(Clone)]
pub struct SqliteBackend {
    pub pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the SQLite database at `db_path` and run pending
    /// migrations.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time, not inside a migration: SQLite refuses to change
    /// `journal_mode` inside a transaction and sqlx wraps every migration
    /// in one.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Pinned to a single connection: each
    /// SQLite `:memory:` connection is its own database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))
    }
}

/// Ids live in `INTEGER` columns; a value outside `u32` range means the row
/// was not written by this store.
fn to_u32(value: i64, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidValue(format!("{what} {value} out of range")))
}

// ── Row types ─────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct LocalIdentityRow {
    device_id: i64,
    secret_key: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct RemoteIdentityRow {
    jid: String,
    device_id: i64,
    identity_key: Vec<u8>,
    trust: String,
    first_seen: DateTime<Utc>,
}

impl RemoteIdentityRow {
    fn into_identity(self) -> Result<RemoteIdentity, StoreError> {
        Ok(RemoteIdentity {
            address: DeviceAddress::new(self.jid, to_u32(self.device_id, "device id")?),
            identity_key: IdentityKey(self.identity_key),
            trust: self.trust.parse()?,
            first_seen: self.first_seen,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PreKeyRow {
    id: i64,
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct SignedPreKeyRow {
    id: i64,
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
    signature: Vec<u8>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    jid: String,
    device_id: i64,
    state: Vec<u8>,
}

// ── Backend implementation ────────────────────────────────────────────────────

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn load_local_identity(&self) -> Result<Option<LocalIdentity>, StoreError> {
        let row: Option<LocalIdentityRow> =
            sqlx::query_as("SELECT device_id, secret_key FROM local_identity LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => Ok(Some(LocalIdentity::from_parts(
                to_u32(row.device_id, "device id")?,
                &row.secret_key,
            )?)),
            None => Ok(None),
        }
    }

    async fn save_local_identity(&self, identity: &LocalIdentity) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO local_identity (device_id, public_key, secret_key) VALUES (?, ?, ?)
             ON CONFLICT (device_id) DO UPDATE SET
                 public_key = excluded.public_key,
                 secret_key = excluded.secret_key",
        )
        .bind(identity.device_id)
        .bind(identity.public_key().as_bytes())
        .bind(identity.key_pair.secret_bytes().as_slice())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_remote_identities(&self) -> Result<Vec<RemoteIdentity>, StoreError> {
        let rows: Vec<RemoteIdentityRow> = sqlx::query_as(
            "SELECT jid, device_id, identity_key, trust, first_seen FROM remote_identities",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RemoteIdentityRow::into_identity).collect()
    }

    async fn upsert_remote_identity(&self, identity: &RemoteIdentity) -> Result<(), StoreError> {
        // first_seen is only written on insert; the conflict arm leaves the
        // original timestamp in place, matching the in-memory semantics.
        sqlx::query(
            "INSERT INTO remote_identities (jid, device_id, identity_key, trust, first_seen)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (jid, device_id) DO UPDATE SET
                 identity_key = excluded.identity_key,
                 trust = excluded.trust",
        )
        .bind(&identity.address.jid)
        .bind(identity.address.device_id)
        .bind(identity.identity_key.as_bytes())
        .bind(identity.trust.to_string())
        .bind(identity.first_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_remote_identity(&self, addr: &DeviceAddress) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM remote_identities WHERE jid = ? AND device_id = ?")
            .bind(&addr.jid)
            .bind(addr.device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_prekeys(&self) -> Result<Vec<PreKeyRecord>, StoreError> {
        let rows: Vec<PreKeyRow> =
            sqlx::query_as("SELECT id, public_key, secret_key FROM prekeys")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| {
                let id = to_u32(row.id, "prekey id")?;
                PreKeyRecord::from_parts(id, &row.public_key, &row.secret_key)
                    .map_err(StoreError::from)
            })
            .collect()
    }

    async fn load_prekey_watermark(&self) -> Result<u32, StoreError> {
        let (highest_id,): (i64,) =
            sqlx::query_as("SELECT highest_id FROM prekey_allocation WHERE id = 0")
                .fetch_one(&self.pool)
                .await?;
        to_u32(highest_id, "prekey watermark")
    }

    async fn upsert_prekey(&self, record: &PreKeyRecord) -> Result<(), StoreError> {
        // Watermark before row: by the time a pre-key row is durable, a
        // watermark covering its id is too, so deleting the row later cannot
        // free the id for reallocation.
        sqlx::query("UPDATE prekey_allocation SET highest_id = MAX(highest_id, ?) WHERE id = 0")
            .bind(record.id)
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO prekeys (id, public_key, secret_key) VALUES (?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 public_key = excluded.public_key,
                 secret_key = excluded.secret_key",
        )
        .bind(record.id)
        .bind(record.public_bytes().as_slice())
        .bind(record.secret_bytes().as_slice())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_prekey(&self, id: u32) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM prekeys WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_signed_prekeys(&self) -> Result<Vec<SignedPreKeyRecord>, StoreError> {
        let rows: Vec<SignedPreKeyRow> = sqlx::query_as(
            "SELECT id, public_key, secret_key, signature, created_at FROM signed_prekeys",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                SignedPreKeyRecord::from_parts(
                    to_u32(row.id, "signed prekey id")?,
                    &row.public_key,
                    &row.secret_key,
                    row.signature,
                    row.created_at,
                )
                .map_err(StoreError::from)
            })
            .collect()
    }

    async fn upsert_signed_prekey(&self, record: &SignedPreKeyRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO signed_prekeys (id, public_key, secret_key, signature, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 public_key = excluded.public_key,
                 secret_key = excluded.secret_key,
                 signature = excluded.signature,
                 created_at = excluded.created_at",
        )
        .bind(record.id)
        .bind(record.public_bytes().as_slice())
        .bind(record.secret_bytes().as_slice())
        .bind(record.signature.as_slice())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<(DeviceAddress, Vec<u8>)>, StoreError> {
        let rows: Vec<SessionRow> =
            sqlx::query_as("SELECT jid, device_id, state FROM sessions")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|row| {
                Ok((
                    DeviceAddress::new(row.jid, to_u32(row.device_id, "device id")?),
                    row.state,
                ))
            })
            .collect()
    }

    async fn upsert_session(&self, addr: &DeviceAddress, state: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (jid, device_id, state, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT (jid, device_id) DO UPDATE SET
                 state = excluded.state,
                 updated_at = datetime('now')",
        )
        .bind(&addr.jid)
        .bind(addr.device_id)
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_session(&self, addr: &DeviceAddress) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE jid = ? AND device_id = ?")
            .bind(&addr.jid)
            .bind(addr.device_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
