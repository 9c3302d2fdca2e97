//! Cursor Store (spec.md §4.D). Backed by a single-writer embedded
//! key/value store (`sled`), behind a narrow trait so tests can substitute
//! an in-memory fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, Result, StoreCause};
use crate::model::Identity;

const CURSOR_KEY: &[u8] = b"cursor";
const REGISTRATION_KEY: &[u8] = b"registration";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistrationRecord {
    org: String,
    id: String,
    token: String,
    exchange_url: String,
    content_store_url: String,
}

/// The narrow persistence contract spec.md §4.D requires: after
/// `save_cursor(id)` returns, no crash-recovery can observe a cursor less
/// than `id`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self) -> Result<u64>;
    async fn save_cursor(&self, id: u64) -> Result<()>;
    async fn load_registration(&self) -> Result<Option<(Identity, String, String)>>;
    async fn save_registration(
        &self,
        identity: &Identity,
        exchange_url: &str,
        content_store_url: &str,
    ) -> Result<()>;
    async fn append_event(&self, entry: &crate::eventlog::EventLogEntry) -> Result<()>;
}

/// `sled`-backed implementation. Single-writer per spec.md §5 ("The Cursor
/// Store is single-writer (this worker)").
pub struct SledCursorStore {
    db: sled::Db,
}

impl SledCursorStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        Ok(SledCursorStore { db })
    }

    /// In-memory store, useful for tests and short-lived demos.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        Ok(SledCursorStore { db })
    }
}

#[async_trait]
impl CursorStore for SledCursorStore {
    async fn load_cursor(&self) -> Result<u64> {
        match self
            .db
            .get(CURSOR_KEY)
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?
        {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| ExchangeError::store(StoreCause::Decode("bad cursor length".into())))?;
                Ok(u64::from_be_bytes(arr))
            }
            None => Ok(0),
        }
    }

    async fn save_cursor(&self, id: u64) -> Result<()> {
        self.db
            .insert(CURSOR_KEY, &id.to_be_bytes())
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        Ok(())
    }

    async fn load_registration(&self) -> Result<Option<(Identity, String, String)>> {
        let raw = self
            .db
            .get(REGISTRATION_KEY)
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        let Some(raw) = raw else { return Ok(None) };
        let record: RegistrationRecord = bincode::deserialize(&raw)
            .map_err(|e| ExchangeError::store(StoreCause::Decode(e.to_string())))?;
        Ok(Some((
            Identity {
                org: record.org,
                id: record.id,
                token: record.token,
            },
            record.exchange_url,
            record.content_store_url,
        )))
    }

    async fn save_registration(
        &self,
        identity: &Identity,
        exchange_url: &str,
        content_store_url: &str,
    ) -> Result<()> {
        let record = RegistrationRecord {
            org: identity.org.clone(),
            id: identity.id.clone(),
            token: identity.token.clone(),
            exchange_url: exchange_url.to_string(),
            content_store_url: content_store_url.to_string(),
        };
        let bytes = bincode::serialize(&record)
            .map_err(|e| ExchangeError::store(StoreCause::Encode(e.to_string())))?;
        self.db
            .insert(REGISTRATION_KEY, bytes)
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        Ok(())
    }

    async fn append_event(&self, entry: &crate::eventlog::EventLogEntry) -> Result<()> {
        let tree = self
            .db
            .open_tree(b"eventlog")
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        let seq = tree
            .generate_id()
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        let bytes = bincode::serialize(entry)
            .map_err(|e| ExchangeError::store(StoreCause::Encode(e.to_string())))?;
        tree.insert(seq.to_be_bytes(), bytes)
            .map_err(|e| ExchangeError::store(StoreCause::Sled(e)))?;
        Ok(())
    }
}
