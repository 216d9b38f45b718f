//! SQLite-backed snapshot store for hunts and the pending-op queue.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    core::store::HuntStore,
    hunt::HuntRecord,
    op::{PendingOp, QUEUE_FORMAT_VERSION, QueueEnvelope},
};

use super::{PersistResult, StateSink};

const HUNTS_FORMAT_VERSION: u16 = 1;

const HUNTS_KEY: &str = "hunts";
const QUEUE_KEY: &str = "pending_ops";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HuntsEnvelope {
    format_version: u16,
    records: Vec<HuntRecord>,
}

/// SQLite implementation of [`crate::persist::StateSink`].
///
/// The two collections are stored as independently-keyed JSON blobs in a
/// single table and written in one transaction. The last fully written
/// snapshot wins; there is no partial-write recovery beyond that.
pub struct SqliteStateSink {
    conn: Connection,
}

impl SqliteStateSink {
    /// Opens or creates a SQLite-backed sink at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory SQLite sink.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Loads a [`HuntStore`] seeded from the persisted snapshot.
    pub fn load_store(&self) -> PersistResult<HuntStore> {
        let (records, ops) = self.load_state()?;
        Ok(HuntStore::from_parts(records, ops))
    }

    /// Reads back both blobs. A missing or undecodable blob yields an empty
    /// collection for that key only; the other blob is unaffected.
    pub fn load_state(&self) -> PersistResult<(Vec<HuntRecord>, Vec<PendingOp>)> {
        let records = match self.read_payload(HUNTS_KEY)? {
            Some(payload) => decode_hunts(&payload).unwrap_or_else(|err| {
                warn!(key = HUNTS_KEY, error = %err, "discarding unreadable snapshot");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let ops = match self.read_payload(QUEUE_KEY)? {
            Some(payload) => decode_queue(&payload).unwrap_or_else(|err| {
                warn!(key = QUEUE_KEY, error = %err, "discarding unreadable snapshot");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok((records, ops))
    }

    /// Writes both blobs in a single transaction.
    pub fn save_state(&mut self, records: &[HuntRecord], ops: &[PendingOp]) -> PersistResult<()> {
        let hunts_payload = serde_json::to_vec(&HuntsEnvelope {
            format_version: HUNTS_FORMAT_VERSION,
            records: records.to_vec(),
        })?;
        let queue_payload = serde_json::to_vec(&QueueEnvelope::new(ops.to_vec()))?;
        let ts_ms = now_ms();

        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT OR REPLACE INTO state(key, ts_ms, payload) VALUES (?1, ?2, ?3)")?;
            stmt.execute(params![HUNTS_KEY, ts_ms as i64, hunts_payload])?;
            stmt.execute(params![QUEUE_KEY, ts_ms as i64, queue_payload])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn read_payload(&self, key: &str) -> PersistResult<Option<Vec<u8>>> {
        let payload = self
            .conn
            .query_row("SELECT payload FROM state WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(payload)
    }
}

impl StateSink for SqliteStateSink {
    fn load(&self) -> PersistResult<(Vec<HuntRecord>, Vec<PendingOp>)> {
        self.load_state()
    }

    fn save(&mut self, records: &[HuntRecord], ops: &[PendingOp]) -> PersistResult<()> {
        self.save_state(records, ops)
    }
}

fn decode_hunts(payload: &[u8]) -> Result<Vec<HuntRecord>, String> {
    let env: HuntsEnvelope =
        serde_json::from_slice(payload).map_err(|e| format!("snapshot decode failed: {e}"))?;
    if env.format_version != HUNTS_FORMAT_VERSION {
        return Err(format!(
            "unsupported snapshot format version: {}",
            env.format_version
        ));
    }
    Ok(env.records)
}

fn decode_queue(payload: &[u8]) -> Result<Vec<PendingOp>, String> {
    let env: QueueEnvelope =
        serde_json::from_slice(payload).map_err(|e| format!("queue decode failed: {e}"))?;
    if env.format_version != QUEUE_FORMAT_VERSION {
        return Err(format!(
            "unsupported queue format version: {}",
            env.format_version
        ));
    }
    Ok(env.ops)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
