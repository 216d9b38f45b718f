pub mod sqlite;

use crate::{hunt::HuntRecord, op::PendingOp};

/// Errors from the persistence layer.
#[derive(Debug)]
pub enum PersistError {
    /// Underlying SQLite failure.
    Sqlite(rusqlite::Error),
    /// Payload encode failure.
    Serde(serde_json::Error),
    /// Anything else.
    Message(String),
}

impl From<rusqlite::Error> for PersistError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable snapshot sink for the hunt collection and the pending-op queue.
///
/// `load` reconstructs the last-saved snapshot and must tolerate absent or
/// corrupt data by returning empty collections; decode problems never reach
/// the caller. `save` persists both collections atomically from the caller's
/// perspective and is called after every mutation, so a crash loses at most
/// the latest in-memory change.
pub trait StateSink: Send {
    /// Reads back the persisted records and queue.
    fn load(&self) -> PersistResult<(Vec<HuntRecord>, Vec<PendingOp>)>;

    /// Writes both collections, replacing the previous snapshot.
    fn save(&mut self, records: &[HuntRecord], ops: &[PendingOp]) -> PersistResult<()>;
}
