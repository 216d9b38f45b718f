//! Runtime event stream payloads.
//!
//! Rendering is a pure projection of current state, so the events carry ids
//! rather than data: subscribers re-read and re-derive on every event.

use crate::types::HuntId;

/// Events emitted from the single-writer engine loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuntEvent {
    /// A hunt was created (server-backed or locally-only).
    Created {
        /// Id of the new hunt.
        id: HuntId,
    },
    /// A hunt's counter or completion state changed.
    Updated {
        /// Id of the mutated hunt.
        id: HuntId,
    },
    /// A hunt was removed from the local collection.
    Deleted {
        /// Id of the removed hunt.
        id: HuntId,
    },
    /// The connectivity state flipped. Offline is advisory only; nothing
    /// in flight is cancelled.
    ConnectivityChanged {
        /// New connectivity state.
        online: bool,
    },
    /// A queue drain pass began. Drives the "syncing" indicator.
    SyncStarted,
    /// The drain pass finished, successfully or not.
    SyncFinished {
        /// Operations still queued after the pass.
        pending: usize,
    },
    /// A full remote refresh was merged into the local collection.
    Refreshed,
}
