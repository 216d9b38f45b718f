//! Pending remote mutation model and queue persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{hunt::HuntPatch, types::HuntId};

/// Version number for serialized [`QueueEnvelope`] payloads.
pub const QUEUE_FORMAT_VERSION: u16 = 1;

/// Record fields an Update payload can touch; the unit of queue coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchField {
    /// The encounter counter.
    EncounterCount,
    /// The completed/completed-at pair.
    Completion,
}

/// Deferred mutation body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Partial-update the target with absolute field values.
    Update {
        /// Fields to overwrite on the remote record.
        patch: HuntPatch,
    },
    /// Delete the target remotely.
    Delete,
}

/// A mutation not yet confirmed by the remote authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOp {
    /// Id of the affected record (server-assigned or pending).
    pub target: HuntId,
    /// What to replay against the remote authority.
    pub kind: OpKind,
    /// Failed replay attempts so far. Ops are dropped once this reaches
    /// the configured ceiling.
    pub attempts: u32,
}

impl PendingOp {
    /// Fresh Update operation for `target`.
    pub fn update(target: HuntId, patch: HuntPatch) -> Self {
        Self {
            target,
            kind: OpKind::Update { patch },
            attempts: 0,
        }
    }

    /// Fresh Delete operation for `target`.
    pub fn delete(target: HuntId) -> Self {
        Self {
            target,
            kind: OpKind::Delete,
            attempts: 0,
        }
    }

    /// True when this is an Update touching `field`.
    pub fn updates_field(&self, field: PatchField) -> bool {
        match &self.kind {
            OpKind::Update { patch } => match field {
                PatchField::EncounterCount => patch.encounter_count.is_some(),
                PatchField::Completion => patch.completion.is_some(),
            },
            OpKind::Delete => false,
        }
    }

    /// Same operation with one more recorded failure.
    pub fn with_failed_attempt(mut self) -> Self {
        self.attempts = self.attempts.saturating_add(1);
        self
    }
}

/// Versioned wrapper for stable on-disk queue decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation queue, in enqueue order.
    pub ops: Vec<PendingOp>,
}

impl QueueEnvelope {
    /// Constructs an envelope using [`QUEUE_FORMAT_VERSION`].
    pub fn new(ops: Vec<PendingOp>) -> Self {
        Self {
            format_version: QUEUE_FORMAT_VERSION,
            ops,
        }
    }
}
