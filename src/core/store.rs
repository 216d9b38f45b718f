use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;

use crate::{
    hunt::{Completion, HuntDraft, HuntRecord},
    op::{OpKind, PatchField, PendingOp},
    types::{HuntId, TimestampMs},
};

/// Errors from local store mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with the given id exists.
    MissingHunt(HuntId),
    /// A record with the given id is already present.
    AlreadyExists(HuntId),
}

/// Authoritative local snapshot of all hunt records plus the queue of
/// mutations not yet confirmed by the remote authority.
///
/// The collection is ordered newest-first: creations insert at the front,
/// and a remote merge keeps locally-only records ahead of the fetched set.
#[derive(Debug, Default)]
pub struct HuntStore {
    records: HashMap<HuntId, HuntRecord>,
    order: Vec<HuntId>,
    queue: Vec<PendingOp>,
    next_pending: i64,
}

impl HuntStore {
    /// Empty store with a fresh pending-id counter.
    pub fn new() -> Self {
        Self {
            next_pending: -1,
            ..Self::default()
        }
    }

    /// Rebuilds a store from persisted collections.
    ///
    /// Tolerates duplicate ids (first occurrence wins). The pending-id
    /// counter resumes below the most negative id seen in either collection
    /// so restored sessions can never re-issue a live temporary id.
    pub fn from_parts(records: Vec<HuntRecord>, queue: Vec<PendingOp>) -> Self {
        let mut store = Self::new();
        for rec in records {
            if store.records.contains_key(&rec.id) {
                continue;
            }
            store.order.push(rec.id);
            store.records.insert(rec.id, rec);
        }

        let floor = store
            .order
            .iter()
            .copied()
            .chain(queue.iter().map(|op| op.target))
            .filter_map(|id| match id {
                HuntId::Pending(n) => Some(n),
                HuntId::Server(_) => None,
            })
            .min()
            .unwrap_or(0);
        store.next_pending = floor.saturating_sub(1).min(-1);

        store.queue = queue;
        store
    }

    /// All records, newest first.
    pub fn export_records(&self) -> Vec<HuntRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    /// Record by id, if present.
    pub fn get(&self, id: HuntId) -> Option<&HuntRecord> {
        self.records.get(&id)
    }

    /// Cloned record by id, if present.
    pub fn get_cloned(&self, id: HuntId) -> Option<HuntRecord> {
        self.get(id).cloned()
    }

    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts a server-acknowledged record at the front of the collection.
    pub fn insert_server(&mut self, rec: HuntRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&rec.id) {
            return Err(StoreError::AlreadyExists(rec.id));
        }
        self.order.insert(0, rec.id);
        self.records.insert(rec.id, rec);
        Ok(())
    }

    /// Synthesizes a locally-only record with a fresh pending id and default
    /// fields, inserted at the front. Returns the assigned id.
    pub fn insert_local(&mut self, draft: HuntDraft) -> HuntId {
        let id = HuntId::Pending(self.next_pending);
        self.next_pending -= 1;

        let rec = HuntRecord {
            id,
            species_name: draft.species_name,
            game: draft.game,
            sprite_url: draft.sprite_url,
            types: draft.types,
            encounter_count: 0,
            target_count: draft.target_count.filter(|t| *t > 0),
            completed: false,
            completed_at: None,
            started_at: now_ms(),
        };
        self.order.insert(0, id);
        self.records.insert(id, rec);
        id
    }

    /// Adjusts the encounter counter by `delta`, clamping at zero. Returns
    /// the new value.
    pub fn adjust_count(&mut self, id: HuntId, delta: i64) -> Result<u64, StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingHunt(id))?;
        rec.encounter_count = if delta >= 0 {
            rec.encounter_count.saturating_add(delta as u64)
        } else {
            rec.encounter_count.saturating_sub(delta.unsigned_abs())
        };
        Ok(rec.encounter_count)
    }

    /// Sets the completion flag and timestamp together.
    pub fn set_completion(&mut self, id: HuntId, completion: Completion) -> Result<(), StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::MissingHunt(id))?;
        rec.completed = completion.completed;
        rec.completed_at = completion.completed_at;
        Ok(())
    }

    /// Removes a record from the collection, returning it.
    pub fn remove(&mut self, id: HuntId) -> Result<HuntRecord, StoreError> {
        let rec = self.records.remove(&id).ok_or(StoreError::MissingHunt(id))?;
        self.order.retain(|x| *x != id);
        Ok(rec)
    }

    /// Merges a freshly fetched remote record set.
    ///
    /// Locally-only records (pending ids) are kept unchanged, in their
    /// current relative order, ahead of the fetched set; everything
    /// server-backed is replaced wholesale. The queue is untouched.
    pub fn merge_remote(&mut self, fetched: Vec<HuntRecord>) {
        let mut records = HashMap::new();
        let mut order = Vec::with_capacity(fetched.len());

        for id in self.order.iter().copied().filter(HuntId::is_pending) {
            if let Some(rec) = self.records.remove(&id) {
                order.push(id);
                records.insert(id, rec);
            }
        }
        for rec in fetched {
            if records.contains_key(&rec.id) {
                continue;
            }
            order.push(rec.id);
            records.insert(rec.id, rec);
        }

        self.records = records;
        self.order = order;
    }

    /// Current queue, in enqueue order.
    pub fn queue(&self) -> &[PendingOp] {
        &self.queue
    }

    /// Number of queued operations.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Appends an operation after applying the coalescing rules: a Delete
    /// supersedes every queued op for its target, and an Update strips the
    /// fields it carries from earlier Updates on the same target (dropping
    /// any that end up empty), so rapid repeated mutation never grows the
    /// queue.
    pub fn enqueue(&mut self, op: PendingOp) {
        match &op.kind {
            OpKind::Delete => {
                self.queue.retain(|q| q.target != op.target);
            }
            OpKind::Update { patch } => {
                let fields = [
                    (patch.encounter_count.is_some(), PatchField::EncounterCount),
                    (patch.completion.is_some(), PatchField::Completion),
                ];
                self.queue.retain_mut(|q| {
                    if q.target != op.target {
                        return true;
                    }
                    let OpKind::Update { patch: existing } = &mut q.kind else {
                        return true;
                    };
                    for (touched, field) in fields {
                        if !touched {
                            continue;
                        }
                        match field {
                            PatchField::EncounterCount => existing.encounter_count = None,
                            PatchField::Completion => existing.completion = None,
                        }
                    }
                    !existing.is_empty()
                });
            }
        }
        self.queue.push(op);
    }

    /// Atomically snapshots and clears the live queue. Operations enqueued
    /// while the snapshot is being drained land in a fresh queue.
    pub fn take_queue(&mut self) -> Vec<PendingOp> {
        std::mem::take(&mut self.queue)
    }

    /// Re-appends an operation whose replay failed.
    ///
    /// Unlike [`enqueue`](Self::enqueue), the incoming op is the *older*
    /// write: if the live queue already holds an Update for the same
    /// `(target, field)`, the newer queued value wins and the stale field is
    /// dropped from the re-appended op instead of clobbering it.
    pub fn requeue(&mut self, op: PendingOp) {
        match op.kind {
            OpKind::Delete => self.enqueue(PendingOp {
                attempts: op.attempts,
                ..PendingOp::delete(op.target)
            }),
            OpKind::Update { mut patch } => {
                for q in self.queue.iter().filter(|q| q.target == op.target) {
                    if q.updates_field(PatchField::EncounterCount) {
                        patch.encounter_count = None;
                    }
                    if q.updates_field(PatchField::Completion) {
                        patch.completion = None;
                    }
                    if matches!(q.kind, OpKind::Delete) {
                        return;
                    }
                }
                if patch.is_empty() {
                    return;
                }
                self.queue.push(PendingOp {
                    target: op.target,
                    kind: OpKind::Update { patch },
                    attempts: op.attempts,
                });
            }
        }
    }

    /// Drops every queued operation for `id` without replaying it. Used when
    /// a record that never reached the server is deleted locally.
    pub fn purge_ops(&mut self, id: HuntId) {
        self.queue.retain(|q| q.target != id);
    }
}

fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
