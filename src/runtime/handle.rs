use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashSet;
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant, sleep_until},
};
use tracing::{debug, warn};

use crate::{
    core::store::{HuntStore, StoreError},
    hunt::{Completion, HuntDraft, HuntPatch, HuntRecord},
    op::{OpKind, PendingOp},
    persist::{PersistError, StateSink},
    remote::RemoteAuthority,
    stats::{self, HuntStats},
    types::{HuntId, TimestampMs},
};

use super::events::HuntEvent;

/// Errors surfaced to callers of [`HuntLogHandle`].
#[derive(Debug)]
pub enum RuntimeError {
    /// A local store mutation failed.
    Store(StoreError),
    /// The durable snapshot could not be written.
    Persist(PersistError),
    /// The engine loop is gone.
    ChannelClosed,
}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<PersistError> for RuntimeError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

/// Tunables for the engine loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Connectivity state reported by the platform at startup.
    pub start_online: bool,
    /// Delay before a counter change is pushed remotely, restarted on each
    /// new change. The request always carries the value current at send
    /// time, so a longer window only coalesces more taps into one call.
    pub counter_debounce_ms: u64,
    /// Transiently-failed operations are dropped once they have failed this
    /// many drain passes.
    pub max_op_attempts: u32,
    /// Command channel capacity.
    pub command_capacity: usize,
    /// Event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            start_online: true,
            counter_debounce_ms: 300,
            max_op_attempts: 8,
            command_capacity: 256,
            event_capacity: 1024,
        }
    }
}

/// Cloneable handle to a spawned engine loop.
pub struct HuntLogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<HuntEvent>,
}

impl Clone for HuntLogHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

enum Command {
    Create {
        draft: HuntDraft,
        resp: oneshot::Sender<Result<HuntId, RuntimeError>>,
    },
    AdjustCount {
        id: HuntId,
        delta: i64,
        resp: oneshot::Sender<Result<u64, RuntimeError>>,
    },
    SetCompletion {
        id: HuntId,
        found: bool,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Delete {
        id: HuntId,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    SetOnline {
        online: bool,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Sync {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Get {
        id: HuntId,
        resp: oneshot::Sender<Option<HuntRecord>>,
    },
    Hunts {
        resp: oneshot::Sender<Vec<HuntRecord>>,
    },
    Stats {
        resp: oneshot::Sender<HuntStats>,
    },
    PendingOps {
        resp: oneshot::Sender<Vec<PendingOp>>,
    },
    IsOnline {
        resp: oneshot::Sender<bool>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

type SharedSink = Arc<Mutex<Box<dyn StateSink>>>;

/// Spawns the single-writer engine loop and returns its handle.
///
/// Every mutation of the shared collections happens on the spawned task, and
/// remote calls are awaited there too, so an in-flight confirmation can never
/// interleave with a newer local mutation of the same record.
pub fn spawn_huntlog(
    store: HuntStore,
    sink: Option<Box<dyn StateSink>>,
    remote: Arc<dyn RemoteAuthority>,
    config: RuntimeConfig,
) -> HuntLogHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(config.command_capacity);
    let (events_tx, _) = broadcast::channel::<HuntEvent>(config.event_capacity);

    let engine = Engine {
        online: config.start_online,
        store,
        dirty: HashSet::new(),
        flush_at: None,
        sink: sink.map(|s| Arc::new(Mutex::new(s))),
        remote,
        config,
        events: events_tx.clone(),
    };
    tokio::spawn(engine.run(cmd_rx));

    HuntLogHandle { cmd_tx, events_tx }
}

impl HuntLogHandle {
    /// Subscribes to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<HuntEvent> {
        self.events_tx.subscribe()
    }

    /// Starts a hunt. Creates remotely when Online; otherwise (or on
    /// failure) synthesizes a locally-only record with a pending id.
    pub async fn create(&self, draft: HuntDraft) -> Result<HuntId, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Create { draft, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Increments the encounter counter. Returns the new value.
    pub async fn increment(&self, id: HuntId) -> Result<u64, RuntimeError> {
        self.adjust_count(id, 1).await
    }

    /// Decrements the encounter counter, flooring at zero. Returns the new
    /// value.
    pub async fn decrement(&self, id: HuntId) -> Result<u64, RuntimeError> {
        self.adjust_count(id, -1).await
    }

    async fn adjust_count(&self, id: HuntId, delta: i64) -> Result<u64, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::AdjustCount {
                id,
                delta,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Marks the shiny as found, stamping the completion timestamp.
    pub async fn mark_found(&self, id: HuntId) -> Result<(), RuntimeError> {
        self.set_completion(id, true).await
    }

    /// Reverts a completion, clearing the timestamp with the flag.
    pub async fn unmark_found(&self, id: HuntId) -> Result<(), RuntimeError> {
        self.set_completion(id, false).await
    }

    async fn set_completion(&self, id: HuntId, found: bool) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetCompletion {
                id,
                found,
                resp: tx,
            })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Deletes a hunt locally right away; the remote side-effect is issued
    /// or queued as connectivity allows.
    pub async fn delete(&self, id: HuntId) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Delete { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Feeds a platform connectivity signal into the engine. The
    /// Offline→Online edge triggers a drain and a full refresh before this
    /// returns; the opposite edge is advisory only.
    pub async fn set_online(&self, online: bool) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetOnline { online, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Manually drains the queue and refreshes from the remote authority.
    /// A no-op while Offline.
    pub async fn sync(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Sync { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Current record by id.
    pub async fn get(&self, id: HuntId) -> Result<Option<HuntRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Get { id, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// All records, newest first.
    pub async fn hunts(&self) -> Result<Vec<HuntRecord>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Hunts { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Aggregates recomputed from the current collection.
    pub async fn stats(&self) -> Result<HuntStats, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stats { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Snapshot of the pending-operation queue, in enqueue order.
    pub async fn pending_ops(&self) -> Result<Vec<PendingOp>, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::PendingOps { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Current connectivity state as the engine sees it.
    pub async fn is_online(&self) -> Result<bool, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::IsOnline { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Parks any debounced counter writes in the queue, persists, and stops
    /// the engine loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }
}

/// Single-writer state holder. All mutation of the shared collections is
/// routed through the action methods below; nothing else touches them.
struct Engine {
    store: HuntStore,
    online: bool,
    /// Records with a counter change not yet pushed remotely.
    dirty: HashSet<HuntId>,
    /// When the debounced counter flush fires, if one is scheduled.
    flush_at: Option<Instant>,
    sink: Option<SharedSink>,
    remote: Arc<dyn RemoteAuthority>,
    config: RuntimeConfig,
    events: broadcast::Sender<HuntEvent>,
}

impl Engine {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        loop {
            let cmd = if let Some(deadline) = self.flush_at {
                tokio::select! {
                    cmd = cmd_rx.recv() => cmd,
                    _ = sleep_until(deadline) => {
                        self.flush_at = None;
                        self.flush_dirty_counters().await;
                        continue;
                    }
                }
            } else {
                cmd_rx.recv().await
            };

            let Some(cmd) = cmd else { break };
            if self.handle_command(cmd).await {
                break;
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Create { draft, resp } => {
                let _ = resp.send(self.create(draft).await);
            }
            Command::AdjustCount { id, delta, resp } => {
                let _ = resp.send(self.adjust_count(id, delta).await);
            }
            Command::SetCompletion { id, found, resp } => {
                let _ = resp.send(self.set_completion(id, found).await);
            }
            Command::Delete { id, resp } => {
                let _ = resp.send(self.delete(id).await);
            }
            Command::SetOnline { online, resp } => {
                let _ = resp.send(self.set_online(online).await);
            }
            Command::Sync { resp } => {
                let _ = resp.send(self.sync().await);
            }
            Command::Get { id, resp } => {
                let _ = resp.send(self.store.get_cloned(id));
            }
            Command::Hunts { resp } => {
                let _ = resp.send(self.store.export_records());
            }
            Command::Stats { resp } => {
                let records = self.store.export_records();
                let _ = resp.send(stats::project(&records));
            }
            Command::PendingOps { resp } => {
                let _ = resp.send(self.store.queue().to_vec());
            }
            Command::IsOnline { resp } => {
                let _ = resp.send(self.online);
            }
            Command::Shutdown { resp } => {
                self.spill_dirty_to_queue();
                self.flush_at = None;
                let _ = resp.send(self.persist().await);
                return true;
            }
        }
        false
    }

    async fn create(&mut self, draft: HuntDraft) -> Result<HuntId, RuntimeError> {
        let id = if self.online {
            match self.remote.create_hunt(&draft).await {
                Ok(rec) => {
                    let id = rec.id;
                    self.store.insert_server(rec)?;
                    id
                }
                Err(err) => {
                    warn!(error = %err, "remote create failed; keeping hunt local-only");
                    self.store.insert_local(draft)
                }
            }
        } else {
            self.store.insert_local(draft)
        };

        self.persist().await?;
        let _ = self.events.send(HuntEvent::Created { id });
        Ok(id)
    }

    async fn adjust_count(&mut self, id: HuntId, delta: i64) -> Result<u64, RuntimeError> {
        let value = self.store.adjust_count(id, delta)?;

        if self.online {
            // Debounced: the eventual request reads the then-current value,
            // so only the last scheduled call matters.
            self.dirty.insert(id);
            self.flush_at =
                Some(Instant::now() + Duration::from_millis(self.config.counter_debounce_ms));
        } else {
            self.store.enqueue(PendingOp::update(id, HuntPatch::count(value)));
        }

        self.persist().await?;
        let _ = self.events.send(HuntEvent::Updated { id });
        Ok(value)
    }

    async fn set_completion(&mut self, id: HuntId, found: bool) -> Result<(), RuntimeError> {
        let completion = if found {
            Completion::found(now_ms())
        } else {
            Completion::cleared()
        };
        self.store.set_completion(id, completion)?;

        let patch = HuntPatch::completion(completion);
        if self.online {
            if let Err(err) = self.remote.update_hunt(id, &patch).await {
                debug!(id = %id, error = %err, "completion update failed; queueing");
                self.store.enqueue(PendingOp::update(id, patch));
            }
        } else {
            self.store.enqueue(PendingOp::update(id, patch));
        }

        self.persist().await?;
        let _ = self.events.send(HuntEvent::Updated { id });
        Ok(())
    }

    async fn delete(&mut self, id: HuntId) -> Result<(), RuntimeError> {
        let removed = self.store.remove(id)?;
        self.dirty.remove(&id);

        if removed.id.is_server() {
            if self.online {
                match self.remote.delete_hunt(id).await {
                    Ok(()) => self.store.purge_ops(id),
                    Err(err) => {
                        debug!(id = %id, error = %err, "remote delete failed; queueing");
                        self.store.enqueue(PendingOp::delete(id));
                    }
                }
            } else {
                self.store.enqueue(PendingOp::delete(id));
            }
        } else {
            // Never reached the server, so there is nothing to delete
            // remotely; stale queued updates go with it.
            self.store.purge_ops(id);
        }

        self.persist().await?;
        let _ = self.events.send(HuntEvent::Deleted { id });
        Ok(())
    }

    async fn set_online(&mut self, next: bool) -> Result<(), RuntimeError> {
        if next == self.online {
            return Ok(());
        }
        self.online = next;
        let _ = self.events.send(HuntEvent::ConnectivityChanged { online: next });

        if next {
            self.drain_queue().await;
            self.refresh().await;
        } else if self.spill_dirty_to_queue() {
            self.flush_at = None;
            self.persist().await?;
        } else {
            self.flush_at = None;
        }
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), RuntimeError> {
        if !self.online {
            return Ok(());
        }
        self.flush_at = None;
        self.flush_dirty_counters().await;
        self.drain_queue().await;
        self.refresh().await;
        Ok(())
    }

    /// Replays the queued operations in enqueue order, re-queueing transient
    /// failures and dropping rejected or exhausted ops, then refreshes the
    /// persisted queue snapshot.
    async fn drain_queue(&mut self) {
        if self.store.queue_len() == 0 {
            return;
        }
        let _ = self.events.send(HuntEvent::SyncStarted);

        for op in self.store.take_queue() {
            let result = match &op.kind {
                OpKind::Update { patch } => self.remote.update_hunt(op.target, patch).await,
                OpKind::Delete => self.remote.delete_hunt(op.target).await,
            };
            match result {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    let op = op.with_failed_attempt();
                    if op.attempts >= self.config.max_op_attempts {
                        warn!(
                            id = %op.target,
                            attempts = op.attempts,
                            "dropping operation after repeated transient failures"
                        );
                    } else {
                        debug!(id = %op.target, error = %err, "replay failed; re-queueing");
                        self.store.requeue(op);
                    }
                }
                Err(err) => {
                    warn!(id = %op.target, error = %err, "server rejected operation; dropping");
                }
            }
        }

        if let Err(err) = self.persist().await {
            warn!(error = ?err, "failed to persist queue after drain");
        }
        let _ = self.events.send(HuntEvent::SyncFinished {
            pending: self.store.queue_len(),
        });
    }

    /// Full refresh: merges server truth under any locally-only records. A
    /// failed fetch leaves the collection untouched for this session.
    async fn refresh(&mut self) {
        match self.remote.list_hunts().await {
            Ok(fetched) => {
                self.store.merge_remote(fetched);
                if let Err(err) = self.persist().await {
                    warn!(error = ?err, "failed to persist refreshed snapshot");
                }
                let _ = self.events.send(HuntEvent::Refreshed);
            }
            Err(err) => {
                debug!(error = %err, "refresh failed; keeping cached snapshot");
            }
        }
    }

    /// Pushes debounced counter values remotely, reading each record's
    /// current value at send time. Failures fall back to the queue.
    async fn flush_dirty_counters(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let ids: Vec<HuntId> = self.dirty.drain().collect();
        let mut queued = false;

        for id in ids {
            // Deleted since the tap: nothing left to push.
            let Some(value) = self.store.get(id).map(|r| r.encounter_count) else {
                continue;
            };
            let patch = HuntPatch::count(value);
            if self.online {
                match self.remote.update_hunt(id, &patch).await {
                    Ok(()) => {}
                    Err(err) => {
                        debug!(id = %id, error = %err, "counter update failed; queueing");
                        self.store.enqueue(PendingOp::update(id, patch));
                        queued = true;
                    }
                }
            } else {
                self.store.enqueue(PendingOp::update(id, patch));
                queued = true;
            }
        }

        if queued {
            if let Err(err) = self.persist().await {
                warn!(error = ?err, "failed to persist queue");
            }
        }
    }

    /// Converts any debounced counter state into queued operations.
    fn spill_dirty_to_queue(&mut self) -> bool {
        let mut spilled = false;
        let ids: Vec<HuntId> = self.dirty.drain().collect();
        for id in ids {
            if let Some(value) = self.store.get(id).map(|r| r.encounter_count) {
                self.store.enqueue(PendingOp::update(id, HuntPatch::count(value)));
                spilled = true;
            }
        }
        spilled
    }

    /// Writes the current snapshot through the sink, if one is attached.
    /// Callers treat this as synchronous: it completes before the action
    /// that mutated state returns.
    async fn persist(&self) -> Result<(), RuntimeError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let records = self.store.export_records();
        let ops = self.store.queue().to_vec();
        let sink = Arc::clone(sink);

        tokio::task::spawn_blocking(move || {
            let mut sink = sink.blocking_lock();
            sink.save(&records, &ops)
        })
        .await
        .map_err(|e| RuntimeError::Persist(PersistError::Message(format!("join error: {e}"))))?
        .map_err(RuntimeError::from)
    }
}

fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
