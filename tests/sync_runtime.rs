use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU16, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;

use huntlog::{
    core::store::HuntStore,
    hunt::{Completion, HuntDraft, HuntPatch, HuntRecord},
    op::OpKind,
    remote::{RemoteAuthority, RemoteError, RemoteResult},
    runtime::{
        events::HuntEvent,
        handle::{HuntLogHandle, RuntimeConfig, spawn_huntlog},
    },
    types::HuntId,
};

#[derive(Default)]
struct FakeState {
    hunts: Vec<HuntRecord>,
    next_id: u64,
    update_calls: Vec<(HuntId, HuntPatch)>,
    delete_calls: Vec<HuntId>,
}

/// In-process stand-in for the remote authority. Flip `unreachable` to
/// simulate a dead network, or set `reject_status` to answer every call with
/// that status code.
struct FakeRemote {
    state: Mutex<FakeState>,
    unreachable: AtomicBool,
    reject_status: AtomicU16,
}

impl FakeRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..FakeState::default()
            }),
            unreachable: AtomicBool::new(false),
            reject_status: AtomicU16::new(0),
        })
    }

    fn gate(&self) -> RemoteResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("fake network down".to_string()));
        }
        let status = self.reject_status.load(Ordering::SeqCst);
        if status != 0 {
            return Err(RemoteError::Status {
                status,
                body: "rejected".to_string(),
            });
        }
        Ok(())
    }

    fn update_calls(&self) -> Vec<(HuntId, HuntPatch)> {
        self.state.lock().expect("lock").update_calls.clone()
    }

    fn delete_calls(&self) -> Vec<HuntId> {
        self.state.lock().expect("lock").delete_calls.clone()
    }
}

#[async_trait]
impl RemoteAuthority for FakeRemote {
    async fn list_hunts(&self) -> RemoteResult<Vec<HuntRecord>> {
        self.gate()?;
        Ok(self.state.lock().expect("lock").hunts.clone())
    }

    async fn create_hunt(&self, draft: &HuntDraft) -> RemoteResult<HuntRecord> {
        self.gate()?;
        let mut state = self.state.lock().expect("lock");
        let id = state.next_id;
        state.next_id += 1;
        let rec = HuntRecord {
            id: HuntId::Server(id),
            species_name: draft.species_name.clone(),
            game: draft.game.clone(),
            sprite_url: draft.sprite_url.clone(),
            types: draft.types.clone(),
            encounter_count: 0,
            target_count: draft.target_count,
            completed: false,
            completed_at: None,
            started_at: 1,
        };
        state.hunts.insert(0, rec.clone());
        Ok(rec)
    }

    async fn update_hunt(&self, id: HuntId, patch: &HuntPatch) -> RemoteResult<()> {
        self.gate()?;
        let mut state = self.state.lock().expect("lock");
        state.update_calls.push((id, patch.clone()));
        if let Some(rec) = state.hunts.iter_mut().find(|h| h.id == id) {
            patch.apply_to(rec);
        }
        Ok(())
    }

    async fn delete_hunt(&self, id: HuntId) -> RemoteResult<()> {
        self.gate()?;
        let mut state = self.state.lock().expect("lock");
        state.delete_calls.push(id);
        state.hunts.retain(|h| h.id != id);
        Ok(())
    }
}

fn draft(species: &str) -> HuntDraft {
    HuntDraft {
        species_name: species.to_string(),
        game: "Yellow".to_string(),
        sprite_url: String::new(),
        types: vec!["electric".to_string()],
        target_count: None,
    }
}

fn spawn(remote: Arc<FakeRemote>, config: RuntimeConfig) -> HuntLogHandle {
    spawn_huntlog(HuntStore::new(), None, remote, config)
}

fn offline_config() -> RuntimeConfig {
    RuntimeConfig {
        start_online: false,
        ..RuntimeConfig::default()
    }
}

#[tokio::test]
async fn offline_create_and_taps_drain_as_a_single_update() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), offline_config());

    let id = handle.create(draft("pikachu")).await.expect("create");
    assert!(id.is_pending());
    let rec = handle.get(id).await.expect("get").expect("record");
    assert_eq!(rec.encounter_count, 0);

    for _ in 0..3 {
        handle.increment(id).await.expect("increment");
    }
    let ops = handle.pending_ops().await.expect("ops");
    assert_eq!(ops.len(), 1);

    handle.set_online(true).await.expect("online");

    let calls = remote.update_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, id);
    assert_eq!(calls[0].1.encounter_count, Some(3));
    assert!(handle.pending_ops().await.expect("ops").is_empty());

    // The refresh cannot know the never-synced record, yet it survives.
    let rec = handle.get(id).await.expect("get").expect("record");
    assert_eq!(rec.encounter_count, 3);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn found_then_unmark_offline_coalesces_to_cleared() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), RuntimeConfig::default());

    let id = handle.create(draft("mewtwo")).await.expect("create");
    handle.set_online(false).await.expect("offline");

    handle.mark_found(id).await.expect("found");
    handle.unmark_found(id).await.expect("unmark");

    let ops = handle.pending_ops().await.expect("ops");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        OpKind::Update { patch } => {
            assert_eq!(patch.completion, Some(Completion::cleared()));
            assert_eq!(patch.encounter_count, None);
        }
        other => panic!("expected update, got {other:?}"),
    }

    let rec = handle.get(id).await.expect("get").expect("record");
    assert!(!rec.completed);
    assert_eq!(rec.completed_at, None);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn delete_supersedes_queued_updates_and_reaches_the_server() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), RuntimeConfig::default());

    let id = handle.create(draft("gible")).await.expect("create");
    handle.set_online(false).await.expect("offline");

    for _ in 0..3 {
        handle.increment(id).await.expect("increment");
    }
    handle.mark_found(id).await.expect("found");

    handle.delete(id).await.expect("delete");
    let ops = handle.pending_ops().await.expect("ops");
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0].kind, OpKind::Delete));
    assert!(handle.get(id).await.expect("get").is_none());

    handle.set_online(true).await.expect("online");
    assert_eq!(remote.delete_calls(), vec![id]);
    assert!(remote.update_calls().is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn deleting_a_local_only_record_queues_nothing() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), offline_config());

    let id = handle.create(draft("zorua")).await.expect("create");
    handle.increment(id).await.expect("increment");
    assert_eq!(handle.pending_ops().await.expect("ops").len(), 1);

    handle.delete(id).await.expect("delete");
    assert!(handle.pending_ops().await.expect("ops").is_empty());

    handle.set_online(true).await.expect("online");
    assert!(remote.delete_calls().is_empty());
    assert!(remote.update_calls().is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn failed_refresh_leaves_the_collection_unchanged() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), RuntimeConfig::default());

    handle.create(draft("charmander")).await.expect("create");
    handle.create(draft("bulbasaur")).await.expect("create");
    let before = handle.hunts().await.expect("hunts");

    remote.unreachable.store(true, Ordering::SeqCst);
    handle.sync().await.expect("sync");

    assert_eq!(handle.hunts().await.expect("hunts"), before);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn refresh_replaces_server_backed_records_wholesale() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), RuntimeConfig::default());

    let id = handle.create(draft("snorlax")).await.expect("create");

    // The server moved on without telling us.
    remote
        .state
        .lock()
        .expect("lock")
        .hunts
        .iter_mut()
        .for_each(|h| h.encounter_count = 41);

    handle.sync().await.expect("sync");
    let rec = handle.get(id).await.expect("get").expect("record");
    assert_eq!(rec.encounter_count, 41);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn server_rejection_drops_the_operation() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), offline_config());

    let id = handle.create(draft("ditto")).await.expect("create");
    handle.increment(id).await.expect("increment");

    remote.reject_status.store(422, Ordering::SeqCst);
    handle.set_online(true).await.expect("online");

    assert!(handle.pending_ops().await.expect("ops").is_empty());
    assert!(remote.update_calls().is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn transient_failures_requeue_until_the_attempt_ceiling() {
    let remote = FakeRemote::new();
    let config = RuntimeConfig {
        start_online: false,
        max_op_attempts: 2,
        ..RuntimeConfig::default()
    };
    let handle = spawn(Arc::clone(&remote), config);

    let id = handle.create(draft("dratini")).await.expect("create");
    handle.increment(id).await.expect("increment");

    remote.unreachable.store(true, Ordering::SeqCst);
    handle.set_online(true).await.expect("online");

    let ops = handle.pending_ops().await.expect("ops");
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].attempts, 1);

    // Second failed pass exhausts the ceiling.
    handle.sync().await.expect("sync");
    assert!(handle.pending_ops().await.expect("ops").is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn online_counter_taps_debounce_into_one_request_with_the_final_value() {
    let remote = FakeRemote::new();
    let config = RuntimeConfig {
        counter_debounce_ms: 50,
        ..RuntimeConfig::default()
    };
    let handle = spawn(Arc::clone(&remote), config);

    let id = handle.create(draft("magikarp")).await.expect("create");
    for _ in 0..3 {
        handle.increment(id).await.expect("increment");
    }
    assert!(remote.update_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(250)).await;

    let calls = remote.update_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.encounter_count, Some(3));
    assert!(handle.pending_ops().await.expect("ops").is_empty());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn going_offline_parks_debounced_taps_in_the_queue() {
    let remote = FakeRemote::new();
    let config = RuntimeConfig {
        counter_debounce_ms: 60_000,
        ..RuntimeConfig::default()
    };
    let handle = spawn(Arc::clone(&remote), config);

    let id = handle.create(draft("beldum")).await.expect("create");
    handle.increment(id).await.expect("increment");
    handle.increment(id).await.expect("increment");
    assert!(remote.update_calls().is_empty());

    handle.set_online(false).await.expect("offline");

    let ops = handle.pending_ops().await.expect("ops");
    assert_eq!(ops.len(), 1);
    match &ops[0].kind {
        OpKind::Update { patch } => assert_eq!(patch.encounter_count, Some(2)),
        other => panic!("expected update, got {other:?}"),
    }

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn reconnect_emits_sync_and_refresh_events_in_order() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), offline_config());
    let mut sub = handle.subscribe();

    let id = handle.create(draft("rookidee")).await.expect("create");
    handle.increment(id).await.expect("increment");
    handle.set_online(true).await.expect("online");

    let mut seen = Vec::new();
    while seen.len() < 6 {
        let evt = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("event")
            .expect("recv");
        seen.push(evt);
    }

    assert_eq!(seen[0], HuntEvent::Created { id });
    assert_eq!(seen[1], HuntEvent::Updated { id });
    assert_eq!(seen[2], HuntEvent::ConnectivityChanged { online: true });
    assert_eq!(seen[3], HuntEvent::SyncStarted);
    assert_eq!(seen[4], HuntEvent::SyncFinished { pending: 0 });
    assert_eq!(seen[5], HuntEvent::Refreshed);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn stats_reflect_the_live_collection() {
    let remote = FakeRemote::new();
    let handle = spawn(Arc::clone(&remote), offline_config());

    let a = handle.create(draft("togepi")).await.expect("create");
    let b = handle.create(draft("marill")).await.expect("create");
    for _ in 0..5 {
        handle.increment(a).await.expect("increment");
    }
    handle.increment(b).await.expect("increment");
    handle.mark_found(a).await.expect("found");

    let stats = handle.stats().await.expect("stats");
    assert_eq!(stats.hunts_started, 2);
    assert_eq!(stats.shinies_found, 1);
    assert_eq!(stats.active_hunts, 1);
    assert_eq!(stats.total_encounters, 6);
    assert_eq!(stats.avg_encounters, Some(5));
    assert_eq!(stats.luckiest.expect("luckiest").species_name, "togepi");

    handle.shutdown().await.expect("shutdown");
}
