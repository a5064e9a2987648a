//! Live sync step definitions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use complaint_sync::test_utils::MockRemoteStore;
use complaint_sync::{InMemoryEventChannel, LiveSync, LiveSyncConfig, Snapshot, SyncError};
use complaint_sync_client::{ComplaintId, ComplaintStatus, EventKind, RemoteStore};
use cucumber::{given, then, when, World};
use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::{describe_records, normalise, parse_records};

/// Test context for live sync scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct LiveSyncWorld {
    remote: Arc<MockRemoteStore>,
    channel: InMemoryEventChannel,
    sync: Option<Arc<LiveSync>>,
    gate: Option<Arc<Notify>>,
    pending: Option<JoinHandle<complaint_sync::Result<()>>>,
    last_result: Option<complaint_sync::Result<()>>,
    remembered: Option<Snapshot>,
}

impl fmt::Debug for LiveSyncWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSyncWorld")
            .field("snapshot", &self.sync.as_ref().map(|s| s.snapshot()))
            .field("last_result", &self.last_result)
            .finish()
    }
}

impl LiveSyncWorld {
    fn new() -> Self {
        Self {
            remote: Arc::new(MockRemoteStore::new()),
            channel: InMemoryEventChannel::new(),
            sync: None,
            gate: None,
            pending: None,
            last_result: None,
            remembered: None,
        }
    }

    fn sync(&self) -> &Arc<LiveSync> {
        self.sync.as_ref().expect("live sync not started")
    }

    async fn start(&mut self, config: LiveSyncConfig) {
        let sync = Arc::new(LiveSync::new(
            self.remote.clone(),
            Arc::new(self.channel.clone()),
            config,
        ));
        sync.start("test-token").await.expect("start");

        // Initial fetch plus the resync that follows `connected`.
        let mut rx = sync.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.revision >= 2))
            .await
            .expect("resync after connect")
            .expect("snapshot channel closed");
        self.sync = Some(sync);
    }
}

fn status(raw: &str) -> ComplaintStatus {
    raw.parse().expect("valid status")
}

// --- Given steps ---

#[given(expr = "a backend holding {string}")]
async fn given_backend_holding(world: &mut LiveSyncWorld, records: String) {
    world.remote.set_complaints(parse_records(&records)).await;
}

#[given("a started live sync")]
async fn given_started_live_sync(world: &mut LiveSyncWorld) {
    world.start(LiveSyncConfig::default()).await;
}

#[given(expr = "a live sync polling every {int} milliseconds")]
async fn given_polling_live_sync(world: &mut LiveSyncWorld, millis: u64) {
    world
        .start(LiveSyncConfig {
            poll_interval: Duration::from_millis(millis),
            ..Default::default()
        })
        .await;
}

#[given("the backend rejects status changes")]
async fn given_backend_rejects(world: &mut LiveSyncWorld) {
    world.remote.set_fail_update(true).await;
}

#[given("the backend holds status changes")]
async fn given_backend_holds(world: &mut LiveSyncWorld) {
    world.gate = Some(world.remote.hold_updates().await);
}

#[given("the snapshot is remembered")]
async fn given_snapshot_remembered(world: &mut LiveSyncWorld) {
    world.remembered = Some(world.sync().snapshot());
}

// --- When steps ---

#[when(expr = "complaint {string} is changed to {string}")]
async fn when_status_changed(world: &mut LiveSyncWorld, id: String, to: String) {
    let result = world
        .sync()
        .request_status_change(&ComplaintId::from(id), status(&to))
        .await;
    world.last_result = Some(result);
}

#[when(expr = "a status change of complaint {string} to {string} is started")]
async fn when_status_change_started(world: &mut LiveSyncWorld, id: String, to: String) {
    let sync = world.sync().clone();
    let started = world.remote.update_count() + 1;
    let to = status(&to);
    world.pending = Some(tokio::spawn(async move {
        sync.request_status_change(&ComplaintId::from(id), to).await
    }));
    world.remote.wait_for_updates(started).await;
}

#[when("the live sync is torn down")]
async fn when_torn_down(world: &mut LiveSyncWorld) {
    world.sync().teardown().await;
}

#[when("the held status change is released")]
async fn when_released(world: &mut LiveSyncWorld) {
    world.gate.as_ref().expect("gate installed").notify_one();
}

#[when(expr = "the backend now holds {string}")]
async fn when_backend_now_holds(world: &mut LiveSyncWorld, records: String) {
    world.remote.set_complaints(parse_records(&records)).await;
}

#[when(expr = "{int} milliseconds pass")]
async fn when_time_passes(_world: &mut LiveSyncWorld, millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

#[when(expr = "the channel pushes an update for {string}")]
async fn when_channel_pushes(world: &mut LiveSyncWorld, record: String) {
    for record in parse_records(&record) {
        // The backend holds the change too, so a concurrent resync agrees.
        world
            .remote
            .update_status(&record.id, record.status)
            .await
            .expect("backend update");
        let delivered = world.channel.publish(
            EventKind::Updated,
            json!({"id": record.id.as_str(), "status": record.status}),
        );
        assert_eq!(delivered, 1);
    }
}

// --- Then steps ---

#[then("the status change succeeded")]
async fn then_change_succeeded(world: &mut LiveSyncWorld) {
    assert!(matches!(world.last_result, Some(Ok(()))));
}

#[then("the status change failed with a remote error")]
async fn then_change_failed(world: &mut LiveSyncWorld) {
    assert!(matches!(world.last_result, Some(Err(SyncError::Remote(_)))));
}

#[then("the status change was rejected as already in progress")]
async fn then_change_rejected(world: &mut LiveSyncWorld) {
    assert!(matches!(
        world.last_result,
        Some(Err(SyncError::AlreadyInProgress(_)))
    ));
}

#[then("the pending status change completes without error")]
async fn then_pending_completes(world: &mut LiveSyncWorld) {
    let pending = world.pending.take().expect("status change started");
    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("status change did not complete")
        .expect("status change task panicked");
    assert!(result.is_ok(), "{result:?}");
}

#[then(expr = "complaint {string} has status {string}")]
async fn then_has_status(world: &mut LiveSyncWorld, id: String, expected: String) {
    let snapshot = world.sync().snapshot();
    let record = snapshot
        .record(&ComplaintId::from(id))
        .expect("complaint present");
    assert_eq!(record.status, status(&expected));
}

#[then(expr = "complaint {string} eventually has status {string}")]
async fn then_eventually_has_status(world: &mut LiveSyncWorld, id: String, expected: String) {
    let id = ComplaintId::from(id);
    let expected = status(&expected);
    let mut rx = world.sync().subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.record(&id).map(|r| r.status) == Some(expected)),
    )
    .await
    .expect("status not observed")
    .expect("snapshot channel closed");
}

#[then("the snapshot is unchanged")]
async fn then_snapshot_unchanged(world: &mut LiveSyncWorld) {
    let remembered = world.remembered.as_ref().expect("snapshot remembered");
    assert_eq!(&world.sync().snapshot(), remembered);
}

#[then(expr = "the snapshot records are {string}")]
async fn then_records_are(world: &mut LiveSyncWorld, expected: String) {
    assert_eq!(describe_records(&world.sync().snapshot()), normalise(&expected));
}
