mod conflict;
mod error;
pub mod index;
mod mutations;
mod queries;
pub mod store;
mod workflow;

pub(crate) use conflict::now_ms;
pub use error::EngineError;
pub use index::ConflictIndex;
pub use mutations::CompactionStats;
pub use store::ResourceState;

use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{Notice, NotifyHub};
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Every append already queued when the first one arrives shares its fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { event, response } => vec![(event, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                // Anything else waits until the batch is durable.
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} record(s) failed: {e}", batch.len());
        if let Err(e) = wal.rollback() {
            tracing::error!("WAL rollback failed: {e}");
        }
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    for (event, _) in batch {
        wal.append_buffered(event)?;
    }
    wal.flush_sync()
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::Storage(e.to_string()))
}

// ── Engine ───────────────────────────────────────────────

/// Behaviour knobs an embedding application picks once per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Policy for resources nobody configured explicitly.
    pub default_policy: ResourcePolicy,
    /// Keep colliding submissions as contested requests an approver can
    /// override, instead of discarding them.
    pub park_contested: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_policy: ResourcePolicy::default(),
            park_contested: true,
        }
    }
}

/// Write access to one resource. Also holds the journal gate shared, so
/// compaction never snapshots around an in-flight commit.
pub(super) struct ResourceLock {
    _gate: OwnedRwLockReadGuard<()>,
    guard: OwnedRwLockWriteGuard<ResourceState>,
}

impl Deref for ResourceLock {
    type Target = ResourceState;

    fn deref(&self) -> &ResourceState {
        &self.guard
    }
}

impl DerefMut for ResourceLock {
    fn deref_mut(&mut self) -> &mut ResourceState {
        &mut self.guard
    }
}

pub struct Engine {
    state: DashMap<ResourceId, SharedResourceState>,
    /// Reverse lookup: reservation id → resource id.
    locator: Arc<DashMap<Ulid, ResourceId>>,
    journal_gate: Arc<RwLock<()>>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    settings: EngineSettings,
}

/// Apply an event to a ResourceState (caller holds the lock).
fn apply_to_resource(rs: &mut ResourceState, event: &Event, locator: &DashMap<Ulid, ResourceId>) {
    if let Event::Recorded { reservation } = event {
        locator.insert(reservation.id, reservation.resource_id.clone());
    }
    rs.apply(event);
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        Self::with_settings(wal_path, notify, EngineSettings::default())
    }

    /// Replay the journal at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn with_settings(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        settings: EngineSettings,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            locator: Arc::new(DashMap::new()),
            journal_gate: Arc::new(RwLock::new(())),
            wal_tx,
            notify,
            settings,
        };

        // Sole owner of these Arcs during replay, so try_write never contends.
        // blocking_write would panic if we're inside an async context.
        for event in &events {
            let handle = engine.resource_handle(event.resource_id());
            let mut guard = handle
                .try_write()
                .map_err(|_| io::Error::other("replay: resource lock contended"))?;
            apply_to_resource(&mut guard, event, &engine.locator);
        }
        tracing::info!(
            "replayed {} event(s) into {} resource(s) from {}",
            events.len(),
            engine.state.len(),
            wal_path.display()
        );

        Ok(engine)
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn get_resource(&self, resource_id: &str) -> Option<SharedResourceState> {
        self.state.get(resource_id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_reservation(&self, id: &Ulid) -> Option<ResourceId> {
        self.locator.get(id).map(|e| e.value().clone())
    }

    /// Resource state for `resource_id`, created on first use. The DashMap
    /// entry guard is released before returning.
    fn resource_handle(&self, resource_id: &str) -> SharedResourceState {
        if let Some(existing) = self.get_resource(resource_id) {
            return existing;
        }
        let handle = self
            .state
            .entry(resource_id.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(ResourceState::new(
                    resource_id.to_string(),
                    self.settings.default_policy,
                )))
            })
            .value()
            .clone();
        metrics::gauge!(crate::observability::RESOURCES_TRACKED).set(self.state.len() as f64);
        handle
    }

    /// Acquire the resource lock. The only point where mutations wait on
    /// each other, and only on the same resource. The journal gate comes
    /// first: compaction may drop empty resources while it holds the gate
    /// exclusively, so the handle is only looked up once the gate is ours.
    pub(super) async fn lock_resource(&self, resource_id: &str) -> ResourceLock {
        let wait_start = Instant::now();
        let gate = self.journal_gate.clone().read_owned().await;
        let handle = self.resource_handle(resource_id);
        let guard = handle.write_owned().await;
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS)
            .record(wait_start.elapsed().as_secs_f64());
        ResourceLock { _gate: gate, guard }
    }

    /// Lookup reservation → resource, acquire that resource's lock.
    pub(super) async fn resolve_reservation_write(&self, id: &Ulid) -> Result<ResourceLock, EngineError> {
        let resource_id = self
            .get_resource_for_reservation(id)
            .ok_or(EngineError::NotFound(*id))?;
        Ok(self.lock_resource(&resource_id).await)
    }

    /// WAL-append, apply and publish as one step that outlives the caller.
    /// The work runs on its own task which owns the lock, so dropping this
    /// future mid-flight can neither leave a journaled but unapplied record
    /// nor lose the notices of a committed change.
    ///
    /// `outcome` reads the applied state under the lock and returns the
    /// caller's value plus the notices; those are sent after the lock drops.
    pub(super) async fn commit<T, F>(&self, mut lock: ResourceLock, event: Event, outcome: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&ResourceState) -> Result<(T, Vec<Notice>), EngineError> + Send + 'static,
    {
        let wal_tx = self.wal_tx.clone();
        let locator = self.locator.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            apply_to_resource(&mut lock, &event, &locator);
            let result = outcome(&*lock);
            drop(lock);
            let (value, notices) = result?;
            for notice in &notices {
                notify.send(notice);
            }
            Ok::<_, EngineError>(value)
        })
        .await
        .map_err(|e| EngineError::Storage(format!("commit task failed: {e}")))?
    }
}
