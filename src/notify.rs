use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::model::{Reservation, ResourceId};

const CHANNEL_CAPACITY: usize = 256;
const FIREHOSE_CAPACITY: usize = 4096;

/// What happened to a reservation, published after the change is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Submitted { reservation: Reservation },
    /// Submission collided and was parked for review.
    Contested {
        reservation: Reservation,
        colliding: Vec<Ulid>,
    },
    Approved { reservation: Reservation },
    Declined { reservation: Reservation },
    Cancelled { reservation: Reservation },
    Completed { reservation: Reservation },
    /// Cancelled by an override; the owner should hear about it.
    Displaced {
        reservation: Reservation,
        winner: Ulid,
    },
}

impl Notice {
    pub fn reservation(&self) -> &Reservation {
        match self {
            Notice::Submitted { reservation }
            | Notice::Contested { reservation, .. }
            | Notice::Approved { reservation }
            | Notice::Declined { reservation }
            | Notice::Cancelled { reservation }
            | Notice::Completed { reservation }
            | Notice::Displaced { reservation, .. } => reservation,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.reservation().resource_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Submitted { .. } => "submitted",
            Notice::Contested { .. } => "contested",
            Notice::Approved { .. } => "approved",
            Notice::Declined { .. } => "declined",
            Notice::Cancelled { .. } => "cancelled",
            Notice::Completed { .. } => "completed",
            Notice::Displaced { .. } => "displaced",
        }
    }
}

/// Broadcast hub for notices: one channel per resource plus a firehose that
/// sees everything.
pub struct NotifyHub {
    channels: DashMap<ResourceId, broadcast::Sender<Notice>>,
    firehose: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            firehose: broadcast::channel(FIREHOSE_CAPACITY).0,
        }
    }

    /// Subscribe to notices for a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource_id: &str) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(resource_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Notice> {
        self.firehose.subscribe()
    }

    /// Send a notice. No-op if nobody is listening. A resource channel whose
    /// subscribers are all gone is dropped.
    pub fn send(&self, notice: &Notice) {
        let resource_id = notice.resource_id();
        let orphaned = match self.channels.get(resource_id) {
            Some(sender) => sender.send(notice.clone()).is_err(),
            None => false,
        };
        if orphaned {
            self.channels
                .remove_if(resource_id, |_, sender| sender.receiver_count() == 0);
        }
        let _ = self.firehose.send(notice.clone());
    }
}

/// The outside world's notification service (mail, push, chat...).
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, notice: &Notice) -> Result<(), String>;
}

/// Forward every notice from the hub to `dispatcher`. Runs outside all engine
/// locks; delivery failures are logged and dropped.
pub fn spawn_dispatcher(hub: &NotifyHub, dispatcher: Arc<dyn Dispatcher>) -> JoinHandle<()> {
    let mut rx = hub.subscribe_all();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notice) => {
                    if let Err(e) = dispatcher.dispatch(&notice).await {
                        tracing::warn!(
                            "dispatch of {} notice for {} failed: {e}",
                            notice.kind(),
                            notice.reservation().id
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("dispatcher lagged, {n} notice(s) dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Dispatcher that writes notices to the log as JSON.
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn dispatch(&self, notice: &Notice) -> Result<(), String> {
        let payload = serde_json::to_string(notice).map_err(|e| e.to_string())?;
        tracing::info!(target: "slotguard::dispatch", "{payload}");
        Ok(())
    }
}
