//! Client-Facing Events
//!
//! Everything the rendering layer needs to react to is published on one
//! broadcast channel: user-visible notifications, view revisions and presence
//! changes. Publishing never fails; events sent while nobody is subscribed are
//! simply dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// A user-visible message, shown by front ends as a toast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    Notification(Notification),
    /// The view changed; re-read the snapshot
    ViewChanged { revision: u64 },
    PresenceChanged { count: u32 },
    /// The room subscription ended (connection closed); local state is kept
    ChannelClosed { room: String },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::Notification(_) => "sync:notification",
            SyncEvent::ViewChanged { .. } => "sync:view-changed",
            SyncEvent::PresenceChanged { .. } => "sync:presence",
            SyncEvent::ChannelClosed { .. } => "sync:channel-closed",
        }
    }
}

/// Cloneable publisher for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, notification: Notification) {
        tracing::debug!("Notification ({:?}): {}", notification.level, notification.message);
        self.emit(SyncEvent::Notification(notification));
    }

    pub fn view_changed(&self, revision: u64) {
        self.emit(SyncEvent::ViewChanged { revision });
    }
}
