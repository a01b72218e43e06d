//! Room Membership
//!
//! At most one room listener runs per client. Joining a room aborts the
//! previous listener before subscribing, so events for the old team stop
//! being applied as soon as the switch starts; any that were already queued
//! are dropped by the reconciler's room check.

use crate::channel::{ChannelError, JoinRoom, PushChannel};
use crate::models::RoomId;
use crate::services::notification::{EventBus, SyncEvent};
use crate::services::reconciler::EventReconciler;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct RoomMembership<C: PushChannel> {
    channel: Arc<C>,
    listener: Mutex<Option<Listener>>,
}

struct Listener {
    room: RoomId,
    handle: JoinHandle<()>,
}

impl<C: PushChannel> RoomMembership<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            listener: Mutex::new(None),
        }
    }

    /// Room the listener is currently subscribed to
    pub async fn current_room(&self) -> Option<RoomId> {
        self.listener
            .lock()
            .await
            .as_ref()
            .filter(|l| !l.handle.is_finished())
            .map(|l| l.room.clone())
    }

    /// Leave the current room (if any) and start listening on `join.room()`.
    ///
    /// Every message from the new subscription goes through `reconciler`.
    pub async fn switch(
        &self,
        join: JoinRoom,
        reconciler: EventReconciler,
        bus: EventBus,
    ) -> Result<(), ChannelError> {
        let mut listener = self.listener.lock().await;
        if let Some(previous) = listener.take() {
            debug!("Leaving room {}", previous.room);
            previous.handle.abort();
        }

        let room = join.room().clone();
        let mut subscription = self.channel.join_room(join).await?;
        info!("📡 Joined room {}", room);

        let task_room = room.clone();
        let handle = tokio::spawn(async move {
            while let Some(envelope) = subscription.next_envelope().await {
                reconciler.handle(envelope).await;
            }
            debug!("Subscription to {} closed", task_room);
            bus.emit(SyncEvent::ChannelClosed {
                room: task_room.to_string(),
            });
        });

        *listener = Some(Listener { room, handle });
        Ok(())
    }

    /// Stop listening without joining another room
    pub async fn leave(&self) {
        if let Some(previous) = self.listener.lock().await.take() {
            debug!("Leaving room {}", previous.room);
            previous.handle.abort();
        }
    }
}

impl<C: PushChannel> Drop for RoomMembership<C> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.handle.abort();
        }
    }
}
