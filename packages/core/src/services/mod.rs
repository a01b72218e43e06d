//! Sync Services
//!
//! This module contains the components that keep a client's view in step with
//! the server:
//!
//! - `MutationPipeline` - user intents to requests, with the optimism policy
//! - `EventReconciler` - idempotent merge of push events into the view
//! - `PresenceTracker` - online count for the active room
//! - `RoomMembership` - the single room listener per client
//! - `SyncClient` - facade tying session, view, room and pipeline together
//!
//! Services coordinate between the request/channel seams and the local store;
//! neither seam is ever called while a view lock is held.

pub mod error;
pub mod mutation_pipeline;
pub mod notification;
pub mod presence;
pub mod reconciler;
pub mod room;
pub mod sync_client;

pub use error::SyncError;
pub use mutation_pipeline::MutationPipeline;
pub use notification::{EventBus, Notification, NotificationLevel, SyncEvent};
pub use presence::PresenceTracker;
pub use reconciler::{EventReconciler, Reconciliation};
pub use room::RoomMembership;
pub use sync_client::SyncClient;
