//! TeamBoard Client Sync Engine
//!
//! This crate keeps one client's in-memory view of a team's boards and notes
//! consistent with its own in-flight mutations, the authoritative
//! request/response service, and push events describing changes made by other
//! members, despite duplicate delivery and the lack of any server-assigned
//! event ordering.
//!
//! # Architecture
//!
//! - **Idempotent by id**: every store write checks the id first, so replays
//!   and self-echoes converge
//! - **Delete wins**: removals leave per-view tombstones, so a delete that
//!   overtakes its insert still sticks
//! - **One room at a time**: a single listener per client, replaced on every
//!   team switch; stale events are dropped by room
//! - **Seams, not transports**: HTTP and socket clients implement
//!   [`CollabApi`] and [`PushChannel`] outside this crate
//!
//! # Modules
//!
//! - [`models`] - Data structures (Team, Board, Note, ClientSession)
//! - [`store`] - Board store and the active team view
//! - [`events`] - Typed inbound push events
//! - [`api`] - Authoritative request service seam
//! - [`channel`] - Push channel seam and room subscriptions
//! - [`services`] - Mutation pipeline, reconciler, presence, room membership
//! - [`config`] - Runtime configuration
//! - [`loopback`] - In-process server for tests and simulations

pub mod api;
pub mod channel;
pub mod config;
pub mod events;
pub mod loopback;
pub mod models;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use api::{ApiError, CollabApi};
pub use channel::{ChannelEnvelope, ChannelError, JoinRoom, PushChannel, RoomSubscription};
pub use config::SyncConfig;
pub use events::{Actor, EventParseError, InboundEvent};
pub use models::*;
pub use services::*;
pub use store::{BoardStore, SharedView, TeamView, ViewSnapshot};
