//! Local State Store
//!
//! - [`BoardStore`] - idempotent-by-id board and note storage
//! - [`TeamView`] - the active team's store plus presence and UI references
//!
//! The store is mutated only by the mutation pipeline (optimistic effects and
//! confirmed responses) and by the event reconciler.

mod board_store;
pub mod view;

pub use board_store::{BoardStore, InsertOutcome, RemoveOutcome, StoreError};
pub use view::{SharedView, TeamView, ViewSnapshot};
