//! Data Models
//!
//! This module contains the data structures shared by every component of the
//! sync engine:
//!
//! - `Team` / `RoomId` - collaboration scope and its broadcast room
//! - `Board` / `Note` - the ordered content the team edits
//! - `ClientSession` / `SessionUser` - who this client is and which team is active

mod board;
mod session;
mod team;

pub use board::{Board, Note, ValidationError};
pub use session::{display_name_from_email, ClientSession, SessionUser};
pub use team::{JoinedTeam, RoomId, Team};
