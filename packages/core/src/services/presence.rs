//! Presence Tracker
//!
//! Holds the number of clients subscribed to the active room. The count is
//! replaced wholesale by each presence update and reset when the room changes.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceTracker {
    count: u32,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Replace the count. Returns true if it changed.
    pub fn replace(&mut self, count: u32) -> bool {
        let changed = self.count != count;
        self.count = count;
        changed
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
