use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage format for every date/time column (local wall-clock, no offset).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Day-only prefix of [`DATETIME_FORMAT`], used for "tasks due on" queries.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Primary key of a row in the `tasks` table.
///
/// Doubles as the reminder tag: the scheduler tracks at most one pending
/// reminder per task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Primary key of a row in the `categories` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl CategoryId {
    /// The seeded fallback category; tasks land here when their category is
    /// deleted without its tasks.
    pub const DEFAULT: CategoryId = CategoryId(1);

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CategoryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}
