use chrono::NaiveDateTime;
use organizer_core::types::{CategoryId, TaskId};
use serde::{Deserialize, Serialize};

use crate::db::STATUS_COMPLETED;

/// A row of `tasks` joined with its status and category names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub due_date: NaiveDateTime,
    /// Higher sorts first.
    pub priority: i64,
    pub status: String,
    pub category: Option<String>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// Fields for a new task. `None` status means the first status ("New");
/// `None` category means the default category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub due_date: NaiveDateTime,
    pub priority: i64,
    pub status: Option<String>,
    pub category: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    pub priority: Option<i64>,
    pub status: Option<String>,
    pub category: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.category.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub id: CategoryId,
    pub name: String,
    pub task_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryWithTasks {
    pub id: CategoryId,
    pub name: String,
    pub tasks: Vec<Task>,
}
