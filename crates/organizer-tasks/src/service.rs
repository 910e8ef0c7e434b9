//! Task handlers: every change to a task keeps its reminder in step.
//!
//! | Handler           | Reminder effect                       |
//! |-------------------|---------------------------------------|
//! | `create_task`     | schedule at the due time              |
//! | `edit_task`       | clear, then schedule at the new time  |
//! | `complete_task`   | clear                                 |
//! | `reopen_task`     | clear                                 |
//! | `delete_task`     | clear                                 |
//! | `delete_category` | clear for every task deleted with it  |

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use organizer_core::notify::{Notification, Notifier};
use organizer_core::types::{CategoryId, TaskId};
use organizer_scheduler::ReminderScheduler;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{STATUS_COMPLETED, STATUS_NEW};
use crate::error::{Result, TaskError};
use crate::store::TaskStore;
use crate::types::{NewTask, TaskUpdate};

pub const MAX_TASK_NAME_CHARS: usize = 50;

/// What the user submits when creating or editing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
    pub name: String,
    pub description: Option<String>,
    pub due_date: NaiveDateTime,
    pub priority: i64,
    pub category: Option<String>,
    /// Ignored on create; the new task always starts as "New".
    pub status: Option<String>,
}

pub struct TaskService {
    store: Arc<TaskStore>,
    reminders: Arc<ReminderScheduler>,
    notifier: Arc<dyn Notifier>,
    reminder_title: String,
}

impl TaskService {
    pub fn new(
        store: Arc<TaskStore>,
        reminders: Arc<ReminderScheduler>,
        notifier: Arc<dyn Notifier>,
        reminder_title: impl Into<String>,
    ) -> Self {
        Self {
            store,
            reminders,
            notifier,
            reminder_title: reminder_title.into(),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }

    pub fn create_task(&self, input: &TaskInput) -> Result<TaskId> {
        let fire_at = self.validate(input)?;
        let id = self.store.add_task(&NewTask {
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            due_date: input.due_date,
            priority: input.priority,
            status: None,
            category: input.category.clone(),
        })?;
        self.schedule_reminder(id, fire_at, input.name.trim());
        Ok(id)
    }

    pub fn edit_task(&self, id: TaskId, input: &TaskInput) -> Result<()> {
        let fire_at = self.validate(input)?;
        self.store.update_task(
            id,
            &TaskUpdate {
                name: Some(input.name.trim().to_string()),
                description: input.description.clone(),
                due_date: Some(input.due_date),
                priority: Some(input.priority),
                status: input.status.clone(),
                category: input.category.clone(),
            },
        )?;
        self.reminders.clear_scheduled_task(id);
        self.schedule_reminder(id, fire_at, input.name.trim());
        Ok(())
    }

    pub fn complete_task(&self, id: TaskId) -> Result<()> {
        self.store.set_status(id, STATUS_COMPLETED)?;
        self.reminders.clear_scheduled_task(id);
        Ok(())
    }

    /// Mark a task as not completed again. Its reminder stays cleared until
    /// the task is edited.
    pub fn reopen_task(&self, id: TaskId) -> Result<()> {
        self.store.set_status(id, STATUS_NEW)?;
        self.reminders.clear_scheduled_task(id);
        Ok(())
    }

    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        self.store.delete_task(id)?;
        self.reminders.clear_scheduled_task(id);
        Ok(())
    }

    pub fn delete_category(&self, id: CategoryId, delete_tasks: bool) -> Result<Vec<TaskId>> {
        let deleted = self.store.delete_category(id, delete_tasks)?;
        for task_id in &deleted {
            self.reminders.clear_scheduled_task(*task_id);
        }
        Ok(deleted)
    }

    fn schedule_reminder(&self, id: TaskId, fire_at: DateTime<Local>, name: &str) {
        self.reminders.schedule_notification(
            id,
            fire_at,
            Arc::clone(&self.notifier),
            Notification::new(self.reminder_title.clone(), name),
        );
        debug!(task_id = %id, %fire_at, "task reminder requested");
    }

    /// Check the input and resolve its due time on the local clock.
    fn validate(&self, input: &TaskInput) -> Result<DateTime<Local>> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(TaskError::Validation(
                "task name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_TASK_NAME_CHARS {
            return Err(TaskError::Validation(format!(
                "task name must not exceed {MAX_TASK_NAME_CHARS} characters"
            )));
        }
        let fire_at = to_local(input.due_date)?;
        if fire_at < self.reminders.runner().now() {
            return Err(TaskError::Validation(
                "the selected due time has already passed".to_string(),
            ));
        }
        Ok(fire_at)
    }
}

/// Resolve a wall-clock time in the local zone. On a DST overlap the earlier
/// instant wins.
fn to_local(at: NaiveDateTime) -> Result<DateTime<Local>> {
    Local.from_local_datetime(&at).earliest().ok_or_else(|| {
        TaskError::Validation(format!("{at} does not exist in the local time zone"))
    })
}
