use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use organizer_core::config::SchedulerConfig;
use organizer_core::notify::{Notification, Notifier};
use organizer_core::types::TaskId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::engine::JobRunner;
use crate::error::{Result, SchedulerError};
use crate::types::{Action, Job, JobId, JobInfo};

/// Application entry point for task reminders.
///
/// Construct one at startup and share it (`Arc<ReminderScheduler>`) with
/// every handler that creates, edits, completes or deletes tasks. Both
/// `schedule_*` and `clear_scheduled_task` only touch the in-memory table
/// and return immediately; all waiting happens on the background worker.
pub struct ReminderScheduler {
    runner: JobRunner,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ReminderScheduler {
    /// Scheduler without a background worker: due jobs fire only when
    /// [`tick`](Self::tick) is called.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            runner: JobRunner::new(clock),
            worker: Mutex::new(None),
        }
    }

    /// Scheduler on the system clock with its poll loop running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &SchedulerConfig) -> Self {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    pub fn start_with_clock(config: &SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let scheduler = Self::new(clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.runner.clone().run(
            config.poll_interval(),
            config.detached_fire,
            shutdown_rx,
        ));
        *scheduler.worker_slot() = Some(Worker {
            shutdown_tx,
            handle,
        });
        scheduler
    }

    fn worker_slot(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `callback` at `fire_at`, tagged with `task_id`.
    ///
    /// A `fire_at` that is not in the future is dropped without error.
    /// If `task_id` already has a pending reminder the new one is ignored;
    /// call [`clear_scheduled_task`](Self::clear_scheduled_task) first when
    /// re-scheduling.
    pub fn schedule_task<F, E>(&self, task_id: TaskId, fire_at: DateTime<Local>, callback: F)
    where
        F: FnOnce() -> std::result::Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        let now = self.runner.now();
        if fire_at <= now {
            debug!(task_id = %task_id, fire_at = %fire_at, "reminder time already passed; not scheduled");
            return;
        }

        let id = JobId::new();
        let runner = self.runner.downgrade();
        let action: Action = Box::new(move || {
            let result = callback().map_err(|e| SchedulerError::ActionFailed(e.to_string()));
            // The runner already dropped the job when it came due; this only
            // matters if the action was invoked some other way.
            if let Some(runner) = runner.upgrade() {
                runner.deregister(task_id, id);
            }
            result
        });

        if self
            .runner
            .register(Job::with_id(id, task_id, fire_at, action))
        {
            info!(
                task_id = %task_id,
                job_id = %id,
                fire_at = %fire_at,
                delay_secs = (fire_at - now).num_seconds(),
                "reminder scheduled"
            );
        }
    }

    /// Deliver `notification` through `notifier` at `fire_at`.
    pub fn schedule_notification(
        &self,
        task_id: TaskId,
        fire_at: DateTime<Local>,
        notifier: Arc<dyn Notifier>,
        notification: Notification,
    ) {
        self.schedule_task(task_id, fire_at, move || notifier.notify(&notification));
    }

    /// Forget the pending reminder for `task_id`. Safe to call when there is
    /// none.
    pub fn clear_scheduled_task(&self, task_id: TaskId) {
        self.runner.cancel(task_id);
    }

    pub fn is_scheduled(&self, task_id: TaskId) -> bool {
        self.runner.contains(task_id)
    }

    /// Pending reminders ordered by fire time.
    pub fn pending(&self) -> Vec<JobInfo> {
        self.runner.snapshot()
    }

    /// Fire due reminders on the calling thread.
    pub fn tick(&self) -> usize {
        self.runner.tick()
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Stop the poll loop and wait for it to exit. Pending reminders are
    /// discarded with the scheduler. No-op without a running worker.
    pub async fn shutdown(&self) -> Result<()> {
        let worker = self.worker_slot().take();
        if let Some(worker) = worker {
            let _ = worker.shutdown_tx.send(true);
            worker
                .handle
                .await
                .map_err(|e| SchedulerError::Shutdown(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        // Signal only; the worker is never joined from here.
        if let Some(worker) = self.worker_slot().take() {
            let _ = worker.shutdown_tx.send(true);
        }
    }
}
