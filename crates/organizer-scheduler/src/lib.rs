//! `organizer-scheduler`: in-process one-shot reminder scheduler.
//!
//! # Overview
//!
//! Jobs live in an in-memory table keyed by [`TaskId`]. A Tokio worker wakes
//! on a fixed interval (1 s by default), removes every job whose `fire_at`
//! has passed and runs its action exactly once. Nothing is persisted: a
//! restart forgets every pending reminder.
//!
//! | Piece                  | Role                                              |
//! |------------------------|---------------------------------------------------|
//! | [`JobRunner`]          | shared job table, `register` / `cancel` / `tick`  |
//! | [`ReminderScheduler`]  | application entry point, owns the worker          |
//! | [`Clock`]              | source of "now"; [`ManualClock`] in tests         |
//!
//! [`TaskId`]: organizer_core::types::TaskId

pub mod clock;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::JobRunner;
pub use error::{Result, SchedulerError};
pub use scheduler::ReminderScheduler;
pub use types::{Job, JobId, JobInfo, JobState};
