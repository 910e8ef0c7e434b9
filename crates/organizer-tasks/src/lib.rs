//! `organizer-tasks`: SQLite-backed tasks and categories, plus the handlers
//! that keep each task's reminder in step with its row.

pub mod db;
pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use error::{Result, TaskError};
pub use service::{TaskInput, TaskService};
pub use store::TaskStore;
