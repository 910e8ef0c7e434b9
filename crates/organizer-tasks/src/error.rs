use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("category not found: {0}")]
    CategoryNotFound(String),

    #[error("a category named '{name}' already exists")]
    CategoryExists { name: String },

    #[error("task not found: {id}")]
    TaskNotFound { id: i64 },

    #[error("status not found: {0}")]
    StatusNotFound(String),

    /// Input rejected before touching the database.
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
