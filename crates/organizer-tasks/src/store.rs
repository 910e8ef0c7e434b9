use std::sync::{Mutex, MutexGuard};

use chrono::{Local, NaiveDate, NaiveDateTime};
use organizer_core::types::{CategoryId, TaskId, DATETIME_FORMAT, DATE_FORMAT};
use rusqlite::{
    params, params_from_iter, types::Type, Connection, OptionalExtension, Params, Row, ToSql,
};
use tracing::{debug, info};

use crate::db::{init_db, STATUS_COMPLETED};
use crate::error::{Result, TaskError};
use crate::types::{CategorySummary, CategoryWithTasks, NewTask, Task, TaskUpdate};

const TASK_SELECT: &str = "SELECT t.id, t.name, t.description, t.creation_date, t.due_date,
            t.priority, s.name, c.name
     FROM tasks t
     LEFT JOIN statuses s ON t.status_id = s.id
     LEFT JOIN categories c ON t.category_id = c.id";

/// Task and category persistence.
///
/// Thread-safe: one SQLite connection behind a mutex, so handlers on any
/// thread can share a single store.
pub struct TaskStore {
    db: Mutex<Connection>,
}

impl TaskStore {
    /// Wrap `conn`, creating the schema and seed rows if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- categories --------------------------------------------------------

    pub fn add_category(&self, name: &str) -> Result<CategoryId> {
        let name = validate_category_name(name)?;
        let db = self.db();
        db.execute("INSERT INTO categories (name) VALUES (?1)", [name])
            .map_err(|e| unique_to(e, || TaskError::CategoryExists { name: name.to_string() }))?;
        let id = CategoryId(db.last_insert_rowid());
        info!(category_id = %id, %name, "category added");
        Ok(id)
    }

    /// Insert the category unless one with that name exists; returns its id
    /// either way.
    pub fn ensure_category(&self, name: &str) -> Result<CategoryId> {
        let name = validate_category_name(name)?;
        let db = self.db();
        db.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", [name])?;
        let id = category_id_by_name(&db, name)?
            .ok_or_else(|| TaskError::CategoryNotFound(name.to_string()))?;
        Ok(id)
    }

    pub fn rename_category(&self, id: CategoryId, new_name: &str) -> Result<()> {
        let new_name = validate_category_name(new_name)?;
        let db = self.db();
        let n = db
            .execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![new_name, id.get()],
            )
            .map_err(|e| {
                unique_to(e, || TaskError::CategoryExists {
                    name: new_name.to_string(),
                })
            })?;
        if n == 0 {
            return Err(TaskError::CategoryNotFound(id.to_string()));
        }
        info!(category_id = %id, name = %new_name, "category renamed");
        Ok(())
    }

    /// Delete a category. Its tasks are deleted with it when `delete_tasks`
    /// is set, otherwise they move to the default category.
    ///
    /// Returns the ids of deleted tasks so their reminders can be cleared.
    pub fn delete_category(&self, id: CategoryId, delete_tasks: bool) -> Result<Vec<TaskId>> {
        if id == CategoryId::DEFAULT {
            return Err(TaskError::Validation(
                "the default category cannot be deleted".to_string(),
            ));
        }

        let mut db = self.db();
        let tx = db.transaction()?;
        let exists = tx
            .query_row("SELECT 1 FROM categories WHERE id = ?1", [id.get()], |_| {
                Ok(())
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(TaskError::CategoryNotFound(id.to_string()));
        }

        let deleted = if delete_tasks {
            let ids = {
                let mut stmt = tx.prepare("SELECT id FROM tasks WHERE category_id = ?1")?;
                let ids = stmt
                    .query_map([id.get()], |row| row.get::<_, i64>(0).map(TaskId))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            tx.execute("DELETE FROM tasks WHERE category_id = ?1", [id.get()])?;
            ids
        } else {
            tx.execute(
                "UPDATE tasks SET category_id = ?1 WHERE category_id = ?2",
                params![CategoryId::DEFAULT.get(), id.get()],
            )?;
            Vec::new()
        };
        tx.execute("DELETE FROM categories WHERE id = ?1", [id.get()])?;
        tx.commit()?;

        info!(category_id = %id, deleted_tasks = deleted.len(), "category deleted");
        Ok(deleted)
    }

    /// All categories with the number of tasks in each.
    pub fn list_categories(&self) -> Result<Vec<CategorySummary>> {
        let db = self.db();
        let mut stmt = db.prepare(
            "SELECT c.id, c.name, COUNT(t.id)
             FROM categories c
             LEFT JOIN tasks t ON c.id = t.category_id
             GROUP BY c.id, c.name
             ORDER BY c.id",
        )?;
        let categories = stmt
            .query_map([], |row| {
                Ok(CategorySummary {
                    id: CategoryId(row.get(0)?),
                    name: row.get(1)?,
                    task_count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn category_with_tasks(&self, id: CategoryId) -> Result<CategoryWithTasks> {
        let db = self.db();
        let name: String = db
            .query_row(
                "SELECT name FROM categories WHERE id = ?1",
                [id.get()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| TaskError::CategoryNotFound(id.to_string()))?;
        let tasks = query_tasks(
            &db,
            &format!("{TASK_SELECT} WHERE t.category_id = ?1 ORDER BY t.due_date"),
            [id.get()],
        )?;
        Ok(CategoryWithTasks { id, name, tasks })
    }

    // --- statuses ----------------------------------------------------------

    pub fn list_statuses(&self) -> Result<Vec<String>> {
        let db = self.db();
        let mut stmt = db.prepare("SELECT name FROM statuses ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    // --- tasks -------------------------------------------------------------

    pub fn add_task(&self, task: &NewTask) -> Result<TaskId> {
        let db = self.db();
        let status_id = match &task.status {
            Some(name) => status_id_by_name(&db, name)?
                .ok_or_else(|| TaskError::StatusNotFound(name.clone()))?,
            None => db.query_row("SELECT id FROM statuses ORDER BY id LIMIT 1", [], |row| {
                row.get(0)
            })?,
        };
        let category_id = match &task.category {
            Some(name) => category_id_by_name(&db, name)?
                .ok_or_else(|| TaskError::CategoryNotFound(name.clone()))?,
            None => CategoryId::DEFAULT,
        };
        let created = format_datetime(Local::now().naive_local());

        db.execute(
            "INSERT INTO tasks
             (name, description, creation_date, due_date, priority, status_id, category_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.name,
                task.description,
                created,
                format_datetime(task.due_date),
                task.priority,
                status_id,
                category_id.get(),
            ],
        )?;
        let id = TaskId(db.last_insert_rowid());
        info!(task_id = %id, name = %task.name, due = %task.due_date, "task added");
        Ok(id)
    }

    pub fn get_task(&self, id: TaskId) -> Result<Task> {
        let db = self.db();
        query_tasks(&db, &format!("{TASK_SELECT} WHERE t.id = ?1"), [id.get()])?
            .into_iter()
            .next()
            .ok_or(TaskError::TaskNotFound { id: id.get() })
    }

    /// Tasks due on `date`, highest priority first.
    pub fn tasks_due_on(&self, date: NaiveDate, include_completed: bool) -> Result<Vec<Task>> {
        let db = self.db();
        query_tasks(
            &db,
            &format!(
                "{TASK_SELECT}
                 WHERE t.due_date LIKE ?1 AND (?2 OR s.name != ?3)
                 ORDER BY t.priority DESC, t.due_date"
            ),
            params![
                format!("{}%", date.format(DATE_FORMAT)),
                include_completed,
                STATUS_COMPLETED
            ],
        )
    }

    /// Every task ordered by due date.
    pub fn list_tasks(&self, include_completed: bool) -> Result<Vec<Task>> {
        let db = self.db();
        query_tasks(
            &db,
            &format!("{TASK_SELECT} WHERE (?1 OR s.name != ?2) ORDER BY t.due_date"),
            params![include_completed, STATUS_COMPLETED],
        )
    }

    /// Apply the fields set in `update`. Unknown status or category names
    /// leave that column unchanged.
    pub fn update_task(&self, id: TaskId, update: &TaskUpdate) -> Result<()> {
        let db = self.db();
        if !task_exists(&db, id)? {
            return Err(TaskError::TaskNotFound { id: id.get() });
        }

        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(name) = &update.name {
            columns.push("name");
            values.push(Box::new(name.clone()));
        }
        if let Some(description) = &update.description {
            columns.push("description");
            values.push(Box::new(description.clone()));
        }
        if let Some(due) = update.due_date {
            columns.push("due_date");
            values.push(Box::new(format_datetime(due)));
        }
        if let Some(priority) = update.priority {
            columns.push("priority");
            values.push(Box::new(priority));
        }
        if let Some(status) = &update.status {
            match status_id_by_name(&db, status)? {
                Some(status_id) => {
                    columns.push("status_id");
                    values.push(Box::new(status_id));
                }
                None => debug!(task_id = %id, %status, "unknown status ignored"),
            }
        }
        if let Some(category) = &update.category {
            match category_id_by_name(&db, category)? {
                Some(category_id) => {
                    columns.push("category_id");
                    values.push(Box::new(category_id.get()));
                }
                None => debug!(task_id = %id, %category, "unknown category ignored"),
            }
        }
        if columns.is_empty() {
            return Ok(());
        }

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(Box::new(id.get()));
        let sql = format!("UPDATE tasks SET {assignments} WHERE id = ?{}", values.len());
        db.execute(&sql, params_from_iter(values.iter()))?;
        info!(task_id = %id, fields = %columns.join(","), "task updated");
        Ok(())
    }

    pub fn set_status(&self, id: TaskId, status: &str) -> Result<()> {
        let db = self.db();
        let status_id = status_id_by_name(&db, status)?
            .ok_or_else(|| TaskError::StatusNotFound(status.to_string()))?;
        let n = db.execute(
            "UPDATE tasks SET status_id = ?1 WHERE id = ?2",
            params![status_id, id.get()],
        )?;
        if n == 0 {
            return Err(TaskError::TaskNotFound { id: id.get() });
        }
        info!(task_id = %id, %status, "task status changed");
        Ok(())
    }

    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        let n = self
            .db()
            .execute("DELETE FROM tasks WHERE id = ?1", [id.get()])?;
        if n == 0 {
            return Err(TaskError::TaskNotFound { id: id.get() });
        }
        info!(task_id = %id, "task deleted");
        Ok(())
    }
}

// --- private helpers -------------------------------------------------------

fn validate_category_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TaskError::Validation(
            "category name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

fn unique_to(e: rusqlite::Error, on_unique: impl FnOnce() -> TaskError) -> TaskError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            on_unique()
        }
        _ => TaskError::Database(e),
    }
}

fn category_id_by_name(db: &Connection, name: &str) -> Result<Option<CategoryId>> {
    Ok(db
        .query_row("SELECT id FROM categories WHERE name = ?1", [name], |row| {
            row.get(0).map(CategoryId)
        })
        .optional()?)
}

fn status_id_by_name(db: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(db
        .query_row("SELECT id FROM statuses WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?)
}

fn task_exists(db: &Connection, id: TaskId) -> Result<bool> {
    Ok(db
        .query_row("SELECT 1 FROM tasks WHERE id = ?1", [id.get()], |_| Ok(()))
        .optional()?
        .is_some())
}

fn query_tasks<P: Params>(db: &Connection, sql: &str, params: P) -> Result<Vec<Task>> {
    let mut stmt = db.prepare(sql)?;
    let tasks = stmt
        .query_map(params, task_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

// Columns follow TASK_SELECT.
fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: datetime_column(row, 3)?,
        due_date: datetime_column(row, 4)?,
        priority: row.get(5)?,
        status: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        category: row.get(7)?,
    })
}

fn datetime_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}
