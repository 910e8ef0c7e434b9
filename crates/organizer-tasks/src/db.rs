use rusqlite::{Connection, Result};

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const STATUS_NEW: &str = "New";
pub const STATUS_IN_PROGRESS: &str = "In progress";
pub const STATUS_COMPLETED: &str = "Completed";

/// Initialise organizer tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_categories_table(conn)?;
    create_statuses_table(conn)?;
    create_tasks_table(conn)?;
    seed_defaults(conn)?;
    Ok(())
}

fn create_categories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL UNIQUE
        );",
    )
}

fn create_statuses_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS statuses (
            id      INTEGER PRIMARY KEY,
            name    TEXT NOT NULL UNIQUE
        );",
    )
}

/// Dates are local wall-clock text in `%Y-%m-%d %H:%M:%S`, so a day prefix
/// match (`LIKE '2026-10-18%'`) selects everything due that day.
fn create_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id              INTEGER PRIMARY KEY,
            name            TEXT NOT NULL,
            description     TEXT,
            creation_date   TEXT NOT NULL,
            due_date        TEXT NOT NULL,
            priority        INTEGER NOT NULL,
            status_id       INTEGER NOT NULL,
            category_id     INTEGER,
            FOREIGN KEY (status_id) REFERENCES statuses(id),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_due
            ON tasks(due_date);
        CREATE INDEX IF NOT EXISTS idx_tasks_category
            ON tasks(category_id);",
    )
}

/// Category 1 is the fallback for orphaned tasks; statuses keep fixed ids so
/// the order New → In progress → Completed is stable.
fn seed_defaults(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO categories (id, name) VALUES (1, ?1)",
        [DEFAULT_CATEGORY],
    )?;
    for (id, name) in [
        (1, STATUS_NEW),
        (2, STATUS_IN_PROGRESS),
        (3, STATUS_COMPLETED),
    ] {
        conn.execute(
            "INSERT OR IGNORE INTO statuses (id, name) VALUES (?1, ?2)",
            rusqlite::params![id, name],
        )?;
    }
    Ok(())
}
