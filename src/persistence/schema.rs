//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so this is safe
//! to re-run on every startup.

use sqlx::SqlitePool;

use crate::models::action::ActionKind;
use crate::Result;

/// DDL for one action table. Table and status names come from
/// [`ActionKind`], never from user input.
fn action_table_ddl(kind: ActionKind) -> String {
    let table = kind.table();
    let statuses = kind
        .statuses()
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "
CREATE TABLE IF NOT EXISTS {table} (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_profile_id  INTEGER,
    fire_at           TEXT NOT NULL,
    notification_id   TEXT,
    status            TEXT NOT NULL CHECK(status IN ({statuses})),
    payload           TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table}(owner_profile_id);
CREATE INDEX IF NOT EXISTS idx_{table}_notification ON {table}(notification_id);
"
    )
}

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates one table per action kind idempotently.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl: String = ActionKind::ALL.into_iter().map(action_table_ddl).collect();
    sqlx::raw_sql(&ddl).execute(pool).await?;
    Ok(())
}
