//! Scheduled action repository for `SQLite` persistence.
//!
//! Every method takes the [`ActionKind`] to pick the table; rows of all
//! kinds share one column layout.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::action::{ActionKind, ActionPayload, ActionStatus, NewAction, ScheduledAction};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for scheduled action records.
#[derive(Clone)]
pub struct ActionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    owner_profile_id: Option<i64>,
    fire_at: String,
    notification_id: Option<String>,
    status: String,
    payload: String,
    created_at: String,
    updated_at: String,
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

impl ActionRow {
    /// Convert a database row into the domain model.
    fn into_action(self, kind: ActionKind) -> Result<ScheduledAction> {
        let payload: ActionPayload = serde_json::from_str(&self.payload)
            .map_err(|e| AppError::Db(format!("invalid payload: {e}")))?;

        Ok(ScheduledAction {
            id: self.id,
            kind,
            owner_profile_id: self.owner_profile_id,
            fire_at: parse_timestamp("fire_at", &self.fire_at)?,
            notification_id: self.notification_id,
            payload,
            status: ActionStatus::parse(&self.status)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn encode_payload(payload: &ActionPayload) -> Result<String> {
    serde_json::to_string(payload).map_err(|e| AppError::Db(format!("serialize payload: {e}")))
}

fn into_actions(kind: ActionKind, rows: Vec<ActionRow>) -> Result<Vec<ScheduledAction>> {
    rows.into_iter().map(|row| row.into_action(kind)).collect()
}

impl ActionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new action with status `unscheduled` and no notification id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, action: &NewAction) -> Result<ScheduledAction> {
        let now = Utc::now().to_rfc3339();
        let payload = encode_payload(&action.payload)?;
        let query = format!(
            "INSERT INTO {} (owner_profile_id, fire_at, notification_id, status, payload, \
             created_at, updated_at) VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?5)",
            action.kind.table()
        );

        let id = sqlx::query(&query)
            .bind(action.owner_profile_id)
            .bind(action.fire_at.to_rfc3339())
            .bind(ActionStatus::Unscheduled.as_str())
            .bind(&payload)
            .bind(&now)
            .execute(self.db.as_ref())
            .await?
            .last_insert_rowid();

        self.get_by_id(action.kind, id)
            .await?
            .ok_or_else(|| {
                AppError::Db(format!("{} {id} vanished after insert", action.kind.table()))
            })
    }

    /// Retrieve an action by its ID.
    ///
    /// Returns `Ok(None)` if the action does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, kind: ActionKind, id: i64) -> Result<Option<ScheduledAction>> {
        let query = format!("SELECT * FROM {} WHERE id = ?1", kind.table());
        let row: Option<ActionRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(|r| r.into_action(kind)).transpose()
    }

    /// Retrieve an action by ID, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the action does not exist, or
    /// `AppError::Db` if the query fails.
    pub async fn require(&self, kind: ActionKind, id: i64) -> Result<ScheduledAction> {
        self.get_by_id(kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id} not found", kind.table())))
    }

    /// Most recent action of `kind` owned by `profile_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_for_profile(
        &self,
        kind: ActionKind,
        profile_id: i64,
    ) -> Result<Option<ScheduledAction>> {
        let query = format!(
            "SELECT * FROM {} WHERE owner_profile_id = ?1 ORDER BY id DESC LIMIT 1",
            kind.table()
        );
        let row: Option<ActionRow> = sqlx::query_as(&query)
            .bind(profile_id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(|r| r.into_action(kind)).transpose()
    }

    /// All actions of `kind` owned by `profile_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_profile(
        &self,
        kind: ActionKind,
        profile_id: i64,
    ) -> Result<Vec<ScheduledAction>> {
        let query = format!(
            "SELECT * FROM {} WHERE owner_profile_id = ?1 ORDER BY id",
            kind.table()
        );
        let rows: Vec<ActionRow> = sqlx::query_as(&query)
            .bind(profile_id)
            .fetch_all(self.db.as_ref())
            .await?;

        into_actions(kind, rows)
    }

    /// All actions of `kind` in `status`, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_status(
        &self,
        kind: ActionKind,
        status: ActionStatus,
    ) -> Result<Vec<ScheduledAction>> {
        let query = format!(
            "SELECT * FROM {} WHERE status = ?1 ORDER BY fire_at, id",
            kind.table()
        );
        let rows: Vec<ActionRow> = sqlx::query_as(&query)
            .bind(status.as_str())
            .fetch_all(self.db.as_ref())
            .await?;

        into_actions(kind, rows)
    }

    /// Overwrite the fire time and payload of an action.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_schedule(
        &self,
        kind: ActionKind,
        id: i64,
        fire_at: DateTime<Utc>,
        payload: &ActionPayload,
    ) -> Result<()> {
        let payload = encode_payload(payload)?;
        let query = format!(
            "UPDATE {} SET fire_at = ?1, payload = ?2, updated_at = ?3 WHERE id = ?4",
            kind.table()
        );
        sqlx::query(&query)
            .bind(fire_at.to_rfc3339())
            .bind(&payload)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Update the status of an action.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_status(
        &self,
        kind: ActionKind,
        id: i64,
        status: ActionStatus,
    ) -> Result<()> {
        let query = format!(
            "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
            kind.table()
        );
        sqlx::query(&query)
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Record a gateway handle and mark the action `pending`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn set_notification(
        &self,
        kind: ActionKind,
        id: i64,
        notification_id: &str,
    ) -> Result<()> {
        let query = format!(
            "UPDATE {} SET notification_id = ?1, status = 'pending', updated_at = ?2 WHERE id = ?3",
            kind.table()
        );
        sqlx::query(&query)
            .bind(notification_id)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Drop the gateway handle. A `pending` action becomes `unscheduled`;
    /// other statuses are kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn clear_notification(&self, kind: ActionKind, id: i64) -> Result<()> {
        let query = format!(
            "UPDATE {} SET notification_id = NULL, \
             status = CASE WHEN status = 'pending' THEN 'unscheduled' ELSE status END, \
             updated_at = ?1 WHERE id = ?2",
            kind.table()
        );
        sqlx::query(&query)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Delete an action row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, kind: ActionKind, id: i64) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE id = ?1", kind.table());
        sqlx::query(&query)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
