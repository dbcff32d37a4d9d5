//! Durable mapping from a scheduled action to its gateway notification id.
//!
//! Each call is exactly one awaited write or read against the action table.

use crate::models::action::ActionKind;
use crate::Result;

use super::action_repo::ActionRepo;

/// Thin persistence facade over the `notification_id` column.
#[derive(Clone)]
pub struct ScheduleRegistry {
    repo: ActionRepo,
}

impl ScheduleRegistry {
    /// Create a registry over `repo`.
    #[must_use]
    pub fn new(repo: ActionRepo) -> Self {
        Self { repo }
    }

    /// Record `notification_id` as the live handle of the action; the action
    /// becomes `pending`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn save(
        &self,
        action_id: i64,
        kind: ActionKind,
        notification_id: &str,
    ) -> Result<()> {
        self.repo
            .set_notification(kind, action_id, notification_id)
            .await
    }

    /// Forget the live handle of the action.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn clear(&self, action_id: i64, kind: ActionKind) -> Result<()> {
        self.repo.clear_notification(kind, action_id).await
    }

    /// Current handle of the action; `None` if unscheduled or missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the read fails.
    pub async fn get(&self, action_id: i64, kind: ActionKind) -> Result<Option<String>> {
        Ok(self
            .repo
            .get_by_id(kind, action_id)
            .await?
            .and_then(|action| action.notification_id))
    }
}
