//! Scheduling orchestration: validate, persist, register with the gateway,
//! record the handle, and supersede on edit, snooze and delete.
//!
//! Per action the lifecycle is `unscheduled -> pending -> {fired | cancelled
//! | completed | sent}`. A reschedule passes briefly through `unscheduled`:
//! the old handle is withdrawn before a new one is registered, so at most one
//! notification per action is ever live at the gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::config::GlobalConfig;
use crate::gateway::{NotificationData, NotificationEvent, NotificationGateway, NotificationRequest};
use crate::models::action::{ActionKind, ActionPayload, ActionStatus, NewAction, ScheduledAction};
use crate::persistence::action_repo::ActionRepo;
use crate::persistence::db::Database;
use crate::persistence::registry::ScheduleRegistry;
use crate::time::builder::ensure_future;
use crate::time::clock::Clock;
use crate::Result;

/// Runtime knobs for fire-time computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingPolicy {
    /// Timezone treated as the user's local time.
    pub timezone: Tz,
    /// Minimum distance between now and an accepted fire time.
    pub min_lead: Duration,
    /// Local hour at which yearly events fire.
    pub yearly_fire_hour: u32,
    /// Days before a birthday that a gift reminder fires.
    pub gift_lead_days: u64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            min_lead: Duration::from_secs(5),
            yearly_fire_hour: 9,
            gift_lead_days: 21,
        }
    }
}

impl From<&GlobalConfig> for SchedulingPolicy {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            timezone: config.timezone,
            min_lead: config.min_lead(),
            yearly_fire_hour: config.scheduling.yearly_fire_hour,
            gift_lead_days: config.scheduling.gift_lead_days,
        }
    }
}

/// A request to notify the user at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleIntent {
    /// Kind of action to schedule.
    pub kind: ActionKind,
    /// Kind-specific content.
    pub payload: ActionPayload,
    /// Requested fire time.
    pub fire_at: DateTime<Utc>,
    /// Owning profile for new records.
    pub owner_profile_id: Option<i64>,
    /// Existing record to (re)schedule instead of inserting a new one.
    pub action_id: Option<i64>,
}

impl ScheduleIntent {
    /// Intent for a new, unowned record.
    #[must_use]
    pub fn new(kind: ActionKind, payload: ActionPayload, fire_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload,
            fire_at,
            owner_profile_id: None,
            action_id: None,
        }
    }

    /// Tie the new record to a profile.
    #[must_use]
    pub fn owned_by(mut self, profile_id: i64) -> Self {
        self.owner_profile_id = Some(profile_id);
        self
    }

    /// Reuse an already persisted record, e.g. to retry after a gateway failure.
    #[must_use]
    pub fn for_existing(mut self, action_id: i64) -> Self {
        self.action_id = Some(action_id);
        self
    }
}

/// Identifiers of a successfully scheduled action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    /// Store-assigned record id.
    pub action_id: i64,
    /// Gateway handle now live for the record.
    pub notification_id: String,
}

/// Result of handling a gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The action was marked `fired`.
    Fired {
        /// Record that fired.
        action_id: i64,
        /// Its kind.
        kind: ActionKind,
        /// Owning profile, if any.
        owner_profile_id: Option<i64>,
    },
    /// The event referred to a deleted record or a superseded handle.
    Ignored,
}

/// Counts from [`SchedulingService::resync_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    /// Pending actions registered again with the gateway.
    pub rearmed: usize,
    /// Pending actions whose time passed and were marked `fired`.
    pub missed: usize,
    /// Pending actions that could not be registered; left `unscheduled`.
    pub failed: usize,
}

/// Orchestrates the scheduling lifecycle of every action kind.
pub struct SchedulingService {
    repo: ActionRepo,
    registry: ScheduleRegistry,
    gateway: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicy,
}

impl SchedulingService {
    /// Build a service over an explicit store, gateway and clock.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn NotificationGateway>,
        clock: Arc<dyn Clock>,
        policy: SchedulingPolicy,
    ) -> Self {
        let repo = ActionRepo::new(db);
        Self {
            registry: ScheduleRegistry::new(repo.clone()),
            repo,
            gateway,
            clock,
            policy,
        }
    }

    /// Active policy.
    #[must_use]
    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Current instant according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Earliest instant a new notification may fire at.
    pub(crate) fn earliest_fire_at(&self) -> DateTime<Utc> {
        let lead =
            chrono::Duration::from_std(self.policy.min_lead).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(lead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub(crate) fn repo(&self) -> &ActionRepo {
        &self.repo
    }

    /// Load an action.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if it does not exist.
    pub async fn get(&self, kind: ActionKind, action_id: i64) -> Result<ScheduledAction> {
        self.repo.require(kind, action_id).await
    }

    /// Actions of `kind` currently waiting to fire, soonest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_pending(&self, kind: ActionKind) -> Result<Vec<ScheduledAction>> {
        self.repo.list_by_status(kind, ActionStatus::Pending).await
    }

    /// Validate the intent, persist the record if new, register it with the
    /// gateway and record the handle.
    ///
    /// Validation happens before any side effect. If the gateway fails the
    /// record stays `unscheduled` and the same call can be retried with
    /// [`ScheduleIntent::for_existing`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` on a kind/payload mismatch,
    /// `AppError::PastOrTooSoon` if the fire time is inside the lead time,
    /// `AppError::Gateway` or `AppError::Db` from the collaborators.
    pub async fn schedule(&self, intent: ScheduleIntent) -> Result<Scheduled> {
        if let Some(action_id) = intent.action_id {
            return self
                .reschedule(intent.kind, action_id, intent.fire_at, Some(intent.payload))
                .await;
        }

        intent.kind.ensure_accepts(&intent.payload)?;
        ensure_future(intent.fire_at, self.clock.now(), self.policy.min_lead)?;

        let action = self
            .repo
            .create(&NewAction {
                kind: intent.kind,
                owner_profile_id: intent.owner_profile_id,
                fire_at: intent.fire_at,
                payload: intent.payload,
            })
            .await?;
        debug!(action_id = action.id, kind = action.kind.as_str(), "action persisted");

        self.arm(&action).await
    }

    /// Move an action to a new fire time (and optionally new content).
    ///
    /// The stored fire time and payload are updated first, then the old
    /// handle is withdrawn, then a new one is registered. A failure after the
    /// withdrawal leaves the record `unscheduled` with the new fire time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PastOrTooSoon`, `AppError::MalformedInput`,
    /// `AppError::NotFound`, `AppError::Gateway` or `AppError::Db`.
    pub async fn reschedule(
        &self,
        kind: ActionKind,
        action_id: i64,
        fire_at: DateTime<Utc>,
        payload: Option<ActionPayload>,
    ) -> Result<Scheduled> {
        ensure_future(fire_at, self.clock.now(), self.policy.min_lead)?;
        if let Some(payload) = &payload {
            kind.ensure_accepts(payload)?;
        }

        let existing = self.repo.require(kind, action_id).await?;
        let payload = payload.unwrap_or(existing.payload);
        self.repo
            .update_schedule(kind, action_id, fire_at, &payload)
            .await?;

        let previous = self.registry.get(action_id, kind).await?;
        self.withdraw(kind, action_id, previous.as_deref()).await?;
        if !existing.status.is_open() {
            self.repo
                .update_status(kind, action_id, ActionStatus::Unscheduled)
                .await?;
        }

        let action = self.repo.require(kind, action_id).await?;
        self.arm(&action).await
    }

    /// Push an action to a later time keeping its content.
    ///
    /// # Errors
    ///
    /// See [`reschedule`](Self::reschedule).
    pub async fn snooze(
        &self,
        kind: ActionKind,
        action_id: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<Scheduled> {
        info!(action_id, kind = kind.as_str(), "snoozing action");
        self.reschedule(kind, action_id, fire_at, None).await
    }

    /// Withdraw the action's notification and mark it `cancelled`.
    ///
    /// Gateway failures are logged and ignored. Calling this on an action
    /// that is already cancelled, fired or done only clears the handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the action does not exist, or
    /// `AppError::Db` if the store fails.
    pub async fn cancel(&self, kind: ActionKind, action_id: i64) -> Result<()> {
        let action = self.repo.require(kind, action_id).await?;
        self.withdraw(kind, action_id, action.notification_id.as_deref())
            .await?;
        if action.status.is_open() {
            self.repo
                .update_status(kind, action_id, ActionStatus::Cancelled)
                .await?;
        }
        info!(action_id, kind = kind.as_str(), "action cancelled");
        Ok(())
    }

    /// Withdraw the action's notification and mark it done (`completed` for
    /// reminders, `sent` for texts).
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the action does not exist, or
    /// `AppError::Db` if the store fails.
    pub async fn complete(&self, kind: ActionKind, action_id: i64) -> Result<()> {
        let action = self.repo.require(kind, action_id).await?;
        self.withdraw(kind, action_id, action.notification_id.as_deref())
            .await?;
        let status = kind.completion_status();
        self.repo.update_status(kind, action_id, status).await?;
        info!(action_id, kind = kind.as_str(), status = status.as_str(), "action completed");
        Ok(())
    }

    /// Withdraw the action's notification and delete its row. Deleting a
    /// missing action is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn delete(&self, kind: ActionKind, action_id: i64) -> Result<()> {
        let Some(action) = self.repo.get_by_id(kind, action_id).await? else {
            debug!(action_id, kind = kind.as_str(), "delete of missing action");
            return Ok(());
        };
        self.withdraw(kind, action_id, action.notification_id.as_deref())
            .await?;
        self.repo.delete(kind, action_id).await?;
        info!(action_id, kind = kind.as_str(), "action deleted");
        Ok(())
    }

    /// Delete every action of every kind owned by `profile_id`, withdrawing
    /// each notification first. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store fails.
    pub async fn delete_for_profile(&self, profile_id: i64) -> Result<usize> {
        let mut removed = 0;
        for kind in ActionKind::ALL {
            for action in self.repo.list_for_profile(kind, profile_id).await? {
                self.withdraw(kind, action.id, action.notification_id.as_deref())
                    .await?;
                self.repo.delete(kind, action.id).await?;
                removed += 1;
            }
        }
        info!(profile_id, removed, "profile actions deleted");
        Ok(removed)
    }

    /// Apply a gateway callback: mark the owning action `fired` and clear its
    /// handle. Events for deleted actions or superseded handles are ignored.
    ///
    /// Birthday texts and gift reminders stay `fired` (disabled) until the
    /// owner re-enables them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` if the event data cannot be routed,
    /// or `AppError::Db` if the store fails.
    pub async fn handle_event(&self, event: &NotificationEvent) -> Result<FireOutcome> {
        let data = NotificationData::from_value(event.data())?;
        let notification_id = event.notification_id();

        let Some(action) = self.repo.get_by_id(data.kind, data.action_id).await? else {
            debug!(
                action_id = data.action_id,
                kind = data.kind.as_str(),
                "event for missing action"
            );
            return Ok(FireOutcome::Ignored);
        };
        if action.notification_id.as_deref() != Some(notification_id) {
            debug!(
                action_id = action.id,
                kind = action.kind.as_str(),
                notification_id,
                "event for superseded notification"
            );
            return Ok(FireOutcome::Ignored);
        }

        self.registry.clear(action.id, action.kind).await?;
        self.repo
            .update_status(action.kind, action.id, ActionStatus::Fired)
            .await?;
        info!(
            action_id = action.id,
            kind = action.kind.as_str(),
            notification_id,
            tapped = matches!(event, NotificationEvent::Tapped { .. }),
            "action fired"
        );

        Ok(FireOutcome::Fired {
            action_id: action.id,
            kind: action.kind,
            owner_profile_id: action.owner_profile_id,
        })
    }

    /// Re-register every `pending` action with the gateway, for gateways
    /// whose registrations do not outlive the process.
    ///
    /// Actions still far enough in the future get a fresh handle; actions
    /// whose time passed while nothing was listening are marked `fired`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if listing or updating rows fails. Gateway
    /// failures are counted in [`ResyncReport::failed`].
    pub async fn resync_pending(&self) -> Result<ResyncReport> {
        let mut report = ResyncReport::default();
        let now = self.clock.now();

        for kind in ActionKind::ALL {
            for action in self.repo.list_by_status(kind, ActionStatus::Pending).await? {
                self.withdraw(kind, action.id, action.notification_id.as_deref())
                    .await?;

                if ensure_future(action.fire_at, now, self.policy.min_lead).is_err() {
                    self.repo
                        .update_status(kind, action.id, ActionStatus::Fired)
                        .await?;
                    warn!(
                        action_id = action.id,
                        kind = kind.as_str(),
                        fire_at = %action.fire_at.to_rfc3339(),
                        "fire time passed while offline; marked fired"
                    );
                    report.missed += 1;
                    continue;
                }

                match self.arm(&action).await {
                    Ok(_) => report.rearmed += 1,
                    Err(err) => {
                        warn!(action_id = action.id, kind = kind.as_str(), %err, "resync failed");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            rearmed = report.rearmed,
            missed = report.missed,
            failed = report.failed,
            "pending actions resynced"
        );
        Ok(report)
    }

    /// Register `action` with the gateway and record the handle.
    async fn arm(&self, action: &ScheduledAction) -> Result<Scheduled> {
        let request = NotificationRequest::for_action(action);
        let notification_id = match self.gateway.schedule(action.fire_at, request).await {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    action_id = action.id,
                    kind = action.kind.as_str(),
                    %err,
                    "gateway schedule failed; action left unscheduled"
                );
                return Err(err);
            }
        };

        if let Err(err) = self
            .registry
            .save(action.id, action.kind, &notification_id)
            .await
        {
            error!(
                action_id = action.id,
                kind = action.kind.as_str(),
                %notification_id,
                %err,
                "notification registered but not recorded"
            );
            return Err(err);
        }

        info!(
            action_id = action.id,
            kind = action.kind.as_str(),
            %notification_id,
            fire_at = %action.fire_at.to_rfc3339(),
            "action scheduled"
        );
        Ok(Scheduled {
            action_id: action.id,
            notification_id,
        })
    }

    /// Best-effort gateway cancel followed by an awaited registry clear.
    async fn withdraw(
        &self,
        kind: ActionKind,
        action_id: i64,
        notification_id: Option<&str>,
    ) -> Result<()> {
        if let Some(notification_id) = notification_id {
            if let Err(err) = self.gateway.cancel(notification_id).await {
                warn!(
                    action_id,
                    kind = kind.as_str(),
                    notification_id,
                    %err,
                    "gateway cancel failed; ignoring"
                );
            }
        }
        self.registry.clear(action_id, kind).await
    }
}
