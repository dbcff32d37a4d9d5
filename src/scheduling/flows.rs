//! Kind-specific entry points built on the scheduling primitives.

use chrono::{DateTime, Utc};
use tracing::info;

use super::service::{ScheduleIntent, Scheduled, SchedulingService};
use crate::models::action::{ActionKind, ActionPayload};
use crate::models::profile::{Birthday, Profile};
use crate::time::builder::build_from_components;
use crate::time::recurrence::{next_lead_occurrence, next_yearly_occurrence};
use crate::{AppError, Result};

impl SchedulingService {
    /// Remind the user about something at `fire_at`.
    ///
    /// # Errors
    ///
    /// See [`SchedulingService::schedule`].
    pub async fn schedule_reminder(
        &self,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
        owner_profile_id: Option<i64>,
    ) -> Result<Scheduled> {
        let payload = ActionPayload::Notice {
            title: title.to_owned(),
            body: body.to_owned(),
        };
        let mut intent = ScheduleIntent::new(ActionKind::Reminder, payload, fire_at);
        intent.owner_profile_id = owner_profile_id;
        self.schedule(intent).await
    }

    /// Remind the user about something at a local `"YYYY-MM-DD"`, `"hh:mm"`,
    /// `"AM"`/`"PM"` reading.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` before any side effect if the
    /// components do not parse; otherwise see [`SchedulingService::schedule`].
    pub async fn schedule_reminder_at(
        &self,
        date: &str,
        time: &str,
        ampm: &str,
        title: &str,
        body: &str,
    ) -> Result<Scheduled> {
        let fire_at = build_from_components(&self.policy().timezone, date, time, ampm)?;
        self.schedule_reminder(title, body, fire_at, None).await
    }

    /// Remind the user to text `phone_number` with `message` at `fire_at`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` for an empty phone number;
    /// otherwise see [`SchedulingService::schedule`].
    pub async fn schedule_text(
        &self,
        phone_number: &str,
        message: &str,
        fire_at: DateTime<Utc>,
        owner_profile_id: Option<i64>,
    ) -> Result<Scheduled> {
        if phone_number.trim().is_empty() {
            return Err(AppError::MalformedInput("phone number is empty".into()));
        }
        let payload = ActionPayload::Text {
            phone_number: phone_number.to_owned(),
            message: message.to_owned(),
        };
        let mut intent = ScheduleIntent::new(ActionKind::ScheduledText, payload, fire_at);
        intent.owner_profile_id = owner_profile_id;
        self.schedule(intent).await
    }

    /// Fire time of the next birthday text for `birthday`.
    ///
    /// # Errors
    ///
    /// Propagates recurrence errors.
    pub fn birthday_fire_at(&self, birthday: Birthday) -> Result<DateTime<Utc>> {
        let policy = self.policy();
        next_yearly_occurrence(
            &policy.timezone,
            birthday.month_day,
            policy.yearly_fire_hour,
            self.earliest_fire_at(),
        )
    }

    /// Fire time of the next gift reminder for `birthday`. When the lead
    /// date for the upcoming birthday is already too close, the following
    /// year's birthday is used.
    ///
    /// # Errors
    ///
    /// Propagates recurrence errors.
    pub fn gift_fire_at(&self, birthday: Birthday) -> Result<DateTime<Utc>> {
        let policy = self.policy();
        next_lead_occurrence(
            &policy.timezone,
            birthday.month_day,
            policy.yearly_fire_hour,
            policy.gift_lead_days,
            self.now(),
            self.earliest_fire_at(),
        )
    }

    /// Turn the profile's birthday text on or off.
    ///
    /// Enabling schedules (or re-schedules) the profile's single birthday
    /// text row for the next birthday; disabling cancels it. Returns the new
    /// identifiers when enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` when enabling for a profile without
    /// a birthday or phone number; otherwise see
    /// [`SchedulingService::schedule`] and [`SchedulingService::cancel`].
    pub async fn set_birthday_text(
        &self,
        profile: &Profile,
        message: &str,
        enabled: bool,
    ) -> Result<Option<Scheduled>> {
        let kind = ActionKind::BirthdayText;
        if !enabled {
            return self.disable_yearly(kind, profile.id).await.map(|()| None);
        }

        let birthday = require_birthday(profile)?;
        let phone_number = profile
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AppError::MalformedInput(format!("profile {} has no phone number", profile.id))
            })?;

        let fire_at = self.birthday_fire_at(birthday)?;
        let payload = ActionPayload::Text {
            phone_number: phone_number.to_owned(),
            message: message.to_owned(),
        };
        self.enable_yearly(kind, profile.id, payload, fire_at)
            .await
            .map(Some)
    }

    /// Turn the profile's gift reminder on or off.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` when enabling for a profile without
    /// a birthday; otherwise see [`SchedulingService::schedule`] and
    /// [`SchedulingService::cancel`].
    pub async fn set_gift_reminder(
        &self,
        profile: &Profile,
        enabled: bool,
    ) -> Result<Option<Scheduled>> {
        let kind = ActionKind::GiftReminder;
        if !enabled {
            return self.disable_yearly(kind, profile.id).await.map(|()| None);
        }

        let birthday = require_birthday(profile)?;
        let fire_at = self.gift_fire_at(birthday)?;
        let payload = ActionPayload::Notice {
            title: "Gift reminder".into(),
            body: format!(
                "{}'s birthday is in {} days",
                profile.name,
                self.policy().gift_lead_days
            ),
        };
        self.enable_yearly(kind, profile.id, payload, fire_at)
            .await
            .map(Some)
    }

    async fn enable_yearly(
        &self,
        kind: ActionKind,
        profile_id: i64,
        payload: ActionPayload,
        fire_at: DateTime<Utc>,
    ) -> Result<Scheduled> {
        let mut intent = ScheduleIntent::new(kind, payload, fire_at).owned_by(profile_id);
        if let Some(existing) = self.repo().find_for_profile(kind, profile_id).await? {
            intent = intent.for_existing(existing.id);
        }
        info!(
            profile_id,
            kind = kind.as_str(),
            fire_at = %fire_at.to_rfc3339(),
            "enabling yearly action"
        );
        self.schedule(intent).await
    }

    async fn disable_yearly(&self, kind: ActionKind, profile_id: i64) -> Result<()> {
        match self.repo().find_for_profile(kind, profile_id).await? {
            Some(existing) => self.cancel(kind, existing.id).await,
            None => Ok(()),
        }
    }
}

fn require_birthday(profile: &Profile) -> Result<Birthday> {
    profile
        .birthday
        .ok_or_else(|| AppError::MalformedInput(format!("profile {} has no birthday", profile.id)))
}
