//! Scheduled action model shared by reminders, texts, birthday texts and
//! gift reminders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Concrete kind of a scheduled action. Each kind lives in its own table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Free-form reminder, optionally tied to a profile.
    Reminder,
    /// A text message the user wants to send at a given time.
    ScheduledText,
    /// Yearly birthday text derived from a profile's birthday.
    BirthdayText,
    /// Reminder to buy a gift some days before a profile's birthday.
    GiftReminder,
}

impl ActionKind {
    /// Every kind, in table bootstrap order.
    pub const ALL: [Self; 4] = [
        Self::Reminder,
        Self::ScheduledText,
        Self::BirthdayText,
        Self::GiftReminder,
    ];

    /// Name of the table that stores this kind.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::ScheduledText => "scheduled_text",
            Self::BirthdayText => "birthday_text",
            Self::GiftReminder => "gift_reminder",
        }
    }

    /// Stable string form, used in notification data.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.table()
    }

    /// Parse the stable string form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` for an unknown kind.
    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::MalformedInput(format!("unknown action kind: {s}")))
    }

    /// Status written by an explicit user "done" action.
    #[must_use]
    pub fn completion_status(self) -> ActionStatus {
        match self {
            Self::Reminder | Self::GiftReminder => ActionStatus::Completed,
            Self::ScheduledText | Self::BirthdayText => ActionStatus::Sent,
        }
    }

    /// Statuses a row of this kind may hold.
    #[must_use]
    pub fn statuses(self) -> [ActionStatus; 5] {
        [
            ActionStatus::Unscheduled,
            ActionStatus::Pending,
            ActionStatus::Fired,
            self.completion_status(),
            ActionStatus::Cancelled,
        ]
    }

    /// Whether the fire time is derived from a profile's birthday.
    #[must_use]
    pub fn is_yearly(self) -> bool {
        matches!(self, Self::BirthdayText | Self::GiftReminder)
    }

    /// Whether `payload` has the shape this kind carries.
    #[must_use]
    pub fn accepts(self, payload: &ActionPayload) -> bool {
        matches!(
            (self, payload),
            (Self::Reminder | Self::GiftReminder, ActionPayload::Notice { .. })
                | (Self::ScheduledText | Self::BirthdayText, ActionPayload::Text { .. })
        )
    }

    /// Fail with `MalformedInput` unless [`accepts`](Self::accepts) holds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` on a kind/payload mismatch.
    pub fn ensure_accepts(self, payload: &ActionPayload) -> Result<()> {
        if self.accepts(payload) {
            Ok(())
        } else {
            Err(AppError::MalformedInput(format!(
                "{} does not carry a {} payload",
                self.as_str(),
                payload.shape()
            )))
        }
    }
}

/// Lifecycle status for a scheduled action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Persisted but not registered with the gateway.
    Unscheduled,
    /// Registered with the gateway, waiting to fire.
    Pending,
    /// The notification fired.
    Fired,
    /// User marked the reminder done.
    Completed,
    /// User marked the text as sent.
    Sent,
    /// User cancelled or disabled the action.
    Cancelled,
}

impl ActionStatus {
    /// Database string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unscheduled => "unscheduled",
            Self::Pending => "pending",
            Self::Fired => "fired",
            Self::Completed => "completed",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the database string form.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` for an unknown status string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "unscheduled" => Ok(Self::Unscheduled),
            "pending" => Ok(Self::Pending),
            "fired" => Ok(Self::Fired),
            "completed" => Ok(Self::Completed),
            "sent" => Ok(Self::Sent),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::Db(format!("invalid action status: {other}"))),
        }
    }

    /// Whether the action still expects to notify the user.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Unscheduled | Self::Pending)
    }
}

/// Kind-specific content of a scheduled action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Title and body shown in the notification.
    Notice {
        /// Notification title.
        title: String,
        /// Notification body.
        body: String,
    },
    /// Text message the user will send when the notification fires.
    Text {
        /// Recipient phone number.
        phone_number: String,
        /// Message to send.
        message: String,
    },
}

impl ActionPayload {
    fn shape(&self) -> &'static str {
        match self {
            Self::Notice { .. } => "notice",
            Self::Text { .. } => "text",
        }
    }
}

/// A persisted reminder, scheduled text, birthday text or gift reminder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledAction {
    /// Store-assigned record identifier.
    pub id: i64,
    /// Table the record lives in.
    pub kind: ActionKind,
    /// Profile this action belongs to, if any.
    pub owner_profile_id: Option<i64>,
    /// Instant at which the user is notified.
    pub fire_at: DateTime<Utc>,
    /// Gateway handle; `None` when not registered with the gateway.
    pub notification_id: Option<String>,
    /// Kind-specific content.
    pub payload: ActionPayload,
    /// Current lifecycle status.
    pub status: ActionStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to insert a new scheduled action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAction {
    /// Table to insert into.
    pub kind: ActionKind,
    /// Owning profile, if any.
    pub owner_profile_id: Option<i64>,
    /// Requested fire time.
    pub fire_at: DateTime<Utc>,
    /// Kind-specific content.
    pub payload: ActionPayload,
}
