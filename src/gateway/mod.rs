//! Notification delivery abstraction.
//!
//! The [`NotificationGateway`] trait decouples the scheduling core from the
//! platform that actually delivers notifications. The gateway hands back an
//! opaque id per scheduled notification and reports fires and taps as
//! [`NotificationEvent`]s on a channel created alongside the gateway.

pub mod local;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::action::{ActionKind, ActionPayload, ScheduledAction};
use crate::{AppError, Result};

/// Boxed future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the gateway shows when a notification fires.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    /// Notification title.
    pub title: Option<String>,
    /// Notification body.
    pub body: Option<String>,
    /// Opaque data handed back verbatim in [`NotificationEvent`]s.
    pub data: serde_json::Value,
}

impl NotificationRequest {
    /// Build the request for a persisted action. `data` carries the action's
    /// id and kind so fire events can be routed back to it.
    #[must_use]
    pub fn for_action(action: &ScheduledAction) -> Self {
        match &action.payload {
            ActionPayload::Notice { title, body } => Self {
                title: Some(title.clone()),
                body: Some(body.clone()),
                data: json!({
                    "action_id": action.id,
                    "kind": action.kind,
                }),
            },
            ActionPayload::Text {
                phone_number,
                message,
            } => Self {
                title: Some(format!("Time to text {phone_number}")),
                body: Some(message.clone()),
                data: json!({
                    "action_id": action.id,
                    "kind": action.kind,
                    "phone_number": phone_number,
                }),
            },
        }
    }
}

/// Routing fields extracted from a notification's `data`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationData {
    /// Owning action id.
    pub action_id: i64,
    /// Owning action kind.
    pub kind: ActionKind,
}

impl NotificationData {
    /// Decode routing fields from a notification `data` object.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MalformedInput` if `action_id` or `kind` is missing.
    pub fn from_value(data: &serde_json::Value) -> Result<Self> {
        Self::deserialize(data)
            .map_err(|err| AppError::MalformedInput(format!("notification data: {err}")))
    }
}

/// Callback events emitted by a gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// The notification fired at (or after) its trigger time.
    Delivered {
        /// Gateway handle of the notification.
        notification_id: String,
        /// Data passed at schedule time.
        data: serde_json::Value,
    },
    /// The user tapped a delivered notification.
    Tapped {
        /// Gateway handle of the notification.
        notification_id: String,
        /// Data passed at schedule time.
        data: serde_json::Value,
    },
}

impl NotificationEvent {
    /// Gateway handle the event refers to.
    #[must_use]
    pub fn notification_id(&self) -> &str {
        match self {
            Self::Delivered {
                notification_id, ..
            }
            | Self::Tapped {
                notification_id, ..
            } => notification_id,
        }
    }

    /// Data passed at schedule time.
    #[must_use]
    pub fn data(&self) -> &serde_json::Value {
        match self {
            Self::Delivered { data, .. } | Self::Tapped { data, .. } => data,
        }
    }
}

/// Platform notification delivery, treated as a black box.
pub trait NotificationGateway: Send + Sync {
    /// Register a notification to fire at `fire_at` and return its handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Gateway` if `fire_at` is not strictly in the future
    /// or the platform rejects the request.
    fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        request: NotificationRequest,
    ) -> GatewayFuture<'_, String>;

    /// Withdraw a notification. Unknown or already-fired ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Gateway` if the platform call itself fails.
    fn cancel(&self, notification_id: &str) -> GatewayFuture<'_, ()>;
}
