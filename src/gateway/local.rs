//! In-process gateway backed by tokio timers.
//!
//! Each scheduled notification is a sleeping task guarded by a child
//! [`CancellationToken`]. When the timer elapses a
//! [`NotificationEvent::Delivered`] is sent on the gateway's event channel.
//! Timers do not survive a restart; see
//! [`resync_pending`](crate::scheduling::service::SchedulingService::resync_pending).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{GatewayFuture, NotificationEvent, NotificationGateway, NotificationRequest};
use crate::AppError;

type Timers = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Timer-based [`NotificationGateway`] running inside the current process.
pub struct LocalGateway {
    timers: Timers,
    events: mpsc::Sender<NotificationEvent>,
    root: CancellationToken,
}

impl LocalGateway {
    /// Create a gateway and the receiving end of its event channel.
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<NotificationEvent>) {
        let (events, rx) = mpsc::channel(buffer);
        let gateway = Self {
            timers: Arc::default(),
            events,
            root: CancellationToken::new(),
        };
        (gateway, rx)
    }

    /// Number of timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every outstanding timer.
    pub fn shutdown(&self) {
        self.root.cancel();
        let drained = {
            let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            let count = timers.len();
            timers.clear();
            count
        };
        info!(drained, "local gateway shut down");
    }
}

impl NotificationGateway for LocalGateway {
    fn schedule(
        &self,
        fire_at: DateTime<Utc>,
        request: NotificationRequest,
    ) -> GatewayFuture<'_, String> {
        Box::pin(async move {
            if self.root.is_cancelled() {
                return Err(AppError::Gateway("gateway is shut down".into()));
            }

            let now = Utc::now();
            let delay = (fire_at - now)
                .to_std()
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| {
                    AppError::Gateway(format!(
                        "fire time {} is not in the future",
                        fire_at.to_rfc3339()
                    ))
                })?;

            let notification_id = Uuid::new_v4().to_string();
            let token = self.root.child_token();
            self.timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(notification_id.clone(), token.clone());

            let timers = Arc::clone(&self.timers);
            let events = self.events.clone();
            let id = notification_id.clone();
            let span = info_span!("local_notification", notification_id = %id);
            tokio::spawn(
                async move {
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!("timer cancelled");
                        }
                        () = tokio::time::sleep(delay) => {
                            timers
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .remove(&id);
                            let event = NotificationEvent::Delivered {
                                notification_id: id,
                                data: request.data,
                            };
                            if events.send(event).await.is_err() {
                                warn!("event channel closed; fire dropped");
                            }
                        }
                    }
                }
                .instrument(span),
            );

            debug!(%notification_id, fire_at = %fire_at.to_rfc3339(), "timer armed");
            Ok(notification_id)
        })
    }

    fn cancel(&self, notification_id: &str) -> GatewayFuture<'_, ()> {
        let notification_id = notification_id.to_owned();
        Box::pin(async move {
            let removed = self
                .timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&notification_id);
            match removed {
                Some(token) => {
                    token.cancel();
                    debug!(%notification_id, "timer disarmed");
                }
                None => debug!(%notification_id, "cancel of unknown or fired id"),
            }
            Ok(())
        })
    }
}
