//! Fire event consumer: applies gateway callbacks to the store.
//!
//! Reads [`NotificationEvent`]s from the gateway's `mpsc` channel and hands
//! each one to [`SchedulingService::handle_event`]. Failures are logged and
//! the loop keeps going.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::service::{FireOutcome, SchedulingService};
use crate::gateway::NotificationEvent;

/// Spawn a background task that applies fire events until the
/// `CancellationToken` fires or the channel closes.
#[must_use]
pub fn spawn_fire_consumer(
    mut rx: mpsc::Receiver<NotificationEvent>,
    service: Arc<SchedulingService>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                let event = tokio::select! {
                    () = cancel.cancelled() => {
                        info!("fire consumer shutting down");
                        break;
                    }
                    maybe_event = rx.recv() => {
                        if let Some(e) = maybe_event { e } else {
                            info!("fire event channel closed");
                            break;
                        }
                    }
                };

                match service.handle_event(&event).await {
                    Ok(FireOutcome::Fired {
                        action_id, kind, ..
                    }) if kind.is_yearly() => {
                        info!(
                            action_id,
                            kind = kind.as_str(),
                            "yearly action fired; disabled until re-enabled"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(
                            notification_id = event.notification_id(),
                            %err,
                            "failed to apply fire event"
                        );
                    }
                }
            }
        }
        .instrument(info_span!("fire_consumer")),
    )
}
