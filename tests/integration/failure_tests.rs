//! Gateway and store failures during scheduling.
//!
//! Validates:
//! - a gateway schedule failure leaves the record `unscheduled` and retryable
//! - a reschedule that fails after withdrawing the old handle keeps the new
//!   fire time and no live notification
//! - gateway cancel failures are logged and ignored
//! - a store failure after a successful gateway call surfaces as `Db`

use chrono::Duration;

use rapport_scheduler::models::action::{ActionKind, ActionPayload, ActionStatus};
use rapport_scheduler::scheduling::service::ScheduleIntent;
use rapport_scheduler::AppError;

use super::test_helpers::{harness, t0};

fn notice() -> ActionPayload {
    ActionPayload::Notice {
        title: "Renew passport".into(),
        body: "Expires in March".into(),
    }
}

#[tokio::test]
async fn gateway_failure_leaves_record_unscheduled_and_retry_reuses_it() {
    let h = harness().await;
    let kind = ActionKind::Reminder;
    let fire_at = t0() + Duration::hours(1);

    h.gateway.fail_schedule(true);
    let result = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), fire_at))
        .await;
    assert!(matches!(result, Err(AppError::Gateway(_))));

    let row = h.service.get(kind, 1).await.expect("row persisted before gateway call");
    assert_eq!(row.status, ActionStatus::Unscheduled);
    assert_eq!(row.notification_id, None);

    h.gateway.fail_schedule(false);
    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), fire_at).for_existing(row.id))
        .await
        .expect("retry");
    assert_eq!(scheduled.action_id, row.id);

    // No duplicate row from the retry.
    assert!(h.service.get(kind, row.id + 1).await.is_err());
    let row = h.service.get(kind, row.id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Pending);
    assert_eq!(row.notification_id.as_deref(), Some(scheduled.notification_id.as_str()));
}

#[tokio::test]
async fn reschedule_failure_after_withdraw_keeps_new_time_unscheduled() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), t0() + Duration::hours(1)))
        .await
        .expect("schedule");

    h.gateway.fail_schedule(true);
    let new_time = t0() + Duration::hours(6);
    let result = h.service.reschedule(kind, scheduled.action_id, new_time, None).await;
    assert!(matches!(result, Err(AppError::Gateway(_))));

    assert_eq!(h.gateway.cancelled_ids(), vec![scheduled.notification_id.clone()]);
    assert!(!h.gateway.is_live(&scheduled.notification_id));

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.fire_at, new_time);
    assert_eq!(row.status, ActionStatus::Unscheduled);
    assert_eq!(row.notification_id, None);

    // The caller retries with the same arguments.
    h.gateway.fail_schedule(false);
    h.service
        .reschedule(kind, scheduled.action_id, new_time, None)
        .await
        .expect("retry");
    assert_eq!(h.gateway.live_for(kind, scheduled.action_id), 1);
}

#[tokio::test]
async fn gateway_cancel_failure_is_ignored() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), t0() + Duration::hours(1)))
        .await
        .expect("schedule");

    h.gateway.fail_cancel(true);
    h.service
        .cancel(kind, scheduled.action_id)
        .await
        .expect("cancel succeeds despite gateway failure");

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Cancelled);
    assert_eq!(row.notification_id, None);
    assert_eq!(h.gateway.cancelled_ids(), vec![scheduled.notification_id]);
}

#[tokio::test]
async fn store_failure_after_gateway_schedule_surfaces_as_db_error() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    h.gateway.close_store_on_next_schedule((*h.db).clone());
    let result = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), t0() + Duration::hours(1)))
        .await;

    assert!(matches!(result, Err(AppError::Db(_))));
    // The gateway accepted the notification but nothing recorded it.
    assert_eq!(h.gateway.schedule_count(), 1);
    assert_eq!(h.gateway.live_for(kind, 1), 1);
}

#[tokio::test]
async fn snooze_validates_against_current_clock() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice(), t0() + Duration::hours(1)))
        .await
        .expect("schedule");

    h.clock.advance(Duration::minutes(30));
    let result = h
        .service
        .snooze(kind, scheduled.action_id, t0() + Duration::minutes(20))
        .await;
    assert!(matches!(result, Err(AppError::PastOrTooSoon(_))));

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Pending);
}
