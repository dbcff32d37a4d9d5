//! End-to-end scheduling lifecycle against a recording gateway.
//!
//! Validates:
//! - schedule / snooze / complete leave the registry and gateway consistent
//! - at most one notification per action is live at any time
//! - cancel is idempotent
//! - validation failures have no side effects

use chrono::Duration;
use chrono_tz::America::New_York;

use rapport_scheduler::models::action::{ActionKind, ActionPayload, ActionStatus};
use rapport_scheduler::scheduling::service::{ScheduleIntent, SchedulingPolicy};
use rapport_scheduler::AppError;

use super::test_helpers::{harness, harness_with, t0, utc, GatewayCall};

fn notice(title: &str) -> ActionPayload {
    ActionPayload::Notice {
        title: title.to_owned(),
        body: "details".into(),
    }
}

#[tokio::test]
async fn schedule_snooze_complete_scenario() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    // Schedule one hour out.
    let first = h
        .service
        .schedule(ScheduleIntent::new(kind, notice("Dentist"), t0() + Duration::hours(1)))
        .await
        .expect("schedule");
    let row = h.service.get(kind, first.action_id).await.expect("row");
    assert_eq!(row.notification_id.as_deref(), Some(first.notification_id.as_str()));
    assert_eq!(row.status, ActionStatus::Pending);

    // Snooze to two hours out.
    let second = h
        .service
        .snooze(kind, first.action_id, t0() + Duration::hours(2))
        .await
        .expect("snooze");
    assert_eq!(second.action_id, first.action_id);
    assert_ne!(second.notification_id, first.notification_id);

    let row = h.service.get(kind, first.action_id).await.expect("row");
    assert_eq!(row.notification_id.as_deref(), Some(second.notification_id.as_str()));
    assert_eq!(row.fire_at, t0() + Duration::hours(2));

    assert_eq!(
        h.gateway.calls(),
        vec![
            GatewayCall::Schedule {
                notification_id: first.notification_id.clone(),
                fire_at: t0() + Duration::hours(1),
                action_id: first.action_id,
            },
            GatewayCall::Cancel {
                notification_id: first.notification_id.clone(),
            },
            GatewayCall::Schedule {
                notification_id: second.notification_id.clone(),
                fire_at: t0() + Duration::hours(2),
                action_id: first.action_id,
            },
        ]
    );

    // Complete.
    h.service.complete(kind, first.action_id).await.expect("complete");
    let row = h.service.get(kind, first.action_id).await.expect("row");
    assert_eq!(row.notification_id, None);
    assert_eq!(row.status, ActionStatus::Completed);
    assert!(h.gateway.live_ids().is_empty());
}

#[tokio::test]
async fn at_most_one_live_notification_per_action() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice("Gym"), t0() + Duration::hours(1)))
        .await
        .expect("schedule");
    let id = scheduled.action_id;

    for step in 1..=5 {
        let at = t0() + Duration::hours(1 + step);
        if step % 2 == 0 {
            h.service.snooze(kind, id, at).await.expect("snooze");
        } else {
            h.service
                .reschedule(kind, id, at, Some(notice("Gym, later")))
                .await
                .expect("reschedule");
        }
        assert_eq!(h.gateway.live_for(kind, id), 1);
    }
    h.service.cancel(kind, id).await.expect("cancel");
    h.service
        .schedule(
            ScheduleIntent::new(kind, notice("Gym"), t0() + Duration::hours(9)).for_existing(id),
        )
        .await
        .expect("re-arm after cancel");

    assert_eq!(h.gateway.max_live_for(kind, id), 1);
    assert_eq!(h.gateway.live_for(kind, id), 1);

    // Every reschedule cancels the previous id before scheduling a new one.
    let calls = h.gateway.calls();
    let mut live: Option<String> = None;
    for call in calls {
        match call {
            GatewayCall::Schedule { notification_id, .. } => {
                assert!(live.is_none(), "schedule while {live:?} still live");
                live = Some(notification_id);
            }
            GatewayCall::Cancel { notification_id } => {
                assert_eq!(live.as_deref(), Some(notification_id.as_str()));
                live = None;
            }
        }
    }
}

#[tokio::test]
async fn cancel_twice_is_idempotent() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice("Call"), t0() + Duration::minutes(30)))
        .await
        .expect("schedule");

    h.service.cancel(kind, scheduled.action_id).await.expect("first cancel");
    h.service.cancel(kind, scheduled.action_id).await.expect("second cancel");

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.notification_id, None);
    assert_eq!(row.status, ActionStatus::Cancelled);
    // Only the first cancel had a handle to withdraw.
    assert_eq!(h.gateway.cancelled_ids(), vec![scheduled.notification_id]);
}

#[tokio::test]
async fn cancel_missing_action_is_not_found() {
    let h = harness().await;

    let result = h.service.cancel(ActionKind::Reminder, 77).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn too_soon_is_rejected_before_any_side_effect() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    for fire_at in [
        t0() - Duration::minutes(1),
        t0(),
        t0() + Duration::seconds(4),
    ] {
        let result = h
            .service
            .schedule(ScheduleIntent::new(kind, notice("Too soon"), fire_at))
            .await;
        assert!(matches!(result, Err(AppError::PastOrTooSoon(_))));
    }

    assert!(h.gateway.calls().is_empty());
    assert!(h.service.get(kind, 1).await.is_err(), "no row was inserted");
}

#[tokio::test]
async fn exactly_min_lead_is_accepted() {
    let h = harness().await;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(
            ActionKind::Reminder,
            notice("Edge"),
            t0() + Duration::seconds(5),
        ))
        .await
        .expect("schedule at the edge");
    assert!(h.gateway.is_live(&scheduled.notification_id));
}

#[tokio::test]
async fn snooze_into_the_past_changes_nothing() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule(ScheduleIntent::new(kind, notice("Laundry"), t0() + Duration::hours(1)))
        .await
        .expect("schedule");

    let result = h.service.snooze(kind, scheduled.action_id, t0()).await;
    assert!(matches!(result, Err(AppError::PastOrTooSoon(_))));

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.notification_id.as_deref(), Some(scheduled.notification_id.as_str()));
    assert_eq!(row.fire_at, t0() + Duration::hours(1));
    assert_eq!(h.gateway.schedule_count(), 1);
    assert!(h.gateway.cancelled_ids().is_empty());
}

#[tokio::test]
async fn payload_must_match_kind() {
    let h = harness().await;

    let result = h
        .service
        .schedule(ScheduleIntent::new(
            ActionKind::ScheduledText,
            notice("Wrong shape"),
            t0() + Duration::hours(1),
        ))
        .await;

    assert!(matches!(result, Err(AppError::MalformedInput(_))));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn scheduled_text_request_names_recipient() {
    let h = harness().await;

    let scheduled = h
        .service
        .schedule_text("+15559876543", "See you at 8", t0() + Duration::hours(3), Some(4))
        .await
        .expect("schedule text");

    let request = h
        .gateway
        .request(&scheduled.notification_id)
        .expect("request recorded");
    assert_eq!(request.title.as_deref(), Some("Time to text +15559876543"));
    assert_eq!(request.body.as_deref(), Some("See you at 8"));
    assert_eq!(request.data["action_id"], scheduled.action_id);
    assert_eq!(request.data["kind"], "scheduled_text");

    let row = h
        .service
        .get(ActionKind::ScheduledText, scheduled.action_id)
        .await
        .expect("row");
    assert_eq!(row.owner_profile_id, Some(4));
}

#[tokio::test]
async fn empty_phone_number_is_malformed() {
    let h = harness().await;

    let result = h
        .service
        .schedule_text("  ", "hello", t0() + Duration::hours(3), None)
        .await;
    assert!(matches!(result, Err(AppError::MalformedInput(_))));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn complete_text_marks_sent() {
    let h = harness().await;

    let scheduled = h
        .service
        .schedule_text("+15559876543", "Dinner?", t0() + Duration::hours(3), None)
        .await
        .expect("schedule text");
    h.service
        .complete(ActionKind::ScheduledText, scheduled.action_id)
        .await
        .expect("complete");

    let row = h
        .service
        .get(ActionKind::ScheduledText, scheduled.action_id)
        .await
        .expect("row");
    assert_eq!(row.status, ActionStatus::Sent);
    assert_eq!(row.notification_id, None);
    assert_eq!(h.gateway.cancelled_ids(), vec![scheduled.notification_id]);
}

#[tokio::test]
async fn reminder_from_local_components_uses_policy_timezone() {
    let policy = SchedulingPolicy {
        timezone: New_York,
        ..SchedulingPolicy::default()
    };
    let h = harness_with(policy).await;

    let scheduled = h
        .service
        .schedule_reminder_at("2025-01-02", "08:15", "PM", "Trash night", "Bins out")
        .await
        .expect("schedule");

    let row = h
        .service
        .get(ActionKind::Reminder, scheduled.action_id)
        .await
        .expect("row");
    assert_eq!(row.fire_at, utc("2025-01-03T01:15:00Z"));
}

#[tokio::test]
async fn malformed_components_have_no_side_effects() {
    let h = harness().await;

    let result = h
        .service
        .schedule_reminder_at("2025-01-02", "8.15", "PM", "Trash night", "Bins out")
        .await;
    assert!(matches!(result, Err(AppError::MalformedInput(_))));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn rescheduling_a_completed_action_arms_it_again() {
    let h = harness().await;
    let kind = ActionKind::Reminder;

    let scheduled = h
        .service
        .schedule_reminder("Pay rent", "Portal", t0() + Duration::hours(1), None)
        .await
        .expect("schedule");
    h.service.complete(kind, scheduled.action_id).await.expect("complete");

    let again = h
        .service
        .reschedule(kind, scheduled.action_id, t0() + Duration::days(30), None)
        .await
        .expect("reschedule");

    let row = h.service.get(kind, scheduled.action_id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Pending);
    assert_eq!(row.notification_id.as_deref(), Some(again.notification_id.as_str()));
    assert_eq!(row.payload, notice_with("Pay rent", "Portal"));
}

#[tokio::test]
async fn list_pending_orders_by_fire_time() {
    let h = harness().await;

    let later = h
        .service
        .schedule_reminder("B", "b", t0() + Duration::hours(5), None)
        .await
        .expect("later");
    let sooner = h
        .service
        .schedule_reminder("A", "a", t0() + Duration::hours(1), None)
        .await
        .expect("sooner");
    let cancelled = h
        .service
        .schedule_reminder("C", "c", t0() + Duration::hours(2), None)
        .await
        .expect("cancelled");
    h.service
        .cancel(ActionKind::Reminder, cancelled.action_id)
        .await
        .expect("cancel");

    let pending = h
        .service
        .list_pending(ActionKind::Reminder)
        .await
        .expect("list");
    let ids: Vec<i64> = pending.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![sooner.action_id, later.action_id]);
}

fn notice_with(title: &str, body: &str) -> ActionPayload {
    ActionPayload::Notice {
        title: title.to_owned(),
        body: body.to_owned(),
    }
}
