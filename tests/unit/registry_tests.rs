//! Unit tests for `ScheduleRegistry`.

use std::sync::Arc;

use chrono::Utc;

use rapport_scheduler::models::action::{ActionKind, ActionPayload, ActionStatus, NewAction};
use rapport_scheduler::persistence::{action_repo::ActionRepo, db, registry::ScheduleRegistry};

async fn setup() -> (ActionRepo, ScheduleRegistry, i64) {
    let db = db::connect_memory().await.expect("db");
    let repo = ActionRepo::new(Arc::new(db));
    let registry = ScheduleRegistry::new(repo.clone());
    let action = repo
        .create(&NewAction {
            kind: ActionKind::BirthdayText,
            owner_profile_id: Some(1),
            fire_at: Utc::now(),
            payload: ActionPayload::Text {
                phone_number: "+15557654321".into(),
                message: "Happy birthday".into(),
            },
        })
        .await
        .expect("create");
    (repo, registry, action.id)
}

#[tokio::test]
async fn get_is_none_before_save() {
    let (_repo, registry, id) = setup().await;

    let nid = registry.get(id, ActionKind::BirthdayText).await.expect("get");
    assert!(nid.is_none());
}

#[tokio::test]
async fn save_then_get_returns_handle() {
    let (repo, registry, id) = setup().await;

    registry
        .save(id, ActionKind::BirthdayText, "notif-a")
        .await
        .expect("save");

    let nid = registry.get(id, ActionKind::BirthdayText).await.expect("get");
    assert_eq!(nid.as_deref(), Some("notif-a"));
    let row = repo.require(ActionKind::BirthdayText, id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Pending);
}

#[tokio::test]
async fn save_overwrites_previous_handle() {
    let (_repo, registry, id) = setup().await;

    registry.save(id, ActionKind::BirthdayText, "notif-a").await.expect("save");
    registry.save(id, ActionKind::BirthdayText, "notif-b").await.expect("save");

    let nid = registry.get(id, ActionKind::BirthdayText).await.expect("get");
    assert_eq!(nid.as_deref(), Some("notif-b"));
}

#[tokio::test]
async fn clear_forgets_handle() {
    let (repo, registry, id) = setup().await;

    registry.save(id, ActionKind::BirthdayText, "notif-a").await.expect("save");
    registry.clear(id, ActionKind::BirthdayText).await.expect("clear");

    assert!(registry
        .get(id, ActionKind::BirthdayText)
        .await
        .expect("get")
        .is_none());
    let row = repo.require(ActionKind::BirthdayText, id).await.expect("row");
    assert_eq!(row.status, ActionStatus::Unscheduled);
}

#[tokio::test]
async fn lookups_are_scoped_by_kind() {
    let (_repo, registry, id) = setup().await;

    registry.save(id, ActionKind::BirthdayText, "notif-a").await.expect("save");

    let other = registry.get(id, ActionKind::GiftReminder).await.expect("get");
    assert!(other.is_none());
}

#[tokio::test]
async fn get_for_missing_action_is_none() {
    let (_repo, registry, _id) = setup().await;

    let nid = registry.get(999, ActionKind::BirthdayText).await.expect("get");
    assert!(nid.is_none());
}
