//! Cursor replay over the per-user change log.

mod common;

use common::TestApp;
use rappel::app::reminders::Actor;
use rappel::domain::reminder::NewReminder;
use rappel::domain::sync_event::{EntityType, NewSyncEvent, SyncAction};
use serde_json::json;
use time::Duration;
use uuid::Uuid;

async fn create_many(app: &TestApp, user: Uuid, count: usize) -> Vec<Uuid> {
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let mut ids = Vec::new();
    for n in 0..count {
        let reminder = app
            .state
            .reminders
            .create(
                actor,
                NewReminder {
                    title: format!("Reminder {}", n),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ids.push(reminder.id);
    }
    ids
}

#[tokio::test]
async fn pages_replay_every_event_in_order() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let ids = create_many(&app, user, 5).await;

    let mut seen = Vec::new();
    let mut cursor = None;
    let mut pages = 0;
    loop {
        let page = app
            .state
            .sync_log
            .changes_since(user, cursor, Some(2))
            .await
            .unwrap();
        pages += 1;
        assert!(page.events.len() <= 2);
        seen.extend(page.events.iter().map(|e| e.entity_id));
        match page.next_cursor() {
            Some(next) => cursor = Some(next),
            None => {
                assert!(!page.has_more);
                break;
            }
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn since_is_exclusive() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    create_many(&app, user, 2).await;

    let all = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    let last = all.events.last().unwrap().created_at;
    assert!(all.events[0].created_at < last);

    let after = app
        .state
        .sync_log
        .changes_since(user, Some(last), None)
        .await
        .unwrap();
    assert!(after.events.is_empty());
    assert!(!after.has_more);
    assert_eq!(after.next_cursor(), None);
}

#[tokio::test]
async fn logs_are_per_user() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    create_many(&app, alice, 3).await;
    create_many(&app, bob, 1).await;

    let page = app.state.sync_log.changes_since(bob, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert!(page.events.iter().all(|e| e.user_id == bob));
    assert!(app.state.sync_log.latest(alice).await.unwrap().is_some());
    assert!(app.state.sync_log.latest(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn has_more_is_false_when_exactly_limit_events_remain() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let ids = create_many(&app, user, 4).await;

    let page = app
        .state
        .sync_log
        .changes_since(user, None, Some(4))
        .await
        .unwrap();
    assert_eq!(page.events.len(), 4);
    assert!(!page.has_more);
    assert_eq!(page.events[3].entity_id, ids[3]);
    assert_eq!(page.next_cursor(), None);
}

#[tokio::test]
async fn has_more_is_true_with_one_event_past_the_limit() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let ids = create_many(&app, user, 5).await;

    let page = app
        .state
        .sync_log
        .changes_since(user, None, Some(4))
        .await
        .unwrap();
    assert_eq!(page.events.len(), 4);
    assert!(page.has_more);

    // the overfetched event is not dropped, it opens the next page
    let rest = app
        .state
        .sync_log
        .changes_since(user, page.next_cursor(), Some(4))
        .await
        .unwrap();
    assert_eq!(rest.events.len(), 1);
    assert_eq!(rest.events[0].entity_id, ids[4]);
    assert!(!rest.has_more);
}

#[tokio::test]
async fn limit_is_clamped() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    create_many(&app, user, 3).await;

    // zero is raised to one
    let page = app
        .state
        .sync_log
        .changes_since(user, None, Some(0))
        .await
        .unwrap();
    assert_eq!(page.events.len(), 1);
    assert!(page.has_more);
}

#[tokio::test]
async fn recorded_events_keep_their_payload() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let entity = Uuid::new_v4();
    let device = Uuid::new_v4();

    let recorded = app
        .state
        .sync_log
        .record(NewSyncEvent {
            user_id: user,
            entity_type: EntityType::ReminderList,
            entity_id: entity,
            action: SyncAction::Update,
            payload: json!({ "name": "Groceries" }),
            device_id: Some(device),
        })
        .await
        .unwrap();

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    let event = &page.events[0];
    assert_eq!(event.id, recorded.id);
    assert_eq!(event.entity_type, EntityType::ReminderList);
    assert_eq!(event.payload["name"], "Groceries");
    assert_eq!(event.device_id, Some(device));
}

#[tokio::test]
async fn retention_sweep_removes_old_events() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    create_many(&app, user, 3).await;

    // inside the window nothing goes
    app.clock.advance(Duration::days(29));
    assert_eq!(app.state.jobs.run_sync_retention().await.unwrap(), 0);

    app.clock.advance(Duration::days(2));
    assert_eq!(app.state.jobs.run_sync_retention().await.unwrap(), 3);
    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert!(page.events.is_empty());
}
