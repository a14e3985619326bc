//! Reminder lists: default list, ordering, cascade delete, and list checks on reminders.

mod common;

use common::TestApp;
use rappel::app::error::ServiceError;
use rappel::app::reminders::Actor;
use rappel::domain::device::Platform;
use rappel::domain::live::ChangeAction;
use rappel::domain::notification::NotificationKind;
use rappel::domain::reminder::{NewReminder, ReminderPatch, ReminderStatus};
use rappel::domain::reminder_list::{NewReminderList, ReminderListPatch, DEFAULT_LIST_NAME};
use rappel::domain::sync_event::{EntityType, SyncAction};
use uuid::Uuid;

fn actor(user_id: Uuid) -> Actor {
    Actor {
        user_id,
        device_id: None,
    }
}

fn named(name: &str) -> NewReminderList {
    NewReminderList {
        name: name.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn listing_creates_the_default_list_once() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let first = app.state.lists.list(actor(user)).await.unwrap();
    let second = app.state.lists.list(actor(user)).await.unwrap();

    assert_eq!(first.len(), 1);
    assert!(first[0].list.is_default);
    assert_eq!(first[0].list.name, DEFAULT_LIST_NAME);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].list.id, first[0].list.id);

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].entity_type, EntityType::ReminderList);
}

#[tokio::test]
async fn create_appends_and_records_a_list_sync_event() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let origin = app.register_device(user, "phone", Platform::Ios, "phone-token").await;
    app.register_device(user, "tablet", Platform::Android, "tablet-token").await;
    let actor = Actor {
        user_id: user,
        device_id: Some(origin.id),
    };
    let mut subscription = app.state.hub.subscribe(user);

    app.state.lists.ensure_default(actor).await.unwrap();
    let groceries = app.state.lists.create(actor, named("  Groceries ")).await.unwrap();
    app.settle().await;

    assert_eq!(groceries.name, "Groceries");
    assert_eq!(groceries.sort_order, 1);
    assert!(!groceries.is_default);

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    let last = page.events.last().unwrap();
    assert_eq!(last.entity_type, EntityType::ReminderList);
    assert_eq!(last.entity_id, groceries.id);
    assert_eq!(last.action, SyncAction::Create);
    assert_eq!(last.payload["name"], "Groceries");

    subscription.try_recv().unwrap();
    let created = subscription.try_recv().unwrap();
    assert_eq!(created.entity_id, groceries.id);
    assert_eq!(created.event_name(), "list_created");
    assert_eq!(created.list.as_ref().unwrap().name, "Groceries");

    // sync pings only, and never back to the origin
    assert!(app.apns.sent().is_empty());
    assert!(app.fcm.sent().iter().all(|push| push.kind == NotificationKind::Sync));
    assert!(!app.fcm.sent().is_empty());
}

#[tokio::test]
async fn create_rejects_bad_names_and_colors() {
    let app = TestApp::new();
    let user = Uuid::new_v4();

    let err = app.state.lists.create(actor(user), named("   ")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));

    let err = app
        .state
        .lists
        .create(
            actor(user),
            NewReminderList {
                name: "Work".into(),
                color_hex: Some("blue".into()),
                icon_name: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
}

#[tokio::test]
async fn update_changes_style_and_broadcasts() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let list = app.state.lists.create(actor(user), named("Work")).await.unwrap();
    let mut subscription = app.state.hub.subscribe(user);

    let updated = app
        .state
        .lists
        .update(
            actor(user),
            list.id,
            ReminderListPatch {
                color_hex: Some("#FF9500".into()),
                icon_name: Some("briefcase".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.name, "Work");
    assert_eq!(updated.color_hex, "#FF9500");
    assert_eq!(updated.icon_name, "briefcase");
    assert_eq!(subscription.try_recv().unwrap().event_name(), "list_updated");

    let missing = app
        .state
        .lists
        .update(actor(Uuid::new_v4()), list.id, ReminderListPatch::default())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn default_list_cannot_be_deleted() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let default = app.state.lists.ensure_default(actor(user)).await.unwrap();

    let err = app.state.lists.delete(actor(user), default.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
    assert!(app.state.lists.get(user, default.id).await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_a_list_deletes_its_reminders() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let errands = app.state.lists.create(actor(user), named("Errands")).await.unwrap();
    let other = app.state.lists.create(actor(user), named("Other")).await.unwrap();

    let inside = app
        .state
        .reminders
        .create(
            actor(user),
            NewReminder {
                list_id: Some(errands.id),
                title: "Post office".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let outside = app
        .state
        .reminders
        .create(
            actor(user),
            NewReminder {
                list_id: Some(other.id),
                title: "Bank".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let mut subscription = app.state.hub.subscribe(user);

    assert!(app.state.lists.delete(actor(user), errands.id).await.unwrap());

    assert!(app.state.lists.get(user, errands.id).await.unwrap().is_none());
    assert!(app.state.reminders.get(user, inside.id).await.unwrap().is_none());
    assert!(app.state.reminders.get(user, outside.id).await.unwrap().is_some());

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    let deletes: Vec<_> = page
        .events
        .iter()
        .filter(|event| event.action == SyncAction::Delete)
        .collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[0].entity_type, EntityType::Reminder);
    assert_eq!(deletes[0].entity_id, inside.id);
    assert_eq!(deletes[1].entity_type, EntityType::ReminderList);
    assert_eq!(deletes[1].entity_id, errands.id);

    let first = subscription.try_recv().unwrap();
    assert_eq!(first.event_name(), "reminder_deleted");
    let second = subscription.try_recv().unwrap();
    assert_eq!(second.event_name(), "list_deleted");
    assert_eq!(second.action, ChangeAction::Deleted);
    assert!(second.list.is_none());

    // a second delete finds nothing
    assert!(!app.state.lists.delete(actor(user), errands.id).await.unwrap());
}

#[tokio::test]
async fn reorder_assigns_positions() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let default = app.state.lists.ensure_default(actor(user)).await.unwrap();
    let work = app.state.lists.create(actor(user), named("Work")).await.unwrap();
    let home = app.state.lists.create(actor(user), named("Home")).await.unwrap();

    let lists = app
        .state
        .lists
        .reorder(actor(user), vec![home.id, work.id, default.id])
        .await
        .unwrap();

    let order: Vec<Uuid> = lists.iter().map(|summary| summary.list.id).collect();
    assert_eq!(order, vec![home.id, work.id, default.id]);
    assert_eq!(lists[0].list.sort_order, 0);
    assert_eq!(lists[2].list.sort_order, 2);

    let stranger = app
        .state
        .lists
        .create(actor(Uuid::new_v4()), named("Theirs"))
        .await
        .unwrap();
    let err = app
        .state
        .lists
        .reorder(actor(user), vec![stranger.id, home.id])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
}

#[tokio::test]
async fn reminder_count_covers_open_reminders_only() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let list = app.state.lists.create(actor(user), named("Chores")).await.unwrap();

    let mut ids = Vec::new();
    for title in ["Laundry", "Dishes", "Vacuum"] {
        let reminder = app
            .state
            .reminders
            .create(
                actor(user),
                NewReminder {
                    list_id: Some(list.id),
                    title: title.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ids.push(reminder.id);
    }
    app.state.reminders.complete(actor(user), ids[0]).await.unwrap();

    let summary = app.state.lists.get(user, list.id).await.unwrap().unwrap();
    assert_eq!(summary.reminder_count, 2);
}

#[tokio::test]
async fn reminders_must_reference_an_owned_list() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let stranger_list = app
        .state
        .lists
        .create(actor(Uuid::new_v4()), named("Theirs"))
        .await
        .unwrap();
    let own = app.state.lists.create(actor(user), named("Mine")).await.unwrap();

    let err = app
        .state
        .reminders
        .create(
            actor(user),
            NewReminder {
                list_id: Some(stranger_list.id),
                title: "Sneaky".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));

    let err = app
        .state
        .reminders
        .create(
            actor(user),
            NewReminder {
                list_id: Some(Uuid::new_v4()),
                title: "Nowhere".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));

    let reminder = app
        .state
        .reminders
        .create(
            actor(user),
            NewReminder {
                list_id: Some(own.id),
                title: "Fine".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reminder.list_id, Some(own.id));
    assert_eq!(reminder.status, ReminderStatus::Active);

    let err = app
        .state
        .reminders
        .update(
            actor(user),
            reminder.id,
            ReminderPatch {
                list_id: Some(Some(stranger_list.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
    let unchanged = app.state.reminders.get(user, reminder.id).await.unwrap().unwrap();
    assert_eq!(unchanged.list_id, Some(own.id));

    // clearing the list is always allowed
    let cleared = app
        .state
        .reminders
        .update(
            actor(user),
            reminder.id,
            ReminderPatch {
                list_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared.list_id, None);
}
