//! Reminder mutations and what follows them: sync log, live feed, pushes.

mod common;

use common::TestApp;
use rappel::app::error::ServiceError;
use rappel::app::reminders::Actor;
use rappel::domain::device::Platform;
use rappel::domain::live::ChangeAction;
use rappel::domain::notification::{CrossDeviceAction, NotificationKind};
use rappel::domain::reminder::{NewReminder, ReminderPatch, ReminderStatus};
use rappel::domain::sync_event::SyncAction;
use time::Duration;
use uuid::Uuid;

fn new_reminder(title: &str) -> NewReminder {
    NewReminder {
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_records_a_sync_event_and_pings_other_devices() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let origin = app.register_device(user, "phone", Platform::Ios, "phone-token").await;
    app.register_device(user, "tablet", Platform::Android, "tablet-token").await;
    let actor = Actor {
        user_id: user,
        device_id: Some(origin.id),
    };

    let reminder = app
        .state
        .reminders
        .create(actor, new_reminder("  Buy milk  "))
        .await
        .unwrap();
    app.settle().await;

    assert_eq!(reminder.title, "Buy milk");
    assert_eq!(reminder.status, ReminderStatus::Active);
    assert_eq!(reminder.version, 1);
    assert_eq!(reminder.last_modified_by, Some(origin.id));

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].action, SyncAction::Create);
    assert_eq!(page.events[0].entity_id, reminder.id);
    assert_eq!(page.events[0].device_id, Some(origin.id));
    assert_eq!(page.events[0].payload["title"], "Buy milk");

    // creation is not a cross-device action, only the sync ping goes out
    assert!(app.apns.sent().is_empty());
    let sent = app.fcm.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Sync);
}

#[tokio::test]
async fn create_is_idempotent_on_local_id() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let input = NewReminder {
        local_id: Some("client-42".into()),
        ..new_reminder("Once")
    };

    let first = app.state.reminders.create(actor, input.clone()).await.unwrap();
    let second = app.state.reminders.create(actor, input).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(app.state.reminders.list(user, None).await.unwrap().len(), 1);
    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
}

#[tokio::test]
async fn titles_are_validated() {
    let app = TestApp::new();
    let actor = Actor {
        user_id: Uuid::new_v4(),
        device_id: None,
    };

    let empty = app.state.reminders.create(actor, new_reminder("   ")).await;
    assert!(matches!(empty, Err(ServiceError::Invalid(_))));

    let long = app
        .state
        .reminders
        .create(actor, new_reminder(&"x".repeat(501)))
        .await;
    assert!(matches!(long, Err(ServiceError::Invalid(_))));

    let limit = app
        .state
        .reminders
        .create(actor, new_reminder(&"é".repeat(500)))
        .await;
    assert!(limit.is_ok());
}

#[tokio::test]
async fn complete_propagates_to_other_devices_only() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let phone = app.register_device(user, "phone", Platform::Ios, "phone-token").await;
    app.register_device(user, "watch", Platform::Ios, "watch-token").await;
    let reminder = app.seed_reminder(user, "Pay rent", None).await;

    let completed = app
        .state
        .reminders
        .complete(
            Actor {
                user_id: user,
                device_id: Some(phone.id),
            },
            reminder.id,
        )
        .await
        .unwrap()
        .unwrap();
    app.settle().await;

    assert_eq!(completed.status, ReminderStatus::Completed);
    assert_eq!(completed.completed_at, Some(app.now()));
    assert_eq!(completed.version, 2);

    let sent = app.apns.sent();
    assert!(sent.iter().all(|p| p.token == "watch-token" && p.silent));
    assert!(sent.iter().any(|p| p.kind
        == NotificationKind::CrossDeviceAction {
            action: CrossDeviceAction::Complete,
            entity_id: reminder.id,
        }));
    assert!(sent.iter().any(|p| p.kind == NotificationKind::Sync));
}

#[tokio::test]
async fn dismiss_and_delete_propagate_their_actions() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    app.register_device(user, "tablet", Platform::Android, "tablet-token").await;
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let first = app.seed_reminder(user, "Dismiss me", None).await;
    let second = app.seed_reminder(user, "Delete me", None).await;

    let dismissed = app
        .state
        .reminders
        .dismiss(actor, first.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dismissed.status, ReminderStatus::Dismissed);
    assert!(app.state.reminders.delete(actor, second.id).await.unwrap());
    app.settle().await;

    let actions: Vec<(CrossDeviceAction, Uuid)> = app
        .fcm
        .sent()
        .into_iter()
        .filter_map(|p| match p.kind {
            NotificationKind::CrossDeviceAction { action, entity_id } => Some((action, entity_id)),
            _ => None,
        })
        .collect();
    assert!(actions.contains(&(CrossDeviceAction::Dismiss, first.id)));
    assert!(actions.contains(&(CrossDeviceAction::Delete, second.id)));
}

#[tokio::test]
async fn snooze_moves_due_date_and_counts() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let reminder = app
        .seed_reminder(user, "Stretch", Some(app.now() - Duration::minutes(2)))
        .await;

    let snoozed = app
        .state
        .reminders
        .snooze(actor, reminder.id, 15)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snoozed.due_at, Some(app.now() + Duration::minutes(15)));
    assert_eq!(snoozed.status, ReminderStatus::Active);
    assert_eq!(snoozed.snooze_count, 1);
    assert_eq!(snoozed.notification_sent_at, None);
    assert_eq!(snoozed.version, 2);
}

#[tokio::test]
async fn snooze_minutes_are_bounded() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let reminder = app.seed_reminder(user, "Bounds", None).await;

    for minutes in [0, -5, 1441] {
        let result = app.state.reminders.snooze(actor, reminder.id, minutes).await;
        assert!(matches!(result, Err(ServiceError::Invalid(_))), "{} accepted", minutes);
    }
    assert!(app.state.reminders.snooze(actor, reminder.id, 1440).await.is_ok());
}

#[tokio::test]
async fn update_applies_patch_and_tracks_completion() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let device = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: Some(device),
    };
    let reminder = app.seed_reminder(user, "Draft", None).await;

    let updated = app
        .state
        .reminders
        .update(
            actor,
            reminder.id,
            ReminderPatch {
                title: Some("Final".into()),
                notes: Some(Some("with notes".into())),
                status: Some(ReminderStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.notes.as_deref(), Some("with notes"));
    assert_eq!(updated.completed_at, Some(app.now()));
    assert_eq!(updated.last_modified_by, Some(device));
    assert_eq!(updated.version, 2);

    let reopened = app
        .state
        .reminders
        .update(
            actor,
            reminder.id,
            ReminderPatch {
                status: Some(ReminderStatus::Active),
                notes: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reopened.completed_at, None);
    assert_eq!(reopened.notes, None);
    assert_eq!(reopened.version, 3);
}

#[tokio::test]
async fn other_users_reminders_are_invisible() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let intruder = Actor {
        user_id: Uuid::new_v4(),
        device_id: None,
    };
    app.register_device(owner, "phone", Platform::Ios, "owner-token").await;
    let reminder = app.seed_reminder(owner, "Private", None).await;

    assert!(app.state.reminders.get(intruder.user_id, reminder.id).await.unwrap().is_none());
    assert!(app.state.reminders.complete(intruder, reminder.id).await.unwrap().is_none());
    assert!(!app.state.reminders.delete(intruder, reminder.id).await.unwrap());
    app.settle().await;

    assert!(app.pushes().is_empty());
    let page = app.state.sync_log.changes_since(owner, None, None).await.unwrap();
    assert!(page.events.is_empty());
}

#[tokio::test]
async fn delete_is_soft_and_logged() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let reminder = app.seed_reminder(user, "Temporary", None).await;

    assert!(app.state.reminders.delete(actor, reminder.id).await.unwrap());
    assert!(!app.state.reminders.delete(actor, reminder.id).await.unwrap());
    assert!(app.state.reminders.get(user, reminder.id).await.unwrap().is_none());
    assert!(app.state.reminders.list(user, None).await.unwrap().is_empty());

    let page = app.state.sync_log.changes_since(user, None, None).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].action, SyncAction::Delete);
    assert_eq!(page.events[0].entity_id, reminder.id);
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let open = app.seed_reminder(user, "Open", None).await;
    let done = app.seed_reminder(user, "Done", None).await;
    app.state.reminders.complete(actor, done.id).await.unwrap();

    let active = app
        .state
        .reminders
        .list(user, Some(ReminderStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, open.id);

    let all = app.state.reminders.list(user, None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn mutations_are_broadcast_to_live_subscribers() {
    let app = TestApp::new();
    let user = Uuid::new_v4();
    let actor = Actor {
        user_id: user,
        device_id: None,
    };
    let mut subscription = app.state.hub.subscribe(user);

    let reminder = app
        .state
        .reminders
        .create(actor, new_reminder("Live"))
        .await
        .unwrap();
    app.state.reminders.delete(actor, reminder.id).await.unwrap();

    let created = subscription.try_recv().unwrap();
    assert_eq!(created.action, ChangeAction::Created);
    assert_eq!(created.entity_id, reminder.id);
    assert_eq!(created.reminder.as_ref().unwrap().title, "Live");

    let deleted = subscription.try_recv().unwrap();
    assert_eq!(deleted.action, ChangeAction::Deleted);
    assert!(deleted.reminder.is_none());
    assert_eq!(deleted.event_name(), "reminder_deleted");
}
