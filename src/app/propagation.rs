use uuid::Uuid;

use crate::app::background::BackgroundTasks;
use crate::app::dispatcher::NotificationDispatcher;
use crate::domain::notification::CrossDeviceAction;

/// Fire-and-forget pushes that follow a mutation. Nothing here is awaited by
/// the request that caused it.
#[derive(Clone)]
pub struct ActionPropagator {
    dispatcher: NotificationDispatcher,
    tasks: BackgroundTasks,
}

impl ActionPropagator {
    pub fn new(dispatcher: NotificationDispatcher, tasks: BackgroundTasks) -> Self {
        Self { dispatcher, tasks }
    }

    /// Tells the user's other devices to cancel local alerts for `entity_id`.
    pub fn propagate(
        &self,
        user_id: Uuid,
        origin_device_id: Option<Uuid>,
        entity_id: Uuid,
        action: CrossDeviceAction,
    ) {
        let dispatcher = self.dispatcher.clone();
        self.tasks.spawn("cross_device_action", async move {
            dispatcher
                .send_cross_device_action(user_id, origin_device_id, entity_id, action)
                .await?;
            Ok(())
        });
    }

    /// Wakes the user's other devices so they pull the sync log.
    pub fn request_sync(&self, user_id: Uuid, origin_device_id: Option<Uuid>) {
        let dispatcher = self.dispatcher.clone();
        self.tasks.spawn("sync_notification", async move {
            dispatcher
                .send_sync_notification(user_id, origin_device_id)
                .await?;
            Ok(())
        });
    }
}
