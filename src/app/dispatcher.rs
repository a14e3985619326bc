use anyhow::anyhow;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::device::PushTarget;
use crate::domain::notification::{CrossDeviceAction, NotificationKind, NotificationPayload};
use crate::infra::push::{token_fingerprint, PushClients, PushError};
use crate::infra::repos::DeviceRepo;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to resolve push targets: {0}")]
    Targets(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Push(#[from] PushError),
}

impl DispatchError {
    fn targets(err: anyhow::Error) -> Self {
        DispatchError::Targets(err.into())
    }
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub device_id: Uuid,
    pub error: PushError,
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    /// Targets handed to a platform client.
    pub attempted: usize,
    pub delivered: usize,
    /// Targets whose platform has no configured client.
    pub skipped: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.delivered == 0
    }

    /// Collapses the report to the first per-device error, if any.
    pub fn into_result(self) -> Result<(), DispatchError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(DispatchError::Push(failure.error)),
            None => Ok(()),
        }
    }
}

/// Platform-agnostic fan-out to a user's devices.
#[derive(Clone)]
pub struct NotificationDispatcher {
    devices: Arc<dyn DeviceRepo>,
    clients: PushClients,
}

impl NotificationDispatcher {
    pub fn new(devices: Arc<dyn DeviceRepo>, clients: PushClients) -> Self {
        Self { devices, clients }
    }

    pub async fn deliver_to_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReport, DispatchError> {
        let targets = self
            .devices
            .get_all_push_tokens(user_id)
            .await
            .map_err(DispatchError::targets)?;
        Ok(self.deliver(targets, payload).await)
    }

    pub async fn deliver_to_user_excluding(
        &self,
        user_id: Uuid,
        exclude_device_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReport, DispatchError> {
        let targets = self
            .devices
            .get_push_tokens_excluding(user_id, exclude_device_id)
            .await
            .map_err(DispatchError::targets)?;
        Ok(self.deliver(targets, payload).await)
    }

    pub async fn send_to_user(&self, user_id: Uuid, payload: &NotificationPayload) -> Result<(), DispatchError> {
        self.deliver_to_user(user_id, payload).await?.into_result()
    }

    pub async fn send_to_user_excluding(
        &self,
        user_id: Uuid,
        exclude_device_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<(), DispatchError> {
        self.deliver_to_user_excluding(user_id, exclude_device_id, payload)
            .await?
            .into_result()
    }

    pub async fn send_to_device(&self, device_id: Uuid, payload: &NotificationPayload) -> Result<(), DispatchError> {
        let device = self
            .devices
            .find(device_id)
            .await
            .map_err(DispatchError::targets)?
            .ok_or_else(|| DispatchError::targets(anyhow!("device {} not found", device_id)))?;

        self.deliver(vec![PushTarget::from(&device)], payload)
            .await
            .into_result()
    }

    /// Silent push telling the user's other devices to drop local state for
    /// `entity_id`. Per-device failures are only logged.
    pub async fn send_cross_device_action(
        &self,
        user_id: Uuid,
        exclude_device_id: Option<Uuid>,
        entity_id: Uuid,
        action: CrossDeviceAction,
    ) -> Result<(), DispatchError> {
        let payload = NotificationPayload::silent(NotificationKind::CrossDeviceAction { action, entity_id });
        let report = self.deliver_excluding_opt(user_id, exclude_device_id, &payload).await?;
        debug!(
            user_id = %user_id,
            entity_id = %entity_id,
            action = action.as_str(),
            delivered = report.delivered,
            failed = report.failures.len(),
            "cross-device action sent"
        );
        Ok(())
    }

    /// Silent `sync` ping so background clients pull the change log.
    pub async fn send_sync_notification(
        &self,
        user_id: Uuid,
        exclude_device_id: Option<Uuid>,
    ) -> Result<(), DispatchError> {
        let payload = NotificationPayload::silent(NotificationKind::Sync);
        let report = self.deliver_excluding_opt(user_id, exclude_device_id, &payload).await?;
        debug!(
            user_id = %user_id,
            delivered = report.delivered,
            failed = report.failures.len(),
            "sync ping sent"
        );
        Ok(())
    }

    async fn deliver_excluding_opt(
        &self,
        user_id: Uuid,
        exclude_device_id: Option<Uuid>,
        payload: &NotificationPayload,
    ) -> Result<DeliveryReport, DispatchError> {
        match exclude_device_id {
            Some(device_id) => self.deliver_to_user_excluding(user_id, device_id, payload).await,
            None => self.deliver_to_user(user_id, payload).await,
        }
    }

    /// Sends to every target concurrently and waits for all of them. One
    /// failing device never stops the others.
    async fn deliver(&self, targets: Vec<PushTarget>, payload: &NotificationPayload) -> DeliveryReport {
        let sends = targets.iter().map(|target| async move {
            let outcome = match self.clients.for_platform(target.platform) {
                Some(client) if payload.is_silent() => {
                    Some(client.send_silent(&target.token, &payload.kind).await)
                }
                Some(client) => Some(client.send(&target.token, payload).await),
                None => None,
            };
            (target, outcome)
        });

        let mut report = DeliveryReport::default();
        for (target, outcome) in join_all(sends).await {
            match outcome {
                None => {
                    debug!(
                        device_id = %target.device_id,
                        platform = target.platform.as_db(),
                        "no push client for platform, skipping"
                    );
                    report.skipped += 1;
                }
                Some(Ok(())) => {
                    report.attempted += 1;
                    report.delivered += 1;
                }
                Some(Err(err)) => {
                    report.attempted += 1;
                    warn!(
                        device_id = %target.device_id,
                        token = %token_fingerprint(&target.token),
                        kind = payload.kind.type_name(),
                        error = %err,
                        "push delivery failed"
                    );
                    if err.is_permanent() {
                        self.forget_token(target).await;
                    }
                    report.failures.push(DeliveryFailure {
                        device_id: target.device_id,
                        error: err,
                    });
                }
            }
        }
        report
    }

    async fn forget_token(&self, target: &PushTarget) {
        match self.devices.delete_by_push_token(&target.token).await {
            Ok(removed) => info!(
                device_id = %target.device_id,
                token = %token_fingerprint(&target.token),
                removed,
                "removed devices with invalid push token"
            ),
            Err(err) => warn!(
                device_id = %target.device_id,
                error = ?err,
                "failed to remove invalid push token"
            ),
        }
    }
}
