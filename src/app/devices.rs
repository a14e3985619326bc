use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::app::error::ServiceError;
use crate::domain::device::{Device, DeviceRegistration, PushTarget};
use crate::infra::clock::Clock;
use crate::infra::push::token_fingerprint;
use crate::infra::repos::DeviceRepo;

const MAX_IDENTIFIER_LEN: usize = 255;
const MAX_PUSH_TOKEN_LEN: usize = 4096;

#[derive(Clone)]
pub struct DeviceService {
    devices: Arc<dyn DeviceRepo>,
    clock: Arc<dyn Clock>,
}

impl DeviceService {
    pub fn new(devices: Arc<dyn DeviceRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { devices, clock }
    }

    pub async fn register(&self, mut registration: DeviceRegistration) -> Result<Device, ServiceError> {
        registration.device_identifier = registration.device_identifier.trim().to_string();
        registration.push_token = registration.push_token.trim().to_string();

        if registration.device_identifier.is_empty() {
            return Err(ServiceError::invalid("device_identifier must not be empty"));
        }
        if registration.device_identifier.len() > MAX_IDENTIFIER_LEN {
            return Err(ServiceError::invalid("device_identifier is too long"));
        }
        if registration.push_token.is_empty() {
            return Err(ServiceError::invalid("push_token must not be empty"));
        }
        if registration.push_token.len() > MAX_PUSH_TOKEN_LEN {
            return Err(ServiceError::invalid("push_token is too long"));
        }

        let device = self.devices.upsert(&registration, self.clock.now()).await?;
        info!(
            user_id = %device.user_id,
            device_id = %device.id,
            platform = device.platform.as_db(),
            token = %token_fingerprint(&device.push_token),
            "device registered"
        );
        Ok(device)
    }

    pub async fn unregister(&self, user_id: Uuid, device_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.devices.delete(user_id, device_id).await?)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Device>, ServiceError> {
        Ok(self.devices.list_by_user(user_id).await?)
    }

    pub async fn touch(&self, device_id: Uuid) -> Result<(), ServiceError> {
        Ok(self.devices.touch(device_id, self.clock.now()).await?)
    }

    pub async fn delete_by_push_token(&self, push_token: &str) -> Result<u64, ServiceError> {
        Ok(self.devices.delete_by_push_token(push_token).await?)
    }

    pub async fn get_all_push_tokens(&self, user_id: Uuid) -> Result<Vec<PushTarget>, ServiceError> {
        Ok(self.devices.get_all_push_tokens(user_id).await?)
    }

    pub async fn get_push_tokens_excluding(
        &self,
        user_id: Uuid,
        device_id: Uuid,
    ) -> Result<Vec<PushTarget>, ServiceError> {
        Ok(self.devices.get_push_tokens_excluding(user_id, device_id).await?)
    }
}
