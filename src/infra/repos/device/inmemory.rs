use anyhow::Result;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

use super::DeviceRepo;
use crate::domain::device::{dedup_targets, Device, DeviceRegistration, PushTarget};

pub struct InMemoryDeviceRepo {
    devices: Mutex<Vec<Device>>,
}

impl InMemoryDeviceRepo {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Device>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a row as given, bypassing the registration rules in `upsert`.
    /// Lets a store be loaded with rows written before those rules existed.
    pub fn seed(&self, device: Device) {
        self.lock().push(device);
    }

    fn targets<F: Fn(&Device) -> bool>(&self, keep: F) -> Vec<PushTarget> {
        let mut devices: Vec<Device> = self
            .lock()
            .iter()
            .filter(|d| !d.push_token.is_empty() && keep(d))
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        dedup_targets(devices.iter().map(PushTarget::from))
    }
}

impl Default for InMemoryDeviceRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceRepo for InMemoryDeviceRepo {
    async fn upsert(&self, registration: &DeviceRegistration, now: OffsetDateTime) -> Result<Device> {
        let mut devices = self.lock();

        devices.retain(|d| {
            let owned_elsewhere = d.device_identifier == registration.device_identifier
                && d.user_id != registration.user_id;
            let reinstall_duplicate = d.user_id == registration.user_id
                && d.push_token == registration.push_token
                && d.device_identifier != registration.device_identifier;
            !owned_elsewhere && !reinstall_duplicate
        });

        if let Some(existing) = devices
            .iter_mut()
            .find(|d| d.device_identifier == registration.device_identifier)
        {
            existing.platform = registration.platform;
            existing.push_token = registration.push_token.clone();
            if registration.device_name.is_some() {
                existing.device_name = registration.device_name.clone();
            }
            if registration.app_version.is_some() {
                existing.app_version = registration.app_version.clone();
            }
            if registration.os_version.is_some() {
                existing.os_version = registration.os_version.clone();
            }
            existing.last_seen_at = now;
            return Ok(existing.clone());
        }

        let device = Device {
            id: Uuid::new_v4(),
            user_id: registration.user_id,
            device_identifier: registration.device_identifier.clone(),
            platform: registration.platform,
            push_token: registration.push_token.clone(),
            device_name: registration.device_name.clone(),
            app_version: registration.app_version.clone(),
            os_version: registration.os_version.clone(),
            last_seen_at: now,
            created_at: now,
        };
        devices.push(device.clone());
        Ok(device)
    }

    async fn find(&self, device_id: Uuid) -> Result<Option<Device>> {
        Ok(self.lock().iter().find(|d| d.id == device_id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .lock()
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(devices)
    }

    async fn delete(&self, user_id: Uuid, device_id: Uuid) -> Result<bool> {
        let mut devices = self.lock();
        let before = devices.len();
        devices.retain(|d| !(d.id == device_id && d.user_id == user_id));
        Ok(devices.len() < before)
    }

    async fn delete_by_push_token(&self, push_token: &str) -> Result<u64> {
        let mut devices = self.lock();
        let before = devices.len();
        devices.retain(|d| d.push_token != push_token);
        Ok((before - devices.len()) as u64)
    }

    async fn delete_stale(&self, last_seen_before: OffsetDateTime) -> Result<u64> {
        let mut devices = self.lock();
        let before = devices.len();
        devices.retain(|d| d.last_seen_at >= last_seen_before);
        Ok((before - devices.len()) as u64)
    }

    async fn touch(&self, device_id: Uuid, now: OffsetDateTime) -> Result<()> {
        if let Some(device) = self.lock().iter_mut().find(|d| d.id == device_id) {
            device.last_seen_at = now;
        }
        Ok(())
    }

    async fn get_all_push_tokens(&self, user_id: Uuid) -> Result<Vec<PushTarget>> {
        Ok(self.targets(|d| d.user_id == user_id))
    }

    async fn get_push_tokens_excluding(&self, user_id: Uuid, device_id: Uuid) -> Result<Vec<PushTarget>> {
        let excluded_token = self
            .lock()
            .iter()
            .find(|d| d.id == device_id)
            .map(|d| d.push_token.clone());

        Ok(self.targets(|d| {
            d.user_id == user_id
                && d.id != device_id
                && excluded_token.as_deref() != Some(d.push_token.as_str())
        }))
    }
}
