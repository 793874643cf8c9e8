//! A customer's own devices: listing, renaming and releasing ownership.

use crate::client::{Query, Store};
use crate::models::rows::{Device, DeviceId, DeviceNamePatch, ReleasePatch, UserId, tables};
use crate::services::prompt::MAX_DEVICE_NAME_LEN;
use log::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    pub warnings: Vec<String>,
}

pub fn list_owned<S: Store>(store: &S, owner: UserId) -> Result<Vec<Device>, String> {
    store
        .select(
            tables::DEVICES,
            &Query::new()
                .eq("allocated_to_customer_id", owner)
                .order_by("allocated_at", false),
        )
        .map_err(|e| format!("Failed to fetch devices: {}", e))
}

fn owned_device<S: Store>(store: &S, owner: UserId, id: DeviceId) -> Result<Device, String> {
    let device: Option<Device> = store
        .select_one(
            tables::DEVICES,
            &Query::new().eq("id", id).eq("allocated_to_customer_id", owner),
        )
        .map_err(|e| format!("Failed to fetch device {}: {}", id, e))?;
    device.ok_or_else(|| format!("Device {} is not one of your devices.", id))
}

/// Sets the display name; a blank name clears it back to the code.
pub fn rename<S: Store>(store: &S, owner: UserId, id: DeviceId, name: &str) -> Result<Option<String>, String> {
    owned_device(store, owner, id)?;
    let trimmed = name.trim();
    if trimmed.chars().count() > MAX_DEVICE_NAME_LEN {
        return Err(format!("Device names are at most {} characters.", MAX_DEVICE_NAME_LEN));
    }
    let device_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
    store
        .update(
            tables::DEVICES,
            &Query::new().eq("id", id),
            &DeviceNamePatch {
                device_name: device_name.clone(),
            },
        )
        .map_err(|e| format!("Failed to update device name: {}", e))?;
    info!("Device {} renamed to {:?}", id, device_name);
    Ok(device_name)
}

/// Returns one device to the unowned pool, dropping its share grants first.
pub fn release<S: Store>(store: &S, owner: UserId, id: DeviceId) -> Result<ReleaseReport, String> {
    owned_device(store, owner, id)?;
    let mut warnings = Vec::new();
    if let Err(e) = store.delete(tables::DEVICE_SHARES, &Query::new().eq("device_id", id)) {
        warn!("Failed to delete share grants for device {}: {}", id, e);
        warnings.push(format!("Share grants for device {} could not be removed.", id));
    }
    let rows = store
        .update(tables::DEVICES, &Query::new().eq("id", id), &ReleasePatch::default())
        .map_err(|e| format!("Failed to release device {}: {}", id, e))?;
    info!("Device {} released by user {}", id, owner);
    Ok(ReleaseReport {
        released: rows.len(),
        warnings,
    })
}

pub fn release_all<S: Store>(store: &S, owner: UserId) -> Result<ReleaseReport, String> {
    let devices = list_owned(store, owner)?;
    if devices.is_empty() {
        return Ok(ReleaseReport {
            released: 0,
            warnings: Vec::new(),
        });
    }
    let mut warnings = Vec::new();
    let ids: Vec<DeviceId> = devices.iter().map(|d| d.id).collect();
    if let Err(e) = store.delete(tables::DEVICE_SHARES, &Query::new().is_in("device_id", ids)) {
        warn!("Failed to delete share grants for user {}'s devices: {}", owner, e);
        warnings.push("Share grants could not be removed.".to_string());
    }
    let rows = store
        .update(
            tables::DEVICES,
            &Query::new().eq("allocated_to_customer_id", owner),
            &ReleasePatch::default(),
        )
        .map_err(|e| format!("Failed to release devices: {}", e))?;
    info!("Released {} device(s) for user {}", rows.len(), owner);
    Ok(ReleaseReport {
        released: rows.len(),
        warnings,
    })
}
