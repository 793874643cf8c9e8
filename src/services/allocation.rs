//! Commits a claim: marks the device owned and creates its companion switch.

use crate::client::{Query, RestClientError, Store};
use crate::models::rows::{AllocationPatch, DeviceId, NewSwitch, Switch, tables};
use crate::services::prompt::ClaimRequest;
use crate::session::SessionUser;
use chrono::Utc;
use log::{error, info, warn};

pub const SWITCH_WARNING: &str =
    "Device allocated successfully, but failed to create switch. You can add it manually later.";
pub const STALE_SHARES_WARNING: &str = "Device allocated, but earlier sharing records could not be cleared.";

#[derive(Debug)]
pub enum AllocationError {
    /// The primary write failed; nothing was changed.
    Write(RestClientError),
    /// The write succeeded but matched no row (code vanished meanwhile).
    NoSuchDevice(String),
}

impl core::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AllocationError::Write(e) => write!(f, "allocation write failed: {}", e),
            AllocationError::NoSuchDevice(code) => write!(f, "no device with code {}", code),
        }
    }
}

impl std::error::Error for AllocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocationError::Write(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwitchOutcome {
    NotRequested,
    Created(Switch),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationReport {
    pub device_code: String,
    /// False when the remote schema rejected the placement columns.
    pub placement_applied: bool,
    pub switch: SwitchOutcome,
    pub warnings: Vec<String>,
}

impl AllocationReport {
    pub fn success_message(&self, name: Option<&str>, category: Option<&str>) -> String {
        match (category, name) {
            (Some(c), _) if matches!(self.switch, SwitchOutcome::Created(_)) => {
                format!("Device allocated and {} switch created successfully!", c)
            }
            (_, Some(n)) => format!("Device \"{}\" has been successfully added to your house!", n),
            _ => format!("Device {} has been successfully allocated to your house!", self.device_code),
        }
    }
}

pub fn allocate<S: Store>(
    store: &S,
    user: &SessionUser,
    device_id: DeviceId,
    req: &ClaimRequest,
) -> Result<AllocationReport, AllocationError> {
    let patch = AllocationPatch {
        allocated_to_customer_id: user.id,
        allocated_to_customer_name: user.name.clone(),
        allocated_at: Utc::now(),
        device_name: req.name.clone(),
        device_icon: req.icon.clone(),
        house_id: Some(req.house_id),
        room_id: Some(req.room_id),
    };
    let by_code = Query::new().eq("device_code", &req.device_code);

    let mut placement_applied = patch.has_placement();
    let updated = match store.update(tables::DEVICES, &by_code, &patch) {
        Ok(rows) => rows,
        Err(e) if e.is_schema_mismatch() && patch.has_placement() => {
            warn!(
                "Device {}: placement columns rejected ({}); retrying without them",
                req.device_code, e
            );
            placement_applied = false;
            store
                .update(tables::DEVICES, &by_code, &patch.without_placement())
                .map_err(|e| {
                    error!("Error allocating device (retry without location fields): {}", e);
                    AllocationError::Write(e)
                })?
        }
        Err(e) => {
            error!("Error allocating device {}: {}", req.device_code, e);
            return Err(AllocationError::Write(e));
        }
    };
    if updated.is_empty() {
        return Err(AllocationError::NoSuchDevice(req.device_code.clone()));
    }
    info!("Device {} allocated to user {}", req.device_code, user.id);

    let mut warnings = Vec::new();

    // Grants from a previous owner must not survive the ownership change.
    match store.delete(tables::DEVICE_SHARES, &Query::new().eq("device_id", device_id)) {
        Ok(removed) if !removed.is_empty() => {
            info!("Cleared {} stale share grant(s) on device {}", removed.len(), device_id)
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Could not clear share grants on device {}: {}", device_id, e);
            warnings.push(STALE_SHARES_WARNING.to_string());
        }
    }

    let switch = create_switch(store, req);
    if let SwitchOutcome::Failed(_) = switch {
        warnings.push(SWITCH_WARNING.to_string());
    }

    Ok(AllocationReport {
        device_code: req.device_code.clone(),
        placement_applied,
        switch,
        warnings,
    })
}

fn create_switch<S: Store>(store: &S, req: &ClaimRequest) -> SwitchOutcome {
    if req.category.trim().is_empty() {
        return SwitchOutcome::NotRequested;
    }
    let row = NewSwitch {
        room_id: req.room_id,
        electronic_object: req.category.clone(),
        is_active: false,
    };
    match store.insert::<_, Switch>(tables::SWITCHES, &row) {
        Ok(mut created) if !created.is_empty() => {
            let sw = created.swap_remove(0);
            info!("Created {} switch {} in room {}", sw.electronic_object, sw.id, sw.room_id);
            SwitchOutcome::Created(sw)
        }
        Ok(_) => SwitchOutcome::Failed("insert returned no row".to_string()),
        Err(e) => {
            error!("Error creating switch: {}", e);
            SwitchOutcome::Failed(e.to_string())
        }
    }
}
