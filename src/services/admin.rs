//! Staff operations: device inventory and account management.
//!
//! Callers gate these on the session role; see `cli`.

use crate::client::{Query, Store};
use crate::models::rows::{
    Customer, Device, DeviceId, Employee, EmployeeLoginLog, M2mPatch, NewDevice, UserId, tables,
};
use crate::utils::{generate_device_code, validate_m2m_number};
use log::{debug, info, warn};
use rand::Rng;
use std::collections::HashSet;

/// Rows per insert request. Larger counts go out as several requests.
pub const MAX_BATCH: usize = 500;

/// Inserts `count` fresh unowned devices. The QR payload is the code itself.
///
/// Batches are written in order; if one fails, the error says how many
/// devices were already saved.
pub fn generate_devices<S: Store, R: Rng + ?Sized>(store: &S, rng: &mut R, count: usize) -> Result<Vec<Device>, String> {
    if count == 0 {
        return Err("Please enter a valid number of devices to generate.".to_string());
    }
    let mut seen = HashSet::with_capacity(count);
    let mut codes: Vec<String> = Vec::with_capacity(count);
    while codes.len() < count {
        let code = generate_device_code(rng);
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }

    let batches = count.div_ceil(MAX_BATCH);
    let mut created: Vec<Device> = Vec::with_capacity(count);
    for (n, chunk) in codes.chunks(MAX_BATCH).enumerate() {
        let rows: Vec<NewDevice> = chunk
            .iter()
            .map(|code| NewDevice {
                qr_code: code.clone(),
                device_code: code.clone(),
                is_active: true,
            })
            .collect();
        let saved: Vec<Device> = store.insert(tables::DEVICES, rows.as_slice()).map_err(|e| {
            format!(
                "Failed to generate devices (batch {} of {}, {} already saved): {}",
                n + 1,
                batches,
                created.len(),
                e
            )
        })?;
        debug!("Batch {}/{}: {} device(s) inserted", n + 1, batches, saved.len());
        created.extend(saved);
    }
    info!("{} device(s) generated", created.len());
    Ok(created)
}

pub fn find_device<S: Store>(store: &S, id: DeviceId) -> Result<Device, String> {
    store
        .select_one(tables::DEVICES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to fetch device: {}", e))?
        .ok_or_else(|| format!("Device {} does not exist.", id))
}

pub fn list_devices<S: Store>(store: &S) -> Result<Vec<Device>, String> {
    store
        .select(tables::DEVICES, &Query::new().order_by("created_at", false))
        .map_err(|e| format!("Failed to fetch devices: {}", e))
}

pub fn set_m2m_number<S: Store>(store: &S, id: DeviceId, raw: &str) -> Result<Option<String>, String> {
    let number = validate_m2m_number(raw)?;
    let rows = store
        .update(
            tables::DEVICES,
            &Query::new().eq("id", id),
            &M2mPatch {
                device_m2m_number: number.clone(),
            },
        )
        .map_err(|e| format!("Failed to update M2M number: {}", e))?;
    if rows.is_empty() {
        return Err(format!("Device {} does not exist.", id));
    }
    Ok(number)
}

/// Hard delete. Share grants go first so no grant points at a missing device.
pub fn delete_device<S: Store>(store: &S, id: DeviceId) -> Result<(), String> {
    if let Err(e) = store.delete(tables::DEVICE_SHARES, &Query::new().eq("device_id", id)) {
        warn!("Failed to delete share grants for device {}: {}", id, e);
    }
    let removed = store
        .delete(tables::DEVICES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete device: {}", e))?;
    if removed.is_empty() {
        return Err(format!("Device {} does not exist.", id));
    }
    info!("Deleted device {}", id);
    Ok(())
}

pub fn list_customers<S: Store>(store: &S) -> Result<Vec<Customer>, String> {
    store
        .select(tables::CUSTOMERS, &Query::new().order_by("created_at", false))
        .map_err(|e| format!("Failed to fetch customers: {}", e))
}

pub fn delete_customer<S: Store>(store: &S, id: UserId) -> Result<(), String> {
    let removed = store
        .delete(tables::CUSTOMERS, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete customer: {}", e))?;
    if removed.is_empty() {
        return Err(format!("Customer {} does not exist.", id));
    }
    info!("Deleted customer {}", id);
    Ok(())
}

pub fn list_employees<S: Store>(store: &S) -> Result<Vec<Employee>, String> {
    store
        .select(tables::EMPLOYEES, &Query::new().order_by("created_at", false))
        .map_err(|e| format!("Failed to fetch employees: {}", e))
}

pub fn delete_employee<S: Store>(store: &S, id: UserId) -> Result<(), String> {
    let removed = store
        .delete(tables::EMPLOYEES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete employee: {}", e))?;
    if removed.is_empty() {
        return Err(format!("Employee {} does not exist.", id));
    }
    info!("Deleted employee {}", id);
    Ok(())
}

pub fn login_logs<S: Store>(store: &S, limit: usize) -> Result<Vec<EmployeeLoginLog>, String> {
    store
        .select(
            tables::EMPLOYEE_LOGIN_LOGS,
            &Query::new().order_by("login_time", false).limit(limit),
        )
        .map_err(|e| format!("Failed to fetch login logs: {}", e))
}
