//! Share grants for devices and switches.
//!
//! A grant is keyed by (target id, recipient user id). The recipient is found
//! by phone number among registered customers.

use crate::client::{Query, RestClientError, Store};
use crate::models::rows::{
    Customer, Device, DeviceId, DeviceShare, NewDeviceShare, NewSwitchShare, ShareId, Switch, SwitchId, SwitchShare,
    UserId, tables,
};
use crate::services::switches;
use chrono::Utc;
use log::info;
use std::collections::BTreeSet;

#[derive(Debug)]
pub enum ShareError {
    MissingPhone,
    RecipientNotFound(String),
    SelfShare,
    AlreadyShared(String),
    NotOwner(String),
    Store(RestClientError),
}

impl core::fmt::Display for ShareError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ShareError::MissingPhone => write!(f, "Please enter a valid phone number."),
            ShareError::RecipientNotFound(_) => write!(f, "User with this phone number not found."),
            ShareError::SelfShare => write!(f, "You cannot share with yourself."),
            ShareError::AlreadyShared(name) => write!(f, "Already shared with {}.", name),
            ShareError::NotOwner(s) => write!(f, "{}", s),
            ShareError::Store(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for ShareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShareError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RestClientError> for ShareError {
    fn from(e: RestClientError) -> Self {
        ShareError::Store(e)
    }
}

/// Who a grant went to, for confirmations.
#[derive(Debug, Clone, PartialEq)]
pub struct Granted {
    pub share_id: ShareId,
    pub recipient: Customer,
}

fn recipient<S: Store>(store: &S, sharer: UserId, phone: &str) -> Result<Customer, ShareError> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err(ShareError::MissingPhone);
    }
    let found: Option<Customer> = store.select_one(tables::CUSTOMERS, &Query::new().eq("phone_number", phone))?;
    let customer = found.ok_or_else(|| ShareError::RecipientNotFound(phone.to_string()))?;
    if customer.id == sharer {
        return Err(ShareError::SelfShare);
    }
    Ok(customer)
}

fn first_id(rows: Vec<serde_json::Value>) -> Result<ShareId, ShareError> {
    rows.first()
        .and_then(|r| r.get("id"))
        .and_then(|v| v.as_i64())
        .map(ShareId)
        .ok_or_else(|| ShareError::Store(RestClientError::Json("grant insert returned no id".into())))
}

pub fn share_device<S: Store>(store: &S, owner: UserId, device: DeviceId, phone: &str) -> Result<Granted, ShareError> {
    let owned: Option<Device> = store.select_one(
        tables::DEVICES,
        &Query::new().eq("id", device).eq("allocated_to_customer_id", owner),
    )?;
    if owned.is_none() {
        return Err(ShareError::NotOwner(format!("Device {} is not one of your devices.", device)));
    }
    let to = recipient(store, owner, phone)?;
    let existing: Option<DeviceShare> = store.select_one(
        tables::DEVICE_SHARES,
        &Query::new().eq("device_id", device).eq("shared_with_user_id", to.id),
    )?;
    if existing.is_some() {
        return Err(ShareError::AlreadyShared(to.full_name));
    }
    let created = store.insert(
        tables::DEVICE_SHARES,
        &NewDeviceShare {
            device_id: device,
            shared_with_user_id: to.id,
            shared_at: Utc::now(),
        },
    )?;
    let share_id = first_id(created)?;
    info!("Device {} shared with user {}", device, to.id);
    Ok(Granted {
        share_id,
        recipient: to,
    })
}

pub fn share_switch<S: Store>(store: &S, owner: UserId, switch: SwitchId, phone: &str) -> Result<Granted, ShareError> {
    switches::owned_switch(store, owner, switch).map_err(ShareError::NotOwner)?;
    let to = recipient(store, owner, phone)?;
    let existing: Option<SwitchShare> = store.select_one(
        tables::SWITCH_SHARES,
        &Query::new().eq("switch_id", switch).eq("shared_with_user_id", to.id),
    )?;
    if existing.is_some() {
        return Err(ShareError::AlreadyShared(to.full_name));
    }
    let created = store.insert(
        tables::SWITCH_SHARES,
        &NewSwitchShare {
            switch_id: switch,
            shared_with_user_id: to.id,
            shared_at: Utc::now(),
        },
    )?;
    let share_id = first_id(created)?;
    info!("Switch {} shared with user {}", switch, to.id);
    Ok(Granted {
        share_id,
        recipient: to,
    })
}

/// Removes a device grant. Either side of the grant may revoke it.
pub fn revoke_device_share<S: Store>(store: &S, user: UserId, id: ShareId) -> Result<(), ShareError> {
    let grant: DeviceShare = store
        .select_one(tables::DEVICE_SHARES, &Query::new().eq("id", id))?
        .ok_or_else(|| ShareError::NotOwner(format!("Share {} does not exist.", id)))?;
    if grant.shared_with_user_id != user {
        let owned: Option<Device> = store.select_one(
            tables::DEVICES,
            &Query::new().eq("id", grant.device_id).eq("allocated_to_customer_id", user),
        )?;
        if owned.is_none() {
            return Err(ShareError::NotOwner(format!("Share {} is not yours to revoke.", id)));
        }
    }
    store.delete(tables::DEVICE_SHARES, &Query::new().eq("id", id))?;
    info!("Revoked device share {}", id);
    Ok(())
}

pub fn revoke_switch_share<S: Store>(store: &S, user: UserId, id: ShareId) -> Result<(), ShareError> {
    let grant: SwitchShare = store
        .select_one(tables::SWITCH_SHARES, &Query::new().eq("id", id))?
        .ok_or_else(|| ShareError::NotOwner(format!("Share {} does not exist.", id)))?;
    if grant.shared_with_user_id != user {
        switches::owned_switch(store, user, grant.switch_id)
            .map_err(|_| ShareError::NotOwner(format!("Share {} is not yours to revoke.", id)))?;
    }
    store.delete(tables::SWITCH_SHARES, &Query::new().eq("id", id))?;
    info!("Revoked switch share {}", id);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentDeviceShare {
    pub share: DeviceShare,
    pub device: Device,
    pub recipient: Option<Customer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedDevice {
    pub share: DeviceShare,
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedSwitch {
    pub share: SwitchShare,
    pub switch: Switch,
}

fn customers_by_id<S: Store>(store: &S, ids: BTreeSet<UserId>) -> Result<Vec<Customer>, ShareError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store.select(tables::CUSTOMERS, &Query::new().is_in("id", ids))?)
}

/// Grants on the owner's devices, newest first.
pub fn sent_device_shares<S: Store>(store: &S, owner: UserId) -> Result<Vec<SentDeviceShare>, ShareError> {
    let devices: Vec<Device> = store.select(tables::DEVICES, &Query::new().eq("allocated_to_customer_id", owner))?;
    if devices.is_empty() {
        return Ok(Vec::new());
    }
    let shares: Vec<DeviceShare> = store.select(
        tables::DEVICE_SHARES,
        &Query::new()
            .is_in("device_id", devices.iter().map(|d| d.id))
            .order_by("shared_at", false),
    )?;
    let people = customers_by_id(store, shares.iter().map(|s| s.shared_with_user_id).collect())?;
    Ok(shares
        .into_iter()
        .filter_map(|share| {
            let device = devices.iter().find(|d| d.id == share.device_id)?.clone();
            let recipient = people.iter().find(|c| c.id == share.shared_with_user_id).cloned();
            Some(SentDeviceShare {
                share,
                device,
                recipient,
            })
        })
        .collect())
}

pub fn received_devices<S: Store>(store: &S, user: UserId) -> Result<Vec<ReceivedDevice>, ShareError> {
    let shares: Vec<DeviceShare> = store.select(
        tables::DEVICE_SHARES,
        &Query::new().eq("shared_with_user_id", user).order_by("shared_at", false),
    )?;
    if shares.is_empty() {
        return Ok(Vec::new());
    }
    let devices: Vec<Device> = store.select(
        tables::DEVICES,
        &Query::new().is_in("id", shares.iter().map(|s| s.device_id)),
    )?;
    Ok(shares
        .into_iter()
        .filter_map(|share| {
            let device = devices.iter().find(|d| d.id == share.device_id)?.clone();
            Some(ReceivedDevice { share, device })
        })
        .collect())
}

pub fn received_switches<S: Store>(store: &S, user: UserId) -> Result<Vec<ReceivedSwitch>, ShareError> {
    let shares: Vec<SwitchShare> = store.select(
        tables::SWITCH_SHARES,
        &Query::new().eq("shared_with_user_id", user).order_by("shared_at", false),
    )?;
    if shares.is_empty() {
        return Ok(Vec::new());
    }
    let found: Vec<Switch> = store.select(
        tables::SWITCHES,
        &Query::new().is_in("id", shares.iter().map(|s| s.switch_id)),
    )?;
    Ok(shares
        .into_iter()
        .filter_map(|share| {
            let switch = found.iter().find(|s| s.id == share.switch_id)?.clone();
            Some(ReceivedSwitch { share, switch })
        })
        .collect())
}
