//! Row types for the hosted smart-switch tables.
//!
//! Scope: types only. Query plumbing lives in `crate::client`.
//!
//! Notes
//! - Read rows keep every nullable column as `Option` and tolerate missing keys.
//! - Write payloads are separate structs so that `None` can mean either "leave
//!   untouched" (skipped) or "set to null" (serialized), depending on the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp columns arrive either as `timestamptz` (RFC 3339 with offset) or
/// as bare `timestamp` (no offset, assumed UTC).
mod ts {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
            .map(|n| n.and_utc())
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp: {}", raw))),
        }
    }

    pub fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp: {}", raw)))
    }
}

// =====================
// Table names
// =====================

pub mod tables {
    pub const DEVICES: &str = "devices";
    pub const SWITCHES: &str = "switches";
    pub const DEVICE_SHARES: &str = "device_shared_with";
    pub const SWITCH_SHARES: &str = "switch_shared_with";
    pub const HOUSES: &str = "houses";
    pub const ROOMS: &str = "rooms";
    pub const CUSTOMERS: &str = "signup_users";
    pub const EMPLOYEES: &str = "employee_data";
    pub const EMPLOYEE_LOGIN_LOGS: &str = "employee_login_logs";
    pub const SUPER_ADMINS: &str = "super_admins";
}

// =====================
// Scalar ID newtype wrappers
// =====================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareId(pub i64);

macro_rules! display_id {
    ($($t:ty),*) => {
        $(impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(DeviceId, SwitchId, HouseId, RoomId, UserId, ShareId);

// =====================
// Devices
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub device_code: String,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub allocated_to_customer_id: Option<UserId>,
    #[serde(default)]
    pub allocated_to_customer_name: Option<String>,
    #[serde(default, deserialize_with = "ts::option")]
    pub allocated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub device_icon: Option<String>,
    #[serde(default)]
    pub device_m2m_number: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub house_id: Option<HouseId>,
    #[serde(default)]
    pub electronic_object: Option<String>,
    #[serde(default)]
    pub switch_is_active: Option<bool>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn owner(&self) -> Option<UserId> {
        self.allocated_to_customer_id
    }

    /// Name shown in listings: display name if set, else the code.
    pub fn label(&self) -> &str {
        self.device_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.device_code)
    }
}

/// Bulk-provisioned inventory row, unowned on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub device_code: String,
    pub qr_code: String,
    pub is_active: bool,
}

/// Ownership patch written by a claim. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPatch {
    pub allocated_to_customer_id: UserId,
    pub allocated_to_customer_name: String,
    pub allocated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_id: Option<HouseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl AllocationPatch {
    pub fn has_placement(&self) -> bool {
        self.house_id.is_some() || self.room_id.is_some()
    }

    pub fn without_placement(&self) -> Self {
        AllocationPatch {
            house_id: None,
            room_id: None,
            ..self.clone()
        }
    }
}

/// Returns a device to the unowned pool. Every field is written, as null.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReleasePatch {
    pub allocated_to_customer_id: Option<UserId>,
    pub allocated_to_customer_name: Option<String>,
    pub allocated_at: Option<DateTime<Utc>>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceNamePatch {
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct M2mPatch {
    pub device_m2m_number: Option<String>,
}

// =====================
// Switches
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub id: SwitchId,
    pub room_id: RoomId,
    pub electronic_object: String,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Switch {
    pub fn is_on(&self) -> bool {
        self.is_active.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSwitch {
    pub room_id: RoomId,
    pub electronic_object: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchStatePatch {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchLabelPatch {
    pub electronic_object: String,
}

// =====================
// Share grants
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceShare {
    pub id: ShareId,
    pub device_id: DeviceId,
    pub shared_with_user_id: UserId,
    #[serde(default, deserialize_with = "ts::option")]
    pub shared_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewDeviceShare {
    pub device_id: DeviceId,
    pub shared_with_user_id: UserId,
    pub shared_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchShare {
    pub id: ShareId,
    pub switch_id: SwitchId,
    pub shared_with_user_id: UserId,
    #[serde(default, deserialize_with = "ts::option")]
    pub shared_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewSwitchShare {
    pub switch_id: SwitchId,
    pub shared_with_user_id: UserId,
    pub shared_at: DateTime<Utc>,
}

// =====================
// Houses / rooms
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    pub house_name: String,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewHouse {
    pub user_id: UserId,
    pub house_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HouseNamePatch {
    pub house_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub house_id: HouseId,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Room {
    pub fn label(&self) -> &str {
        self.room_type.as_deref().unwrap_or("(unnamed room)")
    }
}

/// Used for both inserts and edits; rooms are always written whole.
#[derive(Debug, Clone, Serialize)]
pub struct RoomFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_id: Option<HouseId>,
    pub room_type: String,
    pub description: Option<String>,
}

// =====================
// Accounts
// =====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: UserId,
    pub full_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCustomer {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: UserId,
    pub employee_id: String,
    pub full_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeLoginLog {
    pub id: i64,
    pub employee_id: String,
    #[serde(deserialize_with = "ts::required")]
    pub login_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEmployeeLoginLog {
    pub employee_id: String,
    pub login_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperAdmin {
    pub id: UserId,
    pub full_name: String,
    pub phone_number: String,
    #[serde(default, deserialize_with = "ts::option")]
    pub created_at: Option<DateTime<Utc>>,
}
