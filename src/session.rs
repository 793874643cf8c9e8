//! Signed-in user profile, cached on disk between invocations.
//!
//! The OTP backend issues no token, so the cached profile is the whole session.
//! `Session::init` hydrates it; `sign_out` tears it down.

use crate::models::rows::UserId;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
    Superadmin,
}

impl Role {
    pub fn parse(s: &str) -> Result<Role, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            "superadmin" | "super-admin" => Ok(Role::Superadmin),
            other => Err(format!("unknown role: {}", other)),
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
    pub phone_number: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a signed-out session; a corrupt one is discarded.
    pub fn load(&self) -> Result<Option<SessionUser>, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", self.path.display(), e)),
        };
        match serde_json::from_str::<SessionUser>(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!("Discarding unreadable session file {}: {}", self.path.display(), e);
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn save(&self, user: &SessionUser) -> Result<(), String> {
        let json = serde_json::to_string_pretty(user).map_err(|e| format!("serialize session failed: {}", e))?;
        fs::write(&self.path, json).map_err(|e| format!("failed to write {}: {}", self.path.display(), e))
    }

    pub fn clear(&self) -> Result<(), String> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to remove {}: {}", self.path.display(), e)),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    store: SessionStore,
    user: Option<SessionUser>,
}

impl Session {
    pub fn init(store: SessionStore) -> Result<Self, String> {
        let user = store.load()?;
        if let Some(u) = &user {
            info!("Session restored for {} ({})", u.name, u.role);
        }
        Ok(Session { store, user })
    }

    pub fn current(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn require(&self) -> Result<&SessionUser, String> {
        self.user
            .as_ref()
            .ok_or_else(|| "You must be logged in to do this.".to_string())
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<&SessionUser, String> {
        let user = self.require()?;
        if allowed.contains(&user.role) {
            Ok(user)
        } else {
            Err(format!("This action is not available to a {} account.", user.role))
        }
    }

    pub fn sign_in(&mut self, user: SessionUser) -> Result<(), String> {
        self.store.save(&user)?;
        info!("Signed in as {} ({})", user.name, user.role);
        self.user = Some(user);
        Ok(())
    }

    pub fn sign_out(&mut self) -> Result<(), String> {
        self.store.clear()?;
        if let Some(u) = self.user.take() {
            info!("Signed out {}", u.name);
        }
        Ok(())
    }
}
