//! Claim orchestrator.
//!
//! Drives one device code from detection to ownership:
//!
//! ```text
//! Idle -> CodeDetected -> AvailabilityChecked -> AwaitingMetadata -> Committing -> Done
//! ```
//!
//! Every transition can land in `Error`. Rejections during lookup fall back to
//! `Idle`; failed commits fall back to `AwaitingMetadata` so the user can retry
//! with the prompt they already filled in. Nothing is written before `commit`.

use crate::client::{Query, RestClientError, Store};
use crate::models::rows::{Device, DeviceId, tables};
use crate::services::allocation::{self, AllocationError, AllocationReport};
use crate::services::prompt::{PlacementPrompt, PromptError, PromptSubmit};
use crate::session::{Role, Session};
use log::{debug, info, warn};

pub const MAX_CODE_LEN: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CodeDetected,
    AvailabilityChecked,
    AwaitingMetadata,
    Committing,
    Done,
    Error,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::CodeDetected => "code-detected",
            Phase::AvailabilityChecked => "availability-checked",
            Phase::AwaitingMetadata => "awaiting-metadata",
            Phase::Committing => "committing",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ClaimError {
    NotFound(String),
    AlreadyOwnedBySelf(String),
    AlreadyOwnedByOther(String),
    NotSignedIn,
    /// Only customer accounts own devices.
    NotCustomer(Role),
    InvalidCode(String),
    InvalidState(Phase),
    Validation(PromptError),
    /// The placement-free retry was rejected by the schema as well.
    SchemaMismatch(RestClientError),
    WriteFailed(RestClientError),
    Lookup(RestClientError),
}

/// User-facing title and description for a failed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub description: String,
}

impl ClaimError {
    pub fn notice(&self) -> Notice {
        let (title, description) = match self {
            ClaimError::NotFound(_) => ("Device not found.", "Please check the device code.".to_string()),
            ClaimError::AlreadyOwnedBySelf(_) => (
                "Already Added.",
                "You have already added this device to your list.".to_string(),
            ),
            ClaimError::AlreadyOwnedByOther(_) => (
                "Device Unavailable",
                "This device has been allocated to another user.".to_string(),
            ),
            ClaimError::NotSignedIn => ("Error", "You must be logged in to add devices.".to_string()),
            ClaimError::NotCustomer(role) => (
                "Error",
                format!("Devices can only be added to a customer account, not a {} account.", role),
            ),
            ClaimError::InvalidCode(why) => ("Invalid code", why.clone()),
            ClaimError::InvalidState(p) => ("Error", format!("A claim cannot do that while {}.", p)),
            ClaimError::Validation(e) => ("Error", e.to_string()),
            ClaimError::SchemaMismatch(_) | ClaimError::WriteFailed(_) => {
                ("Error", "Failed to allocate device. Please try again.".to_string())
            }
            ClaimError::Lookup(_) => ("Error", "Failed to check device availability.".to_string()),
        };
        Notice { title, description }
    }

    /// Rejections that leave the remote rows untouched and need no retry.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClaimError::NotFound(_) | ClaimError::AlreadyOwnedBySelf(_) | ClaimError::AlreadyOwnedByOther(_)
        )
    }
}

impl core::fmt::Display for ClaimError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ClaimError::NotFound(c) => write!(f, "device {} not found", c),
            ClaimError::AlreadyOwnedBySelf(c) => write!(f, "device {} is already yours", c),
            ClaimError::AlreadyOwnedByOther(c) => write!(f, "device {} is owned by another user", c),
            ClaimError::NotSignedIn => write!(f, "not signed in"),
            ClaimError::NotCustomer(role) => write!(f, "{} accounts cannot claim devices", role),
            ClaimError::InvalidCode(why) => write!(f, "invalid code: {}", why),
            ClaimError::InvalidState(p) => write!(f, "operation not allowed in state {}", p),
            ClaimError::Validation(e) => write!(f, "{}", e),
            ClaimError::SchemaMismatch(e) => write!(f, "schema mismatch after retry: {}", e),
            ClaimError::WriteFailed(e) => write!(f, "allocation failed: {}", e),
            ClaimError::Lookup(e) => write!(f, "lookup failed: {}", e),
        }
    }
}

impl std::error::Error for ClaimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClaimError::Validation(e) => Some(e),
            ClaimError::SchemaMismatch(e) | ClaimError::WriteFailed(e) | ClaimError::Lookup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PromptError> for ClaimError {
    fn from(e: PromptError) -> Self {
        ClaimError::Validation(e)
    }
}

/// Normalises typed input: trimmed, uppercased, 1..=16 characters.
pub fn normalize_manual_code(raw: &str) -> Result<String, ClaimError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(ClaimError::InvalidCode("Please enter a device code.".into()));
    }
    let len = code.chars().count();
    if len > MAX_CODE_LEN {
        return Err(ClaimError::InvalidCode(format!(
            "Device codes are at most {} characters, got {}.",
            MAX_CODE_LEN, len
        )));
    }
    Ok(code)
}

struct Pending {
    device_id: DeviceId,
    prompt: PlacementPrompt,
}

pub struct ClaimFlow {
    phase: Phase,
    history: Vec<Phase>,
    pending: Option<Pending>,
    refresh_requested: bool,
}

impl Default for ClaimFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimFlow {
    pub fn new() -> Self {
        ClaimFlow {
            phase: Phase::Idle,
            history: vec![Phase::Idle],
            pending: None,
            refresh_requested: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered since construction, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn pending_code(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.prompt.device_code())
    }

    pub fn prompt(&self) -> Option<&PlacementPrompt> {
        self.pending.as_ref().map(|p| &p.prompt)
    }

    pub fn prompt_mut(&mut self) -> Option<&mut PlacementPrompt> {
        self.pending.as_mut().map(|p| &mut p.prompt)
    }

    /// Returns true once per successful claim, so listings can be reloaded.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh_requested)
    }

    fn enter(&mut self, phase: Phase) {
        debug!("claim: {} -> {}", self.phase, phase);
        self.phase = phase;
        self.history.push(phase);
    }

    fn fail(&mut self, err: ClaimError, fallback: Phase) -> ClaimError {
        warn!("Claim failed in {}: {}", self.phase, err);
        self.enter(Phase::Error);
        if fallback == Phase::Idle {
            self.pending = None;
        }
        self.enter(fallback);
        err
    }

    /// Entry point for codes read by the scanner.
    pub fn submit_scanned<S: Store>(&mut self, store: &S, session: &Session, code: &str) -> Result<(), ClaimError> {
        self.submit(store, session, code.trim().to_string())
    }

    /// Entry point for typed codes.
    pub fn submit_manual<S: Store>(&mut self, store: &S, session: &Session, raw: &str) -> Result<(), ClaimError> {
        let code = normalize_manual_code(raw)?;
        self.submit(store, session, code)
    }

    fn submit<S: Store>(&mut self, store: &S, session: &Session, code: String) -> Result<(), ClaimError> {
        match self.phase {
            Phase::Idle | Phase::Done => {}
            other => return Err(ClaimError::InvalidState(other)),
        }
        if code.is_empty() {
            return Err(ClaimError::InvalidCode("empty code".into()));
        }
        let Some(user) = session.current() else {
            return Err(self.fail(ClaimError::NotSignedIn, Phase::Idle));
        };
        if user.role != Role::Customer {
            return Err(self.fail(ClaimError::NotCustomer(user.role), Phase::Idle));
        }
        self.enter(Phase::CodeDetected);
        info!("Checking availability of device {}", code);

        let device: Option<Device> =
            match store.select_one(tables::DEVICES, &Query::new().eq("device_code", &code).limit(1)) {
                Ok(d) => d,
                Err(e) => return Err(self.fail(ClaimError::Lookup(e), Phase::Idle)),
            };
        let Some(device) = device else {
            return Err(self.fail(ClaimError::NotFound(code), Phase::Idle));
        };
        match device.owner() {
            Some(owner) if owner == user.id => {
                return Err(self.fail(ClaimError::AlreadyOwnedBySelf(code), Phase::Idle));
            }
            Some(_) => return Err(self.fail(ClaimError::AlreadyOwnedByOther(code), Phase::Idle)),
            None => {}
        }
        self.enter(Phase::AvailabilityChecked);

        let prompt = match PlacementPrompt::open(store, user.id, &code) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(ClaimError::Lookup(e), Phase::Idle)),
        };
        self.pending = Some(Pending {
            device_id: device.id,
            prompt,
        });
        self.enter(Phase::AwaitingMetadata);
        Ok(())
    }

    /// Validates the prompt and writes the claim.
    pub fn commit<S: Store>(
        &mut self,
        store: &S,
        session: &Session,
        how: PromptSubmit,
    ) -> Result<AllocationReport, ClaimError> {
        if self.phase != Phase::AwaitingMetadata {
            return Err(ClaimError::InvalidState(self.phase));
        }
        let Some(user) = session.current() else {
            return Err(self.fail(ClaimError::NotSignedIn, Phase::Idle));
        };
        if user.role != Role::Customer {
            return Err(self.fail(ClaimError::NotCustomer(user.role), Phase::Idle));
        }
        let Some(pending) = self.pending.as_ref() else {
            return Err(self.fail(ClaimError::InvalidState(Phase::AwaitingMetadata), Phase::Idle));
        };
        // Validation failures are local; the prompt stays open.
        let request = pending.prompt.submit(how)?;
        let device_id = pending.device_id;

        self.enter(Phase::Committing);
        match allocation::allocate(store, user, device_id, &request) {
            Ok(report) => {
                for w in &report.warnings {
                    warn!("Claim of {}: {}", report.device_code, w);
                }
                self.pending = None;
                self.refresh_requested = true;
                self.enter(Phase::Done);
                Ok(report)
            }
            Err(AllocationError::NoSuchDevice(code)) => Err(self.fail(ClaimError::NotFound(code), Phase::Idle)),
            Err(AllocationError::Write(e)) if e.is_schema_mismatch() => {
                Err(self.fail(ClaimError::SchemaMismatch(e), Phase::AwaitingMetadata))
            }
            Err(AllocationError::Write(e)) => Err(self.fail(ClaimError::WriteFailed(e), Phase::AwaitingMetadata)),
        }
    }

    /// Abandons the pending code. Only valid while the prompt is open.
    pub fn cancel(&mut self) -> Result<(), ClaimError> {
        if self.phase != Phase::AwaitingMetadata {
            return Err(ClaimError::InvalidState(self.phase));
        }
        if let Some(p) = self.pending.take() {
            info!("Claim of {} cancelled", p.prompt.device_code());
        }
        self.enter(Phase::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rows::{HouseId, RoomId, UserId};
    use crate::session::tests::scratch_store;
    use crate::session::SessionUser;
    use crate::test_support::{MemoryStore, Op};
    use serde_json::json;

    const CODE: &str = "ABCD1234EFGH5678";

    fn signed_in(id: i64) -> Session {
        signed_in_as(id, Role::Customer)
    }

    fn signed_in_as(id: i64, role: Role) -> Session {
        let mut session = Session::init(scratch_store()).unwrap();
        session
            .sign_in(SessionUser {
                id: UserId(id),
                name: "Asha".into(),
                phone_number: "+919800000000".into(),
                role,
                employee_id: (role != Role::Customer).then(|| "EMP-1".to_string()),
            })
            .unwrap();
        session
    }

    fn store_with(owner: Option<i64>) -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(
            tables::DEVICES,
            vec![json!({"id": 5, "device_code": CODE, "is_active": true, "allocated_to_customer_id": owner})],
        );
        store.seed(tables::HOUSES, vec![json!({"id": 1, "user_id": 42, "house_name": "Home"})]);
        store.seed(
            tables::ROOMS,
            vec![
                json!({"id": 7, "house_id": 1, "room_type": "Living Room"}),
                json!({"id": 8, "house_id": 1, "room_type": "Kitchen"}),
            ],
        );
        store
    }

    fn fill_prompt(flow: &mut ClaimFlow, store: &MemoryStore) {
        let prompt = flow.prompt_mut().unwrap();
        prompt.select_house(store, Some(HouseId(1))).unwrap();
        prompt.select_room(Some(RoomId(7))).unwrap();
        prompt.select_category(Some("LED Light")).unwrap();
    }

    #[test]
    fn unknown_code_is_not_found_without_writes() {
        let store = MemoryStore::new();
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        let err = flow.submit_scanned(&store, &session, CODE).unwrap_err();
        assert!(matches!(err, ClaimError::NotFound(_)));
        assert_eq!(err.notice().title, "Device not found.");
        assert_eq!(store.write_count(), 0);
        assert_eq!(flow.phase(), Phase::Idle);
        assert!(flow.pending_code().is_none());
    }

    #[test]
    fn own_device_is_already_added() {
        let store = store_with(Some(42));
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        let err = flow.submit_scanned(&store, &session, CODE).unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyOwnedBySelf(_)));
        assert_eq!(err.notice().title, "Already Added.");
        assert_eq!(store.write_count(), 0);
        assert_eq!(flow.phase(), Phase::Idle);
    }

    #[test]
    fn someone_elses_device_is_unavailable() {
        let store = store_with(Some(77));
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        let err = flow.submit_manual(&store, &session, CODE).unwrap_err();
        assert!(matches!(err, ClaimError::AlreadyOwnedByOther(_)));
        assert!(err.is_rejection());
        assert_eq!(err.notice().title, "Device Unavailable");
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn signed_out_user_is_rejected_before_lookup() {
        let store = store_with(None);
        let session = Session::init(scratch_store()).unwrap();
        let mut flow = ClaimFlow::new();
        let err = flow.submit_scanned(&store, &session, CODE).unwrap_err();
        assert!(matches!(err, ClaimError::NotSignedIn));
        assert!(store.calls().is_empty());
    }

    #[test]
    fn staff_accounts_cannot_claim() {
        let store = store_with(None);
        for role in [Role::Admin, Role::Superadmin] {
            let session = signed_in_as(42, role);
            let mut flow = ClaimFlow::new();
            let err = flow.submit_manual(&store, &session, CODE).unwrap_err();
            assert!(matches!(err, ClaimError::NotCustomer(r) if r == role));
            assert!(err.notice().description.contains("customer account"));
            assert_eq!(flow.phase(), Phase::Idle);
        }
        assert!(store.calls().is_empty());
        assert!(store.row_by_id(tables::DEVICES, 5).unwrap()["allocated_to_customer_id"].is_null());
    }

    #[test]
    fn commit_rechecks_the_account_role() {
        let store = store_with(None);
        let customer = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &customer, CODE).unwrap();
        fill_prompt(&mut flow, &store);

        let admin = signed_in_as(42, Role::Admin);
        let err = flow.commit(&store, &admin, PromptSubmit::Skip).unwrap_err();
        assert!(matches!(err, ClaimError::NotCustomer(Role::Admin)));
        assert_eq!(store.write_count(), 0);
        assert_eq!(flow.phase(), Phase::Idle);
    }

    #[test]
    fn manual_codes_are_normalised() {
        assert_eq!(normalize_manual_code("  abcd1234efgh5678 ").unwrap(), CODE);
        assert!(matches!(normalize_manual_code("   "), Err(ClaimError::InvalidCode(_))));
        assert!(matches!(
            normalize_manual_code("ABCD1234EFGH56789"),
            Err(ClaimError::InvalidCode(_))
        ));

        let store = store_with(None);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_manual(&store, &session, "abcd1234efgh5678").unwrap();
        assert_eq!(flow.pending_code(), Some(CODE));
    }

    #[test]
    fn skip_name_claim_sets_owner_room_and_switch() {
        let store = store_with(None);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &session, CODE).unwrap();
        assert_eq!(flow.phase(), Phase::AwaitingMetadata);
        assert_eq!(store.write_count(), 0);

        fill_prompt(&mut flow, &store);
        let report = flow.commit(&store, &session, PromptSubmit::Skip).unwrap();
        assert!(report.warnings.is_empty());

        let device = store.row_by_id(tables::DEVICES, 5).unwrap();
        assert_eq!(device["allocated_to_customer_id"], 42);
        assert_eq!(device["room_id"], 7);
        let switches = store.rows(tables::SWITCHES);
        assert_eq!(switches.len(), 1);
        assert_eq!(switches[0]["electronic_object"], "LED Light");
        assert_eq!(switches[0]["is_active"], false);

        assert_eq!(flow.phase(), Phase::Done);
        assert!(flow.pending_code().is_none());
        assert!(flow.take_refresh());
        assert!(!flow.take_refresh());
        assert_eq!(
            flow.history(),
            &[
                Phase::Idle,
                Phase::CodeDetected,
                Phase::AvailabilityChecked,
                Phase::AwaitingMetadata,
                Phase::Committing,
                Phase::Done,
            ]
        );
    }

    #[test]
    fn room_id_schema_mismatch_is_retried_without_placement() {
        let store = store_with(None);
        store.fail_next_with(
            tables::DEVICES,
            Op::Update,
            RestClientError::Http {
                status: 400,
                code: None,
                message: "column \"room_id\" of relation \"devices\" does not exist".into(),
            },
        );
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &session, CODE).unwrap();
        fill_prompt(&mut flow, &store);
        let report = flow.commit(&store, &session, PromptSubmit::Skip).unwrap();
        assert!(!report.placement_applied);
        assert_eq!(store.calls_for(tables::DEVICES, Op::Update).len(), 2);

        let device = store.row_by_id(tables::DEVICES, 5).unwrap();
        assert_eq!(device["allocated_to_customer_id"], 42);
        assert!(device.get("room_id").is_none());
        assert_eq!(flow.phase(), Phase::Done);
    }

    #[test]
    fn failed_switch_insert_still_completes_the_claim() {
        let store = store_with(None);
        store.fail_next(tables::SWITCHES, Op::Insert);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &session, CODE).unwrap();
        fill_prompt(&mut flow, &store);
        let report = flow.commit(&store, &session, PromptSubmit::Skip).unwrap();
        assert_eq!(report.warnings, vec![allocation::SWITCH_WARNING.to_string()]);
        assert_eq!(store.row_by_id(tables::DEVICES, 5).unwrap()["allocated_to_customer_id"], 42);
        assert_eq!(flow.phase(), Phase::Done);
    }

    #[test]
    fn write_failure_returns_to_prompt_for_retry() {
        let store = store_with(None);
        store.fail_next(tables::DEVICES, Op::Update);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &session, CODE).unwrap();
        fill_prompt(&mut flow, &store);

        let err = flow.commit(&store, &session, PromptSubmit::Skip).unwrap_err();
        assert!(matches!(err, ClaimError::WriteFailed(_)));
        assert_eq!(flow.phase(), Phase::AwaitingMetadata);
        assert_eq!(flow.history()[flow.history().len() - 2], Phase::Error);
        assert_eq!(flow.prompt().unwrap().selected_room(), Some(RoomId(7)));

        flow.commit(&store, &session, PromptSubmit::Skip).unwrap();
        assert_eq!(flow.phase(), Phase::Done);
    }

    #[test]
    fn incomplete_prompt_is_rejected_without_network() {
        let store = store_with(None);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        flow.submit_scanned(&store, &session, CODE).unwrap();
        let calls = store.calls().len();
        let err = flow.commit(&store, &session, PromptSubmit::Skip).unwrap_err();
        assert!(matches!(err, ClaimError::Validation(PromptError::HouseRequired)));
        assert_eq!(store.calls().len(), calls);
        assert_eq!(flow.phase(), Phase::AwaitingMetadata);
    }

    #[test]
    fn cancel_discards_pending_code_without_writes() {
        let store = store_with(None);
        let session = signed_in(42);
        let mut flow = ClaimFlow::new();
        assert!(matches!(flow.cancel(), Err(ClaimError::InvalidState(Phase::Idle))));
        flow.submit_scanned(&store, &session, CODE).unwrap();
        assert!(matches!(
            flow.submit_scanned(&store, &session, CODE),
            Err(ClaimError::InvalidState(Phase::AwaitingMetadata))
        ));
        flow.cancel().unwrap();
        assert_eq!(flow.phase(), Phase::Idle);
        assert!(flow.prompt().is_none());
        assert_eq!(store.write_count(), 0);
    }
}
