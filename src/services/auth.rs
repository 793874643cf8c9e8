//! Phone + OTP login for the three account kinds, customer signup and logout.
//!
//! The account row is looked up before the OTP is checked, so an unknown phone
//! never reaches the OTP backend.

use crate::client::{Query, RestClientError, Store};
use crate::models::rows::{Customer, Employee, NewCustomer, NewEmployeeLoginLog, SuperAdmin, tables};
use crate::otp::{OtpError, OtpVerifier};
use crate::session::{Role, Session, SessionUser};
use chrono::Utc;
use log::{info, warn};

#[derive(Debug)]
pub enum AuthError {
    InvalidInput(String),
    UnknownPhone(String),
    AlreadyRegistered(String),
    OtpRejected(Option<String>),
    Otp(OtpError),
    Store(RestClientError),
    Session(String),
}

impl core::fmt::Display for AuthError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuthError::InvalidInput(s) => write!(f, "{}", s),
            AuthError::UnknownPhone(p) => write!(f, "No account is registered for {}.", p),
            AuthError::AlreadyRegistered(p) => write!(f, "An account already exists for {}.", p),
            AuthError::OtpRejected(Some(m)) => write!(f, "OTP rejected: {}", m),
            AuthError::OtpRejected(None) => write!(f, "OTP rejected."),
            AuthError::Otp(e) => write!(f, "otp service error: {}", e),
            AuthError::Store(e) => write!(f, "database error: {}", e),
            AuthError::Session(s) => write!(f, "session error: {}", s),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Otp(e) => Some(e),
            AuthError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RestClientError> for AuthError {
    fn from(e: RestClientError) -> Self {
        AuthError::Store(e)
    }
}

impl From<OtpError> for AuthError {
    fn from(e: OtpError) -> Self {
        AuthError::Otp(e)
    }
}

/// Trims the phone number and rejects an empty one.
pub fn normalize_phone(raw: &str) -> Result<String, AuthError> {
    let phone: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if phone.is_empty() {
        return Err(AuthError::InvalidInput("Please enter a phone number.".into()));
    }
    if !phone.trim_start_matches('+').chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::InvalidInput(format!("Not a phone number: {}", raw.trim())));
    }
    Ok(phone)
}

pub fn send_otp<V: OtpVerifier>(otp: &V, phone: &str) -> Result<(), AuthError> {
    let phone = normalize_phone(phone)?;
    let outcome = otp.send_otp(&phone)?;
    if !outcome.success {
        return Err(AuthError::OtpRejected(outcome.message));
    }
    info!("OTP sent to {}", phone);
    Ok(())
}

fn check_otp<V: OtpVerifier>(otp: &V, phone: &str, code: &str) -> Result<(), AuthError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidInput("Please enter the OTP.".into()));
    }
    let outcome = otp.verify_otp(phone, code)?;
    if outcome.success {
        Ok(())
    } else {
        Err(AuthError::OtpRejected(outcome.message))
    }
}

pub fn login<S: Store, V: OtpVerifier>(
    store: &S,
    otp: &V,
    session: &mut Session,
    role: Role,
    phone: &str,
    code: &str,
) -> Result<SessionUser, AuthError> {
    let phone = normalize_phone(phone)?;
    let by_phone = Query::new().eq("phone_number", &phone);

    let user = match role {
        Role::Customer => {
            let row: Customer = store
                .select_one(tables::CUSTOMERS, &by_phone)?
                .ok_or_else(|| AuthError::UnknownPhone(phone.clone()))?;
            check_otp(otp, &phone, code)?;
            SessionUser {
                id: row.id,
                name: row.full_name,
                phone_number: row.phone_number,
                role,
                employee_id: None,
            }
        }
        Role::Admin => {
            let row: Employee = store
                .select_one(tables::EMPLOYEES, &by_phone)?
                .ok_or_else(|| AuthError::UnknownPhone(phone.clone()))?;
            check_otp(otp, &phone, code)?;
            let log_row = NewEmployeeLoginLog {
                employee_id: row.employee_id.clone(),
                login_time: Utc::now(),
            };
            if let Err(e) = store.insert::<_, serde_json::Value>(tables::EMPLOYEE_LOGIN_LOGS, &log_row) {
                warn!("Failed to record login for employee {}: {}", row.employee_id, e);
            }
            SessionUser {
                id: row.id,
                name: row.full_name,
                phone_number: row.phone_number,
                role,
                employee_id: Some(row.employee_id),
            }
        }
        Role::Superadmin => {
            let row: SuperAdmin = store
                .select_one(tables::SUPER_ADMINS, &by_phone)?
                .ok_or_else(|| AuthError::UnknownPhone(phone.clone()))?;
            check_otp(otp, &phone, code)?;
            SessionUser {
                id: row.id,
                name: row.full_name,
                phone_number: row.phone_number,
                role,
                employee_id: None,
            }
        }
    };

    session.sign_in(user.clone()).map_err(AuthError::Session)?;
    Ok(user)
}

#[derive(Debug, Clone)]
pub struct SignupForm {
    pub full_name: String,
    pub phone_number: String,
    pub email: String,
}

/// Registers a customer after OTP verification and signs them in.
pub fn signup<S: Store, V: OtpVerifier>(
    store: &S,
    otp: &V,
    session: &mut Session,
    form: &SignupForm,
    code: &str,
) -> Result<SessionUser, AuthError> {
    let phone = normalize_phone(&form.phone_number)?;
    let full_name = form.full_name.trim();
    if full_name.is_empty() {
        return Err(AuthError::InvalidInput("Please enter your full name.".into()));
    }
    let email = form.email.trim();
    if !email.contains('@') {
        return Err(AuthError::InvalidInput(format!("Not an email address: {}", email)));
    }

    let existing: Option<Customer> = store.select_one(tables::CUSTOMERS, &Query::new().eq("phone_number", &phone))?;
    if existing.is_some() {
        return Err(AuthError::AlreadyRegistered(phone));
    }
    check_otp(otp, &phone, code)?;

    let row = NewCustomer {
        full_name: full_name.to_string(),
        phone_number: phone.clone(),
        email: email.to_string(),
    };
    let mut created: Vec<Customer> = store.insert(tables::CUSTOMERS, &row)?;
    if created.is_empty() {
        return Err(AuthError::Store(RestClientError::Json("signup returned no row".into())));
    }
    let customer = created.swap_remove(0);
    info!("Registered customer {} ({})", customer.id, customer.phone_number);

    let user = SessionUser {
        id: customer.id,
        name: customer.full_name,
        phone_number: customer.phone_number,
        role: Role::Customer,
        employee_id: None,
    };
    session.sign_in(user.clone()).map_err(AuthError::Session)?;
    Ok(user)
}

pub fn logout(session: &mut Session) -> Result<(), AuthError> {
    session.sign_out().map_err(AuthError::Session)
}
