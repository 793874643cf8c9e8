//! Blocking client for the hosted relational REST interface (PostgREST dialect).
//!
//! - Blocking client using `ureq` (no async).
//! - Generic row access through the [`Store`] trait; services never build URLs.
//! - Every request carries the agent-wide timeout so a hung call surfaces as a
//!   transport error instead of stalling the caller.
//!
//! Authentication
//! - Sends the project anon key both as `apikey` and as a bearer token.

use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REST_PATH: &str = "/rest/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestClientError {
    Transport(String),
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },
    Json(String),
}

impl RestClientError {
    /// The remote side does not know one of the columns we wrote.
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            RestClientError::Http { code, message, .. } => {
                if matches!(code.as_deref(), Some("PGRST204") | Some("42703")) {
                    return true;
                }
                let msg = message.to_ascii_lowercase();
                msg.contains("house_id")
                    || msg.contains("room_id")
                    || msg.contains("schema cache")
                    || (msg.contains("column") && msg.contains("does not exist"))
            }
            _ => false,
        }
    }
}

impl core::fmt::Display for RestClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RestClientError::Transport(s) => write!(f, "transport error: {}", s),
            RestClientError::Http { status, code, message } => {
                let reason = StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("");
                match code {
                    Some(c) => write!(f, "http {} {} [{}]: {}", status, reason, c, message),
                    None => write!(f, "http {} {}: {}", status, reason, message),
                }
            }
            RestClientError::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for RestClientError {}

impl From<serde_json::Error> for RestClientError {
    fn from(value: serde_json::Error) -> Self {
        RestClientError::Json(value.to_string())
    }
}

// =====================
// Query description
// =====================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    Neq(String, String),
    In(String, Vec<String>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::Neq(c, _) | Filter::In(c, _) | Filter::IsNull(c) | Filter::NotNull(c) => c,
        }
    }

    /// PostgREST operator expression, e.g. `eq.42` or `in.(1,2)`.
    pub fn expression(&self) -> String {
        match self {
            Filter::Eq(_, v) => format!("eq.{}", v),
            Filter::Neq(_, v) => format!("neq.{}", v),
            Filter::In(_, vs) => format!("in.({})", vs.join(",")),
            Filter::IsNull(_) => "is.null".to_string(),
            Filter::NotNull(_) => "not.is.null".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Row selector shared by reads, updates and deletes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.to_string()));
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::NotNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Query-string pairs in PostgREST form.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column().to_string(), f.expression()))
            .collect();
        if let Some(o) = &self.order {
            let dir = if o.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", o.column, dir)));
        }
        if let Some(n) = self.limit {
            pairs.push(("limit".to_string(), n.to_string()));
        }
        pairs
    }
}

// =====================
// Store seam
// =====================

/// Row-level access to the hosted tables.
///
/// Writes return the affected rows as the server echoes them back, so callers
/// can tell "matched nothing" from "matched and changed".
pub trait Store {
    fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, RestClientError>;

    fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(&self, table: &str, rows: &B)
    -> Result<Vec<T>, RestClientError>;

    fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<serde_json::Value>, RestClientError>;

    fn delete(&self, table: &str, query: &Query) -> Result<Vec<serde_json::Value>, RestClientError>;

    fn select_one<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Option<T>, RestClientError> {
        let mut rows = self.select::<T>(table, &query.clone().limit(1))?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }
}

// =====================
// HTTP implementation
// =====================

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

pub struct RestClient {
    agent: ureq::Agent,
    base_url: String,
    anon_key: String,
}

impl RestClient {
    pub fn new(project_url: &str, anon_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        RestClient {
            agent,
            base_url: format!("{}{}", project_url.trim_end_matches('/'), REST_PATH),
            anon_key: anon_key.into(),
        }
    }

    fn url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str, query: &Query) -> ureq::Request {
        let mut req = self
            .agent
            .request(method.as_str(), &self.url(table))
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {}", self.anon_key))
            .set("Accept", "application/json");
        for (k, v) in query.to_pairs() {
            req = req.query(&k, &v);
        }
        req
    }

    fn finish<T: DeserializeOwned>(result: Result<ureq::Response, ureq::Error>) -> Result<T, RestClientError> {
        match result {
            Ok(res) => {
                let body = res
                    .into_string()
                    .map_err(|e| RestClientError::Transport(e.to_string()))?;
                decode_body(&body)
            }
            Err(ureq::Error::Transport(t)) => Err(RestClientError::Transport(t.to_string())),
            Err(ureq::Error::Status(status, res)) => {
                let body = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(http_error(status, &body))
            }
        }
    }
}

impl Store for RestClient {
    fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, RestClientError> {
        let req = self.request(Method::GET, table, query).query("select", "*");
        Self::finish(req.call())
    }

    fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        rows: &B,
    ) -> Result<Vec<T>, RestClientError> {
        let req = self
            .request(Method::POST, table, &Query::new())
            .set("Prefer", "return=representation");
        Self::finish(req.send_json(rows))
    }

    fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<serde_json::Value>, RestClientError> {
        let req = self
            .request(Method::PATCH, table, query)
            .set("Prefer", "return=representation");
        Self::finish(req.send_json(patch))
    }

    fn delete(&self, table: &str, query: &Query) -> Result<Vec<serde_json::Value>, RestClientError> {
        let req = self
            .request(Method::DELETE, table, query)
            .set("Prefer", "return=representation");
        Self::finish(req.call())
    }
}

/// Decode a JSON response body, reporting the failing field path on error.
pub fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, RestClientError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| RestClientError::Json(format!("{} at `{}`", e.inner(), e.path())))
}

fn http_error(status: u16, body: &str) -> RestClientError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { code, message, details }) => {
            let message = match (message, details) {
                (Some(m), Some(d)) => format!("{} ({})", m, d),
                (Some(m), None) => m,
                (None, Some(d)) => d,
                (None, None) => body.to_string(),
            };
            RestClientError::Http { status, code, message }
        }
        Err(_) => RestClientError::Http {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rows::Device;

    #[test]
    fn query_pairs_follow_postgrest_syntax() {
        let q = Query::new()
            .eq("device_code", "ABCD1234EFGH5678")
            .is_in("device_id", [1, 2, 3])
            .is_null("allocated_to_customer_id")
            .order_by("created_at", false)
            .limit(5);
        let pairs = q.to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("device_code".to_string(), "eq.ABCD1234EFGH5678".to_string()),
                ("device_id".to_string(), "in.(1,2,3)".to_string()),
                ("allocated_to_customer_id".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn schema_mismatch_detection() {
        let by_code = RestClientError::Http {
            status: 400,
            code: Some("PGRST204".into()),
            message: "Could not find the 'house_id' column of 'devices' in the schema cache".into(),
        };
        assert!(by_code.is_schema_mismatch());

        let by_message = http_error(400, r#"{"message": "column \"room_id\" of relation \"devices\" does not exist"}"#);
        assert!(by_message.is_schema_mismatch());

        let unrelated = http_error(409, r#"{"code": "23505", "message": "duplicate key value"}"#);
        assert!(!unrelated.is_schema_mismatch());
        assert!(!RestClientError::Transport("timed out".into()).is_schema_mismatch());
    }

    #[test]
    fn http_error_keeps_raw_body_when_not_json() {
        let err = http_error(502, "Bad gateway");
        match err {
            RestClientError::Http { status, code, message } => {
                assert_eq!(status, 502);
                assert!(code.is_none());
                assert_eq!(message, "Bad gateway");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_errors_name_the_field_path() {
        let err = decode_body::<Vec<Device>>(r#"[{"id": 1, "device_code": 7}]"#).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("[0].device_code"), "{}", text);
    }
}
