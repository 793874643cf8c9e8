//! In-memory [`Store`] used by unit tests.
//!
//! Rows are kept as JSON objects and filters are evaluated the way PostgREST
//! compares them (textual equality on the rendered value). Column sets can be
//! restricted per table to reproduce remote schema mismatches, and one-shot
//! failures can be queued per (table, operation).

use crate::client::{Filter, Query, RestClientError, Store};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub table: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, Vec<Value>>>,
    columns: RefCell<BTreeMap<String, BTreeSet<String>>>,
    failures: RefCell<Vec<(String, Op, RestClientError)>>,
    calls: RefCell<Vec<Call>>,
    next_id: Cell<i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.next_id.set(1000);
        store
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.borrow_mut().entry(table.to_string()).or_default().extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }

    pub fn row_by_id(&self, table: &str, id: i64) -> Option<Value> {
        self.rows(table).into_iter().find(|r| r["id"] == json!(id))
    }

    /// Only these columns exist remotely; writing any other one fails.
    pub fn restrict_columns(&self, table: &str, columns: &[&str]) {
        self.columns
            .borrow_mut()
            .insert(table.to_string(), columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn fail_next(&self, table: &str, op: Op) {
        self.fail_next_with(
            table,
            op,
            RestClientError::Http {
                status: 500,
                code: None,
                message: "injected failure".into(),
            },
        );
    }

    pub fn fail_next_with(&self, table: &str, op: Op, err: RestClientError) {
        self.failures.borrow_mut().push((table.to_string(), op, err));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_for(&self, table: &str, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.table == table && c.op == op).collect()
    }

    pub fn write_count(&self) -> usize {
        self.calls.borrow().iter().filter(|c| c.op != Op::Select).count()
    }

    fn record(&self, op: Op, table: &str, body: Option<Value>) -> Result<(), RestClientError> {
        self.calls.borrow_mut().push(Call {
            op,
            table: table.to_string(),
            body,
        });
        let mut failures = self.failures.borrow_mut();
        if let Some(pos) = failures.iter().position(|(t, o, _)| t == table && *o == op) {
            let (_, _, err) = failures.remove(pos);
            return Err(err);
        }
        Ok(())
    }

    fn check_columns(&self, table: &str, obj: &Map<String, Value>) -> Result<(), RestClientError> {
        let columns = self.columns.borrow();
        let Some(known) = columns.get(table) else {
            return Ok(());
        };
        match obj.keys().find(|k| !known.contains(*k)) {
            Some(col) => Err(RestClientError::Http {
                status: 400,
                code: Some("PGRST204".into()),
                message: format!("Could not find the '{}' column of '{}' in the schema cache", col, table),
            }),
            None => Ok(()),
        }
    }

    fn matching(&self, table: &str, query: &Query) -> Vec<usize> {
        let tables = self.tables.borrow();
        let Some(rows) = tables.get(table) else {
            return Vec::new();
        };
        rows.iter()
            .enumerate()
            .filter(|(_, row)| query.filters.iter().all(|f| matches(row, f)))
            .map(|(i, _)| i)
            .collect()
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    let field = row.get(filter.column()).unwrap_or(&Value::Null);
    match filter {
        Filter::Eq(_, v) => !field.is_null() && render(field) == *v,
        Filter::Neq(_, v) => !field.is_null() && render(field) != *v,
        Filter::In(_, vs) => !field.is_null() && vs.contains(&render(field)),
        Filter::IsNull(_) => field.is_null(),
        Filter::NotNull(_) => !field.is_null(),
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        _ => render(a).cmp(&render(b)),
    }
}

fn to_value<B: Serialize + ?Sized>(body: &B) -> Result<Value, RestClientError> {
    serde_json::to_value(body).map_err(RestClientError::from)
}

fn from_values<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, RestClientError> {
    serde_json::from_value(Value::Array(rows)).map_err(RestClientError::from)
}

impl Store for MemoryStore {
    fn select<T: DeserializeOwned>(&self, table: &str, query: &Query) -> Result<Vec<T>, RestClientError> {
        self.record(Op::Select, table, None)?;
        let indices = self.matching(table, query);
        let all = self.rows(table);
        let mut rows: Vec<Value> = indices.into_iter().map(|i| all[i].clone()).collect();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(n) = query.limit {
            rows.truncate(n);
        }
        from_values(rows)
    }

    fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        rows: &B,
    ) -> Result<Vec<T>, RestClientError> {
        let body = to_value(rows)?;
        self.record(Op::Insert, table, Some(body.clone()))?;
        let items = match body {
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(mut obj) = item else {
                return Err(RestClientError::Json("insert payload must be an object".into()));
            };
            self.check_columns(table, &obj)?;
            if !obj.contains_key("id") {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                obj.insert("id".into(), json!(id));
            }
            obj.entry("created_at").or_insert_with(|| json!(Utc::now().to_rfc3339()));
            created.push(Value::Object(obj));
        }
        self.seed(table, created.clone());
        from_values(created)
    }

    fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<serde_json::Value>, RestClientError> {
        let body = to_value(patch)?;
        self.record(Op::Update, table, Some(body.clone()))?;
        let Value::Object(patch) = body else {
            return Err(RestClientError::Json("update payload must be an object".into()));
        };
        self.check_columns(table, &patch)?;
        let indices = self.matching(table, query);
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::with_capacity(indices.len());
        for i in indices {
            if let Value::Object(row) = &mut rows[i] {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
            }
            updated.push(rows[i].clone());
        }
        Ok(updated)
    }

    fn delete(&self, table: &str, query: &Query) -> Result<Vec<serde_json::Value>, RestClientError> {
        self.record(Op::Delete, table, None)?;
        let indices: BTreeSet<usize> = self.matching(table, query).into_iter().collect();
        let mut tables = self.tables.borrow_mut();
        let rows = tables.entry(table.to_string()).or_default();
        let mut removed = Vec::with_capacity(indices.len());
        let mut kept = Vec::with_capacity(rows.len());
        for (i, row) in rows.drain(..).enumerate() {
            if indices.contains(&i) {
                removed.push(row);
            } else {
                kept.push(row);
            }
        }
        *rows = kept;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_and_ordering_behave_like_postgrest() {
        let store = MemoryStore::new();
        store.seed(
            "rooms",
            vec![
                json!({"id": 1, "house_id": 9, "room_type": "Kitchen"}),
                json!({"id": 2, "house_id": 9, "room_type": "Bedroom"}),
                json!({"id": 3, "house_id": 4, "room_type": "Attic"}),
                json!({"id": 4, "house_id": 9, "room_type": null}),
            ],
        );
        let rows: Vec<Value> = store
            .select("rooms", &Query::new().eq("house_id", 9).order_by("room_type", true))
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![4, 2, 1]);

        let rows: Vec<Value> = store.select("rooms", &Query::new().is_in("id", [1, 3])).unwrap();
        assert_eq!(rows.len(), 2);
        let rows: Vec<Value> = store.select("rooms", &Query::new().not_null("room_type")).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn restricted_columns_reject_unknown_writes() {
        let store = MemoryStore::new();
        store.seed("devices", vec![json!({"id": 1, "device_code": "X"})]);
        store.restrict_columns("devices", &["id", "device_code"]);
        let err = store
            .update("devices", &Query::new().eq("id", 1), &json!({"room_id": 3}))
            .unwrap_err();
        assert!(err.is_schema_mismatch());
        assert_eq!(store.rows("devices")[0].get("room_id"), None);
    }

    #[test]
    fn injected_failures_are_one_shot() {
        let store = MemoryStore::new();
        store.fail_next("switches", Op::Insert);
        let first: Result<Vec<Value>, _> = store.insert("switches", &json!({"room_id": 1}));
        assert!(first.is_err());
        let second: Vec<Value> = store.insert("switches", &json!({"room_id": 1})).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(store.calls_for("switches", Op::Insert).len(), 2);
    }
}
