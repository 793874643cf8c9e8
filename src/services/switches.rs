//! Switch control within a customer's rooms.
//!
//! Owners may do everything; a user holding a switch share grant may only
//! flip it.

use crate::client::{Query, Store};
use crate::models::rows::{RoomId, Switch, SwitchId, SwitchLabelPatch, SwitchShare, SwitchStatePatch, UserId, tables};
use crate::services::homes;
use crate::services::prompt::find_category;
use log::info;

pub fn list<S: Store>(store: &S, owner: UserId, room: RoomId) -> Result<Vec<Switch>, String> {
    homes::owned_room(store, owner, room)?;
    store
        .select(
            tables::SWITCHES,
            &Query::new().eq("room_id", room).order_by("created_at", true),
        )
        .map_err(|e| format!("Failed to fetch switches: {}", e))
}

fn fetch<S: Store>(store: &S, id: SwitchId) -> Result<Switch, String> {
    let switch: Option<Switch> = store
        .select_one(tables::SWITCHES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to fetch switch {}: {}", id, e))?;
    switch.ok_or_else(|| format!("Switch {} does not exist.", id))
}

pub fn owned_switch<S: Store>(store: &S, owner: UserId, id: SwitchId) -> Result<Switch, String> {
    let switch = fetch(store, id)?;
    homes::owned_room(store, owner, switch.room_id).map_err(|_| format!("Switch {} is not one of your switches.", id))?;
    Ok(switch)
}

fn controllable_switch<S: Store>(store: &S, user: UserId, id: SwitchId) -> Result<Switch, String> {
    let switch = fetch(store, id)?;
    if homes::owned_room(store, user, switch.room_id).is_ok() {
        return Ok(switch);
    }
    let grant: Option<SwitchShare> = store
        .select_one(
            tables::SWITCH_SHARES,
            &Query::new().eq("switch_id", id).eq("shared_with_user_id", user),
        )
        .map_err(|e| format!("Failed to check access to switch {}: {}", id, e))?;
    match grant {
        Some(_) => Ok(switch),
        None => Err(format!("You do not have access to switch {}.", id)),
    }
}

pub fn set_state<S: Store>(store: &S, user: UserId, id: SwitchId, on: bool) -> Result<(), String> {
    controllable_switch(store, user, id)?;
    store
        .update(tables::SWITCHES, &Query::new().eq("id", id), &SwitchStatePatch { is_active: on })
        .map_err(|e| format!("Failed to update switch: {}", e))?;
    info!("Switch {} turned {}", id, if on { "on" } else { "off" });
    Ok(())
}

/// Flips the switch and returns its new state.
pub fn toggle<S: Store>(store: &S, user: UserId, id: SwitchId) -> Result<bool, String> {
    let current = controllable_switch(store, user, id)?;
    let next = !current.is_on();
    store
        .update(tables::SWITCHES, &Query::new().eq("id", id), &SwitchStatePatch { is_active: next })
        .map_err(|e| format!("Failed to update switch: {}", e))?;
    info!("Switch {} toggled {}", id, if next { "on" } else { "off" });
    Ok(next)
}

pub fn relabel<S: Store>(store: &S, owner: UserId, id: SwitchId, label: &str) -> Result<&'static str, String> {
    let category = find_category(label).ok_or_else(|| format!("Unknown electronic object: {}", label.trim()))?;
    owned_switch(store, owner, id)?;
    store
        .update(
            tables::SWITCHES,
            &Query::new().eq("id", id),
            &SwitchLabelPatch {
                electronic_object: category.to_string(),
            },
        )
        .map_err(|e| format!("Failed to update switch: {}", e))?;
    Ok(category)
}

pub fn delete<S: Store>(store: &S, owner: UserId, id: SwitchId) -> Result<(), String> {
    owned_switch(store, owner, id)?;
    store
        .delete(tables::SWITCHES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete switch: {}", e))?;
    info!("Deleted switch {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryStore, Op};
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed(tables::HOUSES, vec![json!({"id": 1, "user_id": 42, "house_name": "Home"})]);
        store.seed(tables::ROOMS, vec![json!({"id": 7, "house_id": 1, "room_type": "Living Room"})]);
        store.seed(
            tables::SWITCHES,
            vec![
                json!({"id": 20, "room_id": 7, "electronic_object": "LED Light", "is_active": false}),
                json!({"id": 21, "room_id": 7, "electronic_object": "Ceiling Fan", "is_active": true}),
            ],
        );
        store.seed(
            tables::SWITCH_SHARES,
            vec![json!({"id": 1, "switch_id": 21, "shared_with_user_id": 9})],
        );
        store
    }

    #[test]
    fn owner_toggles_and_lists() {
        let store = store();
        assert_eq!(list(&store, UserId(42), RoomId(7)).unwrap().len(), 2);
        assert!(toggle(&store, UserId(42), SwitchId(20)).unwrap());
        assert_eq!(store.row_by_id(tables::SWITCHES, 20).unwrap()["is_active"], true);
        assert!(!toggle(&store, UserId(42), SwitchId(20)).unwrap());
    }

    #[test]
    fn grantee_may_flip_but_not_manage() {
        let store = store();
        set_state(&store, UserId(9), SwitchId(21), false).unwrap();
        assert_eq!(store.row_by_id(tables::SWITCHES, 21).unwrap()["is_active"], false);
        assert!(set_state(&store, UserId(9), SwitchId(20), true).is_err());
        assert!(relabel(&store, UserId(9), SwitchId(21), "Table Fan").is_err());
        assert!(delete(&store, UserId(9), SwitchId(21)).is_err());
        assert!(list(&store, UserId(9), RoomId(7)).is_err());
    }

    #[test]
    fn relabel_requires_known_category() {
        let store = store();
        assert!(relabel(&store, UserId(42), SwitchId(20), "Flux Capacitor").is_err());
        assert!(store.calls_for(tables::SWITCHES, Op::Update).is_empty());
        assert_eq!(relabel(&store, UserId(42), SwitchId(20), "table lamp").unwrap(), "Table Lamp");
        assert_eq!(
            store.row_by_id(tables::SWITCHES, 20).unwrap()["electronic_object"],
            "Table Lamp"
        );
    }

    #[test]
    fn delete_removes_row() {
        let store = store();
        delete(&store, UserId(42), SwitchId(20)).unwrap();
        assert!(store.row_by_id(tables::SWITCHES, 20).is_none());
    }
}
