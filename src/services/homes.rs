//! Houses and rooms owned by a customer.

use crate::client::{Query, Store};
use crate::models::rows::{House, HouseId, HouseNamePatch, NewHouse, Room, RoomFields, RoomId, UserId, tables};
use log::info;

fn required(value: &str, what: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("Please enter a {}.", what))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn first<T>(mut rows: Vec<T>, what: &str) -> Result<T, String> {
    if rows.is_empty() {
        Err(format!("{} was not returned by the server.", what))
    } else {
        Ok(rows.swap_remove(0))
    }
}

pub fn list_houses<S: Store>(store: &S, owner: UserId) -> Result<Vec<House>, String> {
    store
        .select(
            tables::HOUSES,
            &Query::new().eq("user_id", owner).order_by("created_at", true),
        )
        .map_err(|e| format!("Failed to fetch houses: {}", e))
}

pub fn owned_house<S: Store>(store: &S, owner: UserId, id: HouseId) -> Result<House, String> {
    let house: Option<House> = store
        .select_one(tables::HOUSES, &Query::new().eq("id", id).eq("user_id", owner))
        .map_err(|e| format!("Failed to fetch house {}: {}", id, e))?;
    house.ok_or_else(|| format!("House {} is not one of your houses.", id))
}

pub fn create_house<S: Store>(store: &S, owner: UserId, name: &str) -> Result<House, String> {
    let row = NewHouse {
        user_id: owner,
        house_name: required(name, "house name")?,
    };
    let created: Vec<House> = store
        .insert(tables::HOUSES, &row)
        .map_err(|e| format!("Failed to create house: {}", e))?;
    let house = first(created, "The new house")?;
    info!("Created house {} ({}) for user {}", house.id, house.house_name, owner);
    Ok(house)
}

pub fn rename_house<S: Store>(store: &S, owner: UserId, id: HouseId, name: &str) -> Result<(), String> {
    owned_house(store, owner, id)?;
    let patch = HouseNamePatch {
        house_name: required(name, "house name")?,
    };
    store
        .update(tables::HOUSES, &Query::new().eq("id", id), &patch)
        .map_err(|e| format!("Failed to update house: {}", e))?;
    Ok(())
}

pub fn delete_house<S: Store>(store: &S, owner: UserId, id: HouseId) -> Result<(), String> {
    owned_house(store, owner, id)?;
    store
        .delete(tables::HOUSES, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete house: {}", e))?;
    info!("Deleted house {}", id);
    Ok(())
}

pub fn list_rooms<S: Store>(store: &S, owner: UserId, house: HouseId) -> Result<Vec<Room>, String> {
    owned_house(store, owner, house)?;
    store
        .select(
            tables::ROOMS,
            &Query::new().eq("house_id", house).order_by("created_at", true),
        )
        .map_err(|e| format!("Failed to fetch rooms: {}", e))
}

/// A room counts as owned when its house is.
pub fn owned_room<S: Store>(store: &S, owner: UserId, id: RoomId) -> Result<Room, String> {
    let room: Option<Room> = store
        .select_one(tables::ROOMS, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to fetch room {}: {}", id, e))?;
    let room = room.ok_or_else(|| format!("Room {} does not exist.", id))?;
    owned_house(store, owner, room.house_id).map_err(|_| format!("Room {} is not in one of your houses.", id))?;
    Ok(room)
}

pub fn create_room<S: Store>(
    store: &S,
    owner: UserId,
    house: HouseId,
    room_type: &str,
    description: Option<&str>,
) -> Result<Room, String> {
    owned_house(store, owner, house)?;
    let row = RoomFields {
        house_id: Some(house),
        room_type: required(room_type, "room type")?,
        description: optional(description),
    };
    let created: Vec<Room> = store
        .insert(tables::ROOMS, &row)
        .map_err(|e| format!("Failed to create room: {}", e))?;
    let room = first(created, "The new room")?;
    info!("Created room {} ({}) in house {}", room.id, room.label(), house);
    Ok(room)
}

pub fn update_room<S: Store>(
    store: &S,
    owner: UserId,
    id: RoomId,
    room_type: &str,
    description: Option<&str>,
) -> Result<(), String> {
    owned_room(store, owner, id)?;
    let patch = RoomFields {
        house_id: None,
        room_type: required(room_type, "room type")?,
        description: optional(description),
    };
    store
        .update(tables::ROOMS, &Query::new().eq("id", id), &patch)
        .map_err(|e| format!("Failed to update room: {}", e))?;
    Ok(())
}

pub fn delete_room<S: Store>(store: &S, owner: UserId, id: RoomId) -> Result<(), String> {
    owned_room(store, owner, id)?;
    store
        .delete(tables::ROOMS, &Query::new().eq("id", id))
        .map_err(|e| format!("Failed to delete room: {}", e))?;
    info!("Deleted room {}", id);
    Ok(())
}
