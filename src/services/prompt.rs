//! Naming/placement step of a claim: pick house, room and category, optionally
//! a display name, before anything is written.

use crate::client::{Query, RestClientError, Store};
use crate::models::rows::{House, HouseId, Room, RoomId, UserId, tables};
use log::{debug, warn};

pub const MAX_DEVICE_NAME_LEN: usize = 50;

pub const ELECTRONIC_OBJECTS: [&str; 46] = [
    "LED Light",
    "Ceiling Fan",
    "Air Conditioner",
    "Television",
    "Smart TV",
    "Sound System",
    "Microwave",
    "Refrigerator",
    "Dishwasher",
    "Coffee Maker",
    "Water Heater",
    "Room Heater",
    "Security Camera",
    "Door Lock",
    "Smart Plug",
    "Smart Switch",
    "Vacuum Cleaner",
    "Air Purifier",
    "Washing Machine",
    "Dryer",
    "Table Lamp",
    "Floor Lamp",
    "Exhaust Fan",
    "Table Fan",
    "Tower Fan",
    "Window AC",
    "Split AC",
    "Home Theater",
    "Music Player",
    "Toaster",
    "Blender",
    "Rice Cooker",
    "Electric Fireplace",
    "Motion Sensor",
    "Smoke Detector",
    "Smart Thermostat",
    "Smart Doorbell",
    "Robot Vacuum",
    "Iron",
    "Garden Light",
    "Pool Pump",
    "Sprinkler System",
    "Humidifier",
    "Dehumidifier",
    "Electric Kettle",
    "Garage Door",
];

/// Case-insensitive lookup returning the canonical spelling.
pub fn find_category(input: &str) -> Option<&'static str> {
    let needle = input.trim();
    ELECTRONIC_OBJECTS
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(needle))
}

/// Icon names stored in `device_icon`.
pub const ICON_NAMES: [&str; 10] = [
    "car",
    "truck",
    "bus",
    "bike",
    "motorcycle",
    "plane",
    "ship",
    "train",
    "ambulance",
    "firetruck",
];

pub fn find_icon(input: &str) -> Option<&'static str> {
    let needle = input.trim();
    ICON_NAMES.iter().copied().find(|i| i.eq_ignore_ascii_case(needle))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    HouseRequired,
    RoomRequired,
    CategoryRequired,
    NameRequired,
    NameTooLong(usize),
    UnknownHouse(HouseId),
    UnknownRoom(RoomId),
    UnknownCategory(String),
    UnknownIcon(String),
    /// The room list for the chosen house could not be loaded.
    RoomsUnavailable(HouseId, RestClientError),
}

impl core::fmt::Display for PromptError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PromptError::HouseRequired => write!(f, "Please select a house."),
            PromptError::RoomRequired => write!(f, "Please select a room."),
            PromptError::CategoryRequired => write!(f, "Please select an electronic object."),
            PromptError::NameRequired => write!(f, "Please enter a device name."),
            PromptError::NameTooLong(n) => {
                write!(f, "Device name is {} characters; the limit is {}.", n, MAX_DEVICE_NAME_LEN)
            }
            PromptError::UnknownHouse(h) => write!(f, "House {} is not one of your houses.", h),
            PromptError::UnknownRoom(r) => write!(f, "Room {} is not in the selected house.", r),
            PromptError::UnknownCategory(c) => write!(f, "Unknown electronic object: {}", c),
            PromptError::UnknownIcon(i) => write!(f, "Unknown icon: {} (choose one of {})", i, ICON_NAMES.join(", ")),
            PromptError::RoomsUnavailable(h, e) => write!(f, "Failed to load rooms for house {}: {}", h, e),
        }
    }
}

impl std::error::Error for PromptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PromptError::RoomsUnavailable(_, e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PromptSubmit {
    SaveName,
    Skip,
}

/// Everything the allocation writer needs to commit a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequest {
    pub device_code: String,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub house_id: HouseId,
    pub room_id: RoomId,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct PlacementPrompt {
    device_code: String,
    houses: Vec<House>,
    rooms: Vec<Room>,
    house: Option<HouseId>,
    room: Option<RoomId>,
    category: Option<&'static str>,
    name: String,
    icon: Option<&'static str>,
}

impl PlacementPrompt {
    /// Opens the prompt for `device_code`, loading the user's houses.
    pub fn open<S: Store>(store: &S, user: UserId, device_code: &str) -> Result<Self, RestClientError> {
        let houses: Vec<House> = store.select(
            tables::HOUSES,
            &Query::new().eq("user_id", user).order_by("house_name", true),
        )?;
        debug!("Placement prompt for {}: {} house(s)", device_code, houses.len());
        Ok(PlacementPrompt {
            device_code: device_code.to_string(),
            houses,
            rooms: Vec::new(),
            house: None,
            room: None,
            category: None,
            name: String::new(),
            icon: None,
        })
    }

    pub fn device_code(&self) -> &str {
        &self.device_code
    }

    pub fn houses(&self) -> &[House] {
        &self.houses
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn selected_house(&self) -> Option<HouseId> {
        self.house
    }

    pub fn selected_room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn selected_category(&self) -> Option<&'static str> {
        self.category
    }

    /// Changing the house re-fetches rooms; clearing it empties them.
    pub fn select_house<S: Store>(&mut self, store: &S, house: Option<HouseId>) -> Result<(), PromptError> {
        self.room = None;
        self.rooms.clear();
        self.house = None;
        let Some(house_id) = house else {
            return Ok(());
        };
        if !self.houses.iter().any(|h| h.id == house_id) {
            return Err(PromptError::UnknownHouse(house_id));
        }
        // The house is only selected once its rooms are known.
        let rooms = store
            .select::<Room>(
                tables::ROOMS,
                &Query::new().eq("house_id", house_id).order_by("room_type", true),
            )
            .map_err(|e| {
                warn!("Failed to load rooms for house {}: {}", house_id, e);
                PromptError::RoomsUnavailable(house_id, e)
            })?;
        self.house = Some(house_id);
        self.rooms = rooms;
        Ok(())
    }

    pub fn select_room(&mut self, room: Option<RoomId>) -> Result<(), PromptError> {
        match room {
            None => self.room = None,
            Some(r) if self.rooms.iter().any(|x| x.id == r) => self.room = Some(r),
            Some(r) => return Err(PromptError::UnknownRoom(r)),
        }
        Ok(())
    }

    pub fn select_category(&mut self, category: Option<&str>) -> Result<(), PromptError> {
        self.category = match category {
            None => None,
            Some(c) => Some(find_category(c).ok_or_else(|| PromptError::UnknownCategory(c.to_string()))?),
        };
        Ok(())
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_icon(&mut self, icon: Option<&str>) -> Result<(), PromptError> {
        self.icon = match icon {
            None => None,
            Some(i) => Some(find_icon(i).ok_or_else(|| PromptError::UnknownIcon(i.to_string()))?),
        };
        Ok(())
    }

    /// Client-side validation; no network call happens on failure.
    pub fn submit(&self, how: PromptSubmit) -> Result<ClaimRequest, PromptError> {
        let name = match how {
            PromptSubmit::SaveName => {
                let trimmed = self.name.trim();
                if trimmed.is_empty() {
                    return Err(PromptError::NameRequired);
                }
                let len = trimmed.chars().count();
                if len > MAX_DEVICE_NAME_LEN {
                    return Err(PromptError::NameTooLong(len));
                }
                Some(trimmed.to_string())
            }
            PromptSubmit::Skip => None,
        };
        let house_id = self.house.ok_or(PromptError::HouseRequired)?;
        let room_id = self.room.ok_or(PromptError::RoomRequired)?;
        let category = self.category.ok_or(PromptError::CategoryRequired)?;
        Ok(ClaimRequest {
            device_code: self.device_code.clone(),
            name,
            icon: self.icon.map(str::to_string),
            house_id,
            room_id,
            category: category.to_string(),
        })
    }
}
