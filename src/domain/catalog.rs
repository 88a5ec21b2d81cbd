//! Static property catalog: properties, sets, prices, yields and cooldowns.
//!
//! Loaded once at startup (built-in table or `CATALOG_PATH` JSON) and
//! shared read-only behind an `Arc` afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Set bonus used by the built-in catalog (40%).
pub const DEFAULT_SET_BONUS_BPS: u32 = 4000;

/// One purchasable property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: u32,
    pub set_id: u32,
    #[serde(default)]
    pub name: Option<String>,
    /// Price per slot in the smallest currency unit.
    pub price: u64,
    /// Daily yield per slot, in basis points of `price`.
    pub yield_bps: u32,
    /// Purchase cooldown for the property's set, in seconds.
    pub cooldown_secs: i64,
}

impl Property {
    /// Daily income per slot scaled by 10_000 (exact, no rounding).
    pub fn scaled_income_per_slot(&self) -> i128 {
        self.price as i128 * self.yield_bps as i128
    }
}

/// A group of properties that pays a bonus when fully owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySet {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub bonus_bps: u32,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate property id {0}")]
    DuplicateProperty(u32),
    #[error("duplicate set id {0}")]
    DuplicateSet(u32),
    #[error("property {property} references unknown set {set}")]
    UnknownSet { property: u32, set: u32 },
    #[error("set {0} has no properties")]
    EmptySet(u32),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    sets: Vec<PropertySet>,
    properties: Vec<Property>,
}

/// Validated, read-only catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    properties: BTreeMap<u32, Property>,
    sets: BTreeMap<u32, PropertySet>,
    members: BTreeMap<u32, Vec<u32>>,
}

impl Catalog {
    pub fn new(sets: Vec<PropertySet>, properties: Vec<Property>) -> Result<Self, CatalogError> {
        let mut set_map = BTreeMap::new();
        for set in sets {
            let id = set.id;
            if set_map.insert(id, set).is_some() {
                return Err(CatalogError::DuplicateSet(id));
            }
        }

        let mut members: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let mut property_map = BTreeMap::new();
        for property in properties {
            if !set_map.contains_key(&property.set_id) {
                return Err(CatalogError::UnknownSet {
                    property: property.id,
                    set: property.set_id,
                });
            }
            let id = property.id;
            members.entry(property.set_id).or_default().push(id);
            if property_map.insert(id, property).is_some() {
                return Err(CatalogError::DuplicateProperty(id));
            }
        }

        if let Some(empty) = set_map.keys().find(|id| !members.contains_key(id)) {
            return Err(CatalogError::EmptySet(*empty));
        }
        for ids in members.values_mut() {
            ids.sort_unstable();
        }

        Ok(Catalog {
            properties: property_map,
            sets: set_map,
            members,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file.sets, file.properties)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// The 22-property, 8-set board the game program ships with.
    pub fn builtin() -> Self {
        let (sets, properties) = builtin_table();
        // Static data; `test_builtin_table_is_valid` keeps it consistent.
        match Self::new(sets, properties) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("builtin catalog is invalid: {}", e),
        }
    }

    pub fn property(&self, id: u32) -> Option<&Property> {
        self.properties.get(&id)
    }

    pub fn set(&self, id: u32) -> Option<&PropertySet> {
        self.sets.get(&id)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    pub fn sets(&self) -> impl Iterator<Item = &PropertySet> {
        self.sets.values()
    }

    /// Property ids in a set, ascending.
    pub fn set_members(&self, set_id: u32) -> &[u32] {
        self.members.get(&set_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn member_count(&self, set_id: u32) -> usize {
        self.set_members(set_id).len()
    }

    /// Set purchase cooldown: taken from the set's first property.
    pub fn set_cooldown_secs(&self, set_id: u32) -> Option<i64> {
        self.set_members(set_id)
            .first()
            .and_then(|id| self.property(*id))
            .map(|p| p.cooldown_secs)
    }

    /// Steal cooldown is per property and half the buy cooldown.
    pub fn steal_cooldown_secs(&self, property_id: u32) -> Option<i64> {
        self.property(property_id).map(|p| p.cooldown_secs / 2)
    }
}

/// Sets and properties of the built-in board, in id order.
fn builtin_table() -> (Vec<PropertySet>, Vec<Property>) {
    const HOUR: i64 = 3600;
    // (set, name, price, yield_bps, cooldown hours, property names)
    let table: [(&str, u64, u32, i64, &[&str]); 8] = [
        ("Brown", 1_500_000_000_000, 600, 6, &["Mediterranean Avenue", "Baltic Avenue"]),
        ("Light Blue", 3_500_000_000_000, 650, 8, &["Oriental Avenue", "Vermont Avenue", "Connecticut Avenue"]),
        ("Pink", 7_500_000_000_000, 700, 10, &["St. Charles Place", "States Avenue", "Virginia Avenue"]),
        ("Orange", 15_000_000_000_000, 750, 12, &["St. James Place", "Tennessee Avenue", "New York Avenue"]),
        ("Red", 30_000_000_000_000, 800, 16, &["Kentucky Avenue", "Indiana Avenue", "Illinois Avenue"]),
        ("Yellow", 60_000_000_000_000, 850, 20, &["Atlantic Avenue", "Ventnor Avenue", "Marvin Gardens"]),
        ("Green", 120_000_000_000_000, 900, 24, &["Pacific Avenue", "North Carolina Avenue", "Pennsylvania Avenue"]),
        ("Dark Blue", 250_000_000_000_000, 1000, 24, &["Park Place", "Boardwalk"]),
    ];

    let mut sets = Vec::new();
    let mut properties = Vec::new();
    let mut next_id = 0u32;
    for (set_id, (set_name, price, yield_bps, hours, names)) in table.iter().enumerate() {
        sets.push(PropertySet {
            id: set_id as u32,
            name: Some(set_name.to_string()),
            bonus_bps: DEFAULT_SET_BONUS_BPS,
        });
        for name in names.iter() {
            properties.push(Property {
                id: next_id,
                set_id: set_id as u32,
                name: Some(name.to_string()),
                price: *price,
                yield_bps: *yield_bps,
                cooldown_secs: hours * HOUR,
            });
            next_id += 1;
        }
    }

    (sets, properties)
}
