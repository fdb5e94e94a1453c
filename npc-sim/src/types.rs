use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use tsify_next::Tsify;

// ============================================================================
// IDs - Agents live in a slotmap arena, world entities are host handles
// ============================================================================

new_key_type! {
    pub struct AgentId;
}

/// Trait for converting SlotMap keys to u64 for WASM boundary
pub trait KeyToU64 {
    fn to_u64(self) -> u64;
}

impl KeyToU64 for AgentId {
    fn to_u64(self) -> u64 {
        self.0.as_ffi()
    }
}

impl AgentId {
    pub fn from_u64(raw: u64) -> Self {
        AgentId::from(slotmap::KeyData::from_ffi(raw))
    }
}

/// Opaque handle to an entity owned by the host world.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct EntityId(pub u64);

// ============================================================================
// Vec3 - World-space position
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(self, other: Vec3) -> f32 {
        let d = self - other;
        d.x * d.x + d.y * d.y + d.z * d.z
    }

    pub fn distance(self, other: Vec3) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vec3 {
    type Output = Vec3;
    fn div(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

// ============================================================================
// Needs & Goals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum NeedKind {
    Hunger,
    Thirst,
    Rest,
    Safety,
    Social,
}

impl NeedKind {
    /// Storage order.
    pub const ALL: [NeedKind; 5] = [
        NeedKind::Hunger,
        NeedKind::Thirst,
        NeedKind::Rest,
        NeedKind::Safety,
        NeedKind::Social,
    ];

    /// Scan order for goal selection. Equal priorities resolve to the
    /// earlier entry.
    pub const PRIORITY_ORDER: [NeedKind; 5] = [
        NeedKind::Safety,
        NeedKind::Hunger,
        NeedKind::Thirst,
        NeedKind::Rest,
        NeedKind::Social,
    ];

    pub fn index(self) -> usize {
        match self {
            NeedKind::Hunger => 0,
            NeedKind::Thirst => 1,
            NeedKind::Rest => 2,
            NeedKind::Safety => 3,
            NeedKind::Social => 4,
        }
    }

    /// The goal an urgent need of this kind drives.
    pub fn goal(self) -> GoalKind {
        match self {
            NeedKind::Hunger => GoalKind::FindFood,
            NeedKind::Thirst => GoalKind::FindWater,
            NeedKind::Rest => GoalKind::FindShelter,
            NeedKind::Safety => GoalKind::IncreaseSafety,
            NeedKind::Social => GoalKind::FulfillSocial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum GoalKind {
    #[default]
    None,
    FindFood,
    FindWater,
    FindShelter,
    FulfillSocial,
    IncreaseSafety,
    Work,
    Trade,
}

impl GoalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalKind::None => "none",
            GoalKind::FindFood => "find_food",
            GoalKind::FindWater => "find_water",
            GoalKind::FindShelter => "find_shelter",
            GoalKind::FulfillSocial => "fulfill_social",
            GoalKind::IncreaseSafety => "increase_safety",
            GoalKind::Work => "work",
            GoalKind::Trade => "trade",
        }
    }
}

// ============================================================================
// Scheduling classifications
// ============================================================================

/// Update-frequency tier. Derived from player distance every rebucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum Bucket {
    High,
    Medium,
    Low,
}

impl Bucket {
    pub fn index(self) -> usize {
        match self {
            Bucket::High => 0,
            Bucket::Medium => 1,
            Bucket::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::High => "high",
            Bucket::Medium => "medium",
            Bucket::Low => "low",
        }
    }
}

/// World cache category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum Category {
    Hostile,
    Friendly,
    Water,
    Shelter,
}

impl Category {
    /// Classification precedence: the first match wins.
    pub const ALL: [Category; 4] = [
        Category::Hostile,
        Category::Friendly,
        Category::Water,
        Category::Shelter,
    ];

    pub fn index(self) -> usize {
        match self {
            Category::Hostile => 0,
            Category::Friendly => 1,
            Category::Water => 2,
            Category::Shelter => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum Archetype {
    Patrol,
    Work,
    Social,
    Defense,
    Trade,
}

impl Archetype {
    /// Formation order. Earlier archetypes claim agents first.
    pub const ALL: [Archetype; 5] = [
        Archetype::Patrol,
        Archetype::Work,
        Archetype::Social,
        Archetype::Defense,
        Archetype::Trade,
    ];
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Archetype::Patrol => "Patrol",
            Archetype::Work => "Work",
            Archetype::Social => "Social",
            Archetype::Defense => "Defense",
            Archetype::Trade => "Trade",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Occupation - Parsed from an entity's display tag
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Occupation {
    Miller,
    Landowner,
    TavernKeeper,
    Guard,
    Warrior,
    Farmer,
    Smith,
    Merchant,
    #[default]
    Generic,
}

impl Occupation {
    pub fn from_tag(tag: &str) -> Self {
        // TavernKeeper before anything shorter it might contain
        const MARKERS: [(&str, Occupation); 9] = [
            ("TavernKeeper", Occupation::TavernKeeper),
            ("Landowner", Occupation::Landowner),
            ("Miller", Occupation::Miller),
            ("Guard", Occupation::Guard),
            ("Warrior", Occupation::Warrior),
            ("Farmer", Occupation::Farmer),
            ("Smith", Occupation::Smith),
            ("Merchant", Occupation::Merchant),
            ("Trader", Occupation::Merchant),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| tag.contains(marker))
            .map(|(_, occupation)| *occupation)
            .unwrap_or_default()
    }

    pub fn is_generic(self) -> bool {
        self == Occupation::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupation_from_tag() {
        assert_eq!(Occupation::from_tag("Miller_03"), Occupation::Miller);
        assert_eq!(Occupation::from_tag("TavernKeeper_Rose"), Occupation::TavernKeeper);
        assert_eq!(Occupation::from_tag("Trader_East"), Occupation::Merchant);
        assert_eq!(Occupation::from_tag("Villager"), Occupation::Generic);
    }

    #[test]
    fn test_need_goal_mapping() {
        assert_eq!(NeedKind::Hunger.goal(), GoalKind::FindFood);
        assert_eq!(NeedKind::Thirst.goal(), GoalKind::FindWater);
        assert_eq!(NeedKind::Rest.goal(), GoalKind::FindShelter);
        assert_eq!(NeedKind::Safety.goal(), GoalKind::IncreaseSafety);
        assert_eq!(NeedKind::Social.goal(), GoalKind::FulfillSocial);
    }

    #[test]
    fn test_agent_id_u64_roundtrip_through_slotmap() {
        let mut map: slotmap::SlotMap<AgentId, ()> = slotmap::SlotMap::with_key();
        let id = map.insert(());
        assert_eq!(AgentId::from_u64(id.to_u64()), id);
    }

    #[test]
    fn test_vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(a.distance_squared(b), 25.0);
        assert_eq!(a.distance(b), 5.0);
    }
}
