//! Categorized snapshot of "what is nearby", rebuilt on an interval.
//!
//! Membership and positions are both captured at rebuild time, so a query may
//! answer with data up to one cache interval old. Callers making
//! safety-critical decisions from `nearby(Category::Hostile, ..)` must accept
//! that staleness; the scheduler does not report it per query.

use crate::types::{Category, EntityId, Vec3};
use crate::world::WorldView;

/// Name markers per category, checked in `Category::ALL` order.
const HOSTILE_MARKERS: &[&str] = &["Wolf", "Bandit", "Hostile"];
const FRIENDLY_MARKERS: &[&str] = &[
    "NPC",
    "Miller",
    "Landowner",
    "TavernKeeper",
    "Guard",
    "Warrior",
    "Farmer",
    "Smith",
    "Merchant",
    "Trader",
];
const WATER_MARKERS: &[&str] = &["Well", "River", "Water"];
const SHELTER_MARKERS: &[&str] = &["House", "Inn", "Shelter"];

fn markers(category: Category) -> &'static [&'static str] {
    match category {
        Category::Hostile => HOSTILE_MARKERS,
        Category::Friendly => FRIENDLY_MARKERS,
        Category::Water => WATER_MARKERS,
        Category::Shelter => SHELTER_MARKERS,
    }
}

/// First matching category wins: Hostile > Friendly > Water > Shelter.
pub fn classify(tag: &str) -> Option<Category> {
    Category::ALL
        .into_iter()
        .find(|&category| markers(category).iter().any(|m| tag.contains(m)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedEntity {
    pub entity: EntityId,
    pub position: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct WorldCache {
    lists: [Vec<CachedEntity>; 4],
    built_at: Option<f64>,
}

impl WorldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear and rescan every entity once. Entities without a position or tag
    /// are skipped, as are entities matching no category.
    pub fn rebuild<W: WorldView + ?Sized>(&mut self, world: &W, now: f64) {
        for list in &mut self.lists {
            list.clear();
        }

        for entity in world.entities() {
            let (Some(tag), Some(position)) = (world.display_tag(entity), world.position(entity))
            else {
                continue;
            };
            if let Some(category) = classify(tag) {
                self.lists[category.index()].push(CachedEntity { entity, position });
            }
        }

        self.built_at = Some(now);
    }

    /// Entities of `category` within `radius` of `point` (inclusive).
    pub fn nearby(&self, category: Category, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.nearby_entries(category, point, radius)
            .map(|c| c.entity)
            .collect()
    }

    pub fn nearby_entries(
        &self,
        category: Category,
        point: Vec3,
        radius: f32,
    ) -> impl Iterator<Item = &CachedEntity> + '_ {
        let radius_sq = if radius >= 0.0 { radius * radius } else { -1.0 };
        self.lists[category.index()]
            .iter()
            .filter(move |c| c.position.distance_squared(point) <= radius_sq)
    }

    /// Closest cached entity of `category` within `radius`, ignoring `exclude`.
    pub fn nearest(
        &self,
        category: Category,
        point: Vec3,
        radius: f32,
        exclude: Option<EntityId>,
    ) -> Option<CachedEntity> {
        self.nearby_entries(category, point, radius)
            .filter(|c| Some(c.entity) != exclude)
            .min_by(|a, b| {
                a.position
                    .distance_squared(point)
                    .total_cmp(&b.position.distance_squared(point))
            })
            .copied()
    }

    pub fn entries(&self, category: Category) -> &[CachedEntity] {
        &self.lists[category.index()]
    }

    pub fn count(&self, category: Category) -> usize {
        self.lists[category.index()].len()
    }

    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_built(&self) -> bool {
        self.built_at.is_some()
    }

    pub fn built_at(&self) -> Option<f64> {
        self.built_at
    }

    /// Seconds since the last rebuild, `None` if never built.
    pub fn age(&self, now: f64) -> Option<f64> {
        self.built_at.map(|t| (now - t).max(0.0))
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
        self.built_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::SandboxWorld;

    #[test]
    fn test_classify_precedence() {
        assert_eq!(classify("Bandit_01"), Some(Category::Hostile));
        // Hostile wins over friendly
        assert_eq!(classify("HostileGuard"), Some(Category::Hostile));
        // Friendly wins over water
        assert_eq!(classify("NPC_WellKeeper"), Some(Category::Friendly));
        assert_eq!(classify("RiverCrossing"), Some(Category::Water));
        assert_eq!(classify("Inn_Crossroads"), Some(Category::Shelter));
        assert_eq!(classify("Rock"), None);
    }

    #[test]
    fn test_rebuild_is_wholesale() {
        let mut world = SandboxWorld::new();
        let wolf = world.spawn("Wolf_A", Vec3::ZERO);
        world.spawn("House_1", Vec3::new(50.0, 0.0, 0.0));

        let mut cache = WorldCache::new();
        cache.rebuild(&world, 0.0);
        assert_eq!(cache.count(Category::Hostile), 1);
        assert_eq!(cache.count(Category::Shelter), 1);

        world.despawn(wolf);
        cache.rebuild(&world, 2.0);
        assert_eq!(cache.count(Category::Hostile), 0);
        assert_eq!(cache.total(), 1);
        assert_eq!(cache.age(3.5), Some(1.5));
    }

    #[test]
    fn test_nearby_radius_is_inclusive() {
        let mut world = SandboxWorld::new();
        let well = world.spawn("Well_North", Vec3::new(10.0, 0.0, 0.0));
        let mut cache = WorldCache::new();
        cache.rebuild(&world, 0.0);

        assert_eq!(cache.nearby(Category::Water, Vec3::ZERO, 10.0), vec![well]);
        assert!(cache.nearby(Category::Water, Vec3::ZERO, 9.9).is_empty());
        assert!(cache.nearby(Category::Water, Vec3::ZERO, -1.0).is_empty());
        assert!(cache.nearby(Category::Shelter, Vec3::ZERO, 1e6).is_empty());
    }

    #[test]
    fn test_nearest_skips_excluded() {
        let mut world = SandboxWorld::new();
        let near = world.spawn("NPC_A", Vec3::new(5.0, 0.0, 0.0));
        let far = world.spawn("NPC_B", Vec3::new(50.0, 0.0, 0.0));
        let mut cache = WorldCache::new();
        cache.rebuild(&world, 0.0);

        let hit = cache.nearest(Category::Friendly, Vec3::ZERO, 100.0, None);
        assert_eq!(hit.map(|c| c.entity), Some(near));
        let hit = cache.nearest(Category::Friendly, Vec3::ZERO, 100.0, Some(near));
        assert_eq!(hit.map(|c| c.entity), Some(far));
    }
}
