// Host world contract and an in-memory implementation of it

use std::collections::BTreeMap;

use crate::types::{EntityId, Vec3};

/// What the scheduler needs from the host world.
///
/// The scheduler calls `entities` once per cache refresh and
/// `player_positions` once per rebucket; `position` and `display_tag` are
/// per-entity lookups that return `None` for entities the world no longer
/// knows about.
pub trait WorldView {
    fn entities(&self) -> Vec<EntityId>;
    fn player_positions(&self) -> Vec<Vec3>;
    fn position(&self, entity: EntityId) -> Option<Vec3>;
    fn display_tag(&self, entity: EntityId) -> Option<&str>;

    /// Replicas mirror the owning side and never run the scheduler
    fn is_authoritative(&self) -> bool {
        true
    }

    fn is_paused(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct SandboxEntity {
    pub name: String,
    pub position: Vec3,
}

/// Flat entity table with player markers. Iteration is ordered by id.
#[derive(Debug, Clone)]
pub struct SandboxWorld {
    entities: BTreeMap<EntityId, SandboxEntity>,
    players: Vec<Vec3>,
    next_entity_id: u64,
    paused: bool,
    authoritative: bool,
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxWorld {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            players: Vec::new(),
            next_entity_id: 1,
            paused: false,
            authoritative: true,
        }
    }

    // === Entity Management ===

    pub fn spawn(&mut self, name: impl Into<String>, position: Vec3) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        self.entities.insert(
            id,
            SandboxEntity {
                name: name.into(),
                position,
            },
        );
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<SandboxEntity> {
        self.entities.remove(&id)
    }

    /// Returns false if the entity does not exist
    pub fn move_entity(&mut self, id: EntityId, position: Vec3) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.position = position;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&SandboxEntity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    // === Players & Flags ===

    pub fn add_player(&mut self, position: Vec3) {
        self.players.push(position);
    }

    pub fn set_players(&mut self, positions: Vec<Vec3>) {
        self.players = positions;
    }

    pub fn clear_players(&mut self) {
        self.players.clear();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.authoritative = authoritative;
    }
}

impl WorldView for SandboxWorld {
    fn entities(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    fn player_positions(&self) -> Vec<Vec3> {
        self.players.clone()
    }

    fn position(&self, entity: EntityId) -> Option<Vec3> {
        self.entities.get(&entity).map(|e| e.position)
    }

    fn display_tag(&self, entity: EntityId) -> Option<&str> {
        self.entities.get(&entity).map(|e| e.name.as_str())
    }

    fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}
