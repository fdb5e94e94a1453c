use serde::Serialize;
use wasm_bindgen::prelude::*;

pub mod cache;
pub mod clock;
pub mod config;
pub mod needs;
pub mod planner;
pub mod scheduler;
mod snapshot;
mod types;
pub mod world;

pub use cache::{CachedEntity, WorldCache, classify};
pub use clock::{Clock, FixedClock, GameClock};
pub use config::{NeedSpec, NeedsConfig, SchedulerConfig};
pub use needs::{Need, NeedStore, Situation};
pub use planner::{
    Goal, GroupDirective, NeedsPlanner, PlannerContext, UpdateReport, Want, completion_bundle,
};
pub use scheduler::{Agent, Group, Scheduler, SocialBonds};
pub use snapshot::*;
pub use types::*;
pub use world::{SandboxWorld, WorldView};

#[cfg(feature = "instrument")]
pub use instrument;

// ============================================================================
// WASM API - Simulation
// ============================================================================

#[derive(Serialize)]
struct WantRecord {
    agent: u64,
    want: Want,
}

#[wasm_bindgen]
pub struct Simulation {
    scheduler: Scheduler<SandboxWorld>,
}

#[wasm_bindgen]
impl Simulation {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64, start_hour: f32) -> Self {
        // Better panic messages in browser console
        console_error_panic_hook::set_once();

        let config = SchedulerConfig::default().with_seed(seed);
        Self {
            scheduler: Scheduler::new(SandboxWorld::new(), GameClock::new(start_hour), config),
        }
    }

    /// Build from a JSON `SchedulerConfig`; missing fields take defaults
    #[wasm_bindgen]
    pub fn from_config_json(config_json: &str, start_hour: f32) -> Result<Simulation, JsValue> {
        console_error_panic_hook::set_once();

        let config = SchedulerConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&format!("invalid scheduler config: {e}")))?;
        Ok(Self {
            scheduler: Scheduler::new(SandboxWorld::new(), GameClock::new(start_hour), config),
        })
    }

    // === World ===

    #[wasm_bindgen]
    pub fn add_entity(&mut self, name: &str, x: f32, y: f32, z: f32) -> u64 {
        self.scheduler.world_mut().spawn(name, Vec3::new(x, y, z)).0
    }

    #[wasm_bindgen]
    pub fn move_entity(&mut self, entity: u64, x: f32, y: f32, z: f32) -> bool {
        self.scheduler
            .world_mut()
            .move_entity(EntityId(entity), Vec3::new(x, y, z))
    }

    /// Unregisters the entity's agent first, if it has one
    #[wasm_bindgen]
    pub fn remove_entity(&mut self, entity: u64) -> bool {
        let entity = EntityId(entity);
        self.scheduler.unregister_entity(entity);
        self.scheduler.world_mut().despawn(entity).is_some()
    }

    #[wasm_bindgen]
    pub fn add_player(&mut self, x: f32, y: f32, z: f32) {
        self.scheduler.world_mut().add_player(Vec3::new(x, y, z));
    }

    #[wasm_bindgen]
    pub fn clear_players(&mut self) {
        self.scheduler.world_mut().clear_players();
    }

    #[wasm_bindgen]
    pub fn set_paused(&mut self, paused: bool) {
        self.scheduler.world_mut().set_paused(paused);
    }

    // === Agents ===

    #[wasm_bindgen]
    pub fn register_agent(&mut self, entity: u64) -> u64 {
        self.scheduler.register(EntityId(entity)).to_u64()
    }

    #[wasm_bindgen]
    pub fn unregister_agent(&mut self, agent: u64) -> bool {
        self.scheduler.unregister(AgentId::from_u64(agent)).is_some()
    }

    // === Simulation ===

    #[wasm_bindgen]
    pub fn step(&mut self, dt: f32) {
        self.scheduler.step(dt);
    }

    #[wasm_bindgen]
    pub fn force_refresh_cache(&mut self) {
        self.scheduler.force_refresh_cache();
    }

    #[wasm_bindgen]
    pub fn nearby(&self, category: Category, x: f32, y: f32, z: f32, radius: f32) -> Vec<u64> {
        self.scheduler
            .nearby(category, Vec3::new(x, y, z), radius)
            .into_iter()
            .map(|e| e.0)
            .collect()
    }

    #[wasm_bindgen]
    pub fn get_step(&self) -> u64 {
        self.scheduler.step_count()
    }

    #[wasm_bindgen]
    pub fn get_time_of_day(&self) -> f32 {
        self.scheduler.time_of_day()
    }

    /// Get a snapshot of the current state for host tooling
    #[wasm_bindgen]
    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.scheduler.snapshot()
    }

    /// Empty every planner outbox. Returns `[{ agent, want }]`.
    #[wasm_bindgen]
    pub fn drain_wants(&mut self) -> Result<JsValue, JsValue> {
        let records: Vec<WantRecord> = self
            .scheduler
            .drain_wants()
            .into_iter()
            .map(|(agent, want)| WantRecord {
                agent: agent.to_u64(),
                want,
            })
            .collect();
        serde_wasm_bindgen::to_value(&records).map_err(JsValue::from)
    }
}
