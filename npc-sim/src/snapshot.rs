use serde::{Deserialize, Serialize};
use tsify_next::Tsify;

use crate::scheduler::Scheduler;
use crate::types::{Archetype, Bucket, Category, GoalKind, KeyToU64, NeedKind};
use crate::world::WorldView;

// ============================================================================
// Serializable Scheduler Snapshot for JS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct SchedulerSnapshot {
    pub step: u64,
    pub time_of_day: f32,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub agents: Vec<AgentSnapshot>,
    pub groups: Vec<GroupSnapshot>,
    pub cache: CacheSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct AgentSnapshot {
    pub id: u64,
    pub entity: u64,
    pub tag: String,
    pub bucket: Bucket,
    pub goal: GoalKind,
    pub goal_progress: f32,
    pub needs: NeedValues,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct NeedValues {
    pub hunger: f32,
    pub thirst: f32,
    pub rest: f32,
    pub safety: f32,
    pub social: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct GroupSnapshot {
    pub id: String,
    pub archetype: Archetype,
    pub leader: Option<u64>,
    pub members: Vec<u64>,
    pub objective: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tsify)]
#[tsify(into_wasm_abi)]
pub struct CacheSnapshot {
    pub hostiles: usize,
    pub friendlies: usize,
    pub water: usize,
    pub shelters: usize,
    /// Seconds since the last rebuild, absent before the first one
    pub age_seconds: Option<f64>,
}

impl<W: WorldView> Scheduler<W> {
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let agents = self
            .agents()
            .map(|(id, agent)| {
                let value = |kind| agent.planner.need_value(kind);
                AgentSnapshot {
                    id: id.to_u64(),
                    entity: agent.entity.0,
                    tag: agent.tag.clone(),
                    bucket: agent.bucket,
                    goal: agent.last_goal,
                    goal_progress: agent.planner.goal_progress(),
                    needs: NeedValues {
                        hunger: value(NeedKind::Hunger),
                        thirst: value(NeedKind::Thirst),
                        rest: value(NeedKind::Rest),
                        safety: value(NeedKind::Safety),
                        social: value(NeedKind::Social),
                    },
                }
            })
            .collect();

        let groups = self
            .groups()
            .iter()
            .map(|g| GroupSnapshot {
                id: g.id.clone(),
                archetype: g.archetype,
                leader: g.leader().map(|l| l.to_u64()),
                members: g.members.iter().map(|m| m.to_u64()).collect(),
                objective: g.objective.clone(),
            })
            .collect();

        let cache = self.cache();
        SchedulerSnapshot {
            step: self.step_count(),
            time_of_day: self.time_of_day(),
            high: self.bucket(Bucket::High).len(),
            medium: self.bucket(Bucket::Medium).len(),
            low: self.bucket(Bucket::Low).len(),
            agents,
            groups,
            cache: CacheSnapshot {
                hostiles: cache.count(Category::Hostile),
                friendlies: cache.count(Category::Friendly),
                water: cache.count(Category::Water),
                shelters: cache.count(Category::Shelter),
                age_seconds: cache.age(self.sim_time()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::clock::FixedClock;
    use crate::config::SchedulerConfig;
    use crate::scheduler::Scheduler;
    use crate::types::{Bucket, GoalKind, Vec3};
    use crate::world::SandboxWorld;

    #[test]
    fn test_snapshot_reflects_registry() {
        let mut sched =
            Scheduler::new(SandboxWorld::new(), FixedClock(9.0), SchedulerConfig::default());
        let e = sched.world_mut().spawn("Farmer_01", Vec3::ZERO);
        sched.world_mut().spawn("Wolf_01", Vec3::new(1_000.0, 0.0, 0.0));
        sched.register(e);
        sched.force_refresh_cache();

        let snap = sched.snapshot();
        assert_eq!(snap.low, 1);
        assert_eq!(snap.agents.len(), 1);
        assert_eq!(snap.agents[0].tag, "Farmer_01");
        assert_eq!(snap.agents[0].bucket, Bucket::Low);
        assert_eq!(snap.agents[0].goal, GoalKind::None);
        assert_eq!(snap.agents[0].needs.hunger, 80.0);
        assert_eq!(snap.cache.hostiles, 1);
        assert_eq!(snap.cache.friendlies, 1);
        assert_eq!(snap.cache.age_seconds, Some(0.0));
    }
}
