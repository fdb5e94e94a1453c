//! Agent scheduler: frequency bucketing, round-robin time slicing, the world
//! cache, and the slower group/social layer.
//!
//! Everything runs on the caller's thread inside [`Scheduler::step`]. Planners
//! only ever see a borrowed [`PlannerContext`]; the scheduler owns every agent
//! by value in a slotmap arena.

mod groups;
mod social;

pub use groups::{Candidate, Delivery, Group, GroupBoard};
pub use social::{BondPassStats, BondSubject, SocialBonds, target_bond};

use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use slotmap::SlotMap;

use crate::cache::WorldCache;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::planner::{NeedsPlanner, PlannerContext, Want};
use crate::types::{AgentId, Bucket, Category, EntityId, GoalKind, KeyToU64, Occupation, Vec3};
use crate::world::WorldView;

// ============================================================================
// Agent - One registered planner and its world handle
// ============================================================================

#[derive(Debug, Clone)]
pub struct Agent {
    pub entity: EntityId,
    /// Display tag captured at registration
    pub tag: String,
    pub occupation: Occupation,
    pub planner: NeedsPlanner,
    pub bucket: Bucket,
    /// Goal of the most recent execution pass
    pub last_goal: GoalKind,
    /// Planner invocations since registration
    pub updates: u64,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler<W: WorldView> {
    world: W,
    clock: Box<dyn Clock>,
    config: SchedulerConfig,

    agents: SlotMap<AgentId, Agent>,
    by_entity: HashMap<EntityId, AgentId>,

    /// Indexed by `Bucket::index`
    buckets: [Vec<AgentId>; 3],
    cursors: [usize; 3],

    rebucket_timer: f32,
    cache_timer: f32,
    group_timer: f32,

    cache: WorldCache,
    groups: GroupBoard,
    bonds: SocialBonds,

    step_count: u64,
    sim_time: f64,
    rng: StdRng,
}

impl<W: WorldView> Scheduler<W> {
    pub fn new(world: W, clock: impl Clock + 'static, config: SchedulerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            world,
            clock: Box::new(clock),
            config,
            agents: SlotMap::with_key(),
            by_entity: HashMap::new(),
            buckets: [Vec::new(), Vec::new(), Vec::new()],
            cursors: [0; 3],
            rebucket_timer: 0.0,
            cache_timer: 0.0,
            group_timer: 0.0,
            cache: WorldCache::new(),
            groups: GroupBoard::new(),
            bonds: SocialBonds::new(),
            step_count: 0,
            sim_time: 0.0,
            rng,
        }
    }

    // === Accessors ===

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn time_of_day(&self) -> f32 {
        self.clock.time_of_day()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn cache(&self) -> &WorldCache {
        &self.cache
    }

    pub fn groups(&self) -> &[Group] {
        self.groups.groups()
    }

    pub fn group_of(&self, agent: AgentId) -> Option<&Group> {
        self.groups.group_of(agent)
    }

    pub fn bonds(&self) -> &SocialBonds {
        &self.bonds
    }

    pub fn bond(&self, a: AgentId, b: AgentId) -> f32 {
        self.bonds.bond(a, b)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Mutable access for collaborators that call `satisfy` or
    /// `execute_goal` on a planner directly.
    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.agents.iter()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent_for_entity(&self, entity: EntityId) -> Option<AgentId> {
        self.by_entity.get(&entity).copied()
    }

    pub fn is_registered(&self, id: AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn bucket(&self, bucket: Bucket) -> &[AgentId] {
        &self.buckets[bucket.index()]
    }

    pub fn bucket_of(&self, id: AgentId) -> Option<Bucket> {
        self.agents.get(id).map(|a| a.bucket)
    }

    // === Registration ===

    /// Add the entity's planner to the registry and the Low bucket. An entity
    /// that is already registered keeps its agent and id.
    pub fn register(&mut self, entity: EntityId) -> AgentId {
        if let Some(&existing) = self.by_entity.get(&entity) {
            return existing;
        }

        let tag = self.world.display_tag(entity).unwrap_or_default().to_owned();
        let occupation = Occupation::from_tag(&tag);
        let planner = NeedsPlanner::new(&self.config.needs, occupation);
        let id = self.agents.insert(Agent {
            entity,
            tag,
            occupation,
            planner,
            bucket: Bucket::Low,
            last_goal: GoalKind::None,
            updates: 0,
        });
        self.by_entity.insert(entity, id);
        self.buckets[Bucket::Low.index()].push(id);

        tracing::debug!(agent = id.to_u64(), entity = entity.0, ?occupation, "agent registered");
        id
    }

    /// Withdraw the agent from the registry, every bucket, its group and the
    /// bond matrix. Pending wants are discarded. No-op if absent.
    pub fn unregister(&mut self, id: AgentId) -> Option<Agent> {
        let agent = self.agents.remove(id)?;
        self.by_entity.remove(&agent.entity);
        for bucket in &mut self.buckets {
            bucket.retain(|&a| a != id);
        }
        self.groups.remove_agent(id);
        self.bonds.remove_agent(id);

        tracing::debug!(agent = id.to_u64(), entity = agent.entity.0, "agent unregistered");
        Some(agent)
    }

    pub fn unregister_entity(&mut self, entity: EntityId) -> Option<Agent> {
        let id = self.by_entity.get(&entity).copied()?;
        self.unregister(id)
    }

    // === Step ===

    /// The single per-frame entry point. Does nothing while the world is
    /// paused or on a non-authoritative replica.
    pub fn step(&mut self, dt: f32) {
        if self.world.is_paused() || !self.world.is_authoritative() {
            return;
        }

        self.step_count += 1;
        self.sim_time += dt as f64;
        self.clock.advance(dt);

        self.rebucket_timer += dt;
        if self.rebucket_timer >= self.config.rebucket_interval {
            self.rebucket();
            self.rebucket_timer = 0.0;
        }

        self.cache_timer += dt;
        if self.cache_timer >= self.config.cache_interval {
            self.refresh_world_cache();
            self.cache_timer = 0.0;
        }

        self.coordinate_groups(dt);
        self.run_time_slices(dt);
    }

    /// Reclassify every agent by distance to the nearest player. No players
    /// (or no position) means Low.
    pub fn rebucket(&mut self) {
        let players = self.world.player_positions();
        let high_sq = self.config.high_radius * self.config.high_radius;
        let medium_sq = self.config.medium_radius * self.config.medium_radius;

        for bucket in &mut self.buckets {
            bucket.clear();
        }

        for (id, agent) in &mut self.agents {
            let nearest_sq = self.world.position(agent.entity).and_then(|p| {
                players
                    .iter()
                    .map(|player| player.distance_squared(p))
                    .min_by(f32::total_cmp)
            });
            agent.bucket = match nearest_sq {
                Some(d) if d <= high_sq => Bucket::High,
                Some(d) if d <= medium_sq => Bucket::Medium,
                _ => Bucket::Low,
            };
            self.buckets[agent.bucket.index()].push(id);
        }

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "rebucket",
            step = self.step_count,
            high = self.buckets[Bucket::High.index()].len(),
            medium = self.buckets[Bucket::Medium.index()].len(),
            low = self.buckets[Bucket::Low.index()].len(),
            players = players.len(),
        );
    }

    /// Rebuild the world cache from a full entity scan.
    pub fn refresh_world_cache(&mut self) {
        #[cfg(feature = "instrument")]
        let previous_age = self.cache.age(self.sim_time);
        self.cache.rebuild(&self.world, self.sim_time);

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "cache_refresh",
            step = self.step_count,
            hostiles = self.cache.count(Category::Hostile),
            friendlies = self.cache.count(Category::Friendly),
            water = self.cache.count(Category::Water),
            shelters = self.cache.count(Category::Shelter),
            age_seconds = previous_age.unwrap_or(0.0),
        );
    }

    /// Synchronous rebuild that bypasses the cache timer. For tooling.
    pub fn force_refresh_cache(&mut self) {
        self.refresh_world_cache();
    }

    // === Spatial queries ===

    /// Cached entities of `category` within `radius` of `point`. Answers come
    /// from the last rebuild and may be up to one cache interval stale.
    pub fn nearby(&self, category: Category, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.cache.nearby(category, point, radius)
    }

    pub fn nearby_hostiles(&self, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.nearby(Category::Hostile, point, radius)
    }

    pub fn nearby_friendlies(&self, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.nearby(Category::Friendly, point, radius)
    }

    pub fn nearby_water(&self, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.nearby(Category::Water, point, radius)
    }

    pub fn nearby_shelters(&self, point: Vec3, radius: f32) -> Vec<EntityId> {
        self.nearby(Category::Shelter, point, radius)
    }

    // === Planner access ===

    /// Borrowed context for `id` as the scheduler would build it this step.
    /// `None` for unknown agents or agents without a world position.
    pub fn planner_context(&self, id: AgentId) -> Option<PlannerContext<'_>> {
        let agent = self.agents.get(id)?;
        let position = self.world.position(agent.entity)?;
        Some(PlannerContext {
            entity: agent.entity,
            position,
            tag: &agent.tag,
            time_of_day: self.clock.time_of_day(),
            cache: self.cache.is_built().then_some(&self.cache),
        })
    }

    /// Empty every planner's outbox, in registry order.
    pub fn drain_wants(&mut self) -> Vec<(AgentId, Want)> {
        let mut out = Vec::new();
        for (id, agent) in &mut self.agents {
            out.extend(agent.planner.drain_wants().into_iter().map(|w| (id, w)));
        }
        out
    }

    // === Internals ===

    fn agent_positions(&self) -> Vec<(AgentId, Vec3)> {
        self.agents
            .iter()
            .filter_map(|(id, a)| self.world.position(a.entity).map(|p| (id, p)))
            .collect()
    }

    /// Formation every `group_interval`, then bond smoothing and directive
    /// delivery every step.
    fn coordinate_groups(&mut self, dt: f32) {
        self.group_timer += dt;
        if self.group_timer >= self.config.group_interval {
            self.group_timer = 0.0;
            self.form_groups();
        }

        let positions = self.agent_positions();
        self.update_social_bonds(&positions);
        self.deliver_directives(&positions);
    }

    fn form_groups(&mut self) {
        let candidates: Vec<Candidate<'_>> = self
            .agents
            .iter()
            .map(|(id, a)| Candidate {
                id,
                tag: &a.tag,
                position: self.world.position(a.entity),
            })
            .collect();
        let hostiles = self.cache.count(Category::Hostile);
        self.groups.form(&candidates, hostiles, &self.config);

        for group in self.groups.groups() {
            tracing::debug!(group = %group.id, members = group.members.len(), "group formed");
            #[cfg(feature = "instrument")]
            tracing::info!(
                target: "group_formed",
                step = self.step_count,
                group_id = group.id.as_str(),
                archetype = %group.archetype,
                members = group.members.len(),
            );
        }
    }

    fn update_social_bonds(&mut self, positions: &[(AgentId, Vec3)]) {
        let subjects: Vec<BondSubject> = positions
            .iter()
            .filter_map(|&(id, position)| {
                self.agents.get(id).map(|a| BondSubject {
                    id,
                    position,
                    occupation: a.occupation,
                })
            })
            .collect();

        let groups = &self.groups;
        #[cfg_attr(not(feature = "instrument"), allow(unused_variables))]
        let stats = self.bonds.update(
            &subjects,
            self.config.social_blend,
            self.config.bond_interaction_radius,
            |a, b| groups.share_group(a, b),
        );

        #[cfg(feature = "instrument")]
        tracing::info!(
            target: "social_bonds",
            step = self.step_count,
            pairs_updated = stats.pairs_updated,
            pairs_skipped = stats.pairs_skipped,
        );
    }

    fn deliver_directives(&mut self, positions: &[(AgentId, Vec3)]) {
        if self.groups.is_empty() {
            return;
        }
        let lookup: HashMap<AgentId, Vec3> = positions.iter().copied().collect();
        let deliveries = self
            .groups
            .directives(&self.config, |id| lookup.get(&id).copied());

        for delivery in deliveries {
            match delivery {
                Delivery::Direct { to, directive } => {
                    if let Some(agent) = self.agents.get_mut(to) {
                        agent.planner.deliver(directive);
                    }
                }
                Delivery::Broadcast {
                    from,
                    directive,
                    radius,
                } => {
                    let Some(&origin) = lookup.get(&from) else {
                        continue;
                    };
                    let radius_sq = radius * radius;
                    for &(to, position) in positions {
                        if to == from || position.distance_squared(origin) > radius_sq {
                            continue;
                        }
                        if let Some(agent) = self.agents.get_mut(to) {
                            agent.planner.deliver(directive.clone());
                        }
                    }
                }
            }
        }
    }

    fn run_time_slices(&mut self, dt: f32) {
        for _ in 0..self.config.high_per_step {
            self.advance_bucket(Bucket::High, dt);
        }
        for _ in 0..self.config.medium_per_step {
            self.advance_bucket(Bucket::Medium, dt);
        }
        if self.step_count % self.config.low_stride.max(1) == 0 {
            self.advance_bucket(Bucket::Low, dt);
        }
    }

    /// Invoke the agent under the bucket's cursor and move the cursor on,
    /// wrapping. Empty buckets just reset the cursor.
    fn advance_bucket(&mut self, bucket: Bucket, dt: f32) {
        let slot = bucket.index();
        let len = self.buckets[slot].len();
        if len == 0 {
            self.cursors[slot] = 0;
            return;
        }

        let cursor = self.cursors[slot] % len;
        let id = self.buckets[slot][cursor];
        self.cursors[slot] = (cursor + 1) % len.max(1);
        self.invoke(id, bucket, dt);
    }

    fn invoke(
        &mut self,
        id: AgentId,
        #[cfg_attr(not(feature = "instrument"), allow(unused_variables))] bucket: Bucket,
        dt: f32,
    ) {
        let time_of_day = self.clock.time_of_day();
        let cache = self.cache.is_built().then_some(&self.cache);
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        let Some(position) = self.world.position(agent.entity) else {
            return;
        };

        let ctx = PlannerContext {
            entity: agent.entity,
            position,
            tag: &agent.tag,
            time_of_day,
            cache,
        };
        let report = agent.planner.update(&ctx, dt, &mut self.rng);
        agent.updates += 1;
        if let Some(goal) = report.executed {
            agent.last_goal = goal;
        }

        #[cfg(feature = "instrument")]
        {
            tracing::info!(
                target: "planner_update",
                agent = id.to_u64(),
                bucket = bucket.as_str(),
                step = self.step_count,
            );
            if let Some(goal) = report.completed {
                tracing::info!(
                    target: "goal_complete",
                    agent = id.to_u64(),
                    goal = goal.as_str(),
                    step = self.step_count,
                );
            }
        }
    }
}
