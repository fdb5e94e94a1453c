//! Per-agent needs planner.
//!
//! There is no explicit state machine. Every invocation re-derives the goal
//! from the need store, so switching between goal kinds is always legal and
//! instantaneous; only the shared progress accumulator and the execution
//! cadence carry over between passes.

mod behavior;

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cache::WorldCache;
use crate::clock::{is_evening, is_work_hours};
use crate::config::NeedsConfig;
use crate::needs::{DEFAULT_ISOLATION, NeedStore, Situation, priority_modifier};
use crate::types::{Category, EntityId, GoalKind, NeedKind, Occupation, Vec3};

/// Completion is reached once accumulated progress is within this of 1.0, so
/// that ten passes of 0.1 always complete regardless of float rounding.
const PROGRESS_EPSILON: f32 = 1e-4;

// ============================================================================
// Planner inputs
// ============================================================================

/// Borrowed view handed to a planner for one invocation. The planner never
/// holds on to any of it.
#[derive(Debug, Clone, Copy)]
pub struct PlannerContext<'a> {
    pub entity: EntityId,
    pub position: Vec3,
    pub tag: &'a str,
    pub time_of_day: f32,
    /// `None` until the scheduler has built its first cache
    pub cache: Option<&'a WorldCache>,
}

// ============================================================================
// Planner outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub kind: GoalKind,
    /// -1.0 when nothing was selected
    pub priority: f32,
    pub target: Option<EntityId>,
    pub target_position: Option<Vec3>,
}

impl Goal {
    pub fn none() -> Self {
        Self {
            kind: GoalKind::None,
            priority: -1.0,
            target: None,
            target_position: None,
        }
    }

    pub fn new(kind: GoalKind, priority: f32) -> Self {
        Self {
            kind,
            priority,
            target: None,
            target_position: None,
        }
    }
}

/// Requests a planner raises for systems outside the core (economy, crime,
/// guards). Nothing here acts on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Want {
    Food { urgency: f32 },
    Water { urgency: f32 },
    Lodging,
    Protection { danger: f32 },
    Deposit { coin: f32 },
}

/// One-way message from group coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GroupDirective {
    PatrolPosition,
    DefensivePosition { at: Vec3 },
    WorkTogether,
    Socialize,
    TradeTogether,
}

impl GroupDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupDirective::PatrolPosition => "PatrolPosition",
            GroupDirective::DefensivePosition { .. } => "DefensivePosition",
            GroupDirective::WorkTogether => "WorkTogether",
            GroupDirective::Socialize => "Socialize",
            GroupDirective::TradeTogether => "TradeTogether",
        }
    }
}

/// What one `update` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateReport {
    /// Goal executed this call, if the cadence timer fired
    pub executed: Option<GoalKind>,
    /// Goal whose completion bundle was applied this call
    pub completed: Option<GoalKind>,
}

// ============================================================================
// NeedsPlanner
// ============================================================================

#[derive(Debug, Clone)]
pub struct NeedsPlanner {
    needs: NeedStore,
    config: NeedsConfig,
    occupation: Occupation,
    goal_progress: f32,
    goal_timer: f32,
    completed_goals: u32,
    inbox: VecDeque<GroupDirective>,
    outbox: VecDeque<Want>,
    last_directive: Option<GroupDirective>,
    rally_point: Option<Vec3>,
}

impl NeedsPlanner {
    pub fn new(config: &NeedsConfig, occupation: Occupation) -> Self {
        Self {
            needs: NeedStore::from_config(config),
            config: config.clone(),
            occupation,
            goal_progress: 0.0,
            goal_timer: 0.0,
            completed_goals: 0,
            inbox: VecDeque::new(),
            outbox: VecDeque::new(),
            last_directive: None,
            rally_point: None,
        }
    }

    pub fn for_tag(config: &NeedsConfig, tag: &str) -> Self {
        Self::new(config, Occupation::from_tag(tag))
    }

    // === Queries ===

    pub fn needs(&self) -> &NeedStore {
        &self.needs
    }

    pub fn need_value(&self, kind: NeedKind) -> f32 {
        self.needs.value(kind)
    }

    pub fn is_urgent(&self, kind: NeedKind) -> bool {
        self.needs.is_urgent(kind)
    }

    pub fn occupation(&self) -> Occupation {
        self.occupation
    }

    pub fn goal_progress(&self) -> f32 {
        self.goal_progress
    }

    pub fn completed_goals(&self) -> u32 {
        self.completed_goals
    }

    pub fn last_directive(&self) -> Option<&GroupDirective> {
        self.last_directive.as_ref()
    }

    pub fn pending_directives(&self) -> usize {
        self.inbox.len()
    }

    pub fn wants(&self) -> impl Iterator<Item = &Want> + '_ {
        self.outbox.iter()
    }

    // === Mutation from collaborators ===

    /// Add `amount` to a need and clamp into [0, 100]. Negative amounts are
    /// penalties.
    pub fn satisfy(&mut self, kind: NeedKind, amount: f32) -> f32 {
        let value = self.needs.satisfy(kind, amount);
        if amount.abs() > 20.0 {
            tracing::debug!(need = ?kind, amount, value, "need changed significantly");
        }
        value
    }

    /// Test and tooling hook: overwrite a need value.
    pub fn set_need_value(&mut self, kind: NeedKind, value: f32) {
        self.needs.set_value(kind, value);
    }

    pub fn deliver(&mut self, directive: GroupDirective) {
        if self.inbox.len() >= self.config.inbox_capacity.max(1) {
            self.inbox.pop_front();
        }
        self.inbox.push_back(directive);
    }

    pub fn drain_wants(&mut self) -> Vec<Want> {
        self.outbox.drain(..).collect()
    }

    fn want(&mut self, want: Want) {
        if self.outbox.len() >= self.config.outbox_capacity.max(1) {
            self.outbox.pop_front();
        }
        self.outbox.push_back(want);
    }

    // === Situation ===

    /// Danger: each cached hostile within the danger radius adds
    /// `(r - d) / r`, total clamped to [0, 1].
    pub fn danger_level(&self, ctx: &PlannerContext<'_>) -> f32 {
        let Some(cache) = ctx.cache else {
            return 0.0;
        };
        let radius = self.config.danger_radius;
        if radius <= 0.0 {
            return 0.0;
        }
        let danger: f32 = cache
            .nearby_entries(Category::Hostile, ctx.position, radius)
            .filter(|h| h.entity != ctx.entity)
            .map(|h| (radius - h.position.distance(ctx.position)) / radius)
            .sum();
        danger.clamp(0.0, 1.0)
    }

    /// `max(1, 3 - 0.5 * friendlies nearby)`; moderate isolation without a
    /// cache.
    pub fn isolation_multiplier(&self, ctx: &PlannerContext<'_>) -> f32 {
        let Some(cache) = ctx.cache else {
            return DEFAULT_ISOLATION;
        };
        let friendly = cache
            .nearby_entries(Category::Friendly, ctx.position, self.config.friendly_radius)
            .filter(|f| f.entity != ctx.entity)
            .count();
        (3.0 - 0.5 * friendly as f32).max(1.0)
    }

    pub fn assess(&self, ctx: &PlannerContext<'_>) -> Situation {
        Situation {
            time_of_day: ctx.time_of_day,
            danger: self.danger_level(ctx),
            isolation: self.isolation_multiplier(ctx),
        }
    }

    // === Goal selection ===

    /// Pure function of the need store and `situation`.
    ///
    /// Urgent needs are scored `(100 - value) / 100 * modifier` and scanned in
    /// `NeedKind::PRIORITY_ORDER`; only a strictly higher score replaces the
    /// current best. With nothing urgent, work hours fall back to Work (0.5)
    /// and the evening to FulfillSocial (0.3).
    pub fn highest_priority_goal(&self, situation: &Situation) -> Goal {
        let mut best = Goal::none();

        for kind in NeedKind::PRIORITY_ORDER {
            let need = self.needs.get(kind);
            if !need.is_urgent() {
                continue;
            }
            let base = (100.0 - need.value) / 100.0;
            let priority = base * priority_modifier(kind, situation);
            if priority > best.priority {
                best = Goal::new(kind.goal(), priority);
            }
        }

        if best.kind == GoalKind::None {
            let hour = situation.time_of_day;
            if is_work_hours(hour) {
                best = Goal::new(GoalKind::Work, 0.5);
            } else if is_evening(hour) {
                best = Goal::new(GoalKind::FulfillSocial, 0.3);
            }
        }

        best
    }

    /// Attach targets from the cache (and the last rally point) to a goal.
    pub fn resolve_targets(&self, mut goal: Goal, ctx: &PlannerContext<'_>) -> Goal {
        let nearest = |category: Category, radius: f32| {
            ctx.cache
                .and_then(|c| c.nearest(category, ctx.position, radius, Some(ctx.entity)))
        };
        let hit = match goal.kind {
            GoalKind::FindWater => nearest(Category::Water, self.config.water_radius),
            GoalKind::FindShelter => nearest(Category::Shelter, self.config.shelter_radius),
            GoalKind::FulfillSocial => nearest(Category::Friendly, self.config.friendly_radius),
            _ => None,
        };
        if let Some(hit) = hit {
            goal.target = Some(hit.entity);
            goal.target_position = Some(hit.position);
        } else if goal.kind == GoalKind::IncreaseSafety {
            goal.target_position = self.rally_point;
        }
        goal
    }

    // === Update ===

    /// Scheduler entry point: read directives, decay needs, and every
    /// `goal_cadence` seconds run one execution pass of the best goal.
    pub fn update<R: Rng>(
        &mut self,
        ctx: &PlannerContext<'_>,
        dt: f32,
        rng: &mut R,
    ) -> UpdateReport {
        self.read_inbox();

        let situation = self.assess(ctx);
        self.needs.decay(&situation, dt);

        let mut report = UpdateReport::default();
        self.goal_timer += dt;
        if self.goal_timer >= self.config.goal_cadence {
            self.goal_timer = 0.0;
            let goal = self.resolve_targets(self.highest_priority_goal(&situation), ctx);
            report.executed = Some(goal.kind);
            report.completed = self.run_goal(&goal, ctx, &situation, rng);
        }
        report
    }

    /// Execute one pass of `goal` outside the normal cadence, e.g. when a
    /// collaborator decides the agent should trade. Progress bookkeeping is
    /// the same as for scheduled passes.
    pub fn execute_goal<R: Rng>(
        &mut self,
        goal: &Goal,
        ctx: &PlannerContext<'_>,
        rng: &mut R,
    ) -> Option<GoalKind> {
        let situation = self.assess(ctx);
        self.run_goal(goal, ctx, &situation, rng)
    }

    fn run_goal<R: Rng>(
        &mut self,
        goal: &Goal,
        ctx: &PlannerContext<'_>,
        situation: &Situation,
        rng: &mut R,
    ) -> Option<GoalKind> {
        self.execute_behavior(goal, ctx, situation, rng);
        self.advance_progress(goal.kind)
    }

    fn read_inbox(&mut self) {
        while let Some(directive) = self.inbox.pop_front() {
            tracing::trace!(directive = directive.as_str(), "group directive received");
            if let GroupDirective::DefensivePosition { at } = directive {
                self.rally_point = Some(at);
            }
            self.last_directive = Some(directive);
        }
    }

    /// Time-based completion: every pass adds `progress_step`; at 1.0 the
    /// goal's satisfaction bundle is applied whether or not individual passes
    /// succeeded.
    fn advance_progress(&mut self, kind: GoalKind) -> Option<GoalKind> {
        self.goal_progress += self.config.progress_step;
        if self.goal_progress + PROGRESS_EPSILON < 1.0 {
            return None;
        }

        self.goal_progress = 0.0;
        self.completed_goals += 1;
        for &(need, amount) in completion_bundle(kind) {
            self.satisfy(need, amount);
        }
        tracing::debug!(goal = kind.as_str(), "goal completed");
        Some(kind)
    }
}

/// Need changes applied when a goal completes.
pub fn completion_bundle(kind: GoalKind) -> &'static [(NeedKind, f32)] {
    match kind {
        GoalKind::FindFood => &[(NeedKind::Hunger, 30.0)],
        GoalKind::FindWater => &[(NeedKind::Thirst, 35.0)],
        GoalKind::FindShelter => &[(NeedKind::Rest, 25.0), (NeedKind::Safety, 20.0)],
        GoalKind::IncreaseSafety => &[(NeedKind::Safety, 40.0)],
        GoalKind::FulfillSocial => &[(NeedKind::Social, 30.0)],
        GoalKind::Work => &[(NeedKind::Hunger, -5.0), (NeedKind::Social, 10.0)],
        GoalKind::Trade => &[(NeedKind::Social, 15.0)],
        GoalKind::None => &[],
    }
}
