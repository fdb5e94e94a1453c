//! Tunables for the scheduler and the per-agent planner.
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON document only
//! needs the fields it overrides.

use serde::{Deserialize, Serialize};

use crate::types::NeedKind;

// === NEEDS ===

/// Registration-time defaults for one need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeedSpec {
    pub initial: f32,
    /// Points lost per second before contextual multipliers
    pub decay_rate: f32,
    /// Value below which the need is urgent
    pub urgency_threshold: f32,
}

impl NeedSpec {
    pub const fn new(initial: f32, decay_rate: f32, urgency_threshold: f32) -> Self {
        Self {
            initial,
            decay_rate,
            urgency_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsConfig {
    pub hunger: NeedSpec,
    pub thirst: NeedSpec,
    pub rest: NeedSpec,
    pub safety: NeedSpec,
    pub social: NeedSpec,

    /// Seconds between goal execution passes
    pub goal_cadence: f32,
    /// Progress added per execution pass; a goal completes at 1.0
    pub progress_step: f32,

    pub danger_radius: f32,
    pub friendly_radius: f32,
    pub water_radius: f32,
    pub shelter_radius: f32,

    pub inbox_capacity: usize,
    pub outbox_capacity: usize,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            hunger: NeedSpec::new(80.0, 1.0, 30.0),
            thirst: NeedSpec::new(75.0, 1.5, 25.0),
            rest: NeedSpec::new(90.0, 0.5, 20.0),
            safety: NeedSpec::new(70.0, 0.3, 40.0),
            social: NeedSpec::new(60.0, 0.2, 30.0),
            goal_cadence: 3.0,
            progress_step: 0.1,
            danger_radius: 500.0,
            friendly_radius: 1000.0,
            water_radius: 500.0,
            shelter_radius: 1000.0,
            inbox_capacity: 16,
            outbox_capacity: 32,
        }
    }
}

impl NeedsConfig {
    pub fn spec(&self, kind: NeedKind) -> NeedSpec {
        match kind {
            NeedKind::Hunger => self.hunger,
            NeedKind::Thirst => self.thirst,
            NeedKind::Rest => self.rest,
            NeedKind::Safety => self.safety,
            NeedKind::Social => self.social,
        }
    }

    pub fn spec_mut(&mut self, kind: NeedKind) -> &mut NeedSpec {
        match kind {
            NeedKind::Hunger => &mut self.hunger,
            NeedKind::Thirst => &mut self.thirst,
            NeedKind::Rest => &mut self.rest,
            NeedKind::Safety => &mut self.safety,
            NeedKind::Social => &mut self.social,
        }
    }

    /// Same table with every decay rate zeroed. Handy when a caller wants
    /// need values to move only through goal effects.
    pub fn without_decay(mut self) -> Self {
        for kind in NeedKind::ALL {
            self.spec_mut(kind).decay_rate = 0.0;
        }
        self
    }
}

// === SCHEDULER ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Agents within this distance of a player are High frequency
    pub high_radius: f32,
    /// ...and within this one Medium; everything else is Low
    pub medium_radius: f32,

    pub rebucket_interval: f32,
    pub cache_interval: f32,
    pub group_interval: f32,

    pub high_per_step: usize,
    pub medium_per_step: usize,
    /// Low bucket advances once every `low_stride` steps
    pub low_stride: u64,

    /// Fraction of the gap to the target bond closed per step
    pub social_blend: f32,
    /// Skip bond updates for pairs farther apart than this. `None` keeps the
    /// dense all-pairs pass.
    pub bond_interaction_radius: Option<f32>,

    pub min_group_size: usize,
    pub social_ally_radius: f32,
    pub social_min_allies: usize,
    /// Defense groups form when more hostiles than this are cached
    pub defense_hostile_threshold: usize,
    pub patrol_message_radius: f32,
    pub work_message_radius: f32,
    pub defense_ring_radius: f32,

    pub seed: u64,
    pub needs: NeedsConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_radius: 3000.0,
            medium_radius: 8000.0,
            rebucket_interval: 1.0,
            cache_interval: 2.0,
            group_interval: 30.0,
            high_per_step: 2,
            medium_per_step: 1,
            low_stride: 2,
            social_blend: 0.1,
            bond_interaction_radius: None,
            min_group_size: 2,
            social_ally_radius: 500.0,
            social_min_allies: 2,
            defense_hostile_threshold: 5,
            patrol_message_radius: 300.0,
            work_message_radius: 200.0,
            defense_ring_radius: 150.0,
            seed: 0,
            needs: NeedsConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_needs(mut self, needs: NeedsConfig) -> Self {
        self.needs = needs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "high_radius": 1500.0, "needs": { "goal_cadence": 1.0 } }"#;
        let cfg = SchedulerConfig::from_json(json).unwrap();
        assert_eq!(cfg.high_radius, 1500.0);
        assert_eq!(cfg.medium_radius, 8000.0);
        assert_eq!(cfg.needs.goal_cadence, 1.0);
        assert_eq!(cfg.needs.hunger, NeedSpec::new(80.0, 1.0, 30.0));
        assert_eq!(cfg.bond_interaction_radius, None);
    }

    #[test]
    fn test_json_rejects_wrong_types() {
        assert!(SchedulerConfig::from_json(r#"{ "high_per_step": "two" }"#).is_err());
    }

    #[test]
    fn test_without_decay_zeroes_rates_only() {
        let cfg = NeedsConfig::default().without_decay();
        for kind in NeedKind::ALL {
            assert_eq!(cfg.spec(kind).decay_rate, 0.0);
        }
        assert_eq!(cfg.thirst.initial, 75.0);
        assert_eq!(cfg.safety.urgency_threshold, 40.0);
    }
}
