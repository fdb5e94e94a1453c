// === NEEDS & CONTEXTUAL MODIFIERS ===

use serde::{Deserialize, Serialize};

use crate::clock::{is_night, is_social_window, is_work_hours};
use crate::config::{NeedSpec, NeedsConfig};
use crate::types::NeedKind;

pub const NEED_MIN: f32 = 0.0;
pub const NEED_MAX: f32 = 100.0;

/// Above this danger level the agent counts as "in danger".
pub const IN_DANGER_THRESHOLD: f32 = 0.7;

/// Isolation multiplier used when no world cache is available yet.
pub const DEFAULT_ISOLATION: f32 = 1.5;

/// Clamp into [NEED_MIN, NEED_MAX]. NaN maps to NEED_MAX.
fn clamp_need(value: f32) -> f32 {
    if value.is_nan() {
        NEED_MAX
    } else {
        value.clamp(NEED_MIN, NEED_MAX)
    }
}

/// Everything the need model reads from the outside world, sampled once per
/// planner invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Situation {
    pub time_of_day: f32,
    /// [0, 1], from nearby hostiles
    pub danger: f32,
    /// >= 1, from nearby friendlies
    pub isolation: f32,
}

impl Situation {
    pub fn calm(time_of_day: f32) -> Self {
        Self {
            time_of_day,
            danger: 0.0,
            isolation: DEFAULT_ISOLATION,
        }
    }

    pub fn in_danger(&self) -> bool {
        self.danger > IN_DANGER_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Need {
    pub value: f32,
    pub decay_rate: f32,
    pub urgency_threshold: f32,
}

impl Need {
    pub fn from_spec(spec: NeedSpec) -> Self {
        Self {
            value: clamp_need(spec.initial),
            decay_rate: spec.decay_rate,
            urgency_threshold: spec.urgency_threshold,
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.value < self.urgency_threshold
    }

    /// Add `amount` (may be negative) and clamp. Returns the new value.
    pub fn adjust(&mut self, amount: f32) -> f32 {
        self.value = clamp_need(self.value + amount);
        self.value
    }
}

/// Decay multiplier applied on top of a need's baseline rate.
pub fn decay_multiplier(kind: NeedKind, situation: &Situation) -> f32 {
    let hour = situation.time_of_day;
    match kind {
        NeedKind::Hunger if is_work_hours(hour) => 1.5,
        NeedKind::Hunger => 1.0,
        NeedKind::Thirst => 1.2,
        NeedKind::Rest if is_night(hour) => 2.0,
        NeedKind::Rest => 1.0,
        NeedKind::Safety => 1.0 + 2.0 * situation.danger,
        NeedKind::Social => situation.isolation,
    }
}

/// Priority multiplier applied to an urgent need's base priority.
pub fn priority_modifier(kind: NeedKind, situation: &Situation) -> f32 {
    let hour = situation.time_of_day;
    match kind {
        NeedKind::Safety => 1.0 + 2.0 * situation.danger,
        NeedKind::Rest if is_night(hour) => 1.5,
        NeedKind::Social if is_social_window(hour) => 1.3,
        NeedKind::Social => 0.8,
        _ => 1.0,
    }
}

/// The five needs of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedStore {
    needs: [Need; 5],
}

impl NeedStore {
    pub fn from_config(config: &NeedsConfig) -> Self {
        Self {
            needs: NeedKind::ALL.map(|kind| Need::from_spec(config.spec(kind))),
        }
    }

    pub fn get(&self, kind: NeedKind) -> &Need {
        &self.needs[kind.index()]
    }

    pub fn value(&self, kind: NeedKind) -> f32 {
        self.get(kind).value
    }

    pub fn is_urgent(&self, kind: NeedKind) -> bool {
        self.get(kind).is_urgent()
    }

    pub fn satisfy(&mut self, kind: NeedKind, amount: f32) -> f32 {
        self.needs[kind.index()].adjust(amount)
    }

    /// Overwrite a value directly (clamped). For tooling and test setup.
    pub fn set_value(&mut self, kind: NeedKind, value: f32) {
        self.needs[kind.index()].value = clamp_need(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (NeedKind, &Need)> + '_ {
        NeedKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }

    /// `value -= rate * multiplier * dt` for every need, clamped.
    pub fn decay(&mut self, situation: &Situation, dt: f32) {
        for kind in NeedKind::ALL {
            let need = &mut self.needs[kind.index()];
            let rate = need.decay_rate * decay_multiplier(kind, situation);
            need.adjust(-rate * dt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: f32, danger: f32, isolation: f32) -> Situation {
        Situation {
            time_of_day: hour,
            danger,
            isolation,
        }
    }

    #[test]
    fn test_decay_multipliers_follow_time_and_context() {
        assert_eq!(decay_multiplier(NeedKind::Hunger, &at(10.0, 0.0, 1.0)), 1.5);
        assert_eq!(decay_multiplier(NeedKind::Hunger, &at(19.0, 0.0, 1.0)), 1.0);
        assert_eq!(decay_multiplier(NeedKind::Thirst, &at(3.0, 0.0, 1.0)), 1.2);
        assert_eq!(decay_multiplier(NeedKind::Rest, &at(23.0, 0.0, 1.0)), 2.0);
        assert_eq!(decay_multiplier(NeedKind::Safety, &at(12.0, 0.5, 1.0)), 2.0);
        assert_eq!(decay_multiplier(NeedKind::Social, &at(12.0, 0.0, 2.5)), 2.5);
    }

    #[test]
    fn test_decay_applies_rate_times_dt() {
        let mut store = NeedStore::from_config(&NeedsConfig::default());
        // 10:00: hunger x1.5, thirst x1.2, rest x1
        store.decay(&at(10.0, 0.0, 1.0), 2.0);
        assert!((store.value(NeedKind::Hunger) - 77.0).abs() < 1e-4);
        assert!((store.value(NeedKind::Thirst) - 71.4).abs() < 1e-4);
        assert!((store.value(NeedKind::Rest) - 89.0).abs() < 1e-4);
        assert!((store.value(NeedKind::Safety) - 69.4).abs() < 1e-4);
        assert!((store.value(NeedKind::Social) - 59.6).abs() < 1e-4);
    }

    #[test]
    fn test_decay_never_goes_negative() {
        let mut store = NeedStore::from_config(&NeedsConfig::default());
        store.decay(&at(23.0, 1.0, 3.0), 10_000.0);
        for (_, need) in store.iter() {
            assert_eq!(need.value, 0.0);
        }
    }

    #[test]
    fn test_satisfy_clamps_both_ends() {
        let mut store = NeedStore::from_config(&NeedsConfig::default());
        assert_eq!(store.satisfy(NeedKind::Hunger, 500.0), 100.0);
        assert_eq!(store.satisfy(NeedKind::Hunger, -500.0), 0.0);
        assert!(store.is_urgent(NeedKind::Hunger));
    }

    #[test]
    fn test_non_finite_amounts_stay_in_range() {
        let mut store = NeedStore::from_config(&NeedsConfig::default());
        assert_eq!(store.satisfy(NeedKind::Hunger, f32::NAN), NEED_MAX);
        assert_eq!(store.satisfy(NeedKind::Hunger, -10.0), 90.0);
        assert_eq!(store.satisfy(NeedKind::Thirst, f32::NEG_INFINITY), NEED_MIN);
        assert_eq!(store.satisfy(NeedKind::Rest, f32::INFINITY), NEED_MAX);

        store.set_value(NeedKind::Social, f32::NAN);
        assert_eq!(store.value(NeedKind::Social), NEED_MAX);
        for (_, need) in store.iter() {
            assert!((NEED_MIN..=NEED_MAX).contains(&need.value));
        }
    }

    #[test]
    fn test_priority_modifiers() {
        assert_eq!(priority_modifier(NeedKind::Social, &at(13.0, 0.0, 1.0)), 1.3);
        assert_eq!(priority_modifier(NeedKind::Social, &at(10.0, 0.0, 1.0)), 0.8);
        assert_eq!(priority_modifier(NeedKind::Rest, &at(2.0, 0.0, 1.0)), 1.5);
        assert_eq!(priority_modifier(NeedKind::Hunger, &at(2.0, 1.0, 1.0)), 1.0);
    }
}
