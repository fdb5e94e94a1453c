// === SOCIAL BONDS ===
//
// Directed affinity matrix, smoothed toward a per-pair target every step.
// Entries persist across group formations and are only dropped when an agent
// is unregistered.

use std::collections::HashMap;

use crate::types::{AgentId, Occupation, Vec3};

pub const BOND_MIN: f32 = -1.0;
pub const BOND_MAX: f32 = 1.0;

const CLOSE_DISTANCE: f32 = 200.0;
const NEAR_DISTANCE: f32 = 500.0;
const CLOSE_BONUS: f32 = 0.3;
const NEAR_BONUS: f32 = 0.1;
const SAME_OCCUPATION_BONUS: f32 = 0.4;
const SHARED_GROUP_BONUS: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct BondSubject {
    pub id: AgentId,
    pub position: Vec3,
    pub occupation: Occupation,
}

/// Cost of one bond pass, for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BondPassStats {
    pub pairs_updated: usize,
    pub pairs_skipped: usize,
}

/// Where the pair's bond is heading: proximity, shared occupation and shared
/// group each add a fixed bonus.
pub fn target_bond(a: &BondSubject, b: &BondSubject, same_group: bool) -> f32 {
    let mut bond = 0.0;

    let distance = a.position.distance(b.position);
    if distance < CLOSE_DISTANCE {
        bond += CLOSE_BONUS;
    } else if distance < NEAR_DISTANCE {
        bond += NEAR_BONUS;
    }

    if a.occupation == b.occupation && !a.occupation.is_generic() {
        bond += SAME_OCCUPATION_BONUS;
    }

    if same_group {
        bond += SHARED_GROUP_BONUS;
    }

    bond.clamp(BOND_MIN, BOND_MAX)
}

#[derive(Debug, Clone, Default)]
pub struct SocialBonds {
    rows: HashMap<AgentId, HashMap<AgentId, f32>>,
}

impl SocialBonds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bond from `a` toward `b`, 0 if the pair was never updated.
    pub fn bond(&self, a: AgentId, b: AgentId) -> f32 {
        self.rows
            .get(&a)
            .and_then(|row| row.get(&b))
            .copied()
            .unwrap_or(0.0)
    }

    /// One pass over every ordered pair. Pairs farther apart than
    /// `interaction_radius` keep their stored value untouched.
    ///
    /// O(n^2) in `subjects`.
    pub fn update(
        &mut self,
        subjects: &[BondSubject],
        blend: f32,
        interaction_radius: Option<f32>,
        same_group: impl Fn(AgentId, AgentId) -> bool,
    ) -> BondPassStats {
        let mut stats = BondPassStats::default();
        let radius_sq = interaction_radius.map(|r| r * r);

        for a in subjects {
            for b in subjects {
                if a.id == b.id {
                    continue;
                }
                if radius_sq.is_some_and(|r| a.position.distance_squared(b.position) > r) {
                    stats.pairs_skipped += 1;
                    continue;
                }

                let target = target_bond(a, b, same_group(a.id, b.id));
                let entry = self.rows.entry(a.id).or_default().entry(b.id).or_insert(0.0);
                *entry = (*entry + (target - *entry) * blend).clamp(BOND_MIN, BOND_MAX);
                stats.pairs_updated += 1;
            }
        }

        stats
    }

    /// Drop the agent's row and its column in every other row.
    pub fn remove_agent(&mut self, agent: AgentId) {
        self.rows.remove(&agent);
        for row in self.rows.values_mut() {
            row.remove(&agent);
        }
        self.rows.retain(|_, row| !row.is_empty());
    }

    /// Whether any row or column references `agent`.
    pub fn mentions(&self, agent: AgentId) -> bool {
        self.rows.contains_key(&agent) || self.rows.values().any(|row| row.contains_key(&agent))
    }

    pub fn pair_count(&self) -> usize {
        self.rows.values().map(HashMap::len).sum()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
