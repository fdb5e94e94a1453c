//! Group coordination: periodic formation plus a per-step strategy that
//! produces directives for the scheduler to deliver.

use std::collections::HashMap;
use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::planner::GroupDirective;
use crate::types::{AgentId, Archetype, Vec3};

/// Group lifetime is one formation interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub archetype: Archetype,
    /// Formation order; the first member leads
    pub members: Vec<AgentId>,
    pub objective: String,
}

impl Group {
    pub fn leader(&self) -> Option<AgentId> {
        self.members.first().copied()
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        self.members.contains(&agent)
    }
}

/// What formation needs to know about one registered agent.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: AgentId,
    pub tag: &'a str,
    pub position: Option<Vec3>,
}

/// A directive and who should receive it.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// To every registered agent within `radius` of `from`, excluding `from`
    Broadcast {
        from: AgentId,
        directive: GroupDirective,
        radius: f32,
    },
    /// To one agent only
    Direct {
        to: AgentId,
        directive: GroupDirective,
    },
}

fn tag_matches(tag: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| tag.contains(m))
}

fn allies_within(candidate: &Candidate<'_>, all: &[Candidate<'_>], radius: f32) -> usize {
    let Some(here) = candidate.position else {
        return 0;
    };
    let radius_sq = radius * radius;
    all.iter()
        .filter(|other| other.id != candidate.id)
        .filter_map(|other| other.position)
        .filter(|p| p.distance_squared(here) <= radius_sq)
        .count()
}

fn is_eligible(
    archetype: Archetype,
    candidate: &Candidate<'_>,
    all: &[Candidate<'_>],
    hostile_count: usize,
    config: &SchedulerConfig,
) -> bool {
    match archetype {
        Archetype::Patrol => tag_matches(candidate.tag, &["Guard", "Warrior"]),
        Archetype::Work => tag_matches(candidate.tag, &["Miller", "Farmer", "Smith"]),
        Archetype::Social => {
            allies_within(candidate, all, config.social_ally_radius) >= config.social_min_allies
        }
        Archetype::Defense => hostile_count > config.defense_hostile_threshold,
        Archetype::Trade => tag_matches(candidate.tag, &["Merchant", "Trader"]),
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupBoard {
    groups: Vec<Group>,
    /// Agent to its position in `groups`, rebuilt whenever `groups` changes
    index: HashMap<AgentId, usize>,
    next_group_id: u64,
}

impl GroupBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard every group and greedily form new ones. Archetypes claim
    /// agents in `Archetype::ALL` order, so an agent joins at most one group.
    /// Returns the number of groups formed.
    pub fn form(
        &mut self,
        candidates: &[Candidate<'_>],
        hostile_count: usize,
        config: &SchedulerConfig,
    ) -> usize {
        self.groups.clear();
        let mut claimed: Vec<AgentId> = Vec::new();

        for archetype in Archetype::ALL {
            let members: Vec<AgentId> = candidates
                .iter()
                .filter(|c| !claimed.contains(&c.id))
                .filter(|c| is_eligible(archetype, c, candidates, hostile_count, config))
                .map(|c| c.id)
                .collect();

            if members.len() < config.min_group_size.max(1) {
                continue;
            }

            self.next_group_id += 1;
            claimed.extend(members.iter().copied());
            self.groups.push(Group {
                id: format!("{archetype}_Group_{}", self.next_group_id),
                archetype,
                members,
                objective: format!("{archetype}_Objective"),
            });
        }

        self.reindex();
        self.groups.len()
    }

    fn reindex(&mut self) {
        self.index = self
            .groups
            .iter()
            .enumerate()
            .flat_map(|(i, g)| g.members.iter().map(move |&m| (m, i)))
            .collect();
    }

    /// Directives for this step. `position_of` returns `None` for members
    /// without a world position; they neither send nor get a ring slot.
    pub fn directives(
        &self,
        config: &SchedulerConfig,
        position_of: impl Fn(AgentId) -> Option<Vec3>,
    ) -> Vec<Delivery> {
        let mut out = Vec::new();
        let (patrol, near) = (config.patrol_message_radius, config.work_message_radius);
        for group in &self.groups {
            let (directive, radius) = match group.archetype {
                Archetype::Defense => {
                    defensive_ring(&mut out, group, config, &position_of);
                    continue;
                }
                Archetype::Patrol => (GroupDirective::PatrolPosition, patrol),
                Archetype::Work => (GroupDirective::WorkTogether, near),
                Archetype::Social => (GroupDirective::Socialize, near),
                Archetype::Trade => (GroupDirective::TradeTogether, near),
            };
            broadcast(&mut out, group, directive, radius);
        }
        out
    }

    pub fn remove_agent(&mut self, agent: AgentId) {
        for group in &mut self.groups {
            group.members.retain(|&m| m != agent);
        }
        self.groups.retain(|g| !g.members.is_empty());
        self.reindex();
    }

    pub fn group_of(&self, agent: AgentId) -> Option<&Group> {
        self.index.get(&agent).map(|&i| &self.groups[i])
    }

    /// Constant time. Agents outside any group share nothing.
    pub fn share_group(&self, a: AgentId, b: AgentId) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn broadcast(out: &mut Vec<Delivery>, group: &Group, directive: GroupDirective, radius: f32) {
    out.extend(group.members.iter().map(|&from| Delivery::Broadcast {
        from,
        directive: directive.clone(),
        radius,
    }));
}

/// Ring of slots around the members' centroid, one per member in formation
/// order.
fn defensive_ring(
    out: &mut Vec<Delivery>,
    group: &Group,
    config: &SchedulerConfig,
    position_of: &impl Fn(AgentId) -> Option<Vec3>,
) {
    let placed: Vec<(AgentId, Vec3)> = group
        .members
        .iter()
        .filter_map(|&m| position_of(m).map(|p| (m, p)))
        .collect();
    if placed.is_empty() {
        return;
    }

    let center = placed.iter().fold(Vec3::ZERO, |acc, (_, p)| acc + *p) / placed.len() as f32;
    let slots = group.members.len() as f32;
    for (i, &member) in group.members.iter().enumerate() {
        if position_of(member).is_none() {
            continue;
        }
        let angle = TAU * i as f32 / slots;
        let at = center + Vec3::new(angle.cos(), angle.sin(), 0.0) * config.defense_ring_radius;
        out.push(Delivery::Direct {
            to: member,
            directive: GroupDirective::DefensivePosition { at },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<AgentId> {
        let mut map: SlotMap<AgentId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn at(id: AgentId, tag: &str, x: f32) -> Candidate<'_> {
        Candidate { id, tag, position: Some(Vec3::new(x, 0.0, 0.0)) }
    }

    fn unplaced(id: AgentId, tag: &str) -> Candidate<'_> {
        Candidate { id, tag, position: None }
    }

    #[test]
    fn test_formation_claims_agents_once() {
        let ids = ids(4);
        let config = SchedulerConfig::default();
        // Guards are close together, so they would also qualify as Social
        let candidates = vec![
            at(ids[0], "Guard_A", 0.0),
            at(ids[1], "Guard_B", 10.0),
            at(ids[2], "NPC_C", 20.0),
            at(ids[3], "Farmer_D", 9_000.0),
        ];
        let mut board = GroupBoard::new();
        board.form(&candidates, 0, &config);

        assert_eq!(board.len(), 1);
        let patrol = &board.groups()[0];
        assert_eq!(patrol.archetype, Archetype::Patrol);
        assert_eq!(patrol.members, vec![ids[0], ids[1]]);
        assert_eq!(patrol.leader(), Some(ids[0]));
        assert_eq!(patrol.id, "Patrol_Group_1");
        assert_eq!(patrol.objective, "Patrol_Objective");
        // NPC_C qualifies for Social but is the only one left to claim
        assert!(board.group_of(ids[2]).is_none());
    }

    #[test]
    fn test_single_eligible_agent_forms_nothing() {
        let ids = ids(2);
        let candidates = vec![
            at(ids[0], "Smith_A", 0.0),
            unplaced(ids[1], "Villager"),
        ];
        let mut board = GroupBoard::new();
        assert_eq!(board.form(&candidates, 0, &SchedulerConfig::default()), 0);
    }

    #[test]
    fn test_defense_needs_more_hostiles_than_threshold() {
        let ids = ids(2);
        let candidates = vec![
            unplaced(ids[0], "Villager_A"),
            unplaced(ids[1], "Villager_B"),
        ];
        let config = SchedulerConfig::default();
        let mut board = GroupBoard::new();
        assert_eq!(board.form(&candidates, 5, &config), 0);
        assert_eq!(board.form(&candidates, 6, &config), 1);
        assert_eq!(board.groups()[0].archetype, Archetype::Defense);
        // Counter keeps climbing across formations
        assert_eq!(board.groups()[0].id, "Defense_Group_1");
        board.form(&candidates, 6, &config);
        assert_eq!(board.groups()[0].id, "Defense_Group_2");
    }

    #[test]
    fn test_defensive_ring_slots_surround_centroid() {
        let ids = ids(2);
        let candidates = vec![
            at(ids[0], "Villager_A", 0.0),
            at(ids[1], "Villager_B", 100.0),
        ];
        let config = SchedulerConfig::default();
        let mut board = GroupBoard::new();
        board.form(&candidates, 10, &config);

        let positions = [Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)];
        let deliveries = board.directives(&config, |id| {
            ids.iter().position(|&i| i == id).map(|i| positions[i])
        });
        assert_eq!(deliveries.len(), 2);
        let center = Vec3::new(50.0, 0.0, 0.0);
        for delivery in deliveries {
            match delivery {
                Delivery::Direct {
                    directive: GroupDirective::DefensivePosition { at },
                    ..
                } => assert!((at.distance(center) - 150.0).abs() < 1e-3),
                other => panic!("unexpected delivery {other:?}"),
            }
        }
    }

    #[test]
    fn test_remove_agent_drops_membership() {
        let ids = ids(3);
        let candidates: Vec<Candidate<'_>> = ids
            .iter()
            .map(|&id| unplaced(id, "Merchant"))
            .collect();
        let mut board = GroupBoard::new();
        board.form(&candidates, 0, &SchedulerConfig::default());
        assert!(board.share_group(ids[0], ids[2]));

        board.remove_agent(ids[0]);
        assert!(board.group_of(ids[0]).is_none());
        assert_eq!(board.groups()[0].leader(), Some(ids[1]));
    }

    #[test]
    fn test_membership_lookup_tracks_formation_and_removal() {
        let ids = ids(6);
        let candidates = vec![
            at(ids[0], "Guard_A", 0.0),
            at(ids[1], "Guard_B", 10.0),
            at(ids[2], "Miller_A", 5_000.0),
            at(ids[3], "Miller_B", 5_010.0),
            at(ids[4], "Smith_C", 5_020.0),
            at(ids[5], "NPC_Alone", 20_000.0),
        ];
        let mut board = GroupBoard::new();
        assert_eq!(board.form(&candidates, 0, &SchedulerConfig::default()), 2);

        assert!(board.share_group(ids[0], ids[1]));
        assert!(board.share_group(ids[2], ids[4]));
        assert!(!board.share_group(ids[1], ids[2]));
        assert!(!board.share_group(ids[5], ids[5]));
        assert_eq!(board.group_of(ids[3]).map(|g| g.archetype), Some(Archetype::Work));

        // Emptying the patrol shifts the work group to slot 0
        board.remove_agent(ids[0]);
        board.remove_agent(ids[1]);
        assert_eq!(board.len(), 1);
        assert!(board.group_of(ids[1]).is_none());
        assert!(board.share_group(ids[3], ids[4]));
        assert_eq!(board.group_of(ids[2]).map(|g| g.id.as_str()), Some("Work_Group_2"));
    }
}
