// Goal execution routines. One pass per cadence tick; each applies small
// need adjustments and may raise a want for an outside system.

use rand::Rng;

use super::{Goal, NeedsPlanner, PlannerContext, Want};
use crate::clock::{is_daylight, is_evening, is_lunch, is_market_hours, is_night, is_work_hours};
use crate::needs::Situation;
use crate::types::{Category, GoalKind, NeedKind, Occupation};

const FORAGE_SUCCESS_CHANCE: f32 = 0.6;
const TRADE_SUCCESS_CHANCE: f32 = 0.7;
const FLEE_DANGER: f32 = 0.8;
const DEFEND_DANGER: f32 = 0.5;

impl NeedsPlanner {
    pub(super) fn execute_behavior<R: Rng>(
        &mut self,
        goal: &Goal,
        ctx: &PlannerContext<'_>,
        situation: &Situation,
        rng: &mut R,
    ) {
        match goal.kind {
            GoalKind::FindFood => self.search_food(situation, rng),
            GoalKind::FindWater => self.search_water(ctx, situation, rng),
            GoalKind::FindShelter => self.search_shelter(ctx, situation, rng),
            GoalKind::IncreaseSafety => self.seek_safety(goal, situation),
            GoalKind::FulfillSocial => self.socialize(situation, rng),
            GoalKind::Work => self.work(situation, rng),
            GoalKind::Trade => self.trade(situation, rng),
            GoalKind::None => {
                tracing::trace!(entity = ctx.entity.0, "idle");
            }
        }
    }

    fn search_food<R: Rng>(&mut self, situation: &Situation, rng: &mut R) {
        if situation.in_danger() {
            tracing::debug!(danger = situation.danger, "food search postponed, in danger");
            return;
        }

        if !is_daylight(situation.time_of_day) {
            tracing::debug!(hour = situation.time_of_day, "food search postponed until daylight");
            self.satisfy(NeedKind::Safety, -10.0);
            return;
        }

        if rng.random::<f32>() < FORAGE_SUCCESS_CHANCE {
            let found = rng.random_range(10.0..=25.0);
            self.satisfy(NeedKind::Hunger, found);
            tracing::trace!(found, "foraged");
        } else {
            let urgency = self.urgency(NeedKind::Hunger);
            self.want(Want::Food { urgency });
            tracing::trace!(urgency, "forage failed");
        }
    }

    fn search_water<R: Rng>(
        &mut self,
        ctx: &PlannerContext<'_>,
        situation: &Situation,
        rng: &mut R,
    ) {
        if situation.in_danger() {
            tracing::debug!(danger = situation.danger, "water search postponed, in danger");
            return;
        }

        if self.source_nearby(ctx, Category::Water, self.config.water_radius) {
            let collected = rng.random_range(15.0..=30.0);
            self.satisfy(NeedKind::Thirst, collected);
        } else {
            let urgency = self.urgency(NeedKind::Thirst);
            self.want(Want::Water { urgency });
        }
    }

    fn search_shelter<R: Rng>(
        &mut self,
        ctx: &PlannerContext<'_>,
        situation: &Situation,
        rng: &mut R,
    ) {
        let high_priority = is_night(situation.time_of_day) || situation.in_danger();
        let found = self.source_nearby(ctx, Category::Shelter, self.config.shelter_radius);

        match (found, high_priority) {
            (true, true) => {
                let rest = rng.random_range(20.0..=35.0);
                self.satisfy(NeedKind::Rest, rest);
                self.satisfy(NeedKind::Safety, 15.0);
            }
            (true, false) => {
                let rest = rng.random_range(10.0..=20.0);
                self.satisfy(NeedKind::Rest, rest);
            }
            (false, true) => {
                // Sleeping rough
                self.satisfy(NeedKind::Rest, 5.0);
                self.want(Want::Lodging);
            }
            (false, false) => {
                tracing::trace!("no better shelter nearby");
            }
        }
    }

    fn seek_safety(&mut self, goal: &Goal, situation: &Situation) {
        let danger = situation.danger;
        if danger > FLEE_DANGER {
            tracing::debug!(danger, "fleeing");
            self.want(Want::Protection { danger });
        } else if danger > DEFEND_DANGER {
            tracing::debug!(danger, rally = ?goal.target_position, "taking defensive position");
        } else {
            tracing::trace!(danger, "patrolling");
        }
    }

    fn socialize<R: Rng>(&mut self, situation: &Situation, rng: &mut R) {
        if situation.in_danger() {
            self.want(Want::Protection {
                danger: situation.danger,
            });
            return;
        }

        let hour = situation.time_of_day;
        let gain = if is_evening(hour) {
            rng.random_range(10.0..=20.0)
        } else if is_lunch(hour) {
            rng.random_range(5.0..=10.0)
        } else {
            rng.random_range(2.0..=5.0)
        };
        self.satisfy(NeedKind::Social, gain);
    }

    fn work<R: Rng>(&mut self, situation: &Situation, rng: &mut R) {
        if !is_work_hours(situation.time_of_day) {
            let rest = rng.random_range(3.0..=8.0);
            self.satisfy(NeedKind::Rest, rest);
            self.satisfy(NeedKind::Social, 2.0);
            return;
        }

        let mut income: f32 = rng.random_range(5.0..=15.0);
        let mut social: f32 = rng.random_range(5.0..=10.0);
        match self.occupation {
            Occupation::Landowner => income *= 1.5,
            Occupation::TavernKeeper => social *= 1.3,
            _ => {}
        }

        self.satisfy(NeedKind::Social, social);
        self.satisfy(NeedKind::Hunger, -8.0);
        self.want(Want::Deposit { coin: income });
        tracing::trace!(occupation = ?self.occupation, income, social, "worked");
    }

    fn trade<R: Rng>(&mut self, situation: &Situation, rng: &mut R) {
        if !is_market_hours(situation.time_of_day) {
            tracing::trace!("preparing goods for market");
            return;
        }

        let social: f32 = rng.random_range(8.0..=15.0);
        if rng.random::<f32>() < TRADE_SUCCESS_CHANCE {
            self.satisfy(NeedKind::Social, social);
            self.satisfy(NeedKind::Rest, -5.0);
        } else {
            self.satisfy(NeedKind::Social, social * 0.5);
        }
    }

    /// `1 - value / 100`, how pressing a need is.
    fn urgency(&self, kind: NeedKind) -> f32 {
        1.0 - self.needs.value(kind) / 100.0
    }

    fn source_nearby(&self, ctx: &PlannerContext<'_>, category: Category, radius: f32) -> bool {
        ctx.cache.is_some_and(|cache| {
            cache
                .nearby_entries(category, ctx.position, radius)
                .any(|c| c.entity != ctx.entity)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing::subscriber::with_default;
    use tracing::{Event, Metadata, Subscriber};

    use super::*;
    use crate::cache::WorldCache;
    use crate::config::NeedsConfig;
    use crate::types::{EntityId, Vec3};
    use crate::world::SandboxWorld;

    fn planner(occupation: Occupation) -> NeedsPlanner {
        NeedsPlanner::new(&NeedsConfig::default().without_decay(), occupation)
    }

    fn run(
        planner: &mut NeedsPlanner,
        kind: GoalKind,
        hour: f32,
        danger: f32,
        cache: Option<&WorldCache>,
        rng: &mut StdRng,
    ) {
        let ctx = PlannerContext {
            entity: EntityId(999),
            position: Vec3::ZERO,
            tag: "NPC",
            time_of_day: hour,
            cache,
        };
        let situation = Situation {
            time_of_day: hour,
            danger,
            isolation: 1.0,
        };
        planner.execute_behavior(&Goal::new(kind, 1.0), &ctx, &situation, rng);
    }

    /// Keeps the message of every event, DEBUG and TRACE included.
    #[derive(Clone, Default)]
    struct Messages(Arc<Mutex<Vec<String>>>);

    struct MessageField<'a>(&'a mut String);

    impl Visit for MessageField<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                *self.0 = format!("{value:?}");
            }
        }
    }

    impl Subscriber for Messages {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _span: &Attributes<'_>) -> Id {
            Id::from_u64(1)
        }

        fn record(&self, _span: &Id, _values: &Record<'_>) {}

        fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

        fn event(&self, event: &Event<'_>) {
            let mut message = String::new();
            event.record(&mut MessageField(&mut message));
            self.0.lock().unwrap().push(message);
        }

        fn enter(&self, _span: &Id) {}

        fn exit(&self, _span: &Id) {}
    }

    fn world_cache(names: &[(&str, Vec3)]) -> WorldCache {
        let mut world = SandboxWorld::new();
        for (name, pos) in names {
            world.spawn(*name, *pos);
        }
        let mut cache = WorldCache::new();
        cache.rebuild(&world, 0.0);
        cache
    }

    #[test]
    fn test_food_search_deferred_in_danger() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Hunger, 20.0);
        run(&mut p, GoalKind::FindFood, 12.0, 0.9, None, &mut rng);
        assert_eq!(p.need_value(NeedKind::Hunger), 20.0);
        assert_eq!(p.need_value(NeedKind::Safety), 70.0);
        assert!(p.drain_wants().is_empty());
    }

    #[test]
    fn test_food_search_at_night_costs_safety() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut p = planner(Occupation::Generic);
        let messages = Messages::default();
        with_default(messages.clone(), || {
            run(&mut p, GoalKind::FindFood, 23.0, 0.0, None, &mut rng);
        });
        assert_eq!(p.need_value(NeedKind::Safety), 60.0);
        assert_eq!(p.need_value(NeedKind::Hunger), 80.0);
        assert!(p.drain_wants().is_empty());
        let logged = messages.0.lock().unwrap();
        assert_eq!(logged[..], ["food search postponed until daylight"]);
    }

    #[test]
    fn test_daylight_forage_either_feeds_or_asks_for_food() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let mut p = planner(Occupation::Generic);
            p.set_need_value(NeedKind::Hunger, 10.0);
            run(&mut p, GoalKind::FindFood, 10.0, 0.0, None, &mut rng);
            let hunger = p.need_value(NeedKind::Hunger);
            let wants = p.drain_wants();
            if hunger > 10.0 {
                assert!((20.0..=35.0).contains(&hunger));
                assert!(wants.is_empty());
            } else {
                match wants[..] {
                    [Want::Food { urgency }] => assert!((urgency - 0.9).abs() < 1e-5),
                    ref other => panic!("unexpected wants {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_water_needs_a_source_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let near = world_cache(&[("Well_North", Vec3::new(400.0, 0.0, 0.0))]);
        let far = world_cache(&[("Well_North", Vec3::new(600.0, 0.0, 0.0))]);

        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Thirst, 10.0);
        run(&mut p, GoalKind::FindWater, 12.0, 0.0, Some(&near), &mut rng);
        let thirst = p.need_value(NeedKind::Thirst);
        assert!((25.0..=40.0).contains(&thirst), "thirst {thirst}");

        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Thirst, 10.0);
        run(&mut p, GoalKind::FindWater, 12.0, 0.0, Some(&far), &mut rng);
        assert_eq!(p.need_value(NeedKind::Thirst), 10.0);
        assert!(matches!(p.drain_wants()[..], [Want::Water { .. }]));
    }

    #[test]
    fn test_night_shelter_without_building_is_consolation() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Rest, 10.0);
        run(&mut p, GoalKind::FindShelter, 22.0, 0.0, None, &mut rng);
        assert_eq!(p.need_value(NeedKind::Rest), 15.0);
        assert_eq!(p.drain_wants(), vec![Want::Lodging]);
    }

    #[test]
    fn test_night_shelter_with_building_restores_safety() {
        let mut rng = StdRng::seed_from_u64(5);
        let cache = world_cache(&[("Inn_Crossroads", Vec3::new(900.0, 0.0, 0.0))]);
        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Rest, 10.0);
        p.set_need_value(NeedKind::Safety, 30.0);
        run(&mut p, GoalKind::FindShelter, 22.0, 0.0, Some(&cache), &mut rng);
        let rest = p.need_value(NeedKind::Rest);
        assert!((30.0..=45.0).contains(&rest), "rest {rest}");
        assert_eq!(p.need_value(NeedKind::Safety), 45.0);
    }

    #[test]
    fn test_flee_asks_for_protection() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut p = planner(Occupation::Generic);
        run(&mut p, GoalKind::IncreaseSafety, 12.0, 0.9, None, &mut rng);
        assert_eq!(p.drain_wants(), vec![Want::Protection { danger: 0.9 }]);

        run(&mut p, GoalKind::IncreaseSafety, 12.0, 0.6, None, &mut rng);
        assert!(p.drain_wants().is_empty());
    }

    #[test]
    fn test_work_hours_cost_hunger_and_pay() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut p = planner(Occupation::Landowner);
        run(&mut p, GoalKind::Work, 10.0, 0.0, None, &mut rng);
        assert_eq!(p.need_value(NeedKind::Hunger), 72.0);
        let social = p.need_value(NeedKind::Social);
        assert!((65.0..=70.0).contains(&social), "social {social}");
        match p.drain_wants()[..] {
            [Want::Deposit { coin }] => assert!((7.5..=22.5).contains(&coin)),
            ref other => panic!("unexpected wants {other:?}"),
        }
    }

    #[test]
    fn test_off_hours_work_is_maintenance() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut p = planner(Occupation::Miller);
        p.set_need_value(NeedKind::Rest, 50.0);
        run(&mut p, GoalKind::Work, 19.0, 0.0, None, &mut rng);
        let rest = p.need_value(NeedKind::Rest);
        assert!((53.0..=58.0).contains(&rest), "rest {rest}");
        assert_eq!(p.need_value(NeedKind::Social), 62.0);
        assert!(p.drain_wants().is_empty());
    }

    #[test]
    fn test_trade_outside_market_hours_changes_nothing() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut p = planner(Occupation::Merchant);
        let before = p.needs().clone();
        run(&mut p, GoalKind::Trade, 20.0, 0.0, None, &mut rng);
        assert_eq!(p.needs(), &before);
    }

    #[test]
    fn test_evening_social_gain_range() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut p = planner(Occupation::Generic);
        p.set_need_value(NeedKind::Social, 10.0);
        run(&mut p, GoalKind::FulfillSocial, 19.0, 0.0, None, &mut rng);
        let social = p.need_value(NeedKind::Social);
        assert!((20.0..=30.0).contains(&social), "social {social}");
    }
}
