//! Time-of-day source and the daily windows the planner reasons about.
//!
//! All windows are inclusive on both ends, so 17:00 still counts as work
//! hours and 06:00 is both night and daylight.

/// Supplies the in-game hour, `[0, 24)`.
pub trait Clock {
    fn time_of_day(&self) -> f32;

    /// Advance by `dt` real seconds. The scheduler calls this once per step.
    fn advance(&mut self, dt: f32);
}

/// One in-game hour per 60 real seconds.
#[derive(Debug, Clone)]
pub struct GameClock {
    start_hour: f32,
    elapsed: f64,
}

pub const SECONDS_PER_GAME_HOUR: f64 = 60.0;

impl GameClock {
    pub fn new(start_hour: f32) -> Self {
        Self {
            start_hour: start_hour.rem_euclid(24.0),
            elapsed: 0.0,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new(12.0)
    }
}

impl Clock for GameClock {
    fn time_of_day(&self) -> f32 {
        let hours = self.start_hour as f64 + self.elapsed / SECONDS_PER_GAME_HOUR;
        hours.rem_euclid(24.0) as f32
    }

    fn advance(&mut self, dt: f32) {
        self.elapsed += dt.max(0.0) as f64;
    }
}

/// A clock frozen at one hour.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub f32);

impl Clock for FixedClock {
    fn time_of_day(&self) -> f32 {
        self.0
    }

    fn advance(&mut self, _dt: f32) {}
}

// === DAILY WINDOWS ===

pub fn is_work_hours(hour: f32) -> bool {
    (8.0..=17.0).contains(&hour)
}

pub fn is_night(hour: f32) -> bool {
    hour >= 20.0 || hour <= 6.0
}

pub fn is_daylight(hour: f32) -> bool {
    (6.0..=18.0).contains(&hour)
}

pub fn is_lunch(hour: f32) -> bool {
    (12.0..=14.0).contains(&hour)
}

pub fn is_evening(hour: f32) -> bool {
    (18.0..=22.0).contains(&hour)
}

pub fn is_social_window(hour: f32) -> bool {
    is_lunch(hour) || is_evening(hour)
}

pub fn is_market_hours(hour: f32) -> bool {
    (9.0..=16.0).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_clock_wraps_midnight() {
        let mut clock = GameClock::new(23.0);
        clock.advance(90.0); // 1.5 hours
        assert!((clock.time_of_day() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_game_clock_ignores_negative_dt() {
        let mut clock = GameClock::new(8.0);
        clock.advance(-30.0);
        assert_eq!(clock.time_of_day(), 8.0);
    }

    #[test]
    fn test_window_edges() {
        assert!(is_work_hours(8.0) && is_work_hours(17.0) && !is_work_hours(17.5));
        assert!(is_night(20.0) && is_night(6.0) && !is_night(12.0));
        assert!(is_social_window(13.0) && is_social_window(21.0) && !is_social_window(16.0));
        assert!(is_market_hours(9.0) && !is_market_hours(16.5));
    }
}
