//! Monster Wandering AI
//!
//! Monsters idle for a random number of ticks, then pick a random point near
//! their home and walk there.

use crate::core::point::{Point, TILE_SIZE};
use crate::core::rng::DeterministicRng;

/// How far from home a monster strays, in pixels.
pub const WANDER_RADIUS: u16 = 5 * TILE_SIZE;

/// Idle ticks between two walks, inclusive bounds.
pub const IDLE_TICKS: (i32, i32) = (10, 50);

/// Per-monster AI state.
#[derive(Clone, Debug)]
pub struct Controller {
    /// Point the monster wanders around
    pub home: Point,
    /// Maximum distance from home on each axis
    pub wander_radius: u16,
    /// Ticks to wait before choosing the next destination
    countdown: u32,
}

impl Controller {
    /// Create a controller anchored at `home`.
    pub fn new(home: Point) -> Self {
        Self {
            home,
            wander_radius: WANDER_RADIUS,
            countdown: 0,
        }
    }

    /// Run one logic tick. Returns the new destination if one was chosen.
    pub fn update(
        &mut self,
        position: Point,
        destination: Point,
        rng: &mut DeterministicRng,
    ) -> Option<Point> {
        // Still walking
        if position != destination {
            return None;
        }

        if self.countdown > 0 {
            self.countdown -= 1;
            return None;
        }

        self.countdown = rng.next_int_range(IDLE_TICKS.0, IDLE_TICKS.1) as u32;
        let target = rng.point_near(self.home, self.wander_radius);
        (target != position).then_some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waits_while_walking() {
        let mut c = Controller::new(Point::new(500, 500));
        let mut rng = DeterministicRng::new(1);
        assert_eq!(c.update(Point::new(500, 500), Point::new(600, 500), &mut rng), None);
    }

    #[test]
    fn test_idles_between_walks() {
        let home = Point::new(500, 500);
        let mut c = Controller::new(home);
        let mut rng = DeterministicRng::new(42);

        let first = c.update(home, home, &mut rng);
        if let Some(target) = first {
            assert!(target.in_range_of(home, WANDER_RADIUS));
        }
        // Next call must idle
        assert_eq!(c.update(home, home, &mut rng), None);
    }

    #[test]
    fn test_same_seed_same_walk() {
        let home = Point::new(500, 500);
        let mut a = Controller::new(home);
        let mut b = Controller::new(home);
        let mut ra = DeterministicRng::new(9);
        let mut rb = DeterministicRng::new(9);
        for _ in 0..200 {
            assert_eq!(a.update(home, home, &mut ra), b.update(home, home, &mut rb));
        }
    }
}
