//! Deterministic Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64. Each map partition owns one, so
//! monster wandering and spawn placement replay identically for a given
//! world seed regardless of how many other maps are active.

use serde::{Serialize, Deserialize};

use super::point::{Point, Rectangle};

/// Deterministic PRNG using the Xorshift128+ algorithm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // All-zero state never leaves zero
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Derive the RNG of one map from the world seed.
    pub fn for_map(world_seed: u64, map_id: u16) -> Self {
        Self::new(world_seed ^ (u64::from(map_id) << 48) ^ u64::from(map_id))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in `[0, max)`. Returns 0 when `max` is 0.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % u64::from(max)) as u32
    }

    /// Generate a random integer in `[min, max]`.
    #[inline]
    pub fn next_int_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        let range = (i64::from(max) - i64::from(min) + 1) as u32;
        min + self.next_int(range) as i32
    }

    /// Random point inside a rectangle (right and bottom edges excluded).
    pub fn point_in(&mut self, rect: &Rectangle) -> Point {
        Point::new(
            rect.x.saturating_add(self.next_int(u32::from(rect.w)) as u16),
            rect.y.saturating_add(self.next_int(u32::from(rect.h)) as u16),
        )
    }

    /// Random point within `radius` pixels of `center` per axis, clamped to
    /// the unsigned coordinate space.
    pub fn point_near(&mut self, center: Point, radius: u16) -> Point {
        let r = i32::from(radius);
        let x = i32::from(center.x) + self.next_int_range(-r, r);
        let y = i32::from(center.y) + self.next_int_range(-r, r);
        Point::new(
            x.clamp(0, i32::from(u16::MAX)) as u16,
            y.clamp(0, i32::from(u16::MAX)) as u16,
        )
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================
