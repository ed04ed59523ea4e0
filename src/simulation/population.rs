//! Population manager
//!
//! Owns the ordered box list and reconciles its length with the configured
//! target between ticks. Growth appends independently randomised boxes;
//! shrinking truncates the tail. Boxes that survive a resize are untouched.

use super::body::BoxBody;
use super::config::{SpawnSettings, WorldBounds};
use cgmath::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// What a call to [`Population::reconcile`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Unchanged,
    Grown { from: usize, to: usize },
    Shrunk { from: usize, to: usize },
}

impl ResizeOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, ResizeOutcome::Unchanged)
    }
}

pub struct Population {
    boxes: Vec<BoxBody>,
    rng: StdRng,
}

impl Population {
    /// Empty population seeded from the operating system
    pub fn new() -> Self {
        Self {
            boxes: Vec::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Empty population with reproducible spawns
    pub fn with_seed(seed: u64) -> Self {
        Self {
            boxes: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Grow or shrink to exactly `target` boxes
    pub fn reconcile(
        &mut self,
        target: usize,
        world: &WorldBounds,
        spawn: &SpawnSettings,
    ) -> ResizeOutcome {
        let from = self.boxes.len();

        if target > from {
            self.boxes.reserve(target - from);
            for _ in from..target {
                let body = self.spawn_box(world, spawn);
                self.boxes.push(body);
            }
            ResizeOutcome::Grown { from, to: target }
        } else if target < from {
            self.boxes.truncate(target);
            ResizeOutcome::Shrunk { from, to: target }
        } else {
            ResizeOutcome::Unchanged
        }
    }

    /// Build one randomised box
    ///
    /// X and Z start in the non-negative part of the world (the whole world
    /// when it lies entirely below zero), Y in a one unit band above the spawn
    /// height, and only the X velocity is non-zero.
    pub fn spawn_box(&mut self, world: &WorldBounds, spawn: &SpawnSettings) -> BoxBody {
        let x = self.spawn_coordinate(world.min_x, world.max_x);
        let z = self.spawn_coordinate(world.min_z, world.max_z);
        let position = Vector3::new(x, spawn.height + self.rng.random::<f32>(), z);
        let speed = spawn.max_speed.abs();
        let velocity_x = if speed > 0.0 {
            self.rng.random_range(-speed..speed)
        } else {
            0.0
        };

        BoxBody::new(position, spawn.radius, Vector3::new(velocity_x, 0.0, 0.0))
    }

    fn spawn_coordinate(&mut self, min: f32, max: f32) -> f32 {
        if min >= max {
            return min;
        }
        let low = min.max(0.0);
        if low < max {
            self.rng.random_range(low..max)
        } else {
            self.rng.random_range(min..max)
        }
    }

    /// Drop every box; the next reconcile respawns from scratch
    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoxBody> {
        self.boxes.get(index)
    }

    pub fn boxes(&self) -> &[BoxBody] {
        &self.boxes
    }

    pub fn boxes_mut(&mut self) -> &mut [BoxBody] {
        &mut self.boxes
    }
}

impl Default for Population {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grow(population: &mut Population, target: usize) -> ResizeOutcome {
        population.reconcile(target, &WorldBounds::default(), &SpawnSettings::default())
    }

    #[test]
    fn test_grow_preserves_existing_boxes() {
        let mut population = Population::with_seed(7);
        grow(&mut population, 10);
        let before = population.boxes().to_vec();

        let outcome = grow(&mut population, 25);
        assert_eq!(outcome, ResizeOutcome::Grown { from: 10, to: 25 });
        assert_eq!(population.len(), 25);
        assert_eq!(&population.boxes()[..10], &before[..]);
    }

    #[test]
    fn test_shrink_keeps_prefix() {
        let mut population = Population::with_seed(11);
        grow(&mut population, 100);
        let before = population.boxes().to_vec();

        let outcome = grow(&mut population, 50);
        assert_eq!(outcome, ResizeOutcome::Shrunk { from: 100, to: 50 });
        assert_eq!(population.boxes(), &before[..50]);
    }

    #[test]
    fn test_same_target_is_unchanged() {
        let mut population = Population::with_seed(3);
        grow(&mut population, 5);
        let outcome = grow(&mut population, 5);
        assert_eq!(outcome, ResizeOutcome::Unchanged);
        assert!(!outcome.changed());
    }

    #[test]
    fn test_spawned_boxes_follow_spawn_rules() {
        let world = WorldBounds::default();
        let spawn = SpawnSettings::default();
        let mut population = Population::with_seed(42);
        population.reconcile(500, &world, &spawn);

        for body in population.boxes() {
            let position = body.position();
            assert!(position.x >= 0.0 && position.x < world.max_x);
            assert!(position.z >= 0.0 && position.z < world.max_z);
            assert!(position.y >= spawn.height && position.y < spawn.height + 1.0);
            assert_eq!(body.radius(), spawn.radius);

            let velocity = body.velocity();
            assert!(velocity.x >= -1.0 && velocity.x < 1.0);
            assert_eq!(velocity.y, 0.0);
            assert_eq!(velocity.z, 0.0);
        }
    }

    #[test]
    fn test_spawns_stay_inside_custom_bounds() {
        let spawn = SpawnSettings::default();
        let below_zero = WorldBounds {
            min_x: -20.0,
            max_x: -5.0,
            min_z: -8.0,
            max_z: -2.0,
            ..WorldBounds::default()
        };
        let above_zero = WorldBounds {
            min_x: 5.0,
            max_x: 6.0,
            min_z: 12.0,
            max_z: 40.0,
            ..WorldBounds::default()
        };

        for world in [below_zero, above_zero] {
            let mut population = Population::with_seed(5);
            population.reconcile(300, &world, &spawn);
            for body in population.boxes() {
                let position = body.position();
                assert!(position.x >= world.min_x && position.x < world.max_x, "{position:?}");
                assert!(position.z >= world.min_z && position.z < world.max_z, "{position:?}");
            }
        }
    }

    #[test]
    fn test_same_seed_spawns_same_boxes() {
        let mut a = Population::with_seed(99);
        let mut b = Population::with_seed(99);
        grow(&mut a, 64);
        grow(&mut b, 64);
        assert_eq!(a.boxes(), b.boxes());
    }

    #[test]
    fn test_out_of_range_lookup_is_none() {
        let mut population = Population::with_seed(1);
        grow(&mut population, 3);
        assert!(population.get(2).is_some());
        assert!(population.get(3).is_none());
    }
}
