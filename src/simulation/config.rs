//! Simulation configuration
//!
//! Everything the tick pipeline needs from the outside world is carried in a
//! [`SimulationConfig`] owned by the caller and passed into every tick.
//!
//! ```
//! use boxstorm::simulation::config::{DetectionStrategy, SimulationConfig};
//!
//! let config = SimulationConfig::new()
//!     .with_target_count(2_000)
//!     .with_strategy(DetectionStrategy::Parallel);
//! assert!(config.validate().is_ok());
//! ```

use super::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Hard upper bound on the population
pub const MAX_BOXES: usize = 20_000;

/// Population used when nothing else is configured
pub const DEFAULT_BOX_COUNT: usize = 1_000;

/// Collision detection backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetectionStrategy {
    /// One thread, pairs resolved as they are found
    #[default]
    Serial,
    /// Task pool detection, serial resolution afterwards
    Parallel,
    /// Compute device detection, serial resolution afterwards
    Device,
}

impl DetectionStrategy {
    pub const ALL: [DetectionStrategy; 3] = [Self::Serial, Self::Parallel, Self::Device];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Parallel => "parallel",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" | "cpu" | "single" => Ok(Self::Serial),
            "parallel" | "threaded" | "multi" => Ok(Self::Parallel),
            "device" | "gpu" => Ok(Self::Device),
            other => Err(format!(
                "unknown strategy '{other}' (expected serial, parallel or device)"
            )),
        }
    }
}

/// Fixed world constants: horizontal walls, floor plane and gravity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub floor_y: f32,
    /// Vertical acceleration, negative is down
    pub gravity: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min_x: -10.0,
            max_x: 30.0,
            min_z: -30.0,
            max_z: 30.0,
            floor_y: 0.0,
            gravity: -9.8,
        }
    }
}

impl WorldBounds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_x >= self.max_x {
            return Err(ConfigError::InvertedBounds { axis: 'x' });
        }
        if self.min_z >= self.max_z {
            return Err(ConfigError::InvertedBounds { axis: 'z' });
        }
        Ok(())
    }
}

/// How freshly grown boxes are initialised
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnSettings {
    /// Lowest spawn height; boxes land in `[height, height + 1)`
    pub height: f32,
    /// Half-extent given to every new box
    pub radius: f32,
    /// Horizontal X speed is drawn from `[-max_speed, max_speed)`
    pub max_speed: f32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            height: 10.0,
            radius: 0.25,
            max_speed: 1.0,
        }
    }
}

/// Caller-owned configuration for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub target_count: usize,
    pub strategy: DetectionStrategy,
    pub world: WorldBounds,
    pub spawn: SpawnSettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_BOX_COUNT,
            strategy: DetectionStrategy::default(),
            world: WorldBounds::default(),
            spawn: SpawnSettings::default(),
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_count(mut self, count: usize) -> Self {
        self.target_count = count;
        self
    }

    pub fn with_strategy(mut self, strategy: DetectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_world(mut self, world: WorldBounds) -> Self {
        self.world = world;
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.world.gravity = gravity;
        self
    }

    pub fn with_spawn(mut self, spawn: SpawnSettings) -> Self {
        self.spawn = spawn;
        self
    }

    /// Check the configuration before it reaches the tick pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_count > MAX_BOXES {
            return Err(ConfigError::TooManyBoxes {
                requested: self.target_count,
                max: MAX_BOXES,
            });
        }
        if !(self.spawn.radius > 0.0) {
            return Err(ConfigError::InvalidRadius(self.spawn.radius));
        }
        self.world.validate()
    }
}

/// Reject delta times the integrator cannot use
pub fn validate_delta_time(delta_time: f32) -> Result<(), ConfigError> {
    if delta_time.is_finite() && delta_time >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDeltaTime(delta_time))
    }
}
