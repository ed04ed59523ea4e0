//! Frame-driven wrapper around [`ColliderManager`]
//!
//! Turns wall-clock frame deltas into ticks, with pause, time scaling and an
//! optional fixed timestep for deterministic runs.

use super::config::SimulationConfig;
use super::error::SimulationError;
use super::manager::ColliderManager;
use log::warn;

/// Upper bound on fixed-timestep ticks run for a single frame
pub const MAX_SUBSTEPS: u32 = 8;

pub struct SimulationDriver {
    manager: ColliderManager,
    config: SimulationConfig,
    is_paused: bool,
    time_scale: f32,
    accumulated_time: f32,
    fixed_timestep: Option<f32>,
}

impl SimulationDriver {
    pub fn new(manager: ColliderManager, config: SimulationConfig) -> Self {
        Self {
            manager,
            config,
            is_paused: false,
            time_scale: 1.0,
            accumulated_time: 0.0,
            fixed_timestep: None,
        }
    }

    /// Advance by one frame of `delta_time` seconds
    ///
    /// Returns the number of ticks run. With a fixed timestep, leftover time
    /// carries over to the next frame; time beyond [`MAX_SUBSTEPS`] ticks is
    /// dropped.
    pub fn update(&mut self, delta_time: f32) -> Result<u32, SimulationError> {
        if self.is_paused {
            return Ok(0);
        }

        let scaled_delta = delta_time * self.time_scale;

        let Some(fixed_dt) = self.fixed_timestep else {
            self.manager.tick(&self.config, scaled_delta)?;
            return Ok(1);
        };

        self.accumulated_time += scaled_delta;
        let mut ticks = 0;
        while self.accumulated_time >= fixed_dt {
            if ticks == MAX_SUBSTEPS {
                warn!(
                    "Falling behind: dropping {:.3}s of simulation time",
                    self.accumulated_time
                );
                self.accumulated_time = 0.0;
                break;
            }
            self.manager.tick(&self.config, fixed_dt)?;
            self.accumulated_time -= fixed_dt;
            ticks += 1;
        }
        Ok(ticks)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.is_paused = paused;
    }

    pub fn toggle_pause(&mut self) {
        self.is_paused = !self.is_paused;
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Set the time multiplier (1.0 = real time); negative values clamp to 0
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn fixed_timestep(&self) -> Option<f32> {
        self.fixed_timestep
    }

    /// Enable fixed timestep mode, or `None` for one tick per frame
    ///
    /// Non-positive or non-finite steps disable it.
    pub fn set_fixed_timestep(&mut self, timestep: Option<f32>) {
        self.fixed_timestep = timestep.filter(|dt| dt.is_finite() && *dt > 0.0);
        self.accumulated_time = 0.0;
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Mutable configuration; changes apply from the next tick
    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    pub fn manager(&self) -> &ColliderManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ColliderManager {
        &mut self.manager
    }

    /// Empty the population and drop any carried-over time
    pub fn reset(&mut self) {
        self.manager.reset();
        self.accumulated_time = 0.0;
    }
}
