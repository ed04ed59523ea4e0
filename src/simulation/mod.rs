// src/simulation/mod.rs
//! Box collision simulation
//!
//! A population of axis-aligned boxes falls under gravity, bounces off the
//! floor and the world walls, and collides with itself. Collisions are found by
//! one of three interchangeable detectors (serial, task pool, compute device)
//! and always resolved on the calling thread, so every detector leaves the
//! population in the same state.

pub mod body;
pub mod bridge;
pub mod collision;
pub mod config;
pub mod cpu;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod integrator;
pub mod manager;
pub mod population;
pub mod traits;

pub use body::{BoxBody, BoxInstance, CollisionPair};
pub use bridge::{ComputeBridge, DeviceCounters, DeviceDetector, SoftwareBridge};
pub use config::{DetectionStrategy, SimulationConfig, SpawnSettings, WorldBounds};
pub use driver::SimulationDriver;
pub use error::{ConfigError, DeviceError, SimulationError};
pub use gpu::{GpuContext, WgpuBridge};
pub use manager::{ColliderManager, DeviceStatus, TickReport};
pub use population::{Population, ResizeOutcome};
pub use traits::{BoxSource, CollisionDetector, DetectionStats};
