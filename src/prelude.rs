//! # boxstorm Prelude
//!
//! Commonly used types in one import.
//!
//! ```no_run
//! use boxstorm::prelude::*;
//!
//! fn main() -> Result<(), SimulationError> {
//!     let mut manager = ColliderManager::with_seed(4, 7)?;
//!     let config = SimulationConfig::new()
//!         .with_target_count(500)
//!         .with_strategy(DetectionStrategy::Parallel);
//!
//!     for _ in 0..100 {
//!         manager.tick(&config, 1.0 / 60.0)?;
//!     }
//!     println!("{}", manager.metrics());
//!     Ok(())
//! }
//! ```

// Re-export simulation types
pub use crate::simulation::{
    BoxBody, BoxInstance, BoxSource, ColliderManager, CollisionDetector, CollisionPair,
    ComputeBridge, DetectionStats, DetectionStrategy, DeviceStatus, SimulationConfig,
    SimulationDriver, SimulationError, SoftwareBridge, SpawnSettings, TickReport, WgpuBridge,
    WorldBounds,
};

// Re-export performance monitoring
pub use crate::performance::{PerformanceMetrics, PerformanceMonitor, PhaseTimings};

// Re-export the task pool
pub use crate::thread_pool::TaskPool;

// Re-export common external dependencies
pub use cgmath::{InnerSpace, Vector3, Zero};
