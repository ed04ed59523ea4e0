//! Error types for the collision simulation

use crate::thread_pool::PoolError;
use thiserror::Error;

/// Failures of a compute device or of the resources created on it
///
/// Any of these disables the device strategy for the rest of the session.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no compatible GPU adapter: {0}")]
    AdapterUnavailable(String),
    #[error("failed to create the compute device: {0}")]
    DeviceRequest(String),
    #[error("collision kernel could not be built: {0}")]
    Pipeline(String),
    #[error("failed to allocate device buffers: {0}")]
    BufferAllocation(String),
    #[error("failed to map a staging buffer: {0}")]
    Map(String),
    #[error("device did not finish the submitted work: {0}")]
    Poll(String),
    #[error("device buffers hold {capacity} boxes but {requested} were uploaded")]
    CapacityExceeded { capacity: usize, requested: usize },
    #[error("device reported {found} overlapping pairs but returned {returned}")]
    PairOverflow { found: usize, returned: usize },
}

/// Rejected [`SimulationConfig`](super::config::SimulationConfig) values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("target population {requested} exceeds the maximum of {max}")]
    TooManyBoxes { requested: usize, max: usize },
    #[error("delta time must be finite and non-negative, got {0}")]
    InvalidDeltaTime(f32),
    #[error("world bounds are inverted on the {axis} axis")]
    InvertedBounds { axis: char },
    #[error("box radius must be positive, got {0}")]
    InvalidRadius(f32),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("device strategy selected but no compute bridge is attached")]
    DeviceUnavailable,
    #[error("device strategy disabled after an earlier failure: {reason}")]
    DeviceDisabled { reason: String },
    #[error("detection job {job} finished without producing results")]
    DetectionJobFailed { job: usize },
}
