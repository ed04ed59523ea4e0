//! # Device Compute Bridge
//!
//! The contract between the tick pipeline and a compute device that runs the
//! pairwise overlap kernel, plus the [`DeviceDetector`] strategy built on it.
//!
//! ## Buffers
//!
//! - **Boxes**: read-only array of [`BoxBody`] records (8 packed `f32` each),
//!   written through a CPU-writable staging buffer and copied device-side.
//! - **Pairs**: writable array of [`CollisionPair`]. Starts with one slot per
//!   box and grows on its own when a dispatch finds more overlaps than slots.
//! - **Counters**: two `u32`; `[0]` counts reserved pair slots, `[1]` counts
//!   overlap tests. Cleared to zero immediately before every dispatch. Created
//!   once and never reallocated.
//!
//! ## Kernel
//!
//! For every unique pair `(i, j)` with `i < j`, apply
//! [`overlaps`](super::collision::overlaps); on a hit, reserve a slot with an
//! atomic add on counter `[0]` and write the pair if the slot is in range.
//!
//! Every call is synchronous: read-back blocks until the device has finished
//! the copy it depends on.

use super::body::{BoxBody, CollisionPair};
use super::collision::{overlaps, resolve_pair};
use super::config::DetectionStrategy;
use super::error::{DeviceError, SimulationError};
use super::traits::{CollisionDetector, DetectionStats};
use log::{debug, warn};

/// Counter buffer contents after a dispatch
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DeviceCounters {
    /// Pair slots reserved by the kernel, possibly more than the buffer holds
    pub pairs: u32,
    /// Overlap tests performed (diagnostic)
    pub comparisons: u32,
}

/// A compute device able to run the overlap kernel
pub trait ComputeBridge {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Boxes the current buffers were sized for
    fn capacity(&self) -> usize;

    /// Pair slots the current pair buffer holds
    fn pair_capacity(&self) -> usize;

    /// Release and reallocate every size-dependent buffer
    ///
    /// The pair buffer never shrinks below its current size.
    fn recreate_buffers(&mut self, max_boxes: usize) -> Result<(), DeviceError>;

    /// Reallocate only the pair buffer and its readback staging
    ///
    /// Uploaded boxes stay valid, so a dispatch can follow directly.
    fn reserve_pairs(&mut self, max_pairs: usize) -> Result<(), DeviceError>;

    /// Copy the population into the device box buffer via staging
    fn upload(&mut self, boxes: &[BoxBody]) -> Result<(), DeviceError>;

    /// Clear the counters and run the kernel over the first `box_count` boxes
    fn dispatch(&mut self, box_count: usize) -> Result<(), DeviceError>;

    /// Block until results are readable, then append the valid pairs to `pairs`
    fn read_back(&mut self, pairs: &mut Vec<CollisionPair>) -> Result<DeviceCounters, DeviceError>;
}

/// Collision detector that offloads the pairwise pass to a [`ComputeBridge`]
pub struct DeviceDetector {
    bridge: Box<dyn ComputeBridge>,
    scratch: Vec<CollisionPair>,
}

impl DeviceDetector {
    pub fn new(bridge: Box<dyn ComputeBridge>) -> Self {
        Self {
            bridge,
            scratch: Vec::new(),
        }
    }

    pub fn bridge_name(&self) -> &str {
        self.bridge.name()
    }

    pub fn capacity(&self) -> usize {
        self.bridge.capacity()
    }

    pub fn pair_capacity(&self) -> usize {
        self.bridge.pair_capacity()
    }

    /// Reallocate device buffers for a new population size
    pub fn resize(&mut self, max_boxes: usize) -> Result<(), DeviceError> {
        debug!(
            "Recreating {} buffers for {} boxes",
            self.bridge.name(),
            max_boxes
        );
        self.bridge.recreate_buffers(max_boxes.max(1))
    }
}

impl CollisionDetector for DeviceDetector {
    fn strategy(&self) -> DetectionStrategy {
        DetectionStrategy::Device
    }

    fn detect_and_resolve(
        &mut self,
        boxes: &mut [BoxBody],
        resolved: &mut Vec<CollisionPair>,
    ) -> Result<DetectionStats, SimulationError> {
        resolved.clear();
        if boxes.is_empty() {
            return Ok(DetectionStats::default());
        }
        if boxes.len() > self.bridge.capacity() {
            self.resize(boxes.len())?;
        }

        self.bridge.upload(boxes)?;
        self.bridge.dispatch(boxes.len())?;

        self.scratch.clear();
        let mut counters = self.bridge.read_back(&mut self.scratch)?;
        let found = counters.pairs as usize;
        if found > self.scratch.len() {
            let grown = found + found / 4;
            debug!(
                "{} overlaps exceed {} pair slots, regrowing to {}",
                found,
                self.bridge.pair_capacity(),
                grown
            );
            self.bridge.reserve_pairs(grown)?;
            self.bridge.dispatch(boxes.len())?;
            self.scratch.clear();
            counters = self.bridge.read_back(&mut self.scratch)?;
        }
        if counters.pairs as usize != self.scratch.len() {
            return Err(DeviceError::PairOverflow {
                found: counters.pairs as usize,
                returned: self.scratch.len(),
            }
            .into());
        }

        // Slot order depends on device scheduling; resolve in index order like the CPU paths.
        self.scratch.sort_unstable();
        for &pair in &self.scratch {
            if pair.index1 >= pair.index2 || pair.index2 as usize >= boxes.len() {
                warn!("Discarding malformed pair {:?} from device", pair);
                continue;
            }
            resolve_pair(boxes, pair);
            resolved.push(pair);
        }

        Ok(DetectionStats {
            pairs: resolved.len(),
            comparisons: counters.comparisons as u64,
        })
    }
}

/// Host-memory emulation of the device buffers and kernel
///
/// Mirrors the staging protocol and the slot reservation of the GPU kernel,
/// including truncation when the pair buffer is full. Useful on machines
/// without an adapter and as a reference for the GPU path.
#[derive(Debug, Default)]
pub struct SoftwareBridge {
    capacity: usize,
    staging_boxes: Vec<BoxBody>,
    device_boxes: Vec<BoxBody>,
    pair_buffer: Vec<CollisionPair>,
    counters: [u32; 2],
    readback_pairs: Vec<CollisionPair>,
    readback_counters: DeviceCounters,
    uploaded: usize,
}

impl SoftwareBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bridge with buffers already allocated for `max_boxes`
    pub fn with_capacity(max_boxes: usize) -> Self {
        let mut bridge = Self::new();
        bridge.allocate(max_boxes);
        bridge
    }

    fn allocate(&mut self, max_boxes: usize) {
        self.capacity = max_boxes;
        self.staging_boxes = vec![BoxBody::default(); max_boxes];
        self.device_boxes = vec![BoxBody::default(); max_boxes];
        self.uploaded = 0;
        let pair_capacity = max_boxes.max(self.pair_buffer.len());
        self.allocate_pairs(pair_capacity);
    }

    fn allocate_pairs(&mut self, max_pairs: usize) {
        self.pair_buffer = vec![CollisionPair::default(); max_pairs];
        self.readback_pairs = vec![CollisionPair::default(); max_pairs];
    }
}

impl ComputeBridge for SoftwareBridge {
    fn name(&self) -> &str {
        "software"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn pair_capacity(&self) -> usize {
        self.pair_buffer.len()
    }

    fn recreate_buffers(&mut self, max_boxes: usize) -> Result<(), DeviceError> {
        self.allocate(max_boxes);
        Ok(())
    }

    fn reserve_pairs(&mut self, max_pairs: usize) -> Result<(), DeviceError> {
        self.allocate_pairs(max_pairs.max(1));
        Ok(())
    }

    fn upload(&mut self, boxes: &[BoxBody]) -> Result<(), DeviceError> {
        if boxes.len() > self.capacity {
            return Err(DeviceError::CapacityExceeded {
                capacity: self.capacity,
                requested: boxes.len(),
            });
        }

        self.staging_boxes[..boxes.len()].copy_from_slice(boxes);
        self.device_boxes[..boxes.len()].copy_from_slice(&self.staging_boxes[..boxes.len()]);
        self.uploaded = boxes.len();
        Ok(())
    }

    fn dispatch(&mut self, box_count: usize) -> Result<(), DeviceError> {
        if box_count > self.uploaded {
            return Err(DeviceError::CapacityExceeded {
                capacity: self.uploaded,
                requested: box_count,
            });
        }

        self.counters = [0, 0];
        let boxes = &self.device_boxes[..box_count];
        for i in 0..box_count {
            for j in (i + 1)..box_count {
                self.counters[1] += 1;
                if overlaps(&boxes[i], &boxes[j]) {
                    let slot = self.counters[0] as usize;
                    self.counters[0] += 1;
                    if slot < self.pair_buffer.len() {
                        self.pair_buffer[slot] = CollisionPair::new(i as u32, j as u32);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_back(&mut self, pairs: &mut Vec<CollisionPair>) -> Result<DeviceCounters, DeviceError> {
        self.readback_counters = DeviceCounters {
            pairs: self.counters[0],
            comparisons: self.counters[1],
        };
        self.readback_pairs.copy_from_slice(&self.pair_buffer);

        let valid = (self.readback_counters.pairs as usize).min(self.readback_pairs.len());
        pairs.extend_from_slice(&self.readback_pairs[..valid]);
        Ok(self.readback_counters)
    }
}
