//! Core simulation traits
//!
//! [`CollisionDetector`] is the seam between the tick pipeline and the three
//! detection backends. [`BoxSource`] is the read-only view handed to a
//! renderer.

use super::body::{BoxBody, BoxInstance, CollisionPair};
use super::config::DetectionStrategy;
use super::error::SimulationError;

/// Work done by one detection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Overlapping pairs handed to the resolver
    pub pairs: usize,
    /// Pairwise overlap tests performed
    pub comparisons: u64,
}

/// A collision detection backend
///
/// Implementations find every overlapping pair in `boxes`, resolve them on the
/// calling thread and append each pair to `resolved` in the order it was
/// resolved. Resolution always happens after detection has finished reading
/// the boxes, or inline on a single thread.
pub trait CollisionDetector {
    /// Which strategy this backend implements
    fn strategy(&self) -> DetectionStrategy;

    /// Detect overlaps and apply impulses for one tick
    ///
    /// # Arguments
    /// * `boxes` - The whole population, mutated in place by the resolver
    /// * `resolved` - Cleared, then filled with the pairs that were resolved
    fn detect_and_resolve(
        &mut self,
        boxes: &mut [BoxBody],
        resolved: &mut Vec<CollisionPair>,
    ) -> Result<DetectionStats, SimulationError>;
}

/// Read-only access to the simulated boxes for drawing
pub trait BoxSource {
    /// Number of live boxes
    fn box_count(&self) -> usize;

    /// Box at `index`, or `None` past the end
    fn get_box(&self, index: usize) -> Option<&BoxBody>;

    /// Fill `out` with one instance per box
    fn write_instances(&self, out: &mut Vec<BoxInstance>) {
        out.clear();
        out.extend((0..self.box_count()).filter_map(|i| self.get_box(i).map(BoxBody::instance)));
    }
}

impl BoxSource for super::population::Population {
    fn box_count(&self) -> usize {
        self.len()
    }

    fn get_box(&self, index: usize) -> Option<&BoxBody> {
        self.get(index)
    }
}
