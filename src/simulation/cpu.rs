//! CPU collision detection backends
//!
//! [`SerialDetector`] is the single-threaded baseline. [`ParallelDetector`]
//! splits the outer loop across a [`TaskPool`], collects pairs per job and
//! resolves them on the calling thread once every job is done. Both walk pairs
//! in the same lexicographic order, so they leave the boxes in identical state.
//!
//! The partitioning is static: chunk `k` owns outer indices
//! `[k * n/T, (k + 1) * n/T)` and compares each of them against the rest of the
//! population, so low chunks do more work than high ones. The imbalance is
//! kept; the point of the brute-force pass is to generate load.

use super::body::{BoxBody, CollisionPair};
use super::collision::{overlaps, resolve_pair};
use super::config::DetectionStrategy;
use super::error::SimulationError;
use super::traits::{CollisionDetector, DetectionStats};
use crate::thread_pool::{JobCounter, PoolError, TaskPool};
use log::error;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

/// Single-threaded detector that resolves each pair as soon as it is found
#[derive(Debug, Default)]
pub struct SerialDetector;

impl SerialDetector {
    pub fn new() -> Self {
        Self
    }
}

impl CollisionDetector for SerialDetector {
    fn strategy(&self) -> DetectionStrategy {
        DetectionStrategy::Serial
    }

    fn detect_and_resolve(
        &mut self,
        boxes: &mut [BoxBody],
        resolved: &mut Vec<CollisionPair>,
    ) -> Result<DetectionStats, SimulationError> {
        resolved.clear();
        let count = boxes.len();
        let mut comparisons = 0u64;

        for i in 0..count {
            // Only later boxes, so every pair is visited once.
            for j in (i + 1)..count {
                comparisons += 1;
                if overlaps(&boxes[i], &boxes[j]) {
                    let pair = CollisionPair::new(i as u32, j as u32);
                    resolve_pair(boxes, pair);
                    resolved.push(pair);
                }
            }
        }

        Ok(DetectionStats {
            pairs: resolved.len(),
            comparisons,
        })
    }
}

/// Pairs found by one detection job
#[derive(Debug, Default)]
struct JobOutput {
    pairs: Vec<CollisionPair>,
    comparisons: u64,
}

/// Split `[0, count)` into `jobs` contiguous ranges
///
/// Every range is `count / jobs` long except the last, which absorbs the
/// remainder. With fewer boxes than jobs the leading ranges are empty.
pub fn partition(count: usize, jobs: usize) -> Vec<Range<usize>> {
    let jobs = jobs.max(1);
    let per_job = count / jobs;
    let mut ranges = Vec::with_capacity(jobs);
    let mut start = 0;

    for job in 0..jobs {
        let end = if job == jobs - 1 { count } else { start + per_job };
        ranges.push(start..end);
        start = end;
    }

    ranges
}

/// Test outer indices in `outer` against every later box
fn find_collisions(boxes: &[BoxBody], outer: Range<usize>) -> JobOutput {
    let mut output = JobOutput::default();

    for i in outer {
        let a = &boxes[i];
        for (j, b) in boxes.iter().enumerate().skip(i + 1) {
            output.comparisons += 1;
            if overlaps(a, b) {
                output.pairs.push(CollisionPair::new(i as u32, j as u32));
            }
        }
    }

    output
}

/// Task pool detector with deferred, single-threaded resolution
pub struct ParallelDetector {
    pool: TaskPool,
}

impl ParallelDetector {
    /// Create a detector backed by its own pool of `thread_count` workers
    pub fn new(thread_count: usize) -> Result<Self, PoolError> {
        Ok(Self::from_pool(TaskPool::new(thread_count)?))
    }

    pub fn from_pool(pool: TaskPool) -> Self {
        Self { pool }
    }

    /// Number of jobs dispatched per tick
    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }
}

impl CollisionDetector for ParallelDetector {
    fn strategy(&self) -> DetectionStrategy {
        DetectionStrategy::Parallel
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

        // Workers only ever see this snapshot; nothing writes to it.
        let snapshot: Arc<[BoxBody]> = Arc::from(&*boxes);
        let ranges = partition(snapshot.len(), self.pool.thread_count());
        let outputs: Arc<[OnceLock<JobOutput>]> = ranges.iter().map(|_| OnceLock::new()).collect();
        let counter = JobCounter::new(ranges.len());

        for (job, range) in ranges.into_iter().enumerate() {
            let guard = counter.guard();
            let snapshot = Arc::clone(&snapshot);
            let outputs = Arc::clone(&outputs);

            self.pool.enqueue(move || {
                let _guard = guard;
                let output = find_collisions(&snapshot, range);
                // Each job owns slot `job`, so the first set always wins.
                let stored = outputs[job].set(output).is_ok();
                debug_assert!(stored, "detection slot {job} written twice");
            });
        }

        counter.wait();

        let mut comparisons = 0u64;
        for (job, slot) in outputs.iter().enumerate() {
            let Some(output) = slot.get() else {
                error!("Detection job {} did not report any results", job);
                return Err(SimulationError::DetectionJobFailed { job });
            };

            comparisons += output.comparisons;
            for &pair in &output.pairs {
                resolve_pair(boxes, pair);
                resolved.push(pair);
            }
        }

        Ok(DetectionStats {
            pairs: resolved.len(),
            comparisons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn dense_cluster(count: usize, seed: u64) -> Vec<BoxBody> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                BoxBody::new(
                    Vector3::new(
                        rng.random_range(0.0..4.0),
                        rng.random_range(0.0..4.0),
                        rng.random_range(0.0..4.0),
                    ),
                    0.25,
                    Vector3::new(
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                        rng.random_range(-1.0..1.0),
                    ),
                )
            })
            .collect()
    }

    #[test]
    fn test_partition_covers_range_contiguously() {
        let ranges = partition(103, 4);
        assert_eq!(ranges, vec![0..25, 25..50, 50..75, 75..103]);
    }

    #[test]
    fn test_partition_with_more_jobs_than_boxes() {
        let ranges = partition(3, 8);
        assert_eq!(ranges.len(), 8);
        assert!(ranges[..7].iter().all(|r| r.is_empty()));
        assert_eq!(ranges[7], 0..3);
    }

    #[test]
    fn test_serial_counts_every_unique_pair() {
        let mut boxes = dense_cluster(50, 1);
        let mut resolved = Vec::new();
        let stats = SerialDetector::new()
            .detect_and_resolve(&mut boxes, &mut resolved)
            .unwrap();

        assert_eq!(stats.comparisons, 50 * 49 / 2);
        assert_eq!(stats.pairs, resolved.len());
        assert!(resolved.iter().all(|p| p.index1 < p.index2));
    }

    #[test]
    fn test_empty_population_is_noop() {
        let mut boxes: Vec<BoxBody> = Vec::new();
        let mut resolved = vec![CollisionPair::new(0, 1)];

        let stats = SerialDetector::new()
            .detect_and_resolve(&mut boxes, &mut resolved)
            .unwrap();
        assert_eq!(stats, DetectionStats::default());
        assert!(resolved.is_empty());

        let mut parallel = ParallelDetector::new(4).unwrap();
        let stats = parallel.detect_and_resolve(&mut boxes, &mut resolved).unwrap();
        assert_eq!(stats, DetectionStats::default());
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_parallel_matches_serial_exactly() {
        let initial = dense_cluster(400, 5);

        let mut serial_boxes = initial.clone();
        let mut serial_pairs = Vec::new();
        let serial_stats = SerialDetector::new()
            .detect_and_resolve(&mut serial_boxes, &mut serial_pairs)
            .unwrap();

        let mut parallel_boxes = initial;
        let mut parallel_pairs = Vec::new();
        let mut parallel = ParallelDetector::new(6).unwrap();
        let parallel_stats = parallel
            .detect_and_resolve(&mut parallel_boxes, &mut parallel_pairs)
            .unwrap();

        assert!(serial_stats.pairs > 0);
        assert_eq!(serial_stats, parallel_stats);
        assert_eq!(serial_pairs, parallel_pairs);
        assert_eq!(serial_boxes, parallel_boxes);
    }

    #[test]
    fn test_every_job_reports_with_empty_chunks() {
        // Eight jobs over five boxes: seven chunks are empty but still report.
        let mut parallel = ParallelDetector::new(8).unwrap();
        let mut serial = SerialDetector::new();
        let initial = dense_cluster(5, 2);

        for _ in 0..20 {
            let mut parallel_boxes = initial.clone();
            let mut serial_boxes = initial.clone();
            let mut parallel_pairs = Vec::new();
            let mut serial_pairs = Vec::new();

            let stats = parallel
                .detect_and_resolve(&mut parallel_boxes, &mut parallel_pairs)
                .unwrap();
            serial
                .detect_and_resolve(&mut serial_boxes, &mut serial_pairs)
                .unwrap();

            assert_eq!(stats.comparisons, 10);
            assert_eq!(parallel_pairs, serial_pairs);
            assert_eq!(parallel_boxes, serial_boxes);
        }
    }

    #[test]
    fn test_parallel_detector_is_reusable_across_ticks() {
        let mut parallel = ParallelDetector::new(3).unwrap();
        let mut boxes = dense_cluster(120, 9);
        let mut resolved = Vec::new();

        for _ in 0..5 {
            parallel.detect_and_resolve(&mut boxes, &mut resolved).unwrap();
        }
        assert_eq!(parallel.thread_count(), 3);
    }
}
