//! # Performance Metrics System
//!
//! Tick timing for the collision pipeline, so the detection strategies can be
//! compared on the same population.
//!
//! ## Features
//!
//! - **Tick Time Tracking**: rolling window of whole-tick durations with
//!   average, min, max and ticks per second
//! - **Phase Timings**: resize, integrate and detect timings of the last tick
//! - **Detection Statistics**: pairs and comparisons of the last tick
//!
//! ## Usage
//!
//! ```rust
//! use boxstorm::performance::{PerformanceMonitor, PhaseTimings};
//! use boxstorm::simulation::traits::DetectionStats;
//! use std::time::Duration;
//!
//! let mut monitor = PerformanceMonitor::new();
//! let phases = PhaseTimings {
//!     resize: Duration::from_micros(5),
//!     integrate: Duration::from_micros(40),
//!     detect: Duration::from_millis(3),
//! };
//! monitor.record_tick(phases, DetectionStats::default(), 1000);
//!
//! println!("{}", monitor.get_metrics());
//! ```

use crate::simulation::traits::DetectionStats;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Time spent in each stage of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub resize: Duration,
    pub integrate: Duration,
    pub detect: Duration,
}

impl PhaseTimings {
    pub fn total(&self) -> Duration {
        self.resize + self.integrate + self.detect
    }
}

/// Aggregated tick metrics
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    /// Ticks per second over the sample window
    pub ticks_per_second: f32,
    /// Average tick time in milliseconds
    pub tick_time_ms: f32,
    /// Minimum tick time in the current window
    pub min_tick_time_ms: f32,
    /// Maximum tick time in the current window
    pub max_tick_time_ms: f32,
    /// Phase timings of the last tick
    pub last_phases: PhaseTimings,
    /// Pairs resolved in the last tick
    pub pairs: usize,
    /// Overlap tests performed in the last tick
    pub comparisons: u64,
    /// Population size at the end of the last tick
    pub box_count: usize,
    /// Ticks recorded since creation or the last reset
    pub total_ticks: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            ticks_per_second: 0.0,
            tick_time_ms: 0.0,
            min_tick_time_ms: f32::MAX,
            max_tick_time_ms: 0.0,
            last_phases: PhaseTimings::default(),
            pairs: 0,
            comparisons: 0,
            box_count: 0,
            total_ticks: 0,
        }
    }
}

impl fmt::Display for PerformanceMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f32() * 1000.0;
        write!(
            f,
            "{} boxes | {:.1} ticks/s | tick avg {:.2}ms (min {:.2}, max {:.2}) | \
             resize {:.3}ms integrate {:.3}ms detect {:.3}ms | {} pairs / {} tests",
            self.box_count,
            self.ticks_per_second,
            self.tick_time_ms,
            if self.total_ticks == 0 { 0.0 } else { self.min_tick_time_ms },
            self.max_tick_time_ms,
            ms(self.last_phases.resize),
            ms(self.last_phases.integrate),
            ms(self.last_phases.detect),
            self.pairs,
            self.comparisons,
        )
    }
}

/// Rolling tick-time monitor
pub struct PerformanceMonitor {
    /// Ring buffer of recent tick times for averaging
    tick_times: VecDeque<Duration>,
    max_samples: usize,
    current_metrics: PerformanceMetrics,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_config(120)
    }

    /// Monitor averaging over the last `max_samples` ticks
    pub fn with_config(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            tick_times: VecDeque::with_capacity(max_samples),
            max_samples,
            current_metrics: PerformanceMetrics::default(),
        }
    }

    /// Record one finished tick and refresh the metrics
    pub fn record_tick(&mut self, phases: PhaseTimings, stats: DetectionStats, box_count: usize) {
        if self.tick_times.len() >= self.max_samples {
            self.tick_times.pop_front();
        }
        self.tick_times.push_back(phases.total());

        let metrics = &mut self.current_metrics;
        metrics.last_phases = phases;
        metrics.pairs = stats.pairs;
        metrics.comparisons = stats.comparisons;
        metrics.box_count = box_count;
        metrics.total_ticks += 1;

        self.update_metrics();
    }

    fn update_metrics(&mut self) {
        if self.tick_times.is_empty() {
            return;
        }

        let total_time: Duration = self.tick_times.iter().sum();
        let avg_tick_time = total_time / self.tick_times.len() as u32;
        let avg_tick_time_ms = avg_tick_time.as_secs_f32() * 1000.0;

        self.current_metrics.tick_time_ms = avg_tick_time_ms;
        self.current_metrics.ticks_per_second = if avg_tick_time_ms > 0.0 {
            1000.0 / avg_tick_time_ms
        } else {
            0.0
        };

        if let (Some(min_time), Some(max_time)) =
            (self.tick_times.iter().min(), self.tick_times.iter().max())
        {
            self.current_metrics.min_tick_time_ms = min_time.as_secs_f32() * 1000.0;
            self.current_metrics.max_tick_time_ms = max_time.as_secs_f32() * 1000.0;
        }
    }

    pub fn get_metrics(&self) -> &PerformanceMetrics {
        &self.current_metrics
    }

    /// Tick times in milliseconds, oldest first
    pub fn get_tick_time_history(&self) -> Vec<f32> {
        self.tick_times
            .iter()
            .map(|duration| duration.as_secs_f32() * 1000.0)
            .collect()
    }

    /// Reset all metrics and history
    pub fn reset(&mut self) {
        self.tick_times.clear();
        self.current_metrics = PerformanceMetrics::default();
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases(detect_ms: u64) -> PhaseTimings {
        PhaseTimings {
            resize: Duration::ZERO,
            integrate: Duration::ZERO,
            detect: Duration::from_millis(detect_ms),
        }
    }

    #[test]
    fn test_window_tracks_min_max_and_average() {
        let mut monitor = PerformanceMonitor::with_config(3);
        for ms in [10, 20, 30] {
            monitor.record_tick(phases(ms), DetectionStats::default(), 5);
        }

        let metrics = monitor.get_metrics();
        assert!((metrics.tick_time_ms - 20.0).abs() < 1e-3);
        assert!((metrics.ticks_per_second - 50.0).abs() < 1e-2);
        assert!((metrics.min_tick_time_ms - 10.0).abs() < 1e-3);
        assert!((metrics.max_tick_time_ms - 30.0).abs() < 1e-3);
        assert_eq!(metrics.total_ticks, 3);
    }

    #[test]
    fn test_old_samples_fall_out_of_window() {
        let mut monitor = PerformanceMonitor::with_config(2);
        for ms in [100, 2, 4] {
            monitor.record_tick(phases(ms), DetectionStats::default(), 0);
        }

        assert_eq!(monitor.get_tick_time_history().len(), 2);
        assert!((monitor.get_metrics().max_tick_time_ms - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_last_tick_statistics_are_kept() {
        let mut monitor = PerformanceMonitor::new();
        let stats = DetectionStats {
            pairs: 7,
            comparisons: 45,
        };
        monitor.record_tick(phases(1), stats, 10);

        let metrics = monitor.get_metrics();
        assert_eq!(metrics.pairs, 7);
        assert_eq!(metrics.comparisons, 45);
        assert_eq!(metrics.box_count, 10);

        monitor.reset();
        assert_eq!(monitor.get_metrics().total_ticks, 0);
        assert!(monitor.get_tick_time_history().is_empty());
    }
}
