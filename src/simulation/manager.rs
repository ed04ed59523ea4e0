//! Collider manager: the per-tick pipeline
//!
//! Owns the population and every detection backend. Each [`tick`] reconciles
//! the population with the configured target, integrates motion, then runs
//! the selected detector, which resolves the pairs it finds.
//!
//! [`tick`]: ColliderManager::tick

use super::body::{BoxBody, CollisionPair};
use super::bridge::{ComputeBridge, DeviceDetector};
use super::config::{validate_delta_time, DetectionStrategy, SimulationConfig};
use super::cpu::{ParallelDetector, SerialDetector};
use super::error::{DeviceError, SimulationError};
use super::integrator::integrate;
use super::population::{Population, ResizeOutcome};
use super::traits::{BoxSource, CollisionDetector, DetectionStats};
use crate::performance::{PerformanceMetrics, PerformanceMonitor, PhaseTimings};
use crate::thread_pool::TaskPool;
use log::{debug, error, info, warn};
use std::time::Instant;

/// State of the device detection path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// No compute bridge attached
    Unavailable,
    /// Bridge attached and usable
    Ready,
    /// Disabled for the rest of the session
    Failed(String),
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub outcome: ResizeOutcome,
    pub strategy: DetectionStrategy,
    pub stats: DetectionStats,
    pub timings: PhaseTimings,
    pub box_count: usize,
}

pub struct ColliderManager {
    population: Population,
    serial: SerialDetector,
    parallel: ParallelDetector,
    device: Option<DeviceDetector>,
    device_failure: Option<String>,
    resolved: Vec<CollisionPair>,
    monitor: PerformanceMonitor,
}

impl ColliderManager {
    /// Manager with a pool of `thread_count` workers and an OS-seeded population
    pub fn new(thread_count: usize) -> Result<Self, SimulationError> {
        Ok(Self::from_parts(
            Population::new(),
            TaskPool::new(thread_count)?,
        ))
    }

    /// Manager whose spawned boxes are reproducible from `seed`
    pub fn with_seed(thread_count: usize, seed: u64) -> Result<Self, SimulationError> {
        Ok(Self::from_parts(
            Population::with_seed(seed),
            TaskPool::new(thread_count)?,
        ))
    }

    /// Manager with one worker per hardware thread
    pub fn with_hardware_concurrency() -> Result<Self, SimulationError> {
        Ok(Self::from_parts(
            Population::new(),
            TaskPool::with_hardware_concurrency()?,
        ))
    }

    pub fn from_parts(population: Population, pool: TaskPool) -> Self {
        debug!(
            "Collider manager created with {} boxes and {} workers",
            population.len(),
            pool.thread_count()
        );
        Self {
            population,
            serial: SerialDetector::new(),
            parallel: ParallelDetector::from_pool(pool),
            device: None,
            device_failure: None,
            resolved: Vec::new(),
            monitor: PerformanceMonitor::new(),
        }
    }

    /// Attach a compute bridge and size its buffers for the current population
    ///
    /// Replaces any previous bridge and clears an earlier failure.
    pub fn attach_device(&mut self, bridge: Box<dyn ComputeBridge>) -> Result<(), SimulationError> {
        let mut detector = DeviceDetector::new(bridge);
        self.device = None;
        self.device_failure = None;

        if let Err(err) = detector.resize(self.population.len()) {
            self.disable_device(&err);
            return Err(err.into());
        }

        info!("Device collision path ready on {}", detector.bridge_name());
        self.device = Some(detector);
        Ok(())
    }

    pub fn device_status(&self) -> DeviceStatus {
        match (&self.device_failure, &self.device) {
            (Some(reason), _) => DeviceStatus::Failed(reason.clone()),
            (None, Some(_)) => DeviceStatus::Ready,
            (None, None) => DeviceStatus::Unavailable,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(DeviceDetector::bridge_name)
    }

    fn disable_device(&mut self, err: &DeviceError) {
        error!("Device collision path disabled: {}", err);
        self.device = None;
        self.device_failure = Some(err.to_string());
    }

    fn ensure_device_ready(&self) -> Result<(), SimulationError> {
        if let Some(reason) = &self.device_failure {
            return Err(SimulationError::DeviceDisabled {
                reason: reason.clone(),
            });
        }
        if self.device.is_none() {
            return Err(SimulationError::DeviceUnavailable);
        }
        Ok(())
    }

    /// Reallocate device buffers after the population changed size
    fn resize_device(&mut self, strategy: DetectionStrategy) -> Result<(), SimulationError> {
        let result = match self.device.as_mut() {
            Some(device) => device.resize(self.population.len()),
            None => return Ok(()),
        };

        if let Err(err) = result {
            self.disable_device(&err);
            if strategy == DetectionStrategy::Device {
                return Err(err.into());
            }
            warn!("Continuing with the {} strategy", strategy);
        }
        Ok(())
    }

    /// Advance the simulation by `delta_time` seconds
    pub fn tick(
        &mut self,
        config: &SimulationConfig,
        delta_time: f32,
    ) -> Result<TickReport, SimulationError> {
        config.validate()?;
        validate_delta_time(delta_time)?;
        if config.strategy == DetectionStrategy::Device {
            self.ensure_device_ready()?;
        }

        let resize_start = Instant::now();
        let outcome = self
            .population
            .reconcile(config.target_count, &config.world, &config.spawn);
        if outcome.changed() {
            debug!("Population {:?}", outcome);
            self.resize_device(config.strategy)?;
        }
        let resize_time = resize_start.elapsed();

        let integrate_start = Instant::now();
        integrate(self.population.boxes_mut(), delta_time, &config.world);
        let integrate_time = integrate_start.elapsed();

        let detect_start = Instant::now();
        let boxes = self.population.boxes_mut();
        let resolved = &mut self.resolved;
        let detector: Option<&mut dyn CollisionDetector> = match config.strategy {
            DetectionStrategy::Serial => Some(&mut self.serial),
            DetectionStrategy::Parallel => Some(&mut self.parallel),
            DetectionStrategy::Device => self
                .device
                .as_mut()
                .map(|device| device as &mut dyn CollisionDetector),
        };
        let detected = match detector {
            Some(detector) => {
                debug_assert_eq!(detector.strategy(), config.strategy);
                detector.detect_and_resolve(boxes, resolved)
            }
            None => Err(SimulationError::DeviceUnavailable),
        };
        let detect_time = detect_start.elapsed();

        let stats = match detected {
            Ok(stats) => stats,
            Err(SimulationError::Device(err)) => {
                self.disable_device(&err);
                return Err(SimulationError::Device(err));
            }
            Err(err) => return Err(err),
        };

        let timings = PhaseTimings {
            resize: resize_time,
            integrate: integrate_time,
            detect: detect_time,
        };
        let box_count = self.population.len();
        self.monitor.record_tick(timings, stats, box_count);

        Ok(TickReport {
            outcome,
            strategy: config.strategy,
            stats,
            timings,
            box_count,
        })
    }

    /// Drop every box and the tick history; the device keeps its buffers
    pub fn reset(&mut self) {
        self.population.clear();
        self.resolved.clear();
        self.monitor.reset();
    }

    pub fn box_count(&self) -> usize {
        self.population.len()
    }

    pub fn get_box(&self, index: usize) -> Option<&BoxBody> {
        self.population.get(index)
    }

    pub fn boxes(&self) -> &[BoxBody] {
        self.population.boxes()
    }

    /// Pairs resolved by the last tick, in resolution order
    pub fn last_pairs(&self) -> &[CollisionPair] {
        &self.resolved
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        self.monitor.get_metrics()
    }

    pub fn thread_count(&self) -> usize {
        self.parallel.thread_count()
    }
}

impl BoxSource for ColliderManager {
    fn box_count(&self) -> usize {
        self.population.len()
    }

    fn get_box(&self, index: usize) -> Option<&BoxBody> {
        self.population.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::bridge::{DeviceCounters, SoftwareBridge};
    use crate::simulation::config::{SpawnSettings, WorldBounds};

    /// Bridge that fails on the first allocation
    struct BrokenBridge;

    impl ComputeBridge for BrokenBridge {
        fn name(&self) -> &str {
            "broken"
        }

        fn capacity(&self) -> usize {
            0
        }

        fn pair_capacity(&self) -> usize {
            0
        }

        fn recreate_buffers(&mut self, _max_boxes: usize) -> Result<(), DeviceError> {
            Err(DeviceError::BufferAllocation("out of device memory".to_string()))
        }

        fn reserve_pairs(&mut self, _max_pairs: usize) -> Result<(), DeviceError> {
            Err(DeviceError::BufferAllocation("out of device memory".to_string()))
        }

        fn upload(&mut self, _boxes: &[BoxBody]) -> Result<(), DeviceError> {
            unreachable!("never allocated")
        }

        fn dispatch(&mut self, _box_count: usize) -> Result<(), DeviceError> {
            unreachable!("never allocated")
        }

        fn read_back(&mut self, _pairs: &mut Vec<CollisionPair>) -> Result<DeviceCounters, DeviceError> {
            unreachable!("never allocated")
        }
    }

    fn config(count: usize, strategy: DetectionStrategy) -> SimulationConfig {
        SimulationConfig::new()
            .with_target_count(count)
            .with_strategy(strategy)
    }

    #[test]
    fn test_shrink_keeps_leading_boxes() {
        let mut manager = ColliderManager::with_seed(2, 11).unwrap();
        manager.tick(&config(100, DetectionStrategy::Serial), 0.0).unwrap();
        let before: Vec<BoxBody> = manager.boxes()[..50].to_vec();

        // dt = 0, so positions do not move.
        let report = manager
            .tick(&config(50, DetectionStrategy::Serial), 0.0)
            .unwrap();

        assert_eq!(report.outcome, ResizeOutcome::Shrunk { from: 100, to: 50 });
        assert_eq!(manager.box_count(), 50);
        for (i, body) in before.iter().enumerate() {
            assert_eq!(manager.get_box(i).unwrap().position(), body.position());
        }
    }

    #[test]
    fn test_device_strategy_without_bridge_fails() {
        let mut manager = ColliderManager::with_seed(1, 3).unwrap();
        let result = manager.tick(&config(10, DetectionStrategy::Device), 0.016);

        assert!(matches!(result, Err(SimulationError::DeviceUnavailable)));
        assert_eq!(manager.device_status(), DeviceStatus::Unavailable);
        // Rejected before the population was touched.
        assert_eq!(manager.box_count(), 0);
        assert_eq!(manager.metrics().total_ticks, 0);
    }

    #[test]
    fn test_rejected_device_tick_leaves_population_alone() {
        let mut manager = ColliderManager::with_seed(1, 8).unwrap();
        manager.tick(&config(20, DetectionStrategy::Serial), 0.0).unwrap();
        let before = manager.boxes().to_vec();

        assert!(manager.attach_device(Box::new(BrokenBridge)).is_err());
        let result = manager.tick(&config(40, DetectionStrategy::Device), 0.016);

        assert!(matches!(result, Err(SimulationError::DeviceDisabled { .. })));
        assert_eq!(manager.boxes(), before.as_slice());
    }

    #[test]
    fn test_device_resolves_overflowing_pairs_like_serial() {
        // 5000 default spawns overlap far more often than once per box.
        let mut serial = ColliderManager::with_seed(1, 42).unwrap();
        let mut device = ColliderManager::with_seed(1, 42).unwrap();
        device
            .attach_device(Box::new(SoftwareBridge::new()))
            .unwrap();

        let a = serial
            .tick(&config(5000, DetectionStrategy::Serial), 1.0 / 60.0)
            .unwrap();
        let b = device
            .tick(&config(5000, DetectionStrategy::Device), 1.0 / 60.0)
            .unwrap();

        assert!(a.stats.pairs > 5000, "population must overflow one slot per box");
        assert_eq!(a.stats.pairs, b.stats.pairs);
        assert_eq!(serial.last_pairs(), device.last_pairs());
        assert_eq!(serial.boxes(), device.boxes());
        assert_eq!(device.device_status(), DeviceStatus::Ready);
    }

    #[test]
    fn test_custom_world_and_spawn_shape_new_boxes() {
        let spawn = SpawnSettings {
            height: 4.0,
            radius: 0.5,
            max_speed: 0.0,
        };
        let world = WorldBounds {
            min_x: -12.0,
            max_x: -2.0,
            ..WorldBounds::default()
        };
        let config = config(50, DetectionStrategy::Serial)
            .with_world(world)
            .with_spawn(spawn)
            .with_gravity(0.0);

        let mut manager = ColliderManager::with_seed(1, 4).unwrap();
        manager.tick(&config, 0.0).unwrap();

        for body in manager.boxes() {
            let position = body.position();
            assert!(position.x >= world.min_x && position.x < world.max_x);
            assert!(position.y >= 4.0 && position.y < 5.0);
            assert_eq!(body.radius(), 0.5);
            assert_eq!(body.velocity().x, 0.0);
        }
    }

    #[test]
    fn test_write_instances_follows_box_order() {
        let mut manager = ColliderManager::with_seed(2, 13).unwrap();
        manager.tick(&config(64, DetectionStrategy::Parallel), 0.016).unwrap();

        let mut instances = vec![BoxBody::default().instance(); 3];
        manager.write_instances(&mut instances);

        assert_eq!(instances.len(), manager.box_count());
        for (i, instance) in instances.iter().enumerate() {
            let body = manager.get_box(i).unwrap();
            let position = body.position();
            assert_eq!(instance.position, [position.x, position.y, position.z]);
            assert_eq!(instance.scale, body.radius());
        }
    }

    #[test]
    fn test_software_device_matches_serial_over_many_ticks() {
        let mut serial = ColliderManager::with_seed(2, 99).unwrap();
        let mut device = ColliderManager::with_seed(2, 99).unwrap();
        device
            .attach_device(Box::new(SoftwareBridge::new()))
            .unwrap();
        assert_eq!(device.device_status(), DeviceStatus::Ready);

        let serial_config = config(300, DetectionStrategy::Serial);
        let device_config = config(300, DetectionStrategy::Device);
        for _ in 0..60 {
            let a = serial.tick(&serial_config, 0.016).unwrap();
            let b = device.tick(&device_config, 0.016).unwrap();
            assert_eq!(a.stats.pairs, b.stats.pairs);
            assert_eq!(serial.last_pairs(), device.last_pairs());
        }
        assert_eq!(serial.boxes(), device.boxes());
    }

    #[test]
    fn test_parallel_matches_serial_over_many_ticks() {
        let mut serial = ColliderManager::with_seed(1, 5).unwrap();
        let mut parallel = ColliderManager::with_seed(4, 5).unwrap();

        for _ in 0..60 {
            serial
                .tick(&config(250, DetectionStrategy::Serial), 0.016)
                .unwrap();
            parallel
                .tick(&config(250, DetectionStrategy::Parallel), 0.016)
                .unwrap();
        }
        assert_eq!(serial.boxes(), parallel.boxes());
    }

    #[test]
    fn test_failed_device_stays_disabled() {
        let mut manager = ColliderManager::with_seed(1, 8).unwrap();
        manager.tick(&config(20, DetectionStrategy::Serial), 0.0).unwrap();

        assert!(manager.attach_device(Box::new(BrokenBridge)).is_err());
        assert!(matches!(manager.device_status(), DeviceStatus::Failed(_)));

        let result = manager.tick(&config(20, DetectionStrategy::Device), 0.016);
        assert!(matches!(result, Err(SimulationError::DeviceDisabled { .. })));

        // CPU strategies are unaffected.
        assert!(manager
            .tick(&config(20, DetectionStrategy::Parallel), 0.016)
            .is_ok());
    }

    #[test]
    fn test_out_of_range_lookup_is_none() {
        let mut manager = ColliderManager::with_seed(1, 2).unwrap();
        manager.tick(&config(5, DetectionStrategy::Serial), 0.0).unwrap();

        assert!(manager.get_box(4).is_some());
        assert!(manager.get_box(5).is_none());
        assert_eq!(BoxSource::box_count(&manager), 5);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_any_work() {
        let mut manager = ColliderManager::with_seed(1, 2).unwrap();
        let too_many = config(crate::simulation::config::MAX_BOXES + 1, DetectionStrategy::Serial);

        assert!(matches!(manager.tick(&too_many, 0.016), Err(SimulationError::Config(_))));
        assert!(matches!(
            manager.tick(&config(10, DetectionStrategy::Serial), f32::NAN),
            Err(SimulationError::Config(_))
        ));
        assert_eq!(manager.box_count(), 0);
    }

    #[test]
    fn test_reset_clears_population_and_metrics() {
        let mut manager = ColliderManager::with_seed(1, 2).unwrap();
        manager.tick(&config(30, DetectionStrategy::Serial), 0.016).unwrap();
        assert_eq!(manager.metrics().total_ticks, 1);

        manager.reset();
        assert_eq!(manager.box_count(), 0);
        assert_eq!(manager.metrics().total_ticks, 0);
        assert!(manager.last_pairs().is_empty());
    }
}
