//! Runs only where a wgpu adapter is available; returns early otherwise.

use boxstorm::simulation::{
    ColliderManager, ComputeBridge, DetectionStrategy, SimulationConfig, WgpuBridge,
};
use cgmath::Vector3;

fn gpu_bridge() -> Option<WgpuBridge> {
    match WgpuBridge::new_headless() {
        Ok(bridge) => Some(bridge),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

#[test]
fn wgpu_kernel_finds_the_same_pairs_as_serial() {
    let Some(bridge) = gpu_bridge() else {
        return;
    };

    let mut serial = ColliderManager::with_seed(1, 1234).unwrap();
    let mut device = ColliderManager::with_seed(1, 1234).unwrap();
    device.attach_device(Box::new(bridge)).unwrap();

    let serial_config = SimulationConfig::new()
        .with_target_count(600)
        .with_strategy(DetectionStrategy::Serial);
    let device_config = serial_config.with_strategy(DetectionStrategy::Device);

    for _ in 0..30 {
        let a = serial.tick(&serial_config, 1.0 / 60.0).unwrap();
        let b = device.tick(&device_config, 1.0 / 60.0).unwrap();
        assert_eq!(a.stats, b.stats);
        assert_eq!(serial.last_pairs(), device.last_pairs());
    }
    assert_eq!(serial.boxes(), device.boxes());
}

#[test]
fn wgpu_pair_buffer_truncates_then_regrows() {
    let Some(mut bridge) = gpu_bridge() else {
        return;
    };

    // 40 boxes stacked on one spot: 780 overlapping pairs, 40 slots.
    let boxes: Vec<_> = (0..40)
        .map(|i| {
            boxstorm::simulation::BoxBody::new(
                Vector3::new(i as f32 * 0.001, 0.0, 0.0),
                1.0,
                Vector3::new(0.0, 0.0, 0.0),
            )
        })
        .collect();

    bridge.recreate_buffers(boxes.len()).unwrap();
    bridge.upload(&boxes).unwrap();
    bridge.dispatch(boxes.len()).unwrap();

    let mut pairs = Vec::new();
    let counters = bridge.read_back(&mut pairs).unwrap();
    assert_eq!(counters.pairs, 780);
    assert_eq!(counters.comparisons, 780);
    assert_eq!(pairs.len(), 40);
    assert!(pairs.iter().all(|p| p.index1 < p.index2 && p.index2 < 40));

    // Counters start from zero again on the next dispatch.
    bridge.dispatch(boxes.len()).unwrap();
    pairs.clear();
    assert_eq!(bridge.read_back(&mut pairs).unwrap().pairs, 780);

    // A larger pair buffer keeps the uploaded boxes and returns every pair.
    bridge.reserve_pairs(780).unwrap();
    assert_eq!(bridge.capacity(), 40);
    assert_eq!(bridge.pair_capacity(), 780);
    bridge.dispatch(boxes.len()).unwrap();
    pairs.clear();
    bridge.read_back(&mut pairs).unwrap();
    pairs.sort_unstable();
    pairs.dedup();
    assert_eq!(pairs.len(), 780);
}

#[test]
fn wgpu_device_resolves_overflowing_population_like_serial() {
    let Some(bridge) = gpu_bridge() else {
        return;
    };

    let mut serial = ColliderManager::with_seed(1, 42).unwrap();
    let mut device = ColliderManager::with_seed(1, 42).unwrap();
    device.attach_device(Box::new(bridge)).unwrap();

    let serial_config = SimulationConfig::new()
        .with_target_count(5000)
        .with_strategy(DetectionStrategy::Serial);
    let device_config = serial_config.with_strategy(DetectionStrategy::Device);

    let a = serial.tick(&serial_config, 1.0 / 60.0).unwrap();
    let b = device.tick(&device_config, 1.0 / 60.0).unwrap();
    assert!(a.stats.pairs > 5000);
    assert_eq!(a.stats, b.stats);
    assert_eq!(serial.last_pairs(), device.last_pairs());
    assert_eq!(serial.boxes(), device.boxes());
}

#[test]
fn empty_population_never_touches_the_device() {
    let Some(bridge) = gpu_bridge() else {
        return;
    };

    let mut manager = ColliderManager::with_seed(1, 1).unwrap();
    manager.attach_device(Box::new(bridge)).unwrap();
    let config = SimulationConfig::new()
        .with_target_count(0)
        .with_strategy(DetectionStrategy::Device);

    let report = manager.tick(&config, 0.016).unwrap();
    assert_eq!(report.stats.pairs, 0);
}
