//! Box and collision pair records
//!
//! Both types are `#[repr(C)]` and `Pod` so the host array can be copied to a
//! compute device byte for byte.

use cgmath::Vector3;

/// A simulated axis-aligned box
///
/// `position_radius` packs the center in `xyz` and the half-extent in `w`.
/// `velocity` only uses `xyz`; `w` is padding that keeps the record 32 bytes
/// and 16-byte aligned on the device side.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoxBody {
    pub position_radius: [f32; 4],
    pub velocity: [f32; 4],
}

impl BoxBody {
    pub fn new(position: Vector3<f32>, radius: f32, velocity: Vector3<f32>) -> Self {
        Self {
            position_radius: [position.x, position.y, position.z, radius],
            velocity: [velocity.x, velocity.y, velocity.z, 0.0],
        }
    }

    pub fn position(&self) -> Vector3<f32> {
        let [x, y, z, _] = self.position_radius;
        Vector3::new(x, y, z)
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position_radius[0] = position.x;
        self.position_radius[1] = position.y;
        self.position_radius[2] = position.z;
    }

    /// Half-extent on every axis
    pub fn radius(&self) -> f32 {
        self.position_radius[3]
    }

    pub fn velocity(&self) -> Vector3<f32> {
        let [x, y, z, _] = self.velocity;
        Vector3::new(x, y, z)
    }

    pub fn set_velocity(&mut self, velocity: Vector3<f32>) {
        self.velocity[0] = velocity.x;
        self.velocity[1] = velocity.y;
        self.velocity[2] = velocity.z;
    }

    /// Position and uniform scale for the renderer
    pub fn instance(&self) -> BoxInstance {
        let [x, y, z, scale] = self.position_radius;
        BoxInstance {
            position: [x, y, z],
            scale,
        }
    }
}

/// Indices of two overlapping boxes, always with `index1 < index2`
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct CollisionPair {
    pub index1: u32,
    pub index2: u32,
}

impl CollisionPair {
    /// Build a pair from two distinct indices in either order
    pub fn new(a: u32, b: u32) -> Self {
        debug_assert_ne!(a, b, "a box cannot collide with itself");
        Self {
            index1: a.min(b),
            index2: a.max(b),
        }
    }

    pub fn indices(&self) -> (usize, usize) {
        (self.index1 as usize, self.index2 as usize)
    }
}

/// Per-box instance data consumed by an instanced renderer
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoxInstance {
    pub position: [f32; 3],
    pub scale: f32,
}
