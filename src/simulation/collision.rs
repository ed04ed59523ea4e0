//! Overlap predicate and impulse resolution shared by every strategy

use super::body::{BoxBody, CollisionPair};
use cgmath::{InnerSpace, Vector3, Zero};

/// Coefficient of restitution (0 = inelastic, 1 = elastic)
pub const RESTITUTION: f32 = 0.01;

/// Fraction of the impulse actually applied
pub const DAMPENING: f32 = 0.9;

/// Axis-aligned overlap test between two boxes
///
/// Strict on every axis: boxes that only touch do not collide.
#[inline]
pub fn overlaps(a: &BoxBody, b: &BoxBody) -> bool {
    let reach = a.radius() + b.radius();
    let [ax, ay, az, _] = a.position_radius;
    let [bx, by, bz, _] = b.position_radius;

    (ax - bx).abs() < reach && (ay - by).abs() < reach && (az - bz).abs() < reach
}

/// Apply an equal and opposite impulse along the line between centres
///
/// Returns `false` without touching either box when they are already moving
/// apart. Coincident centres produce a zero normal, so nothing changes.
pub fn resolve_collision(a: &mut BoxBody, b: &mut BoxBody) -> bool {
    let mut normal = a.position() - b.position();
    let length = normal.magnitude();
    if length > 0.0 {
        normal /= length;
    }

    let relative_velocity = a.velocity() - b.velocity();
    let impulse = relative_velocity.dot(normal);
    if impulse > 0.0 {
        return false;
    }

    let j = -(1.0 + RESTITUTION) * impulse * DAMPENING;
    let delta: Vector3<f32> = normal * j;
    if delta.is_zero() {
        return false;
    }

    a.set_velocity(a.velocity() + delta);
    b.set_velocity(b.velocity() - delta);
    true
}

/// Resolve a pair addressed by index into `boxes`
pub fn resolve_pair(boxes: &mut [BoxBody], pair: CollisionPair) -> bool {
    let (i, j) = pair.indices();
    debug_assert!(i < j, "collision pairs are ordered");

    let (head, tail) = boxes.split_at_mut(j);
    resolve_collision(&mut head[i], &mut tail[0])
}
