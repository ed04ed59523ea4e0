//! Explicit Euler motion integration with floor and wall response

use super::body::BoxBody;
use super::config::WorldBounds;

/// Fraction of vertical speed kept after bouncing off the floor
pub const FLOOR_RESTITUTION: f32 = 0.7;

/// Advance every box by `delta_time`
///
/// Runs on the calling thread: the pass is O(n) and each box is independent.
pub fn integrate(boxes: &mut [BoxBody], delta_time: f32, world: &WorldBounds) {
    for body in boxes.iter_mut() {
        integrate_box(body, delta_time, world);
    }
}

/// Advance a single box by `delta_time` and apply boundary response
pub fn integrate_box(body: &mut BoxBody, delta_time: f32, world: &WorldBounds) {
    let mut velocity = body.velocity();
    velocity.y += world.gravity * delta_time;

    let mut position = body.position() + velocity * delta_time;
    let radius = body.radius();

    if position.y - radius < world.floor_y {
        position.y = world.floor_y + radius;
        velocity.y = -velocity.y * FLOOR_RESTITUTION;
    }

    // Walls reflect velocity only; the position is left where it ended up.
    if position.x - radius < world.min_x || position.x + radius > world.max_x {
        velocity.x = -velocity.x;
    }
    if position.z - radius < world.min_z || position.z + radius > world.max_z {
        velocity.z = -velocity.z;
    }

    body.set_position(position);
    body.set_velocity(velocity);
}
