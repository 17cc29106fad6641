/// Enemy AI: straight-line pursuit.
///
/// Each tick an enemy heads directly at its target at a fixed speed.
/// No pathfinding and no obstacle avoidance; walls simply stop the
/// blocked axis (see `physics::resolve_move_among`).

use super::physics::Vec2;

/// Displacement for one pursuit tick. Never overshoots the target.
pub fn pursuit_delta(from: Vec2, to: Vec2, speed: f32, dt: f32) -> Vec2 {
    let offset = to - from;
    let dist = offset.length();
    let step = speed * dt;
    if dist <= step {
        offset
    } else {
        offset.normalized().scaled(step)
    }
}
