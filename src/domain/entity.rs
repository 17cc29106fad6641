/// Entities: Hero, Enemy, and the health pool both battle sides share.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ai;
use super::grid::GridMap;
use super::physics::{self, Aabb, Vec2};

/// Stable enemy identity, derived from the spawn cell.
/// Reloading the same map always yields the same id for the same spawn,
/// which is what lets defeats persist across screen reloads.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyId(String);

impl EnemyId {
    pub fn from_spawn(row: usize, col: usize) -> Self {
        EnemyId(format!("enemy_{}_{}", row, col))
    }

    /// Wrap a persisted identity string as-is.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        EnemyId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single damage application.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Hit {
    pub dealt: i32,
    /// True only on the hit that brought health to 0.
    pub defeated_now: bool,
}

/// Health clamped to `[0, max]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Vitals {
    health: i32,
    max: i32,
}

impl Vitals {
    pub fn new(health: i32, max: i32) -> Self {
        let max = max.max(1);
        Vitals { health: health.clamp(0, max), max }
    }

    pub fn full(max: i32) -> Self {
        Vitals::new(max, max)
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_depleted(&self) -> bool {
        self.health == 0
    }

    /// Apply damage. Past zero this is a no-op that reports nothing new.
    pub fn take_damage(&mut self, amount: i32) -> Hit {
        if self.health == 0 {
            return Hit { dealt: 0, defeated_now: false };
        }
        let dealt = amount.max(0).min(self.health);
        self.health -= dealt;
        Hit { dealt, defeated_now: self.health == 0 }
    }

    pub fn set(&mut self, health: i32) {
        self.health = health.clamp(0, self.max);
    }
}

#[derive(Clone, Debug)]
pub struct Hero {
    pub pos: Vec2,
    pub vitals: Vitals,
    pub size: f32,
    pub speed: f32,
}

impl Hero {
    pub fn new(pos: Vec2, size: f32, speed: f32, max_health: i32) -> Self {
        Hero {
            pos,
            vitals: Vitals::full(max_health),
            size,
            speed,
        }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::centered(self.pos, self.size)
    }

    pub fn health(&self) -> i32 {
        self.vitals.health()
    }

    /// Move along `dir` for `dt` seconds. Diagonals are normalized so they
    /// are no faster than straight moves. Returns the applied displacement.
    pub fn apply_input(&mut self, dir: Vec2, dt: f32, grid: &GridMap) -> Vec2 {
        if dir.is_zero() {
            return Vec2::ZERO;
        }
        let wanted = if dir.length() > 1.0 { dir.normalized() } else { dir };
        let delta = wanted.scaled(self.speed * dt);
        let applied = physics::resolve_move(grid, self.pos, self.size, delta);
        self.pos = self.pos + applied;
        applied
    }

    /// Returns true exactly once: on the hit that reaches 0.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        self.vitals.take_damage(amount).defeated_now
    }

    pub fn heal_to(&mut self, health: i32) {
        self.vitals.set(health);
    }

    pub fn is_defeated(&self) -> bool {
        self.vitals.is_depleted()
    }
}

#[derive(Clone, Debug)]
pub struct Enemy {
    pub id: EnemyId,
    pub pos: Vec2,
    pub size: f32,
    pub speed: f32,
}

impl Enemy {
    pub fn new(id: EnemyId, pos: Vec2, size: f32, speed: f32) -> Self {
        Enemy { id, pos, size, speed }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::centered(self.pos, self.size)
    }

    /// One pursuit tick toward `target`. Walls and `others` block per axis.
    pub fn step(&mut self, target: Vec2, dt: f32, grid: &GridMap, others: &[Aabb]) -> Vec2 {
        let wanted = ai::pursuit_delta(self.pos, target, self.speed, dt);
        let applied = physics::resolve_move_among(grid, self.pos, self.size, wanted, others);
        self.pos = self.pos + applied;
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> GridMap {
        GridMap::load(&[
            "WWWWWW",
            "W....W",
            "W....W",
            "W....W",
            "WWWWWW",
        ], 40.0)
    }

    #[test]
    fn enemy_id_is_row_then_column() {
        assert_eq!(EnemyId::from_spawn(3, 2).as_str(), "enemy_3_2");
        assert_eq!(EnemyId::from_spawn(3, 2), EnemyId::from_raw("enemy_3_2"));
    }

    #[test]
    fn take_damage_signals_defeat_once() {
        let mut h = Hero::new(Vec2::ZERO, 32.0, 180.0, 100);
        assert!(!h.take_damage(60));
        assert!(h.take_damage(60));
        assert_eq!(h.health(), 0);
        assert!(!h.take_damage(10));
        assert!(!h.take_damage(1000));
        assert_eq!(h.health(), 0);
        assert!(h.is_defeated());
    }

    #[test]
    fn vitals_clamp_and_ignore_negative_damage() {
        let mut v = Vitals::new(250, 100);
        assert_eq!(v.health(), 100);
        assert_eq!(v.take_damage(-5).dealt, 0);
        assert_eq!(v.health(), 100);
        v.set(-3);
        assert_eq!(v.health(), 0);
    }

    #[test]
    fn diagonal_input_is_normalized() {
        let g = room();
        let mut h = Hero::new(g.cell_center(2, 2), 32.0, 100.0, 100);
        let applied = h.apply_input(Vec2::new(1.0, 1.0), 0.1, &g);
        assert!((applied.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn hero_slides_along_wall() {
        let g = room();
        // Flush against the top wall, pushing up-right
        let mut h = Hero::new(Vec2::new(100.0, 56.0), 32.0, 100.0, 100);
        let applied = h.apply_input(Vec2::new(1.0, -1.0), 0.1, &g);
        assert!(applied.x > 0.0);
        assert_eq!(applied.y, 0.0);
        assert_eq!(h.pos.y, 56.0);
    }

    #[test]
    fn enemy_moves_straight_toward_target() {
        let g = room();
        let start = g.cell_center(1, 1);
        let mut e = Enemy::new(EnemyId::from_spawn(1, 1), start, 32.0, 70.0);
        let target = g.cell_center(1, 4);
        e.step(target, 0.5, &g, &[]);
        assert!((e.pos.x - (start.x + 35.0)).abs() < 1e-3);
        assert_eq!(e.pos.y, start.y);
    }

    #[test]
    fn enemy_does_not_overshoot_target() {
        let g = room();
        let mut e = Enemy::new(EnemyId::from_spawn(1, 1), g.cell_center(1, 1), 32.0, 70.0);
        let target = Vec2::new(e.pos.x + 5.0, e.pos.y);
        e.step(target, 1.0, &g, &[]);
        assert_eq!(e.pos, target);
    }

    #[test]
    fn enemies_do_not_stack() {
        let g = room();
        let mut a = Enemy::new(EnemyId::from_spawn(2, 1), g.cell_center(2, 1), 32.0, 70.0);
        let b = Enemy::new(EnemyId::from_spawn(2, 2), g.cell_center(2, 2), 32.0, 70.0);
        a.step(g.cell_center(2, 4), 0.5, &g, &[b.bounds()]);
        assert!(!a.bounds().overlaps(&b.bounds()));
    }
}
