/// ExploreState: the exploration screen.
///
/// Built from scratch on every switch back from battle. The only input
/// besides the level map is the Session State, which `load` reconciles:
/// defeated demons are dropped, the hero's health and position come back,
/// and a fresh battle result is consumed so it cannot apply twice.
///
/// ## Camera / Viewport
///
/// World cells and screen cells are separate:
///   - `camera` is a viewport into the grid (top-left cell + size)
///   - Renderer maps: `screen(sx, sy) = grid(camera.x + sx, camera.y + sy)`
///   - Camera follows the hero with a dead zone
///   - Maps smaller than the viewport are centered

use tracing::{info, warn};

use crate::config::ExploreConfig;
use crate::domain::battle::BattleResult;
use crate::domain::entity::{Enemy, EnemyId, Hero};
use crate::domain::grid::GridMap;
use crate::domain::physics;
use crate::sim::level::LevelDef;
use crate::sim::session::{self, SessionState, SessionStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Playing,
    /// Encounter fired; waiting out the transition before the battle screen.
    Transition,
    /// Hero is at 0 health after a lost battle.
    Fallen,
    LevelComplete,
}

/// Viewport into the grid, in cells.
#[derive(Clone, Debug, Default)]
pub struct Camera {
    /// Grid column of the left edge (negative when centering a narrow map)
    pub x: i32,
    /// Grid row of the top edge
    pub y: i32,
    pub view_w: usize,
    pub view_h: usize,
}

impl Camera {
    /// Scroll only when the target leaves the inner 60% of the view.
    pub fn follow(&mut self, target: (usize, usize), world_w: usize, world_h: usize) {
        if self.view_w == 0 || self.view_h == 0 { return; }
        self.x = follow_axis(self.x, target.0 as i32, self.view_w as i32, world_w as i32);
        self.y = follow_axis(self.y, target.1 as i32, self.view_h as i32, world_h as i32);
    }

    /// Snap straight onto the target. Used on load.
    pub fn center_on(&mut self, target: (usize, usize), world_w: usize, world_h: usize) {
        if self.view_w == 0 || self.view_h == 0 { return; }
        self.x = center_axis(target.0 as i32, self.view_w as i32, world_w as i32);
        self.y = center_axis(target.1 as i32, self.view_h as i32, world_h as i32);
    }

    /// Grid cell to viewport cell, if visible.
    pub fn world_to_view(&self, col: usize, row: usize) -> Option<(usize, usize)> {
        let vx = col as i32 - self.x;
        let vy = row as i32 - self.y;
        if vx >= 0 && vx < self.view_w as i32 && vy >= 0 && vy < self.view_h as i32 {
            Some((vx as usize, vy as usize))
        } else {
            None
        }
    }
}

fn follow_axis(origin: i32, target: i32, view: i32, world: i32) -> i32 {
    if world <= view {
        return -((view - world) / 2);
    }
    let margin = view / 5;
    let mut origin = origin;
    if target < origin + margin {
        origin = target - margin;
    } else if target > origin + view - margin - 1 {
        origin = target - view + margin + 1;
    }
    origin.clamp(0, world - view)
}

fn center_axis(target: i32, view: i32, world: i32) -> i32 {
    if world <= view {
        -((view - world) / 2)
    } else {
        (target - view / 2).clamp(0, world - view)
    }
}

pub struct ExploreState {
    pub grid: GridMap,
    pub level_name: String,
    pub hero: Hero,
    pub enemies: Vec<Enemy>,
    pub phase: Phase,
    pub camera: Camera,

    /// Demons on the map at load, live or not.
    pub total_enemies: usize,
    pub exit_unlocked: bool,
    /// Demon this screen handed off to battle, if any.
    pub engaged: Option<EnemyId>,

    // ── Timers (seconds) ──
    pub grace_timer: f32,
    pub transition_timer: f32,

    // ── UI ──
    pub message: String,
    pub message_timer: f32,
    pub paused: bool,
    pub anim_tick: u32,
    pub tick: u64,

    pub settings: ExploreConfig,
}

impl ExploreState {
    /// Build the screen for `level`, reconciling with the Session State.
    pub fn load(level: &LevelDef, settings: &ExploreConfig, store: &mut dyn SessionStore) -> Self {
        let grid = GridMap::load(&level.rows, settings.tile_size);
        let max_health = settings.max_health;

        let outcome = session::consume_battle_outcome(store);
        let mut state = SessionState::load(store);

        let mut grace_timer = 0.0;
        let mut message = String::new();
        let health = match &outcome {
            Some(o) => match o.result {
                BattleResult::Win => {
                    if let Some(enemy) = &o.enemy {
                        state.mark_defeated(enemy.clone());
                    }
                    message = "The demon is slain. Your wounds close.".into();
                    max_health
                }
                BattleResult::Fled => {
                    grace_timer = settings.encounter_grace_secs;
                    message = "You escaped... for now.".into();
                    o.health_before_battle.unwrap_or(max_health)
                }
                BattleResult::Lose => state.player_health.unwrap_or(0),
            },
            None => state.player_health.unwrap_or(max_health),
        };
        let health = health.clamp(0, max_health);

        state.player_health = Some(health);
        if let Err(e) = state.save(store) {
            warn!(error = %e, "could not persist reconciled session");
        }

        let hero_box = settings.hero_box();
        let start = grid.player_start_position();
        let pos = outcome
            .as_ref()
            .and_then(|o| o.return_position)
            .filter(|p| physics::box_fits(&grid, *p, hero_box))
            .unwrap_or(start);

        let mut hero = Hero::new(pos, hero_box, settings.hero_speed, max_health);
        hero.heal_to(health);

        let enemies: Vec<Enemy> = grid
            .enemy_spawns
            .iter()
            .filter(|s| !state.is_defeated(&s.id))
            .map(|s| Enemy::new(
                s.id.clone(),
                grid.cell_center(s.row, s.col),
                settings.enemy_box(),
                settings.enemy_speed,
            ))
            .collect();

        let total_enemies = grid.enemy_spawns.len();
        let exit_unlocked = match grid.exit {
            Some(exit) => !exit.locked || enemies.is_empty(),
            None => false,
        };
        let sealed_exit = grid.exit.map_or(false, |e| e.locked);
        if sealed_exit && exit_unlocked && total_enemies > 0
            && outcome.as_ref().map_or(false, |o| o.result == BattleResult::Win)
        {
            message = "The last demon falls. The sealed gate opens.".into();
        }

        let phase = if hero.is_defeated() {
            message = "You have fallen.".into();
            Phase::Fallen
        } else {
            Phase::Playing
        };

        info!(
            level = %level.name,
            walls = grid.walls.len(),
            health,
            live_enemies = enemies.len(),
            total_enemies,
            result = outcome.as_ref().map(|o| o.result.as_str()).unwrap_or("none"),
            "exploration loaded"
        );

        let message_timer = if message.is_empty() { 0.0 } else { 3.0 };
        let mut camera = Camera::default();
        if let Some(cell) = grid.cell_at(hero.pos) {
            camera.center_on((cell.1, cell.0), grid.width, grid.height);
        }

        ExploreState {
            level_name: level.name.clone(),
            grid,
            hero,
            enemies,
            phase,
            camera,
            total_enemies,
            exit_unlocked,
            engaged: None,
            grace_timer,
            transition_timer: 0.0,
            message,
            message_timer,
            paused: false,
            anim_tick: 0,
            tick: 0,
            settings: settings.clone(),
        }
    }

    /// Get back up after a lost battle: start cell, full health.
    /// Slain demons stay slain.
    pub fn revive(&mut self, store: &mut dyn SessionStore) {
        if self.phase != Phase::Fallen {
            return;
        }
        let max = self.settings.max_health;
        self.hero.pos = self.grid.player_start_position();
        self.hero.heal_to(max);
        self.grace_timer = self.settings.encounter_grace_secs;
        self.phase = Phase::Playing;
        self.set_message("You rise again.", 2.0);
        if let Err(e) = store.set(session::keys::PLAYER_HEALTH, &max.to_string()) {
            warn!(error = %e, "could not persist revived health");
        }
        info!("hero revived");
    }

    /// Hero's grid cell as `(col, row)`, for the camera.
    pub fn hero_cell(&self) -> Option<(usize, usize)> {
        self.grid.cell_at(self.hero.pos).map(|(r, c)| (c, r))
    }

    pub fn defeated_count(&self) -> usize {
        self.total_enemies - self.enemies.len()
    }

    pub fn set_message(&mut self, msg: &str, secs: f32) {
        self.message = msg.to_string();
        self.message_timer = secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::physics::Vec2;
    use crate::sim::session::{begin_battle, keys, record_battle_result, MemoryStore};

    fn level() -> LevelDef {
        LevelDef {
            name: "Test Grove".into(),
            rows: vec![
                "WWWWWWW".into(),
                "WP....W".into(),
                "W.WWW.W".into(),
                "W..E.LW".into(),
                "WWWWWWW".into(),
            ],
        }
    }

    fn settings() -> ExploreConfig {
        ExploreConfig::default()
    }

    #[test]
    fn fresh_session_spawns_everything_at_full_health() {
        let mut store = MemoryStore::new();
        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(w.phase, Phase::Playing);
        assert_eq!(w.hero.health(), 100);
        assert_eq!(w.hero.pos, w.grid.cell_center(1, 1));
        assert_eq!(w.enemies.len(), 1);
        assert_eq!(w.enemies[0].id.as_str(), "enemy_3_3");
        assert!(!w.exit_unlocked);
    }

    #[test]
    fn defeated_enemy_is_never_instantiated() {
        let mut store = MemoryStore::new();
        store.set(keys::DEFEATED_ENEMIES, r#"["enemy_3_3"]"#).unwrap();
        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert!(w.enemies.is_empty());
        assert_eq!(w.defeated_count(), 1);
        assert!(w.exit_unlocked);
    }

    #[test]
    fn win_marks_defeat_and_restores_health() {
        let mut store = MemoryStore::new();
        let e = EnemyId::from_spawn(3, 3);
        let back = Vec2::new(180.0, 60.0);
        begin_battle(&mut store, &e, 45, back).unwrap();
        record_battle_result(&mut store, BattleResult::Win, 12).unwrap();

        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert!(w.enemies.is_empty());
        assert_eq!(w.hero.health(), 100);
        assert_eq!(w.hero.pos, back);
        assert!(w.exit_unlocked);
        assert_eq!(store.get(keys::BATTLE_RESULT), None);
        assert_eq!(store.get(keys::PLAYER_HEALTH).as_deref(), Some("100"));
    }

    #[test]
    fn fled_restores_pre_battle_health_and_grants_grace() {
        let mut store = MemoryStore::new();
        let e = EnemyId::from_spawn(3, 3);
        begin_battle(&mut store, &e, 63, Vec2::new(100.0, 60.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Fled, 63).unwrap();

        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(w.hero.health(), 63);
        assert_eq!(w.enemies.len(), 1);
        assert!(w.grace_timer > 0.0);
        assert_eq!(w.phase, Phase::Playing);
    }

    #[test]
    fn result_applies_only_once() {
        let mut store = MemoryStore::new();
        let e = EnemyId::from_spawn(3, 3);
        begin_battle(&mut store, &e, 63, Vec2::new(100.0, 60.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Fled, 63).unwrap();
        let _ = ExploreState::load(&level(), &settings(), &mut store);
        let again = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(again.grace_timer, 0.0);
        assert_eq!(again.hero.health(), 63);
        // Return position was consumed with the result
        assert_eq!(again.hero.pos, again.grid.cell_center(1, 1));
    }

    #[test]
    fn lose_leaves_hero_fallen_until_revived() {
        let mut store = MemoryStore::new();
        let slain = EnemyId::from_raw("enemy_9_9");
        store.set(keys::DEFEATED_ENEMIES, r#"["enemy_9_9"]"#).unwrap();
        begin_battle(&mut store, &EnemyId::from_spawn(3, 3), 30, Vec2::new(100.0, 60.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Lose, 0).unwrap();

        let mut w = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(w.phase, Phase::Fallen);
        assert_eq!(w.hero.health(), 0);

        w.revive(&mut store);
        assert_eq!(w.phase, Phase::Playing);
        assert_eq!(w.hero.health(), 100);
        assert_eq!(w.hero.pos, w.grid.cell_center(1, 1));
        assert!(SessionState::load(&store).is_defeated(&slain));
        assert_eq!(store.get(keys::PLAYER_HEALTH).as_deref(), Some("100"));
    }

    #[test]
    fn return_position_inside_wall_falls_back_to_start() {
        let mut store = MemoryStore::new();
        begin_battle(&mut store, &EnemyId::from_spawn(3, 3), 80, Vec2::new(100.0, 100.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Fled, 80).unwrap();
        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(w.hero.pos, w.grid.cell_center(1, 1));
    }

    #[test]
    fn garbage_session_degrades_to_defaults() {
        let mut store = MemoryStore::new();
        store.set(keys::PLAYER_HEALTH, "many").unwrap();
        store.set(keys::DEFEATED_ENEMIES, "enemy_3_3").unwrap();
        store.set(keys::BATTLE_RESULT, "maybe").unwrap();
        let w = ExploreState::load(&level(), &settings(), &mut store);
        assert_eq!(w.hero.health(), 100);
        assert_eq!(w.enemies.len(), 1);
        assert_eq!(w.phase, Phase::Playing);
    }

    #[test]
    fn camera_centers_small_maps_and_clamps_large_ones() {
        let mut cam = Camera { x: 0, y: 0, view_w: 10, view_h: 10 };
        cam.follow((2, 2), 6, 4);
        assert_eq!((cam.x, cam.y), (-2, -3));

        let mut cam = Camera { x: 0, y: 0, view_w: 10, view_h: 10 };
        cam.follow((19, 0), 20, 20);
        assert_eq!(cam.x, 10);
        assert_eq!(cam.y, 0);
        assert_eq!(cam.world_to_view(19, 0), Some((9, 0)));
        assert_eq!(cam.world_to_view(3, 0), None);
    }
}
