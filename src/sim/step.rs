/// The step function: advances exploration by one tick.
///
/// Processing order:
///   1. Hero movement (input → collision rule)
///   2. Demon pursuit (each demon in spawn order, blocking the others)
///   3. Encounter check (hero/demon overlap → battle snapshot)
///   4. Exit check
///   5. Timer updates (grace period, message)
///
/// Outside `Playing` only the transition countdown runs.

use tracing::{debug, info, warn};

use crate::domain::physics::{Aabb, Vec2};
use crate::sim::session::{self, SessionStore};
use super::event::GameEvent;
use super::world::{ExploreState, Phase};

/// Input for one tick. `direction` is raw stick/keys, any length.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInput {
    pub direction: Vec2,
}

// ══════════════════════════════════════════════════════════════
// Main entry point
// ══════════════════════════════════════════════════════════════

pub fn step(
    world: &mut ExploreState,
    input: FrameInput,
    dt: f32,
    store: &mut dyn SessionStore,
) -> Vec<GameEvent> {
    let mut events: Vec<GameEvent> = Vec::new();
    let dt = dt.clamp(0.0, world.settings.max_dt);

    match world.phase {
        Phase::Playing => {}
        Phase::Transition => {
            resolve_transition(world, dt, &mut events);
            return events;
        }
        Phase::Fallen | Phase::LevelComplete => return events,
    }

    world.tick += 1;

    resolve_hero_movement(world, input, dt);
    resolve_enemy_movement(world, dt);
    if resolve_encounter(world, store, &mut events) { return events; }
    if resolve_exit(world, store, &mut events) { return events; }
    resolve_timers(world, dt);

    events
}

// ══════════════════════════════════════════════════════════════
// Movement
// ══════════════════════════════════════════════════════════════

fn resolve_hero_movement(world: &mut ExploreState, input: FrameInput, dt: f32) {
    world.hero.apply_input(input.direction, dt, &world.grid);
}

/// Demons move one at a time against the others' current boxes,
/// so two demons never end a tick stacked.
fn resolve_enemy_movement(world: &mut ExploreState, dt: f32) {
    let target = world.hero.pos;
    for i in 0..world.enemies.len() {
        let others: Vec<Aabb> = world.enemies.iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, e)| e.bounds())
            .collect();
        world.enemies[i].step(target, dt, &world.grid, &others);
    }
}

// ══════════════════════════════════════════════════════════════
// Encounter
// ══════════════════════════════════════════════════════════════

/// Fires at most once: the phase leaves `Playing` in the same call.
fn resolve_encounter(
    world: &mut ExploreState,
    store: &mut dyn SessionStore,
    events: &mut Vec<GameEvent>,
) -> bool {
    if world.grace_timer > 0.0 {
        return false;
    }
    let hero_box = world.hero.bounds();
    let Some(enemy) = world.enemies.iter().find(|e| e.bounds().overlaps(&hero_box)) else {
        return false;
    };
    let id = enemy.id.clone();

    if let Err(e) = session::begin_battle(store, &id, world.hero.health(), world.hero.pos) {
        warn!(error = %e, "could not write battle snapshot");
    }
    info!(enemy = %id, hero_health = world.hero.health(), tick = world.tick, "encounter");

    world.phase = Phase::Transition;
    world.transition_timer = world.settings.transition_secs;
    world.engaged = Some(id.clone());
    world.set_message("A demon blocks your path!", world.settings.transition_secs);
    events.push(GameEvent::EncounterStarted { enemy: id });
    true
}

fn resolve_transition(world: &mut ExploreState, dt: f32, events: &mut Vec<GameEvent>) {
    let Some(enemy) = world.engaged.clone() else { return };
    if world.transition_timer <= 0.0 {
        return;
    }
    world.transition_timer -= dt;
    if world.transition_timer <= 0.0 {
        world.transition_timer = 0.0;
        debug!(enemy = %enemy, "transition done");
        events.push(GameEvent::EnterBattle { enemy });
    }
}

// ══════════════════════════════════════════════════════════════
// Exit
// ══════════════════════════════════════════════════════════════

fn resolve_exit(
    world: &mut ExploreState,
    store: &mut dyn SessionStore,
    events: &mut Vec<GameEvent>,
) -> bool {
    let Some(exit) = world.grid.exit else { return false };
    if world.grid.cell_at(world.hero.pos) != Some((exit.row, exit.col)) {
        return false;
    }

    if !world.exit_unlocked {
        if world.message_timer <= 0.0 {
            let left = world.enemies.len();
            world.set_message(&format!("The gate is sealed. {} demon(s) still roam.", left), 2.0);
            events.push(GameEvent::ExitSealed);
        }
        return false;
    }

    if let Err(e) = session::reset(store) {
        warn!(error = %e, "could not clear session on level completion");
    }
    info!(level = %world.level_name, "level complete");
    world.phase = Phase::LevelComplete;
    events.push(GameEvent::LevelCompleted);
    true
}

// ══════════════════════════════════════════════════════════════
// Timers
// ══════════════════════════════════════════════════════════════

fn resolve_timers(world: &mut ExploreState, dt: f32) {
    if world.grace_timer > 0.0 {
        world.grace_timer = (world.grace_timer - dt).max(0.0);
    }
    if world.message_timer > 0.0 {
        world.message_timer -= dt;
        if world.message_timer <= 0.0 {
            world.message_timer = 0.0;
            world.message.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExploreConfig;
    use crate::domain::battle::BattleResult;
    use crate::domain::entity::EnemyId;
    use crate::sim::level::LevelDef;
    use crate::sim::session::{keys, record_battle_result, MemoryStore, SessionState};

    const DT: f32 = 1.0 / 30.0;

    fn level(rows: &[&str]) -> LevelDef {
        LevelDef { name: "Test".into(), rows: rows.iter().map(|s| s.to_string()).collect() }
    }

    fn corridor() -> LevelDef {
        level(&[
            "WWWWWWWWW",
            "WP.....EW",
            "WWWWWWWWW",
        ])
    }

    fn still() -> FrameInput {
        FrameInput::default()
    }

    fn right() -> FrameInput {
        FrameInput { direction: Vec2::new(1.0, 0.0) }
    }

    fn run_until_event(
        w: &mut ExploreState,
        store: &mut MemoryStore,
        input: FrameInput,
        max_ticks: usize,
    ) -> Vec<GameEvent> {
        for _ in 0..max_ticks {
            let ev = step(w, input, DT, store);
            if !ev.is_empty() {
                return ev;
            }
        }
        vec![]
    }

    #[test]
    fn hero_walks_and_stops_at_walls() {
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&level(&["WWWW", "WP.W", "WWWW"]), &ExploreConfig::default(), &mut store);
        for _ in 0..60 {
            step(&mut w, right(), DT, &mut store);
        }
        // Right edge flush with the wall at x = 120
        assert!((w.hero.bounds().max.x - 120.0).abs() < 1e-3);
        assert_eq!(w.hero.pos.y, 60.0);
    }

    #[test]
    fn encounter_fires_once_and_snapshots_state() {
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&corridor(), &ExploreConfig::default(), &mut store);
        w.hero.heal_to(77);

        let ev = run_until_event(&mut w, &mut store, right(), 300);
        assert_eq!(ev, vec![GameEvent::EncounterStarted { enemy: EnemyId::from_spawn(1, 7) }]);
        assert_eq!(w.phase, Phase::Transition);

        let s = SessionState::load(&store);
        assert_eq!(s.enemy_to_fight, Some(EnemyId::from_spawn(1, 7)));
        assert_eq!(s.player_health_before_battle, Some(77));
        assert!(s.player_return_position.is_some());

        // Frozen: further steps neither move actors nor re-fire the encounter
        let hero_before = w.hero.pos;
        let mut enter = 0;
        for _ in 0..100 {
            for e in step(&mut w, right(), DT, &mut store) {
                match e {
                    GameEvent::EnterBattle { .. } => enter += 1,
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
        assert_eq!(enter, 1);
        assert_eq!(w.hero.pos, hero_before);
    }

    #[test]
    fn enemies_pursue_the_hero() {
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&corridor(), &ExploreConfig::default(), &mut store);
        let x0 = w.enemies[0].pos.x;
        step(&mut w, still(), DT, &mut store);
        assert!(w.enemies[0].pos.x < x0);
    }

    #[test]
    fn grace_period_suppresses_encounters() {
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&corridor(), &ExploreConfig::default(), &mut store);
        w.grace_timer = 100.0;
        w.hero.pos = w.enemies[0].pos;
        assert!(step(&mut w, still(), DT, &mut store).is_empty());
        assert_eq!(w.phase, Phase::Playing);

        w.grace_timer = 0.0;
        let ev = step(&mut w, still(), DT, &mut store);
        assert!(matches!(ev.as_slice(), [GameEvent::EncounterStarted { .. }]));
    }

    #[test]
    fn sealed_exit_blocks_completion_until_demons_fall() {
        let rows = ["WWWWW", "WP.LW", "WWWWW", "WWWWE"];
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&level(&rows), &ExploreConfig::default(), &mut store);
        assert!(!w.exit_unlocked);
        let ev = run_until_event(&mut w, &mut store, right(), 120);
        assert_eq!(ev, vec![GameEvent::ExitSealed]);
        assert_eq!(w.phase, Phase::Playing);

        // Slay the demon through the session, then reload
        store.set(keys::DEFEATED_ENEMIES, r#"["enemy_3_4"]"#).unwrap();
        let mut w = ExploreState::load(&level(&rows), &ExploreConfig::default(), &mut store);
        assert!(w.exit_unlocked);
        let ev = run_until_event(&mut w, &mut store, right(), 120);
        assert_eq!(ev, vec![GameEvent::LevelCompleted]);
        assert_eq!(w.phase, Phase::LevelComplete);
    }

    #[test]
    fn level_completion_clears_the_session() {
        let mut store = MemoryStore::new();
        store.set(keys::DEFEATED_ENEMIES, r#"["enemy_9_9"]"#).unwrap();
        let mut w = ExploreState::load(&level(&["WWWWW", "WP.XW", "WWWWW"]), &ExploreConfig::default(), &mut store);
        let ev = run_until_event(&mut w, &mut store, right(), 120);
        assert_eq!(ev, vec![GameEvent::LevelCompleted]);
        assert_eq!(SessionState::load(&store), SessionState::default());
        assert!(step(&mut w, right(), DT, &mut store).is_empty());
    }

    #[test]
    fn huge_dt_is_capped() {
        let mut store = MemoryStore::new();
        let mut w = ExploreState::load(&level(&["WWWWWWWWWW", "WP.......W", "WWWWWWWWWW"]), &ExploreConfig::default(), &mut store);
        let x0 = w.hero.pos.x;
        step(&mut w, right(), 5.0, &mut store);
        // 180 px/s * 0.1 s
        assert!((w.hero.pos.x - x0 - 18.0).abs() < 1e-3);
    }

    #[test]
    fn fallen_hero_does_not_tick() {
        let mut store = MemoryStore::new();
        crate::sim::session::begin_battle(&mut store, &EnemyId::from_spawn(1, 7), 10, Vec2::ZERO).unwrap();
        record_battle_result(&mut store, BattleResult::Lose, 0).unwrap();
        let mut w = ExploreState::load(&corridor(), &ExploreConfig::default(), &mut store);
        assert_eq!(w.phase, Phase::Fallen);
        let e0 = w.enemies[0].pos;
        assert!(step(&mut w, right(), DT, &mut store).is_empty());
        assert_eq!(w.enemies[0].pos, e0);
    }
}
