/// Session State: the only data that crosses a screen switch.
///
/// A flat string key/value record. Exploration writes the pre-battle
/// snapshot, the battle writes its result, exploration consumes the
/// result on its next load. Level completion wipes everything.
///
/// ## File format (`FileStore`):
///   One `key=value` per line, sorted by key. The whole file is
///   rewritten through a temp file + rename on every batch, so a
///   reader never sees half a batch.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::battle::BattleResult;
use crate::domain::entity::EnemyId;
use crate::domain::physics::Vec2;
use crate::error::SessionError;

pub mod keys {
    pub const PLAYER_HEALTH_BEFORE_BATTLE: &str = "playerHealthBeforeBattle";
    pub const ENEMY_TO_FIGHT: &str = "enemyToFight";
    pub const BATTLE_RESULT: &str = "battleResult";
    pub const DEFEATED_ENEMIES: &str = "defeatedEnemies";
    pub const PLAYER_RETURN_POSITION: &str = "playerReturnPosition";
    pub const PLAYER_HEALTH: &str = "playerHealth";
}

pub const SESSION_FILE: &str = "session.dat";

// ══════════════════════════════════════════════════════════════
// Storage
// ══════════════════════════════════════════════════════════════

pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply a batch of writes as one unit. `None` deletes the key.
    fn apply(&mut self, batch: &[(&str, Option<String>)]) -> Result<(), SessionError>;

    fn clear(&mut self) -> Result<(), SessionError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.apply(&[(key, Some(value.to_string()))])
    }
}

fn apply_to_map(map: &mut BTreeMap<String, String>, batch: &[(&str, Option<String>)]) {
    for (key, value) in batch {
        match value {
            Some(v) => {
                map.insert((*key).to_string(), v.clone());
            }
            None => {
                map.remove(*key);
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn apply(&mut self, batch: &[(&str, Option<String>)]) -> Result<(), SessionError> {
        apply_to_map(&mut self.entries, batch);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.entries.clear();
        Ok(())
    }
}

/// Session file on disk with an in-memory mirror.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the session file at `path`.
    /// A missing or unreadable file starts an empty session.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => parse_entries(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "session file unreadable, starting empty");
                BTreeMap::new()
            }
        };
        FileStore { path, entries }
    }

    pub fn in_dir(dir: &Path) -> Self {
        FileStore::open(dir.join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serialize_entries(entries))?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn apply(&mut self, batch: &[(&str, Option<String>)]) -> Result<(), SessionError> {
        let mut next = self.entries.clone();
        apply_to_map(&mut next, batch);
        self.write_file(&next)?;
        self.entries = next;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.entries.clear();
        Ok(())
    }
}

fn serialize_entries(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (k, v) in entries {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    out
}

fn parse_entries(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

// ══════════════════════════════════════════════════════════════
// Typed view
// ══════════════════════════════════════════════════════════════

/// Typed Session State. Absent or unparseable keys read as `None` / empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionState {
    pub player_health_before_battle: Option<i32>,
    pub enemy_to_fight: Option<EnemyId>,
    pub battle_result: Option<BattleResult>,
    pub defeated_enemies: BTreeSet<EnemyId>,
    pub player_return_position: Option<Vec2>,
    pub player_health: Option<i32>,
}

impl SessionState {
    pub fn load(store: &dyn SessionStore) -> Self {
        SessionState {
            player_health_before_battle: read_parsed(store, keys::PLAYER_HEALTH_BEFORE_BATTLE),
            enemy_to_fight: store
                .get(keys::ENEMY_TO_FIGHT)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .map(EnemyId::from_raw),
            battle_result: read_parsed(store, keys::BATTLE_RESULT),
            defeated_enemies: read_defeated(store),
            player_return_position: store
                .get(keys::PLAYER_RETURN_POSITION)
                .and_then(|raw| {
                    let pos = parse_position(&raw);
                    if pos.is_none() {
                        warn!(value = %raw, "ignoring malformed return position");
                    }
                    pos
                }),
            player_health: read_parsed(store, keys::PLAYER_HEALTH),
        }
    }

    /// Write every key in a single batch. `None` fields are deleted.
    pub fn save(&self, store: &mut dyn SessionStore) -> Result<(), SessionError> {
        let defeated: Vec<&EnemyId> = self.defeated_enemies.iter().collect();
        let defeated_json = serde_json::to_string(&defeated)
            .unwrap_or_else(|_| "[]".to_string());
        store.apply(&[
            (keys::PLAYER_HEALTH_BEFORE_BATTLE, self.player_health_before_battle.map(|h| h.to_string())),
            (keys::ENEMY_TO_FIGHT, self.enemy_to_fight.as_ref().map(|e| e.to_string())),
            (keys::BATTLE_RESULT, self.battle_result.map(|r| r.as_str().to_string())),
            (keys::DEFEATED_ENEMIES, Some(defeated_json)),
            (keys::PLAYER_RETURN_POSITION, self.player_return_position.map(format_position)),
            (keys::PLAYER_HEALTH, self.player_health.map(|h| h.to_string())),
        ])
    }

    pub fn is_defeated(&self, id: &EnemyId) -> bool {
        self.defeated_enemies.contains(id)
    }

    /// Returns false if the enemy was already recorded.
    pub fn mark_defeated(&mut self, id: EnemyId) -> bool {
        self.defeated_enemies.insert(id)
    }
}

fn read_parsed<T: std::str::FromStr>(store: &dyn SessionStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed session value");
            None
        }
    }
}

fn read_defeated(store: &dyn SessionStore) -> BTreeSet<EnemyId> {
    let Some(raw) = store.get(keys::DEFEATED_ENEMIES) else {
        return BTreeSet::new();
    };
    match serde_json::from_str::<Vec<EnemyId>>(&raw) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, "defeatedEnemies is not a JSON string array, treating as empty");
            BTreeSet::new()
        }
    }
}

fn format_position(p: Vec2) -> String {
    format!("{},{}", p.x, p.y)
}

fn parse_position(raw: &str) -> Option<Vec2> {
    let (x, y) = raw.split_once(',')?;
    let x: f32 = x.trim().parse().ok()?;
    let y: f32 = y.trim().parse().ok()?;
    if x.is_finite() && y.is_finite() {
        Some(Vec2::new(x, y))
    } else {
        None
    }
}

// ══════════════════════════════════════════════════════════════
// Screen hand-off operations
// ══════════════════════════════════════════════════════════════

/// What exploration needs to reconcile after a battle.
#[derive(Clone, Debug, PartialEq)]
pub struct BattleOutcome {
    pub result: BattleResult,
    pub enemy: Option<EnemyId>,
    pub health_before_battle: Option<i32>,
    pub return_position: Option<Vec2>,
}

/// Exploration side: snapshot the hero before switching to battle.
pub fn begin_battle(
    store: &mut dyn SessionStore,
    enemy: &EnemyId,
    hero_health: i32,
    return_position: Vec2,
) -> Result<(), SessionError> {
    let mut state = SessionState::load(store);
    state.player_health_before_battle = Some(hero_health);
    state.enemy_to_fight = Some(enemy.clone());
    state.player_return_position = Some(return_position);
    state.battle_result = None;
    state.save(store)?;
    debug!(enemy = %enemy, hero_health, "battle snapshot written");
    Ok(())
}

/// Battle side: write the result. A win also records the engaged enemy.
pub fn record_battle_result(
    store: &mut dyn SessionStore,
    result: BattleResult,
    hero_health: i32,
) -> Result<(), SessionError> {
    let mut state = SessionState::load(store);
    state.battle_result = Some(result);
    state.player_health = Some(hero_health);
    if result == BattleResult::Win {
        if let Some(enemy) = state.enemy_to_fight.clone() {
            state.mark_defeated(enemy);
        }
    }
    state.save(store)?;
    debug!(%result, hero_health, "battle result written");
    Ok(())
}

/// Read and delete the battle-scoped keys. Yields the outcome at most once.
/// `playerHealthBeforeBattle` and `playerHealth` are left in place.
pub fn consume_battle_outcome(store: &mut dyn SessionStore) -> Option<BattleOutcome> {
    let state = SessionState::load(store);
    let cleared = store.apply(&[
        (keys::BATTLE_RESULT, None),
        (keys::ENEMY_TO_FIGHT, None),
        (keys::PLAYER_RETURN_POSITION, None),
    ]);
    if let Err(e) = cleared {
        warn!(error = %e, "could not clear battle keys");
    }
    state.battle_result.map(|result| BattleOutcome {
        result,
        enemy: state.enemy_to_fight,
        health_before_battle: state.player_health_before_battle,
        return_position: state.player_return_position,
    })
}

/// Full reset on level completion.
pub fn reset(store: &mut dyn SessionStore) -> Result<(), SessionError> {
    store.clear()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enemy(id: &str) -> EnemyId {
        EnemyId::from_raw(id)
    }

    #[test]
    fn empty_store_reads_as_defaults() {
        let store = MemoryStore::new();
        assert_eq!(SessionState::load(&store), SessionState::default());
    }

    #[test]
    fn garbage_values_read_as_defaults() {
        let mut store = MemoryStore::new();
        store.set(keys::PLAYER_HEALTH_BEFORE_BATTLE, "lots").unwrap();
        store.set(keys::BATTLE_RESULT, "draw").unwrap();
        store.set(keys::DEFEATED_ENEMIES, "{not json").unwrap();
        store.set(keys::PLAYER_RETURN_POSITION, "12;40").unwrap();
        let s = SessionState::load(&store);
        assert_eq!(s.player_health_before_battle, None);
        assert_eq!(s.battle_result, None);
        assert!(s.defeated_enemies.is_empty());
        assert_eq!(s.player_return_position, None);
    }

    #[test]
    fn defeated_enemies_parse_from_json_array() {
        let mut store = MemoryStore::new();
        store.set(keys::DEFEATED_ENEMIES, r#"["enemy_3_2","enemy_9_2","enemy_3_2"]"#).unwrap();
        let s = SessionState::load(&store);
        assert_eq!(s.defeated_enemies.len(), 2);
        assert!(s.is_defeated(&enemy("enemy_3_2")));
    }

    #[test]
    fn save_then_load_is_identity() {
        let mut store = MemoryStore::new();
        let mut s = SessionState {
            player_health_before_battle: Some(55),
            enemy_to_fight: Some(enemy("enemy_4_9")),
            battle_result: Some(BattleResult::Fled),
            player_return_position: Some(Vec2::new(380.5, 180.0)),
            player_health: Some(55),
            ..SessionState::default()
        };
        s.mark_defeated(enemy("enemy_9_2"));
        s.save(&mut store).unwrap();
        assert_eq!(store.get(keys::PLAYER_RETURN_POSITION).as_deref(), Some("380.5,180"));
        assert_eq!(store.get(keys::DEFEATED_ENEMIES).as_deref(), Some(r#"["enemy_9_2"]"#));
        assert_eq!(SessionState::load(&store), s);
    }

    #[test]
    fn win_records_defeat_once() {
        let mut store = MemoryStore::new();
        let e = enemy("enemy_3_2");
        begin_battle(&mut store, &e, 80, Vec2::new(60.0, 60.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Win, 42).unwrap();
        begin_battle(&mut store, &e, 80, Vec2::new(60.0, 60.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Win, 42).unwrap();
        let s = SessionState::load(&store);
        assert_eq!(s.defeated_enemies.iter().collect::<Vec<_>>(), vec![&e]);
        assert_eq!(s.player_health, Some(42));
    }

    #[test]
    fn flee_and_lose_do_not_record_defeat() {
        let mut store = MemoryStore::new();
        let e = enemy("enemy_3_2");
        begin_battle(&mut store, &e, 80, Vec2::ZERO).unwrap();
        record_battle_result(&mut store, BattleResult::Fled, 80).unwrap();
        assert!(!SessionState::load(&store).is_defeated(&e));
        record_battle_result(&mut store, BattleResult::Lose, 0).unwrap();
        assert!(!SessionState::load(&store).is_defeated(&e));
    }

    #[test]
    fn outcome_is_consumed_exactly_once() {
        let mut store = MemoryStore::new();
        let e = enemy("enemy_4_9");
        begin_battle(&mut store, &e, 70, Vec2::new(100.0, 140.0)).unwrap();
        record_battle_result(&mut store, BattleResult::Fled, 70).unwrap();

        let first = consume_battle_outcome(&mut store);
        assert_eq!(first, Some(BattleOutcome {
            result: BattleResult::Fled,
            enemy: Some(e),
            health_before_battle: Some(70),
            return_position: Some(Vec2::new(100.0, 140.0)),
        }));
        assert_eq!(consume_battle_outcome(&mut store), None);
        assert_eq!(store.get(keys::ENEMY_TO_FIGHT), None);
        assert_eq!(store.get(keys::PLAYER_RETURN_POSITION), None);
        // Health snapshot survives consumption
        assert_eq!(store.get(keys::PLAYER_HEALTH_BEFORE_BATTLE).as_deref(), Some("70"));
    }

    #[test]
    fn begin_battle_discards_stale_result() {
        let mut store = MemoryStore::new();
        store.set(keys::BATTLE_RESULT, "win").unwrap();
        begin_battle(&mut store, &enemy("enemy_1_1"), 100, Vec2::ZERO).unwrap();
        assert_eq!(store.get(keys::BATTLE_RESULT), None);
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SESSION_FILE);
        {
            let mut store = FileStore::open(&path);
            begin_battle(&mut store, &enemy("enemy_13_14"), 64, Vec2::new(1.0, 2.0)).unwrap();
            record_battle_result(&mut store, BattleResult::Win, 31).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("battleResult=win\n"));
        assert!(text.contains("defeatedEnemies=[\"enemy_13_14\"]\n"));

        let mut reopened = FileStore::open(&path);
        let s = SessionState::load(&reopened);
        assert_eq!(s.battle_result, Some(BattleResult::Win));
        assert!(s.is_defeated(&enemy("enemy_13_14")));

        reset(&mut reopened).unwrap();
        assert!(!path.exists());
        assert_eq!(SessionState::load(&reopened), SessionState::default());
        // Clearing twice is fine
        reopened.clear().unwrap();
    }

    #[test]
    fn file_parser_skips_junk_lines() {
        let m = parse_entries("# comment\n\nbattleResult=lose\nnonsense\nplayerHealth=0\n");
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("battleResult").map(String::as_str), Some("lose"));
    }
}
