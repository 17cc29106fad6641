/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory, the CWD, or the
/// per-user data directory. Missing files and missing keys fall back to
/// defaults; a file that does not parse is reported and ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::battle::{BattleRules, DamageRoll};
use crate::domain::grid::DEFAULT_TILE_SIZE;
use crate::sim::taunt::RetryPolicy;

const APP_DIR: &str = "cursedpath";

pub const DEFAULT_TAUNT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-preview-09-2025:generateContent";

// ── Public Config Structs ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub tick_rate_ms: u64,
    pub explore: ExploreConfig,
    pub battle: BattleConfig,
    pub taunt: TauntConfig,
    pub gamepad: GamepadConfig,
    pub levels_dir: PathBuf,
    pub data_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ExploreConfig {
    pub tile_size: f32,
    pub hero_speed: f32,
    pub enemy_speed: f32,
    /// Collision box side as a fraction of the tile.
    pub hero_box_scale: f32,
    pub enemy_box_scale: f32,
    pub max_health: i32,
    pub encounter_grace_secs: f32,
    /// Pause between an encounter and the battle screen.
    pub transition_secs: f32,
    /// Largest dt a single tick may integrate.
    pub max_dt: f32,
}

impl ExploreConfig {
    pub fn hero_box(&self) -> f32 {
        self.tile_size * self.hero_box_scale
    }

    pub fn enemy_box(&self) -> f32 {
        self.tile_size * self.enemy_box_scale
    }
}

#[derive(Clone, Debug)]
pub struct BattleConfig {
    pub water: (i32, i32),
    pub thunder: (i32, i32),
    pub enemy_attack: (i32, i32),
    pub enemy_delay_secs: f32,
    pub enemy_max_health: i32,
    pub seed: Option<u64>,
}

impl BattleConfig {
    pub fn rules(&self, hero_max_health: i32) -> BattleRules {
        fn roll((lo, hi): (i32, i32)) -> DamageRoll {
            if lo == hi { DamageRoll::Fixed(lo) } else { DamageRoll::Range(lo.min(hi), lo.max(hi)) }
        }
        BattleRules {
            hero_max_health,
            enemy_max_health: self.enemy_max_health,
            water: roll(self.water),
            thunder: roll(self.thunder),
            enemy_attack: roll(self.enemy_attack),
            enemy_delay: self.enemy_delay_secs,
        }
    }

    /// Seeded when the config pins a seed, otherwise from OS entropy.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TauntConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TauntConfig {
    fn default() -> Self {
        TomlTaunt::default().into()
    }
}

impl Default for ExploreConfig {
    fn default() -> Self {
        TomlExplore::default().into()
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        TomlBattle::default().into()
    }
}

impl Default for GamepadConfig {
    fn default() -> Self {
        TomlGamepad::default().into()
    }
}

#[derive(Clone, Debug)]
pub struct GamepadConfig {
    pub attack: Vec<String>,
    pub skill: Vec<String>,
    pub flee: Vec<String>,
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    explore: TomlExplore,
    #[serde(default)]
    battle: TomlBattle,
    #[serde(default)]
    taunt: TomlTaunt,
    #[serde(default)]
    gamepad: TomlGamepad,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlExplore {
    #[serde(default = "default_tile_size")]
    tile_size: f32,
    #[serde(default = "default_hero_speed")]
    hero_speed: f32,
    #[serde(default = "default_enemy_speed")]
    enemy_speed: f32,
    #[serde(default = "default_box_scale")]
    hero_box_scale: f32,
    #[serde(default = "default_box_scale")]
    enemy_box_scale: f32,
    #[serde(default = "default_max_health")]
    max_health: i32,
    #[serde(default = "default_grace")]
    encounter_grace_secs: f32,
    #[serde(default = "default_transition")]
    transition_secs: f32,
    #[serde(default = "default_max_dt")]
    max_dt: f32,
}

#[derive(Deserialize, Debug)]
struct TomlBattle {
    #[serde(default = "default_water")]
    water: [i32; 2],
    #[serde(default = "default_thunder")]
    thunder: [i32; 2],
    #[serde(default = "default_enemy_attack")]
    enemy_attack: [i32; 2],
    #[serde(default = "default_enemy_delay")]
    enemy_delay_secs: f32,
    #[serde(default = "default_max_health")]
    enemy_max_health: i32,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct TomlTaunt {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_endpoint")]
    endpoint: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
}

#[derive(Deserialize, Debug)]
struct TomlGamepad {
    #[serde(default = "default_attack")]
    attack: Vec<String>,
    #[serde(default = "default_skill")]
    skill: Vec<String>,
    #[serde(default = "default_flee")]
    flee: Vec<String>,
    #[serde(default = "default_confirm")]
    confirm: Vec<String>,
    #[serde(default = "default_cancel")]
    cancel: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_tick_rate")]
    tick_rate_ms: u64,
    #[serde(default = "default_levels_dir")]
    levels_dir: String,
}

// ── Defaults ──

fn default_tick_rate() -> u64 { 33 }
fn default_tile_size() -> f32 { DEFAULT_TILE_SIZE }
fn default_hero_speed() -> f32 { 180.0 }
fn default_enemy_speed() -> f32 { 70.0 }
fn default_box_scale() -> f32 { 0.8 }
fn default_max_health() -> i32 { 100 }
fn default_grace() -> f32 { 2.0 }
fn default_transition() -> f32 { 0.6 }
fn default_max_dt() -> f32 { 0.1 }     // keeps a stalled frame from tunnelling through walls

fn default_water() -> [i32; 2] { [15, 25] }
fn default_thunder() -> [i32; 2] { [5, 40] }
fn default_enemy_attack() -> [i32; 2] { [10, 20] }
fn default_enemy_delay() -> f32 { 1.5 }

fn default_true() -> bool { true }
fn default_endpoint() -> String { DEFAULT_TAUNT_ENDPOINT.into() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".into() }
fn default_timeout_secs() -> u64 { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 16_000 }

fn default_attack() -> Vec<String> { vec!["A".into()] }
fn default_skill() -> Vec<String> { vec!["X".into(), "Y".into()] }
fn default_flee() -> Vec<String> { vec!["B".into()] }
fn default_confirm() -> Vec<String> { vec!["A".into(), "Start".into()] }
fn default_cancel() -> Vec<String> { vec!["Select".into()] }
fn default_levels_dir() -> String { "levels".into() }

impl Default for TomlExplore {
    fn default() -> Self {
        TomlExplore {
            tile_size: default_tile_size(),
            hero_speed: default_hero_speed(),
            enemy_speed: default_enemy_speed(),
            hero_box_scale: default_box_scale(),
            enemy_box_scale: default_box_scale(),
            max_health: default_max_health(),
            encounter_grace_secs: default_grace(),
            transition_secs: default_transition(),
            max_dt: default_max_dt(),
        }
    }
}

impl Default for TomlBattle {
    fn default() -> Self {
        TomlBattle {
            water: default_water(),
            thunder: default_thunder(),
            enemy_attack: default_enemy_attack(),
            enemy_delay_secs: default_enemy_delay(),
            enemy_max_health: default_max_health(),
            seed: None,
        }
    }
}

impl Default for TomlTaunt {
    fn default() -> Self {
        TomlTaunt {
            enabled: default_true(),
            endpoint: default_endpoint(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for TomlGamepad {
    fn default() -> Self {
        TomlGamepad {
            attack: default_attack(),
            skill: default_skill(),
            flee: default_flee(),
            confirm: default_confirm(),
            cancel: default_cancel(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            tick_rate_ms: default_tick_rate(),
            levels_dir: default_levels_dir(),
        }
    }
}

// ── Schema → public ──

impl From<TomlExplore> for ExploreConfig {
    fn from(t: TomlExplore) -> Self {
        ExploreConfig {
            tile_size: if t.tile_size > 0.0 { t.tile_size } else { default_tile_size() },
            hero_speed: t.hero_speed.max(0.0),
            enemy_speed: t.enemy_speed.max(0.0),
            hero_box_scale: t.hero_box_scale.clamp(0.1, 1.0),
            enemy_box_scale: t.enemy_box_scale.clamp(0.1, 1.0),
            max_health: t.max_health.max(1),
            encounter_grace_secs: t.encounter_grace_secs.max(0.0),
            transition_secs: t.transition_secs.max(0.0),
            max_dt: if t.max_dt > 0.0 { t.max_dt } else { default_max_dt() },
        }
    }
}

impl From<TomlBattle> for BattleConfig {
    fn from(t: TomlBattle) -> Self {
        BattleConfig {
            water: (t.water[0], t.water[1]),
            thunder: (t.thunder[0], t.thunder[1]),
            enemy_attack: (t.enemy_attack[0], t.enemy_attack[1]),
            enemy_delay_secs: t.enemy_delay_secs.max(0.0),
            enemy_max_health: t.enemy_max_health.max(1),
            seed: t.seed,
        }
    }
}

impl From<TomlTaunt> for TauntConfig {
    fn from(t: TomlTaunt) -> Self {
        TauntConfig {
            enabled: t.enabled,
            endpoint: t.endpoint,
            api_key: t.api_key,
            api_key_env: t.api_key_env,
            timeout: Duration::from_secs(t.timeout_secs),
            retry: RetryPolicy {
                max_attempts: t.max_attempts.max(1),
                base_delay: Duration::from_millis(t.base_delay_ms),
                max_delay: Duration::from_millis(t.max_delay_ms.max(t.base_delay_ms)),
            },
        }
    }
}

impl From<TomlGamepad> for GamepadConfig {
    fn from(t: TomlGamepad) -> Self {
        GamepadConfig {
            attack: t.attack,
            skill: t.skill,
            flee: t.flee,
            confirm: t.confirm,
            cancel: t.cancel,
        }
    }
}

// ── Loading ──

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig::from_toml(TomlConfig::default(), &[], PathBuf::from("."))
    }
}

impl GameConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) current working directory,
    /// (3) the per-user data directory.
    pub fn load(data_dir: PathBuf) -> Self {
        let search_dirs = candidate_dirs();
        let toml_cfg = load_toml(&search_dirs);
        GameConfig::from_toml(toml_cfg, &search_dirs, data_dir)
    }

    fn from_toml(toml_cfg: TomlConfig, search_dirs: &[PathBuf], data_dir: PathBuf) -> Self {
        // Resolve levels directory
        let levels_dir_str = &toml_cfg.general.levels_dir;
        let levels_dir = if Path::new(levels_dir_str).is_absolute() {
            PathBuf::from(levels_dir_str)
        } else {
            search_dirs.iter()
                .map(|d| d.join(levels_dir_str))
                .find(|p| p.is_dir())
                .unwrap_or_else(|| PathBuf::from(levels_dir_str))
        };

        GameConfig {
            tick_rate_ms: toml_cfg.general.tick_rate_ms.max(1),
            explore: toml_cfg.explore.into(),
            battle: toml_cfg.battle.into(),
            taunt: toml_cfg.taunt.into(),
            gamepad: toml_cfg.gamepad.into(),
            levels_dir,
            data_dir,
        }
    }
}

fn xdg_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".local/share").join(APP_DIR))
}

/// Candidate directories to search: exe dir + CWD + XDG data home (deduplicated).
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    if let Ok(exe) = std::env::current_exe() {
        // Resolve symlinks so an installed link still finds data next to the binary.
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    if let Some(xdg) = xdg_dir() {
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

/// Search for config.toml in candidate directories.
fn load_toml(search_dirs: &[PathBuf]) -> TomlConfig {
    for dir in search_dirs {
        let path = dir.join("config.toml");
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(text) => match toml::from_str::<TomlConfig>(&text) {
                    Ok(cfg) => {
                        info!(path = %path.display(), "loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "config.toml parse error, using defaults");
                        return TomlConfig::default();
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read config");
                }
            }
        }
    }
    TomlConfig::default()
}

/// Writable directory for the session file and the log.
/// (1) exe dir if writable, (2) XDG data home, (3) CWD.
pub fn data_dir() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            // System installs won't be writable
            let probe = parent.join(".write_test_cursedpath");
            if std::fs::write(&probe, "").is_ok() {
                let _ = std::fs::remove_file(&probe);
                return parent.to_path_buf();
            }
        }
    }

    if let Some(xdg) = xdg_dir() {
        if std::fs::create_dir_all(&xdg).is_ok() {
            return xdg;
        }
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
