/// Entry point and game loop.
///
/// Only one screen is alive at a time. Switching screens drops the old one
/// and builds the new one from the Session State alone.

mod config;
mod domain;
mod error;
mod sim;
mod ui;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::GameConfig;
use domain::battle::{AttackStyle, BattleResult};
use domain::physics::Vec2;
use sim::battle::BattleScreen;
use sim::event::GameEvent;
use sim::level::{load_levels, LevelDef};
use sim::session::{self, FileStore, SessionStore};
use sim::step::{self, FrameInput};
use sim::taunt;
use sim::world::{ExploreState, Phase};
use ui::gamepad::GamepadState;
use ui::input::InputState;
use ui::renderer::{Renderer, View};

const FRAME_SLEEP: Duration = Duration::from_millis(5);
const LOG_FILE: &str = "cursedpath.log";

fn main() {
    let data_dir = config::data_dir();
    init_tracing(&data_dir);

    let config = GameConfig::load(data_dir);
    let levels = load_levels(&config);

    // A launch is a fresh run: nothing carries over from the previous one.
    let mut store = FileStore::in_dir(&config.data_dir);
    if let Err(e) = session::reset(&mut store) {
        warn!(error = %e, path = %store.path().display(), "could not clear old session");
    }
    info!(levels = levels.len(), data_dir = %config.data_dir.display(), "starting");

    let mut app = App::new(config, Box::new(store), levels);
    let mut renderer = Renderer::new();

    if let Err(e) = renderer.init() {
        eprintln!("Terminal init failed: {e}");
        return;
    }

    let result = game_loop(&mut app, &mut renderer);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }

    if let Err(e) = result {
        eprintln!("Game error: {e}");
    }

    println!();
    println!("The cursed path falls quiet.");
    println!("Demons slain this run: {}", app.slain);
}

/// Log to a file; the terminal is in raw mode while the game runs.
fn init_tracing(data_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let path = data_dir.join(LOG_FILE);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .compact()
            .init(),
        Err(e) => eprintln!("Logging disabled, cannot open {}: {e}", path.display()),
    }
}

fn game_loop(app: &mut App, renderer: &mut Renderer) -> Result<(), Box<dyn std::error::Error>> {
    let mut kb = InputState::new();
    let mut gp = GamepadState::new(&app.config.gamepad);
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(app.config.tick_rate_ms);

    loop {
        kb.drain_events();
        gp.update();

        if kb.quit_pressed() || gp.cancel_pressed() {
            break;
        }
        app.handle_actions(&actions(&kb, &gp));

        if last_tick.elapsed() >= tick_rate {
            let dt = last_tick.elapsed().as_secs_f32();
            last_tick = Instant::now();
            app.tick(dt, movement(&kb, &gp));
        }

        renderer.render(app.view())?;
        std::thread::sleep(FRAME_SLEEP);
    }

    Ok(())
}

/// Edge-triggered actions for one frame, keyboard and pad merged.
#[derive(Clone, Copy, Debug, Default)]
struct Actions {
    water: bool,
    thunder: bool,
    flee: bool,
    confirm: bool,
    pause: bool,
}

fn actions(kb: &InputState, gp: &GamepadState) -> Actions {
    Actions {
        water: kb.water_pressed() || gp.attack_pressed(),
        thunder: kb.thunder_pressed() || gp.skill_pressed(),
        flee: kb.flee_pressed() || gp.flee_pressed(),
        confirm: kb.confirm_pressed() || gp.confirm_pressed(),
        pause: kb.pause_pressed(),
    }
}

/// Keyboard wins when both devices push.
fn movement(kb: &InputState, gp: &GamepadState) -> Vec2 {
    let keys = kb.direction();
    if keys.is_zero() { gp.direction() } else { keys }
}

enum Screen {
    Explore(ExploreState),
    Battle(BattleScreen),
    Complete,
}

/// Where to go after this frame.
enum Switch {
    Explore,
    Battle,
    NextLevel,
}

struct App {
    config: GameConfig,
    store: Box<dyn SessionStore>,
    levels: Vec<LevelDef>,
    level_index: usize,
    screen: Screen,
    slain: usize,
}

impl App {
    fn new(config: GameConfig, store: Box<dyn SessionStore>, levels: Vec<LevelDef>) -> Self {
        let mut app = App {
            config,
            store,
            levels,
            level_index: 0,
            screen: Screen::Complete,
            slain: 0,
        };
        app.enter_explore();
        app
    }

    fn view(&mut self) -> View<'_> {
        match &mut self.screen {
            Screen::Explore(w) => View::Explore(w),
            Screen::Battle(b) => View::Battle(b),
            Screen::Complete => View::Complete { levels: self.levels.len() },
        }
    }

    fn handle_actions(&mut self, act: &Actions) {
        let mut switch = None;
        match &mut self.screen {
            Screen::Explore(w) => {
                if act.pause && matches!(w.phase, Phase::Playing) {
                    w.paused = !w.paused;
                }
                if act.confirm && !w.paused {
                    match w.phase {
                        Phase::Fallen => w.revive(self.store.as_mut()),
                        Phase::LevelComplete => switch = Some(Switch::NextLevel),
                        Phase::Playing | Phase::Transition => {}
                    }
                }
            }
            Screen::Battle(b) => {
                if b.result().is_some() {
                    if act.confirm {
                        switch = Some(Switch::Explore);
                    }
                } else if act.water {
                    b.attack(AttackStyle::Water, self.store.as_mut());
                } else if act.thunder {
                    b.attack(AttackStyle::Thunder, self.store.as_mut());
                } else if act.flee {
                    b.flee(self.store.as_mut());
                }
            }
            Screen::Complete => {}
        }
        if let Some(s) = switch {
            self.apply(s);
        }
    }

    fn tick(&mut self, dt: f32, direction: Vec2) {
        let mut switch = None;
        match &mut self.screen {
            Screen::Explore(w) => {
                w.anim_tick = w.anim_tick.wrapping_add(1);
                if w.paused {
                    return;
                }
                for event in step::step(w, FrameInput { direction }, dt, self.store.as_mut()) {
                    debug!(?event, "explore event");
                    if let GameEvent::EnterBattle { .. } = event {
                        switch = Some(Switch::Battle);
                    }
                }
            }
            Screen::Battle(b) => {
                b.tick(dt, self.store.as_mut());
                // Fleeing drops straight back into exploration
                if b.result() == Some(BattleResult::Fled) {
                    switch = Some(Switch::Explore);
                }
            }
            Screen::Complete => {}
        }
        if let Some(s) = switch {
            self.apply(s);
        }
    }

    fn apply(&mut self, switch: Switch) {
        match switch {
            Switch::Explore => self.enter_explore(),
            Switch::Battle => self.enter_battle(),
            Switch::NextLevel => {
                self.level_index += 1;
                self.enter_explore();
            }
        }
    }

    fn enter_explore(&mut self) {
        if let Screen::Battle(b) = &self.screen {
            if b.result() == Some(BattleResult::Win) {
                self.slain += 1;
            }
        }
        self.screen = match self.levels.get(self.level_index) {
            Some(level) => Screen::Explore(ExploreState::load(level, &self.config.explore, self.store.as_mut())),
            None => {
                info!(levels = self.levels.len(), "every level cleared");
                Screen::Complete
            }
        };
    }

    fn enter_battle(&mut self) {
        let battle = &self.config.battle;
        self.screen = Screen::Battle(BattleScreen::load(
            self.store.as_ref(),
            battle.rules(self.config.explore.max_health),
            battle.rng(),
            taunt::client_from_config(&self.config.taunt),
            self.config.taunt.retry,
        ));
    }
}
