/// Battle screen: wraps the turn machine with the Session State hand-off,
/// the status log and the defeat taunt.
///
/// The screen is built from the session alone. When the fight ends the
/// result is written back once; the exploration screen picks it up when
/// it is rebuilt.

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::domain::battle::{AttackStyle, Battle, BattleEvent, BattleResult, BattleRules};
use crate::domain::entity::{EnemyId, Vitals};
use crate::sim::session::{self, SessionState, SessionStore};
use crate::sim::taunt::{RetryPolicy, TauntClient, TauntHandle};

const LOG_LINES: usize = 4;

pub struct BattleScreen {
    battle: Battle,
    pub enemy: Option<EnemyId>,
    /// Newest last.
    pub log: Vec<String>,
    /// One-line prompt under the log.
    pub hint: String,
    pub anim_tick: u32,
    recorded: bool,
    taunt_client: Option<(Box<dyn TauntClient>, RetryPolicy)>,
    taunt: Option<TauntHandle>,
}

impl BattleScreen {
    /// Hero health comes from the pre-battle snapshot, full if absent.
    pub fn load(
        store: &dyn SessionStore,
        rules: BattleRules,
        rng: ChaCha8Rng,
        taunt_client: Box<dyn TauntClient>,
        retry: RetryPolicy,
    ) -> Self {
        let state = SessionState::load(store);
        let hero_health = state
            .player_health_before_battle
            .unwrap_or(rules.hero_max_health)
            .clamp(0, rules.hero_max_health);
        if state.enemy_to_fight.is_none() {
            warn!("battle started without an enemy on record");
        }
        info!(enemy = ?state.enemy_to_fight.as_ref().map(|e| e.as_str()), hero_health, "battle start");

        BattleScreen {
            battle: Battle::new(hero_health, rules, rng),
            enemy: state.enemy_to_fight,
            log: vec!["A demon appears!".to_string()],
            hint: "Your turn!".to_string(),
            anim_tick: 0,
            recorded: false,
            taunt_client: Some((taunt_client, retry)),
            taunt: None,
        }
    }

    pub fn hero(&self) -> Vitals {
        self.battle.hero()
    }

    pub fn enemy_vitals(&self) -> Vitals {
        self.battle.enemy()
    }

    pub fn controls_enabled(&self) -> bool {
        self.battle.controls_enabled()
    }

    /// The demon is winding up its attack.
    pub fn enemy_acting(&self) -> bool {
        self.battle.enemy_turn_pending()
    }

    pub fn result(&self) -> Option<BattleResult> {
        self.battle.result()
    }

    pub fn attack(&mut self, style: AttackStyle, store: &mut dyn SessionStore) {
        if !self.battle.controls_enabled() {
            self.nudge();
            return;
        }
        let events = self.battle.attack(style);
        self.apply(events, store);
    }

    pub fn flee(&mut self, store: &mut dyn SessionStore) {
        if !self.battle.controls_enabled() {
            self.nudge();
            return;
        }
        let events = self.battle.flee();
        self.apply(events, store);
    }

    pub fn tick(&mut self, dt: f32, store: &mut dyn SessionStore) {
        self.anim_tick = self.anim_tick.wrapping_add(1);
        let events = self.battle.tick(dt);
        self.apply(events, store);
    }

    /// The defeat taunt, once it has arrived. Always `None` unless lost.
    pub fn taunt(&mut self) -> Option<&str> {
        self.taunt.as_mut().and_then(|t| t.poll())
    }

    fn nudge(&mut self) {
        debug!(state = ?self.battle.state(), "input ignored");
        if self.battle.result().is_none() {
            self.hint = "The demon is thinking...".to_string();
        }
    }

    fn apply(&mut self, events: Vec<BattleEvent>, store: &mut dyn SessionStore) {
        for event in events {
            match event {
                BattleEvent::PlayerAttacked { style, damage } => {
                    self.push_log(format!("You used {}! Dealt {} damage.", style.label(), damage));
                }
                BattleEvent::EnemyActing => {
                    self.hint = "Demon is attacking...".to_string();
                }
                BattleEvent::EnemyAttacked { damage } => {
                    self.push_log(format!("Demon attacked! You took {} damage.", damage));
                    self.hint = "Your turn!".to_string();
                }
                BattleEvent::Ended(result) => self.finish(result, store),
            }
        }
    }

    fn finish(&mut self, result: BattleResult, store: &mut dyn SessionStore) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        let (line, hint) = match result {
            BattleResult::Win => ("You defeated the demon!", "ENTER: continue"),
            BattleResult::Lose => ("You have been defeated... GAME OVER", "ENTER: continue"),
            BattleResult::Fled => ("You fled!", ""),
        };
        self.push_log(line.to_string());
        self.hint = hint.to_string();

        let health = self.battle.hero().health();
        if let Err(e) = session::record_battle_result(store, result, health) {
            warn!(error = %e, "could not write battle result");
        }
        info!(%result, hero_health = health, "battle over");

        if result == BattleResult::Lose {
            if let Some((client, retry)) = self.taunt_client.take() {
                debug!("requesting taunt");
                self.taunt = Some(TauntHandle::spawn(client, retry));
            }
        }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
        if self.log.len() > LOG_LINES {
            let excess = self.log.len() - LOG_LINES;
            self.log.drain(..excess);
        }
    }
}
