/// Turn-based battle state machine.
///
/// ```text
///   PlayerTurn ──attack──▶ EnemyTurnPending ──delay──▶ EnemyTurn ──▶ PlayerTurn
///       │                                                 │
///       ├──flee──▶ Over(Fled)                             └──hero ≤ 0──▶ Over(Lose)
///       └──enemy ≤ 0──▶ Over(Win)
/// ```
///
/// The enemy-turn delay is the only timer. It is owned by the battle,
/// advanced by `tick(dt)`, and cancelled whenever the battle ends, so a
/// pending enemy action can never land after `Over`.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::entity::Vitals;

/// How much damage an action deals.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DamageRoll {
    Fixed(i32),
    /// Uniform over `lo..=hi`.
    Range(i32, i32),
}

impl DamageRoll {
    pub fn roll(self, rng: &mut ChaCha8Rng) -> i32 {
        match self {
            DamageRoll::Fixed(n) => n,
            DamageRoll::Range(lo, hi) if hi > lo => rng.gen_range(lo..=hi),
            DamageRoll::Range(lo, _) => lo,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttackStyle {
    Water,
    Thunder,
}

impl AttackStyle {
    pub fn label(self) -> &'static str {
        match self {
            AttackStyle::Water => "Water Breathing",
            AttackStyle::Thunder => "Thunder Breathing",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BattleResult {
    Win,
    Lose,
    Fled,
}

impl BattleResult {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleResult::Win => "win",
            BattleResult::Lose => "lose",
            BattleResult::Fled => "fled",
        }
    }
}

impl fmt::Display for BattleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BattleResult {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "win" => Ok(BattleResult::Win),
            "lose" => Ok(BattleResult::Lose),
            "fled" => Ok(BattleResult::Fled),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TurnState {
    PlayerTurn,
    EnemyTurnPending,
    EnemyTurn,
    Over(BattleResult),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BattleEvent {
    PlayerAttacked { style: AttackStyle, damage: i32 },
    EnemyActing,
    EnemyAttacked { damage: i32 },
    Ended(BattleResult),
}

#[derive(Clone, Copy, Debug)]
pub struct BattleRules {
    pub hero_max_health: i32,
    pub enemy_max_health: i32,
    pub water: DamageRoll,
    pub thunder: DamageRoll,
    pub enemy_attack: DamageRoll,
    /// Seconds the enemy "thinks" before striking.
    pub enemy_delay: f32,
}

impl Default for BattleRules {
    fn default() -> Self {
        BattleRules {
            hero_max_health: 100,
            enemy_max_health: 100,
            water: DamageRoll::Range(15, 25),
            thunder: DamageRoll::Range(5, 40),
            enemy_attack: DamageRoll::Range(10, 20),
            enemy_delay: 1.5,
        }
    }
}

impl BattleRules {
    fn roll_for(&self, style: AttackStyle) -> DamageRoll {
        match style {
            AttackStyle::Water => self.water,
            AttackStyle::Thunder => self.thunder,
        }
    }
}

/// Cancellable one-shot countdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct TurnTimer {
    remaining: Option<f32>,
}

impl TurnTimer {
    pub fn start(&mut self, secs: f32) {
        self.remaining = Some(secs.max(0.0));
    }

    pub fn cancel(&mut self) {
        self.remaining = None;
    }

    pub fn is_armed(&self) -> bool {
        self.remaining.is_some()
    }

    /// Advance; returns true once, on the tick the countdown expires.
    pub fn tick(&mut self, dt: f32) -> bool {
        match self.remaining {
            Some(r) if r - dt <= 0.0 => {
                self.remaining = None;
                true
            }
            Some(r) => {
                self.remaining = Some(r - dt);
                false
            }
            None => false,
        }
    }
}

pub struct Battle {
    state: TurnState,
    hero: Vitals,
    enemy: Vitals,
    rules: BattleRules,
    timer: TurnTimer,
    rng: ChaCha8Rng,
}

impl Battle {
    /// Start at `PlayerTurn`. The enemy always begins at full health.
    pub fn new(hero_health: i32, rules: BattleRules, rng: ChaCha8Rng) -> Self {
        Battle {
            state: TurnState::PlayerTurn,
            hero: Vitals::new(hero_health, rules.hero_max_health),
            enemy: Vitals::full(rules.enemy_max_health),
            rules,
            timer: TurnTimer::default(),
            rng,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn hero(&self) -> Vitals {
        self.hero
    }

    pub fn enemy(&self) -> Vitals {
        self.enemy
    }

    pub fn result(&self) -> Option<BattleResult> {
        match self.state {
            TurnState::Over(r) => Some(r),
            _ => None,
        }
    }

    /// Player controls are live only on the player's turn.
    pub fn controls_enabled(&self) -> bool {
        self.state == TurnState::PlayerTurn
    }

    pub fn enemy_turn_pending(&self) -> bool {
        self.timer.is_armed()
    }

    /// Player attack. Ignored outside `PlayerTurn`.
    pub fn attack(&mut self, style: AttackStyle) -> Vec<BattleEvent> {
        let mut events = vec![];
        if self.state != TurnState::PlayerTurn {
            return events;
        }

        let damage = self.rules.roll_for(style).roll(&mut self.rng);
        let hit = self.enemy.take_damage(damage);
        events.push(BattleEvent::PlayerAttacked { style, damage: hit.dealt });

        if self.enemy.is_depleted() {
            self.finish(BattleResult::Win, &mut events);
        } else {
            self.state = TurnState::EnemyTurnPending;
            self.timer.start(self.rules.enemy_delay);
            events.push(BattleEvent::EnemyActing);
        }
        events
    }

    /// Leave the battle with healths untouched. Only on the player's turn.
    pub fn flee(&mut self) -> Vec<BattleEvent> {
        let mut events = vec![];
        if self.state == TurnState::PlayerTurn {
            self.finish(BattleResult::Fled, &mut events);
        }
        events
    }

    /// Advance the enemy-turn delay; resolves the enemy attack when it fires.
    pub fn tick(&mut self, dt: f32) -> Vec<BattleEvent> {
        let mut events = vec![];
        if self.state != TurnState::EnemyTurnPending {
            return events;
        }
        if self.timer.tick(dt) {
            self.state = TurnState::EnemyTurn;
            self.resolve_enemy_turn(&mut events);
        }
        events
    }

    fn resolve_enemy_turn(&mut self, events: &mut Vec<BattleEvent>) {
        let damage = self.rules.enemy_attack.roll(&mut self.rng);
        let hit = self.hero.take_damage(damage);
        events.push(BattleEvent::EnemyAttacked { damage: hit.dealt });

        if self.hero.is_depleted() {
            self.finish(BattleResult::Lose, events);
        } else {
            self.state = TurnState::PlayerTurn;
        }
    }

    fn finish(&mut self, result: BattleResult, events: &mut Vec<BattleEvent>) {
        self.timer.cancel();
        self.state = TurnState::Over(result);
        events.push(BattleEvent::Ended(result));
    }
}
