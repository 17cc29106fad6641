/// Keyboard state tracker.
///
/// Movement is level-triggered (held keys), everything else edge-triggered
/// (fires on the initial press only). Release events are honored when the
/// terminal reports them, otherwise a key counts as released after
/// `HOLD_TIMEOUT` without Press/Repeat.
///
/// Bindings:
///   WASD / arrows   move
///   1 / Z           Water Breathing
///   2 / X           Thunder Breathing
///   F               flee
///   Enter / Space   confirm
///   F1 / P          pause
///   Esc             quit

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{self, poll, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::domain::physics::Vec2;

const HOLD_TIMEOUT: Duration = Duration::from_millis(160);

const UP: &[KeyCode] = &[KeyCode::Up, KeyCode::Char('w'), KeyCode::Char('W')];
const DOWN: &[KeyCode] = &[KeyCode::Down, KeyCode::Char('s'), KeyCode::Char('S')];
const LEFT: &[KeyCode] = &[KeyCode::Left, KeyCode::Char('a'), KeyCode::Char('A')];
const RIGHT: &[KeyCode] = &[KeyCode::Right, KeyCode::Char('d'), KeyCode::Char('D')];

const WATER: &[KeyCode] = &[KeyCode::Char('1'), KeyCode::Char('z'), KeyCode::Char('Z')];
const THUNDER: &[KeyCode] = &[KeyCode::Char('2'), KeyCode::Char('x'), KeyCode::Char('X')];
const FLEE: &[KeyCode] = &[KeyCode::Char('f'), KeyCode::Char('F')];
const CONFIRM: &[KeyCode] = &[KeyCode::Enter, KeyCode::Char(' ')];
const PAUSE: &[KeyCode] = &[KeyCode::F(1), KeyCode::Char('p'), KeyCode::Char('P')];
const QUIT: &[KeyCode] = &[KeyCode::Esc];

pub struct InputState {
    last_active: HashMap<KeyCode, Instant>,
    /// Keys that went from released to held during the last drain.
    fresh_presses: Vec<KeyCode>,
    pub raw_events: Vec<KeyEvent>,
    /// Only set once keyboard enhancement is confirmed.
    pub honor_release: bool,
}

impl InputState {
    pub fn new() -> Self {
        InputState {
            last_active: HashMap::with_capacity(16),
            fresh_presses: Vec::with_capacity(8),
            raw_events: Vec::with_capacity(8),
            honor_release: false,
        }
    }

    /// Drain all pending terminal events without blocking. Once per frame.
    pub fn drain_events(&mut self) {
        self.fresh_presses.clear();
        self.raw_events.clear();

        while poll(Duration::ZERO).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                self.record(key);
            }
        }

        let now = Instant::now();
        self.last_active.retain(|_, t| now.duration_since(*t) < HOLD_TIMEOUT);
    }

    fn record(&mut self, key: KeyEvent) {
        self.raw_events.push(key);
        match key.kind {
            KeyEventKind::Release if self.honor_release => {
                self.last_active.remove(&key.code);
            }
            KeyEventKind::Release => {}
            _ => {
                let was_held = self.is_held(key.code);
                self.last_active.insert(key.code, Instant::now());
                if !was_held {
                    self.fresh_presses.push(key.code);
                }
            }
        }
    }

    pub fn is_held(&self, code: KeyCode) -> bool {
        self.last_active.get(&code)
            .map(|t| t.elapsed() < HOLD_TIMEOUT)
            .unwrap_or(false)
    }

    pub fn any_held(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.is_held(*c))
    }

    pub fn was_pressed(&self, code: KeyCode) -> bool {
        self.fresh_presses.contains(&code)
    }

    pub fn any_pressed(&self, codes: &[KeyCode]) -> bool {
        codes.iter().any(|c| self.was_pressed(*c))
    }

    /// Held movement keys as a raw direction. Opposites cancel.
    pub fn direction(&self) -> Vec2 {
        let axis = |neg: &[KeyCode], pos: &[KeyCode]| -> f32 {
            (self.any_held(pos) as i32 - self.any_held(neg) as i32) as f32
        };
        Vec2::new(axis(LEFT, RIGHT), axis(UP, DOWN))
    }

    pub fn water_pressed(&self) -> bool {
        self.any_pressed(WATER)
    }

    pub fn thunder_pressed(&self) -> bool {
        self.any_pressed(THUNDER)
    }

    pub fn flee_pressed(&self) -> bool {
        self.any_pressed(FLEE)
    }

    pub fn confirm_pressed(&self) -> bool {
        self.any_pressed(CONFIRM)
    }

    pub fn pause_pressed(&self) -> bool {
        self.any_pressed(PAUSE)
    }

    pub fn quit_pressed(&self) -> bool {
        self.any_pressed(QUIT) || self.ctrl_c_pressed()
    }

    pub fn ctrl_c_pressed(&self) -> bool {
        self.raw_events.iter().any(|k| {
            k.modifiers.contains(KeyModifiers::CONTROL)
                && (k.code == KeyCode::Char('c') || k.code == KeyCode::Char('C'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut InputState, code: KeyCode) {
        input.record(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn release(input: &mut InputState, code: KeyCode) {
        input.record(KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Release));
    }

    #[test]
    fn direction_combines_axes() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::Char('d'));
        press(&mut input, KeyCode::Up);
        assert_eq!(input.direction(), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Right);
        assert_eq!(input.direction(), Vec2::ZERO);
    }

    #[test]
    fn repeat_is_not_a_fresh_press() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::Char('1'));
        assert!(input.water_pressed());
        input.fresh_presses.clear();
        press(&mut input, KeyCode::Char('1'));
        assert!(!input.water_pressed());
    }

    #[test]
    fn release_only_honored_when_enabled() {
        let mut input = InputState::new();
        press(&mut input, KeyCode::Char('w'));
        release(&mut input, KeyCode::Char('w'));
        assert!(input.is_held(KeyCode::Char('w')));

        input.honor_release = true;
        release(&mut input, KeyCode::Char('w'));
        assert!(!input.is_held(KeyCode::Char('w')));
    }

    #[test]
    fn ctrl_c_quits() {
        let mut input = InputState::new();
        input.record(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(input.quit_pressed());
        assert!(!input.flee_pressed());
    }
}
