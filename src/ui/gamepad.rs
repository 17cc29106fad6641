/// Gamepad input tracker using gilrs.
///
/// Button mapping comes from the `[gamepad]` section of config.toml.
/// Default mapping:
///   D-pad / Left Stick    →  Movement (stick is analog)
///   A                     →  Water Breathing
///   X / Y                 →  Thunder Breathing
///   B                     →  Flee
///   A / Start             →  Confirm
///   Select                →  Quit

#[cfg(feature = "gamepad")]
use gilrs::{Axis, Button, EventType, Gilrs};
#[cfg(feature = "gamepad")]
use tracing::{debug, info};

use crate::config::GamepadConfig;
use crate::domain::physics::Vec2;

const STICK_DEADZONE: f32 = 0.25;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Btn {
    A,       // South
    B,       // East
    X,       // West
    Y,       // North
    L1,
    R1,
    L2,
    R2,
    Start,
    Select,
}

const BTN_COUNT: usize = 10;

impl Btn {
    fn from_name(s: &str) -> Option<Btn> {
        match s.trim().to_uppercase().as_str() {
            "A" | "SOUTH"  => Some(Btn::A),
            "B" | "EAST"   => Some(Btn::B),
            "X" | "WEST"   => Some(Btn::X),
            "Y" | "NORTH"  => Some(Btn::Y),
            "L1" | "LB" | "LEFTTRIGGER"  => Some(Btn::L1),
            "R1" | "RB" | "RIGHTTRIGGER" => Some(Btn::R1),
            "L2" | "LT" | "LEFTTRIGGER2"  => Some(Btn::L2),
            "R2" | "RT" | "RIGHTTRIGGER2" => Some(Btn::R2),
            "START" => Some(Btn::Start),
            "SELECT" | "BACK" => Some(Btn::Select),
            _ => None,
        }
    }

    #[cfg(feature = "gamepad")]
    fn from_gilrs(btn: Button) -> Option<Btn> {
        match btn {
            Button::South     => Some(Btn::A),
            Button::East      => Some(Btn::B),
            Button::West      => Some(Btn::X),
            Button::North     => Some(Btn::Y),
            Button::LeftTrigger  => Some(Btn::L1),
            Button::RightTrigger => Some(Btn::R1),
            Button::LeftTrigger2  => Some(Btn::L2),
            Button::RightTrigger2 => Some(Btn::R2),
            Button::Start     => Some(Btn::Start),
            Button::Select    => Some(Btn::Select),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct BtnState {
    held: bool,
    just_pressed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct DPad {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
}

#[derive(Clone, Debug, PartialEq)]
struct ActionMap {
    attack: Vec<Btn>,
    skill: Vec<Btn>,
    flee: Vec<Btn>,
    confirm: Vec<Btn>,
    cancel: Vec<Btn>,
}

impl Default for ActionMap {
    fn default() -> Self {
        ActionMap {
            attack:  vec![Btn::A],
            skill:   vec![Btn::X, Btn::Y],
            flee:    vec![Btn::B],
            confirm: vec![Btn::A, Btn::Start],
            cancel:  vec![Btn::Select],
        }
    }
}

impl ActionMap {
    /// Unknown names are skipped; a list with nothing usable keeps the default.
    fn from_config(cfg: &GamepadConfig) -> Self {
        fn parse_into(names: &[String], slot: &mut Vec<Btn>) {
            let parsed: Vec<Btn> = names.iter().filter_map(|s| Btn::from_name(s)).collect();
            if !parsed.is_empty() {
                *slot = parsed;
            }
        }
        let mut map = ActionMap::default();
        parse_into(&cfg.attack, &mut map.attack);
        parse_into(&cfg.skill, &mut map.skill);
        parse_into(&cfg.flee, &mut map.flee);
        parse_into(&cfg.confirm, &mut map.confirm);
        parse_into(&cfg.cancel, &mut map.cancel);
        map
    }
}

/// Left stick to a screen-space direction (y down). Inside the deadzone
/// reads as zero; magnitude is kept so a half-tilt walks at half speed.
fn stick_direction(x: f32, y: f32) -> Vec2 {
    let v = Vec2::new(x, -y);
    if v.length() < STICK_DEADZONE {
        Vec2::ZERO
    } else {
        v
    }
}

pub struct GamepadState {
    #[cfg(feature = "gamepad")]
    gilrs: Option<Gilrs>,
    buttons: [BtnState; BTN_COUNT],
    dpad: DPad,
    stick_x: f32,
    stick_y: f32,
    action_map: ActionMap,
    #[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
    pub connected: bool,
}

impl GamepadState {
    pub fn new(cfg: &GamepadConfig) -> Self {
        #[cfg_attr(not(feature = "gamepad"), allow(unused_mut))]
        let mut pad = GamepadState::detached(cfg);
        #[cfg(feature = "gamepad")]
        match Gilrs::new() {
            Ok(g) => {
                pad.connected = g.gamepads().next().is_some();
                info!(connected = pad.connected, "gamepad support ready");
                pad.gilrs = Some(g);
            }
            Err(e) => debug!(error = %e, "gamepad support unavailable"),
        }
        pad
    }

    /// A tracker with no backend attached.
    fn detached(cfg: &GamepadConfig) -> Self {
        GamepadState {
            #[cfg(feature = "gamepad")]
            gilrs: None,
            buttons: [BtnState::default(); BTN_COUNT],
            dpad: DPad::default(),
            stick_x: 0.0,
            stick_y: 0.0,
            action_map: ActionMap::from_config(cfg),
            connected: false,
        }
    }

    /// Drain pad events. Once per frame, alongside the keyboard drain.
    pub fn update(&mut self) {
        self.clear_edges();

        #[cfg(feature = "gamepad")]
        self.poll_gilrs();
    }

    #[cfg(feature = "gamepad")]
    fn poll_gilrs(&mut self) {
        let Some(gilrs) = &mut self.gilrs else { return };
        let events: Vec<_> = std::iter::from_fn(|| gilrs.next_event()).collect();

        for event in events {
            match event.event {
                EventType::ButtonPressed(btn, _) => {
                    self.connected = true;
                    self.set_button(btn, true);
                }
                EventType::ButtonReleased(btn, _) => {
                    self.connected = true;
                    self.set_button(btn, false);
                }
                EventType::AxisChanged(axis, value, _) => {
                    self.connected = true;
                    match axis {
                        Axis::LeftStickX => self.stick_x = value,
                        Axis::LeftStickY => self.stick_y = value,
                        _ => {}
                    }
                }
                EventType::Connected => self.connected = true,
                EventType::Disconnected => {
                    self.connected = false;
                    self.release_all();
                }
                _ => {}
            }
        }
    }

    #[cfg(feature = "gamepad")]
    fn set_button(&mut self, gilrs_btn: Button, held: bool) {
        match gilrs_btn {
            Button::DPadUp    => self.dpad.up = held,
            Button::DPadDown  => self.dpad.down = held,
            Button::DPadLeft  => self.dpad.left = held,
            Button::DPadRight => self.dpad.right = held,
            other => {
                if let Some(btn) = Btn::from_gilrs(other) {
                    self.press(btn, held);
                }
            }
        }
    }

    fn clear_edges(&mut self) {
        for b in &mut self.buttons {
            b.just_pressed = false;
        }
    }

    #[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
    fn press(&mut self, btn: Btn, held: bool) {
        let state = &mut self.buttons[btn as usize];
        if held && !state.held {
            state.just_pressed = true;
        }
        state.held = held;
    }

    fn any_just_pressed(&self, btns: &[Btn]) -> bool {
        btns.iter().any(|&b| self.buttons[b as usize].just_pressed)
    }

    /// D-pad wins over the stick when both are active.
    pub fn direction(&self) -> Vec2 {
        let d = self.dpad;
        let dx = d.right as i32 - d.left as i32;
        let dy = d.down as i32 - d.up as i32;
        if dx != 0 || dy != 0 {
            return Vec2::new(dx as f32, dy as f32);
        }
        stick_direction(self.stick_x, self.stick_y)
    }

    pub fn attack_pressed(&self) -> bool {
        self.any_just_pressed(&self.action_map.attack)
    }

    pub fn skill_pressed(&self) -> bool {
        self.any_just_pressed(&self.action_map.skill)
    }

    pub fn flee_pressed(&self) -> bool {
        self.any_just_pressed(&self.action_map.flee)
    }

    pub fn confirm_pressed(&self) -> bool {
        self.any_just_pressed(&self.action_map.confirm)
    }

    pub fn cancel_pressed(&self) -> bool {
        self.any_just_pressed(&self.action_map.cancel)
    }

    #[cfg_attr(not(feature = "gamepad"), allow(dead_code))]
    fn release_all(&mut self) {
        self.buttons = [BtnState::default(); BTN_COUNT];
        self.dpad = DPad::default();
        self.stick_x = 0.0;
        self.stick_y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn button_names_are_case_insensitive() {
        assert_eq!(Btn::from_name("south"), Some(Btn::A));
        assert_eq!(Btn::from_name(" Back "), Some(Btn::Select));
        assert_eq!(Btn::from_name("rt"), Some(Btn::R2));
        assert_eq!(Btn::from_name("Turbo"), None);
    }

    #[test]
    fn config_overrides_and_falls_back() {
        let cfg = GamepadConfig {
            attack: names(&["R1"]),
            skill: names(&["nonsense"]),
            flee: vec![],
            ..GamepadConfig::default()
        };
        let map = ActionMap::from_config(&cfg);
        assert_eq!(map.attack, vec![Btn::R1]);
        assert_eq!(map.skill, ActionMap::default().skill);
        assert_eq!(map.flee, vec![Btn::B]);
    }

    #[test]
    fn stick_deadzone_and_orientation() {
        assert_eq!(stick_direction(0.1, 0.1), Vec2::ZERO);
        // Pushing up is negative y on screen
        assert_eq!(stick_direction(0.0, 1.0), Vec2::new(0.0, -1.0));
        assert_eq!(stick_direction(0.5, 0.0), Vec2::new(0.5, 0.0));
    }

    #[test]
    fn press_edges_fire_once() {
        let mut pad = GamepadState::detached(&GamepadConfig::default());
        pad.press(Btn::B, true);
        assert!(pad.flee_pressed());
        pad.clear_edges();
        pad.press(Btn::B, true);
        assert!(!pad.flee_pressed());
        pad.press(Btn::B, false);
        pad.press(Btn::B, true);
        assert!(pad.flee_pressed());
    }

    #[test]
    fn dpad_overrides_stick() {
        let mut pad = GamepadState::detached(&GamepadConfig::default());
        pad.stick_x = 0.9;
        assert_eq!(pad.direction(), Vec2::new(0.9, 0.0));
        pad.dpad.left = true;
        assert_eq!(pad.direction(), Vec2::new(-1.0, 0.0));
    }
}
