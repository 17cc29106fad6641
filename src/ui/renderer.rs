/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Build the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// Actors live in pixel space; they are drawn in the grid cell that
/// contains their center.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};

use crate::domain::battle::BattleResult;
use crate::domain::entity::Vitals;
use crate::domain::tile::Tile;
use crate::sim::battle::BattleScreen;
use crate::sim::world::{ExploreState, Phase};

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
    wide: bool,    // occupies 2 terminal columns
    cont: bool,    // right half of a wide char (skip render)
}

impl Cell {
    /// Same RGB for Clear and every cell background, so VTE terminals show
    /// no seams between rows.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };

    const BLANK: Cell = Cell { ch: ' ', fg: Color::White, bg: Cell::BASE_BG, wide: false, cont: false };

    const WIDE_CONT: Cell = Cell { ch: ' ', fg: Color::White, bg: Cell::BASE_BG, wide: false, cont: true };

    /// Never equal to a real cell; filling `back` with it forces a full repaint.
    const INVALID: Cell = Cell { ch: '?', fg: Color::Magenta, bg: Color::Magenta, wide: false, cont: false };

    #[inline]
    fn norm_bg(bg: Color) -> Color {
        match bg {
            Color::Reset => Self::BASE_BG,
            other => other,
        }
    }

    fn from_char(ch: char, fg: Color, bg: Color) -> Self {
        Cell { ch, fg, bg: Self::norm_bg(bg), wide: false, cont: false }
    }

    fn from_char_wide(ch: char, bg: Color) -> Self {
        Cell { ch, fg: Color::Reset, bg: Self::norm_bg(bg), wide: true, cont: false }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![Cell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            if x + i >= self.width { break; }
            self.set(x + i, y, Cell::from_char(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, Cell::from_char(' ', Color::White, bg));
        }
    }

    fn put_wide(&mut self, x: usize, y: usize, ch: char, bg: Color) {
        if x + 1 < self.width {
            self.set(x, y, Cell::from_char_wide(ch, bg));
            self.set(x + 1, y, Cell::WIDE_CONT);
        }
    }
}

/// What the main loop wants on screen this frame.
pub enum View<'a> {
    Explore(&'a mut ExploreState),
    Battle(&'a mut BattleScreen),
    Complete { levels: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ViewKind {
    Explore(Phase),
    Battle,
    Complete,
}

/// Each grid cell = 2 terminal columns.
const CELL_W: usize = 2;

const HUD_ROW: usize = 0;
const MAP_ROW: usize = 2;

const HUD_BG: Color = Color::Rgb { r: 40, g: 14, b: 30 };
const MSG_BG: Color = Color::Rgb { r: 200, g: 150, b: 60 };
const WALL_BG: Color = Color::Rgb { r: 70, g: 60, b: 80 };
const FLOOR_FG: Color = Color::Rgb { r: 60, g: 60, b: 75 };
const BLOOD: Color = Color::Rgb { r: 220, g: 50, b: 60 };
const WISTERIA: Color = Color::Rgb { r: 190, g: 140, b: 255 };
const GOLD: Color = Color::Rgb { r: 255, g: 220, b: 50 };
const DIM: Color = Color::DarkGrey;

const HP_BAR_W: usize = 24;

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
    last_view: Option<ViewKind>,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
            last_view: None,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        self.back.cells.fill(Cell::INVALID);
        Ok(())
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        execute!(self.writer, ResetColor, cursor::Show, terminal::LeaveAlternateScreen)?;
        terminal::disable_raw_mode()
    }

    pub fn render(&mut self, view: View<'_>) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
        }

        let kind = match &view {
            View::Explore(w) => ViewKind::Explore(w.phase),
            View::Battle(_) => ViewKind::Battle,
            View::Complete { .. } => ViewKind::Complete,
        };
        if self.last_view != Some(kind) {
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
            self.last_view = Some(kind);
        }

        self.front.clear();
        match view {
            View::Explore(w) => {
                self.fit_camera(w);
                self.compose_explore(w);
                match w.phase {
                    Phase::Playing => {}
                    Phase::Transition => self.compose_transition(w),
                    Phase::Fallen => self.compose_fallen(w),
                    Phase::LevelComplete => self.compose_level_complete(w),
                }
                if w.paused {
                    self.compose_pause_overlay(w);
                }
            }
            View::Battle(b) => self.compose_battle(b),
            View::Complete { levels } => self.compose_game_complete(levels),
        }

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    /// Size the viewport from the terminal and move the camera.
    fn fit_camera(&self, w: &mut ExploreState) {
        let reserved_rows = MAP_ROW + 4; // HUD + gap + msg + help
        let max_view_h = self.front.height.saturating_sub(reserved_rows).max(1);
        w.camera.view_w = (self.front.width / CELL_W).min(w.grid.width.max(1));
        w.camera.view_h = max_view_h.min(w.grid.height.max(1));

        let Some(cell) = w.hero_cell() else { return };
        if w.phase == Phase::Playing {
            w.camera.follow(cell, w.grid.width, w.grid.height);
        } else {
            w.camera.center_on(cell, w.grid.width, w.grid.height);
        }
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut need_move = true;
        let mut last_x: usize = 0;
        let mut last_y: usize = 0;

        // Not ResetColor: the terminal default may differ from BASE_BG.
        queue!(self.writer, SetForegroundColor(Color::White), SetBackgroundColor(Cell::BASE_BG))?;

        let mut text = [0u8; 4];
        for y in 0..self.front.height {
            let mut x = 0;
            while x < self.front.width {
                let cell = self.front.get(x, y);
                let prev = self.back.get(x, y);

                if cell.cont {
                    if cell != prev { need_move = true; }
                    x += 1;
                    continue;
                }

                let cont_changed = cell.wide
                    && x + 1 < self.front.width
                    && self.front.get(x + 1, y) != self.back.get(x + 1, y);

                if cell == prev && !cont_changed {
                    need_move = true;
                    x += 1;
                    continue;
                }

                if need_move || x != last_x + 1 || y != last_y {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                    need_move = false;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }

                queue!(self.writer, Print(&*cell.ch.encode_utf8(&mut text)))?;

                if cell.wide {
                    last_x = x + 1;
                    x += 2;
                } else {
                    last_x = x;
                    x += 1;
                }
                last_y = y;
            }
        }

        self.writer.flush()
    }

    // ── Exploration ──

    fn compose_explore(&mut self, w: &ExploreState) {
        let gate = match w.grid.exit {
            Some(_) if w.exit_unlocked => "Gate: OPEN",
            Some(_) => "Gate: SEALED",
            None => "",
        };
        let hud = format!(
            " {}   HP {}/{}   Demons slain {}/{}   {} ",
            w.level_name,
            w.hero.health(),
            w.settings.max_health,
            w.defeated_count(),
            w.total_enemies,
            gate,
        );
        self.front.fill_row(HUD_ROW, HUD_BG);
        self.front.put_str(0, HUD_ROW, &hud, Color::White, HUD_BG);

        let cam = w.camera.clone();
        for vy in 0..cam.view_h {
            let row = MAP_ROW + vy;
            if row >= self.front.height { break; }
            for vx in 0..cam.view_w {
                let col = vx * CELL_W;
                if col + 1 >= self.front.width { break; }
                let (gx, gy) = (cam.x + vx as i32, cam.y + vy as i32);
                if gx < 0 || gy < 0 || gx as usize >= w.grid.width || gy as usize >= w.grid.height {
                    continue;
                }
                self.compose_tile(w, gx as usize, gy as usize, col, row);
            }
        }

        let blink = (w.anim_tick / 8) % 2 == 0;
        for e in &w.enemies {
            if let Some((r, c)) = w.grid.cell_at(e.pos) {
                let glyph = if w.engaged.as_ref() == Some(&e.id) && !blink { '💢' } else { '👹' };
                self.put_actor(w, c, r, glyph);
            }
        }
        if let Some((r, c)) = w.grid.cell_at(w.hero.pos) {
            // Flicker while the encounter grace period lasts
            if w.grace_timer <= 0.0 || blink {
                self.put_actor(w, c, r, '🗡');
            }
        }

        let msg_row = MAP_ROW + cam.view_h + 1;
        if msg_row < self.front.height && !w.message.is_empty() {
            self.front.fill_row(msg_row, MSG_BG);
            self.front.put_str(0, msg_row, &format!(" ◈ {} ", w.message), Color::Black, MSG_BG);
        }

        let help_row = MAP_ROW + cam.view_h + 3;
        if help_row < self.front.height {
            let help = " WASD/Arrows: Move  F1: Pause  ESC: Quit  │  Pad: Stick/D-pad";
            self.front.put_str(0, help_row, help, DIM, Color::Reset);
        }
    }

    fn compose_tile(&mut self, w: &ExploreState, gx: usize, gy: usize, col: usize, row: usize) {
        let (a, b, fg, bg) = match w.grid.tile(gy, gx) {
            Tile::Wall => ('▓', '▓', WALL_BG, Color::Reset),
            t if t.is_exit() && w.exit_unlocked => ('[', ']', GOLD, Color::Reset),
            t if t.is_exit() => ('[', ']', BLOOD, Color::Reset),
            _ => ('·', ' ', FLOOR_FG, Color::Reset),
        };
        self.front.set(col, row, Cell::from_char(a, fg, bg));
        self.front.set(col + 1, row, Cell::from_char(b, fg, bg));
    }

    fn put_actor(&mut self, w: &ExploreState, col: usize, row: usize, glyph: char) {
        if let Some((vx, vy)) = w.camera.world_to_view(col, row) {
            self.front.put_wide(vx * CELL_W, MAP_ROW + vy, glyph, Color::Reset);
        }
    }

    /// Dark box in the middle of the map viewport. Returns its top-left.
    fn overlay_box(&mut self, w: &ExploreState, box_w: usize, box_h: usize, bg: Color) -> (usize, usize) {
        let view_cols = (w.camera.view_w * CELL_W).max(box_w);
        let view_rows = w.camera.view_h.max(box_h);
        let box_x = (view_cols - box_w) / 2;
        let box_y = MAP_ROW + (view_rows - box_h) / 2;
        for y in box_y..box_y + box_h {
            for x in box_x..box_x + box_w {
                self.front.set(x, y, Cell::from_char(' ', Color::Reset, bg));
            }
        }
        (box_x, box_y)
    }

    fn compose_transition(&mut self, w: &ExploreState) {
        let bg = Color::Rgb { r: 60, g: 0, b: 10 };
        let (x, y) = self.overlay_box(w, 30, 5, bg);
        let label = if (w.anim_tick / 4) % 2 == 0 { "!! A DEMON ATTACKS !!" } else { "   A DEMON ATTACKS   " };
        self.front.put_str(x + 4, y + 2, label, BLOOD, bg);
    }

    fn compose_fallen(&mut self, w: &ExploreState) {
        let bg = Color::Rgb { r: 30, g: 30, b: 30 };
        let (x, y) = self.overlay_box(w, 34, 7, bg);
        self.front.put_str(x + 2, y + 1, "╔════════════════════════════╗", BLOOD, bg);
        self.front.put_str(x + 2, y + 2, "║       YOU HAVE FALLEN      ║", BLOOD, bg);
        self.front.put_str(x + 2, y + 3, "╚════════════════════════════╝", BLOOD, bg);
        self.front.put_str(x + 4, y + 5, "▸ ENTER: rise again", Color::White, bg);
    }

    fn compose_level_complete(&mut self, w: &ExploreState) {
        let bg = Color::Rgb { r: 30, g: 20, b: 50 };
        let (x, y) = self.overlay_box(w, 34, 7, bg);
        self.front.put_str(x + 2, y + 1, "╔════════════════════════════╗", WISTERIA, bg);
        self.front.put_str(x + 2, y + 2, "║      THE PATH IS CLEAR     ║", WISTERIA, bg);
        self.front.put_str(x + 2, y + 3, "╚════════════════════════════╝", WISTERIA, bg);
        self.front.put_str(x + 4, y + 5, "▸ ENTER: next path", Color::White, bg);
    }

    fn compose_pause_overlay(&mut self, w: &ExploreState) {
        let bg = Color::Rgb { r: 40, g: 40, b: 40 };
        let (x, y) = self.overlay_box(w, 36, 12, bg);
        let label = if (w.anim_tick / 8) % 2 == 0 { "║  ▶  PAUSED  ◀  ║" } else { "║     PAUSED      ║" };
        self.front.put_str(x + 9, y, "╔═════════════════╗", GOLD, bg);
        self.front.put_str(x + 9, y + 1, label, GOLD, bg);
        self.front.put_str(x + 9, y + 2, "╚═════════════════╝", GOLD, bg);

        let key_c = Color::Rgb { r: 100, g: 200, b: 255 };
        let lines = [
            "F1    Resume",
            "WASD  Move",
            "1 / 2 Water / Thunder Breathing",
            "F     Flee a battle",
            "ENTER Continue",
            "ESC   Quit",
        ];
        for (i, l) in lines.iter().enumerate() {
            self.front.put_str(x + 2, y + 4 + i, l, key_c, bg);
        }
    }

    // ── Battle ──

    fn compose_battle(&mut self, b: &mut BattleScreen) {
        self.front.fill_row(HUD_ROW, HUD_BG);
        let enemy_name = b.enemy.as_ref().map(|e| e.as_str().to_string()).unwrap_or_else(|| "demon".into());
        self.front.put_str(0, HUD_ROW, &format!(" BATTLE  ─  {} ", enemy_name), Color::White, HUD_BG);

        let demon = if (b.anim_tick / 10) % 2 == 0 { '👹' } else { '👺' };
        self.front.put_wide(4, 3, demon, Color::Reset);
        self.put_hp_bar(8, 3, "Demon", b.enemy_vitals(), BLOOD);
        if b.enemy_acting() && (b.anim_tick / 6) % 2 == 0 {
            self.front.put_str(8, 4, "winding up...", BLOOD, Color::Reset);
        }

        self.front.put_wide(4, 6, '🗡', Color::Reset);
        self.put_hp_bar(8, 6, "You  ", b.hero(), WISTERIA);

        let log_top = 9;
        for (i, line) in b.log.iter().enumerate() {
            let fg = if i + 1 == b.log.len() { Color::White } else { DIM };
            self.front.put_str(4, log_top + i, line, fg, Color::Reset);
        }
        let hint_row = log_top + b.log.len() + 1;
        self.front.put_str(4, hint_row, &b.hint, GOLD, Color::Reset);

        let controls_row = hint_row + 2;
        let fg = if b.controls_enabled() { Color::White } else { DIM };
        self.front.put_str(4, controls_row, "[1] Water Breathing   [2] Thunder Breathing   [F] Flee", fg, Color::Reset);
        self.front.put_str(4, controls_row + 1, "Pad: A  Water   X/Y  Thunder   B  Flee", DIM, Color::Reset);

        if b.result() == Some(BattleResult::Lose) {
            let taunt_row = controls_row + 3;
            let line = match b.taunt() {
                Some(t) => format!("Muzan: \"{}\"", t),
                None => "Muzan is watching...".to_string(),
            };
            self.front.put_str(4, taunt_row, &line, BLOOD, Color::Reset);
        }
    }

    fn put_hp_bar(&mut self, x: usize, y: usize, label: &str, v: Vitals, color: Color) {
        let filled = bar_fill(v.health(), v.max(), HP_BAR_W);
        self.front.put_str(x, y, label, Color::White, Color::Reset);
        let bar_x = x + label.chars().count() + 1;
        for i in 0..HP_BAR_W {
            let (ch, fg) = if i < filled { ('█', color) } else { ('░', DIM) };
            self.front.set(bar_x + i, y, Cell::from_char(ch, fg, Color::Reset));
        }
        let nums = format!(" {}/{}", v.health(), v.max());
        self.front.put_str(bar_x + HP_BAR_W, y, &nums, Color::White, Color::Reset);
    }

    fn compose_game_complete(&mut self, levels: usize) {
        let art = [
            "╔════════════════════════════════════╗",
            "║   ★ EVERY CURSED PATH CLEANSED ★   ║",
            "╚════════════════════════════════════╝",
        ];
        for (i, l) in art.iter().enumerate() {
            self.front.put_str(4, 4 + i, l, GOLD, Color::Reset);
        }
        let cleared = format!("◈ {} paths walked", levels);
        self.front.put_str(6, 9, &cleared, Color::White, Color::Reset);
        self.front.put_str(6, 11, "▸ ESC: Quit", DIM, Color::Reset);
    }
}

/// Filled cells of an HP bar. Any health above zero shows at least one cell.
fn bar_fill(health: i32, max: i32, width: usize) -> usize {
    if max <= 0 || health <= 0 {
        return 0;
    }
    let cells = (health.min(max) as usize * width) / max as usize;
    cells.max(1)
}
