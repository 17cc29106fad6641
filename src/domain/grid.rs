/// Grid map: the static tile layout of an exploration level.
///
/// Cells are addressed `(row, col)`. World units are pixels: the center
/// of a cell is `(col, row) * tile_size + tile_size / 2`.
///
/// Loading is pure and total. Unknown characters are open floor, ragged
/// rows are padded with floor, and there is no failure mode.

use super::entity::EnemyId;
use super::physics::Vec2;
use super::tile::Tile;

pub const DEFAULT_TILE_SIZE: f32 = 40.0;

/// An enemy spawn cell with the identity derived from its coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct EnemySpawn {
    pub id: EnemyId,
    pub row: usize,
    pub col: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitCell {
    pub row: usize,
    pub col: usize,
    pub locked: bool,
}

#[derive(Clone, Debug)]
pub struct GridMap {
    cells: Vec<Vec<Tile>>,
    pub width: usize,
    pub height: usize,
    pub tile_size: f32,
    pub walls: Vec<(usize, usize)>,
    pub player_start: (usize, usize),
    pub exit: Option<ExitCell>,
    pub enemy_spawns: Vec<EnemySpawn>,
}

impl GridMap {
    pub fn load<S: AsRef<str>>(rows: &[S], tile_size: f32) -> GridMap {
        let height = rows.len();
        let width = rows.iter().map(|r| r.as_ref().chars().count()).max().unwrap_or(0);

        let mut cells = vec![vec![Tile::Path; width]; height];
        let mut walls = vec![];
        let mut player_start = None;
        let mut exit = None;
        let mut enemy_spawns = vec![];

        for (row, line) in rows.iter().enumerate() {
            for (col, ch) in line.as_ref().chars().enumerate() {
                let tile = Tile::from_char(ch);
                cells[row][col] = tile;
                match tile {
                    Tile::Wall => walls.push((row, col)),
                    Tile::PlayerStart => {
                        // First marker wins
                        if player_start.is_none() {
                            player_start = Some((row, col));
                        }
                    }
                    Tile::Exit | Tile::LockedExit => {
                        if exit.is_none() {
                            exit = Some(ExitCell { row, col, locked: tile == Tile::LockedExit });
                        }
                    }
                    Tile::EnemySpawn => enemy_spawns.push(EnemySpawn {
                        id: EnemyId::from_spawn(row, col),
                        row,
                        col,
                    }),
                    Tile::Path => {}
                }
            }
        }

        let player_start = player_start
            .or_else(|| first_open_cell(&cells))
            .unwrap_or((0, 0));

        GridMap {
            cells,
            width,
            height,
            tile_size,
            walls,
            player_start,
            exit,
            enemy_spawns,
        }
    }

    /// Tile at `(row, col)`. Out of bounds reads as Wall.
    #[inline]
    pub fn tile(&self, row: usize, col: usize) -> Tile {
        if row < self.height && col < self.width {
            self.cells[row][col]
        } else {
            Tile::Wall
        }
    }

    /// Blocked test on signed coordinates, so callers can probe past the edges.
    #[inline]
    pub fn is_blocked(&self, row: i64, col: i64) -> bool {
        if row < 0 || col < 0 {
            return true;
        }
        self.tile(row as usize, col as usize).is_blocking()
    }

    #[inline]
    pub fn in_bounds(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.height && (col as usize) < self.width
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Vec2 {
        Vec2::new(
            col as f32 * self.tile_size + self.tile_size / 2.0,
            row as f32 * self.tile_size + self.tile_size / 2.0,
        )
    }

    /// Cell containing a world point (floor division), if inside the grid.
    pub fn cell_at(&self, pos: Vec2) -> Option<(usize, usize)> {
        let row = (pos.y / self.tile_size).floor() as i64;
        let col = (pos.x / self.tile_size).floor() as i64;
        if self.in_bounds(row, col) {
            Some((row as usize, col as usize))
        } else {
            None
        }
    }

    pub fn player_start_position(&self) -> Vec2 {
        self.cell_center(self.player_start.0, self.player_start.1)
    }
}

fn first_open_cell(cells: &[Vec<Tile>]) -> Option<(usize, usize)> {
    cells.iter().enumerate().find_map(|(row, line)| {
        line.iter().position(|t| *t == Tile::Path).map(|col| (row, col))
    })
}
