/// Tile types and their properties.
/// Properties are queried via methods, not stored as flags,
/// so tile semantics are centralized here.

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Tile {
    #[default]
    Path,
    Wall,
    PlayerStart,
    Exit,        // Open exit: reaching it clears the level
    LockedExit,  // Opens once every enemy on the map is defeated
    EnemySpawn,
}

impl Tile {
    /// Map legend. Unknown characters degrade to open floor.
    pub fn from_char(c: char) -> Tile {
        match c {
            'W' => Tile::Wall,
            'P' => Tile::PlayerStart,
            'X' => Tile::Exit,
            'L' => Tile::LockedExit,
            'E' => Tile::EnemySpawn,
            _   => Tile::Path,
        }
    }

    /// Does this cell block actor bounding boxes?
    pub fn is_blocking(self) -> bool {
        matches!(self, Tile::Wall)
    }

    pub fn is_exit(self) -> bool {
        matches!(self, Tile::Exit | Tile::LockedExit)
    }
}
