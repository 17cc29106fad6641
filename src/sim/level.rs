/// Level loader.
///
/// ## Sources (priority order):
///   1. `levels/` directory (individual `.txt` files, sorted by file name)
///   2. Built-in embedded levels
///
/// ## Single-level format (`.txt`):
///   Line 1: `# Level Name`
///   Further `#` lines: comments
///   Lines: map rows
///
/// ## Tile legend:
///   'W' = Wall          '.' = Path
///   'P' = Hero start    'E' = Demon spawn
///   'X' = Exit          'L' = Sealed exit (opens when every demon is slain)
///   anything else = Path

use std::path::Path;

use tracing::{debug, warn};

use crate::config::GameConfig;

/// Runtime level data (owned strings, loaded from file or embedded).
#[derive(Clone, Debug, PartialEq)]
pub struct LevelDef {
    pub name: String,
    pub rows: Vec<String>,
}

// ══════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════

/// All playable levels. Never empty.
pub fn load_levels(config: &GameConfig) -> Vec<LevelDef> {
    let from_dir = load_from_directory(&config.levels_dir);
    if from_dir.is_empty() {
        debug!(dir = %config.levels_dir.display(), "no level files, using built-in levels");
        return embedded_levels();
    }
    from_dir.into_iter().map(|(_, def)| def).collect()
}

// ══════════════════════════════════════════════════════════════
// Single-level file parsing
// ══════════════════════════════════════════════════════════════

/// Parse a single level from text content.
fn parse_level_file(content: &str) -> Option<LevelDef> {
    let mut name = String::new();
    let mut rows = vec![];

    for line in content.lines() {
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix('#') {
            if name.is_empty() && rows.is_empty() {
                name = rest.trim().to_string();
            }
            continue;
        }
        rows.push(line.to_string());
    }

    // Trim blank lines around the map
    while rows.last().map_or(false, |r| r.trim().is_empty()) {
        rows.pop();
    }
    let leading = rows.iter().take_while(|r| r.trim().is_empty()).count();
    rows.drain(..leading);

    if rows.is_empty() {
        return None;
    }

    if name.is_empty() {
        name = "Nameless Path".to_string();
    }

    Some(LevelDef { name, rows })
}

// ══════════════════════════════════════════════════════════════
// Directory loading (individual .txt files)
// ══════════════════════════════════════════════════════════════

fn load_from_directory(dir: &Path) -> Vec<(String, LevelDef)> {
    let mut results = vec![];

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return results,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(false, |e| e == "txt") {
            match std::fs::read_to_string(&path) {
                Ok(content) => match parse_level_file(&content) {
                    Some(def) => {
                        let filename = path.file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .to_string();
                        results.push((filename, def));
                    }
                    None => warn!(path = %path.display(), "level file has no map rows"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "could not read level file"),
            }
        }
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

// ══════════════════════════════════════════════════════════════
// Embedded levels
// ══════════════════════════════════════════════════════════════

pub fn embedded_levels() -> Vec<LevelDef> {
    vec![
        make_embedded("The Cursed Path", &[
            "WWWWWWWWWWWWWWWWWWWW",
            "WP...........W.....W",
            "W.WWWWWWWWWWW.WWWW.W",
            "W.............W....W",
            "W.WWWWWW.E.WWWWWWW.W",
            "W.W......W.......W.W",
            "W.W.WWWWWWWWWWW.W.EW",
            "W.W.W.........W.W..W",
            "W.W.W.WWWWWWWWW.WW.W",
            "W.E.W.W.......W....W",
            "W.W.W.W.WWWWWWW.WW.W",
            "W...W...W...W...W..W",
            "W.WWWWWWWWW.W.WWWW.W",
            "W.............E...LW",
            "WWWWWWWWWWWWWWWWWWWW",
        ]),
        make_embedded("Wisteria Hollow", &[
            "WWWWWWWWWWWWWWWWWW",
            "WP......W........W",
            "W.WWWW..W..WWWWW.W",
            "W....W.....W...E.W",
            "WWWW.W.WWWWW.WWW.W",
            "W....W...E.......W",
            "W.WWWWWW.WWW.WWWWW",
            "W......W...W.....W",
            "W.E..W.WWW.WWWW..W",
            "W....W..........LW",
            "WWWWWWWWWWWWWWWWWW",
        ]),
    ]
}

fn make_embedded(name: &str, map: &[&str]) -> LevelDef {
    LevelDef {
        name: name.to_string(),
        rows: map.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::domain::grid::{GridMap, DEFAULT_TILE_SIZE};
    use crate::domain::physics::box_fits;

    #[test]
    fn parses_name_and_rows() {
        let def = parse_level_file("# Mountain Pass\n\nWWWW\nWP.W\n# note\nWWWW\n\n").unwrap();
        assert_eq!(def.name, "Mountain Pass");
        assert_eq!(def.rows, vec!["WWWW", "WP.W", "WWWW"]);
    }

    #[test]
    fn nameless_file_gets_a_name() {
        let def = parse_level_file("WWW\nWPW\nWWW").unwrap();
        assert_eq!(def.name, "Nameless Path");
    }

    #[test]
    fn empty_file_is_skipped() {
        assert!(parse_level_file("# Only a name\n\n").is_none());
    }

    #[test]
    fn directory_levels_are_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02_second.txt"), "# Second\nWPW").unwrap();
        std::fs::write(dir.path().join("01_first.txt"), "# First\nWPW").unwrap();
        std::fs::write(dir.path().join("readme.md"), "# Not a level\nWPW").unwrap();
        let names: Vec<String> = load_from_directory(dir.path())
            .into_iter()
            .map(|(_, d)| d.name)
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        assert!(load_from_directory(Path::new("/definitely/not/here")).is_empty());
    }

    /// Every embedded level is rectangular, has a start and an exit, and
    /// every demon and the exit can be reached on foot from the start.
    #[test]
    fn embedded_levels_are_playable() {
        for def in embedded_levels() {
            let width = def.rows[0].len();
            assert!(def.rows.iter().all(|r| r.len() == width), "{} is ragged", def.name);

            let g = GridMap::load(&def.rows, DEFAULT_TILE_SIZE);
            assert!(g.exit.is_some(), "{} has no exit", def.name);
            assert!(box_fits(&g, g.player_start_position(), DEFAULT_TILE_SIZE * 0.8));

            let mut seen = HashSet::from([g.player_start]);
            let mut stack = vec![g.player_start];
            while let Some((r, c)) = stack.pop() {
                for (dr, dc) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                    let (nr, nc) = (r as i64 + dr, c as i64 + dc);
                    if !g.is_blocked(nr, nc) && seen.insert((nr as usize, nc as usize)) {
                        stack.push((nr as usize, nc as usize));
                    }
                }
            }
            for spawn in &g.enemy_spawns {
                assert!(seen.contains(&(spawn.row, spawn.col)), "{} unreachable in {}", spawn.id, def.name);
            }
            let exit = g.exit.unwrap();
            assert!(seen.contains(&(exit.row, exit.col)));
        }
    }
}
