pub mod ai;
pub mod battle;
pub mod entity;
pub mod grid;
pub mod physics;
pub mod tile;
