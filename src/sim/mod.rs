pub mod battle;
pub mod event;
pub mod level;
pub mod session;
pub mod step;
pub mod taunt;
pub mod world;
