#![forbid(unsafe_code)]

pub mod controller;
pub mod model;
pub mod time;

pub use controller::{DifficultyController, DifficultyState};
pub use time::Clock;
