//! Predator-prey ecosystem on a fixed grid.
//!
//! Prey and predators move, reproduce and starve over discrete generations.
//! Every movement phase runs in parallel against a frozen world and writes
//! into a shared snapshot; overlapping moves are reconciled afterwards.

pub mod config;
pub mod ecosystem;
pub mod engine;
pub mod model;
pub mod resolver;
pub mod rules;
pub mod stats;
pub mod world;

pub use config::{Config, RunOptions};
pub use ecosystem::Ecosystem;
pub use engine::Engine;
pub use rules::PreyPolicy;
