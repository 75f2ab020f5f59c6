//! Movement rule shared by both kinds.
//!
//! Neighbors are always scanned north, south, east, west. Among the `n`
//! admissible neighbors the one at position `(i_gen + x + y) mod n` in that
//! order is taken, so the choice depends only on the generation index, the
//! agent's coordinates and the world it reads.

use crate::world::{Tile, World};
use serde::{Deserialize, Serialize};

/// Whether prey may step into a cell that holds another prey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PreyPolicy {
    /// Only empty cells are admissible.
    #[default]
    EmptyOnly,
    /// Empty cells and prey-held cells are admissible.
    Permissive,
}

/// Decision of the movement rule for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Stay,
    Move(usize),
    /// Predator moves onto an adjacent prey.
    Hunt(usize),
}

impl Step {
    /// Destination cell, given the agent's current cell.
    pub fn dest(self, cell: usize) -> usize {
        match self {
            Step::Stay => cell,
            Step::Move(dest) | Step::Hunt(dest) => dest,
        }
    }
}

pub fn seed(world: &World, cell: usize, i_gen: u32) -> u64 {
    let loc = world.loc(cell);
    i_gen as u64 + loc.x as u64 + loc.y as u64
}

pub fn prey_step(world: &World, cell: usize, i_gen: u32, policy: PreyPolicy) -> Step {
    let admissible = |tile: Tile| match policy {
        PreyPolicy::EmptyOnly => tile == Tile::Empty,
        PreyPolicy::Permissive => matches!(tile, Tile::Empty | Tile::Prey),
    };
    match select(world, cell, seed(world, cell, i_gen), admissible) {
        Some(dest) => Step::Move(dest),
        None => Step::Stay,
    }
}

/// Adjacent prey take precedence over empty cells.
pub fn predator_step(world: &World, cell: usize, i_gen: u32) -> Step {
    let seed = seed(world, cell, i_gen);
    if let Some(dest) = select(world, cell, seed, |tile| tile == Tile::Prey) {
        return Step::Hunt(dest);
    }
    match select(world, cell, seed, |tile| tile == Tile::Empty) {
        Some(dest) => Step::Move(dest),
        None => Step::Stay,
    }
}

fn select<F>(world: &World, cell: usize, seed: u64, admissible: F) -> Option<usize>
where
    F: Fn(Tile) -> bool,
{
    let mut cands = [0; 4];
    let mut n_cands = 0;
    for idx in world.neighbors(cell).into_iter().flatten() {
        if admissible(world.tile(idx)) {
            cands[n_cands] = idx;
            n_cands += 1;
        }
    }

    if n_cands == 0 {
        return None;
    }
    Some(cands[(seed % n_cands as u64) as usize])
}
