//! Reconciliation of overlapping moves.
//!
//! Detection is a pure read over the full claim set of a phase; kills are
//! applied afterwards in a separate pass.

use crate::model::{Agent, Pool};
use std::cmp::Reverse;

/// Move made by the agent in slot `i_slot` during one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub i_slot: usize,
    pub origin: usize,
    pub dest: usize,
}

impl Claim {
    pub fn moved(&self) -> bool {
        self.origin != self.dest
    }
}

/// Outcome of conflict detection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Conflicts {
    /// Cells claimed by two or more agents.
    pub n_cells: usize,
    /// Slots that lost, in ascending order.
    pub losers: Vec<usize>,
}

/// Find every cell with several claimants and pick a single survivor for each.
///
/// The survivor has the highest [`Agent::priority`]; remaining ties go to
/// the lowest slot index.
pub fn detect<A: Agent>(claims: &[Claim], pool: &Pool<A>) -> Conflicts {
    let mut by_dest: Vec<&Claim> = claims.iter().collect();
    by_dest.sort_unstable_by_key(|claim| (claim.dest, claim.i_slot));

    let mut conflicts = Conflicts::default();
    for group in by_dest.chunk_by(|a, b| a.dest == b.dest) {
        if group.len() < 2 {
            continue;
        }
        conflicts.n_cells += 1;

        let Some(winner) = group.iter().max_by_key(|claim| {
            let priority = pool.get(claim.i_slot).map(Agent::priority);
            (priority, Reverse(claim.i_slot))
        }) else {
            continue;
        };
        conflicts.losers.extend(
            group
                .iter()
                .filter(|claim| claim.i_slot != winner.i_slot)
                .map(|claim| claim.i_slot),
        );
    }
    conflicts.losers.sort_unstable();
    conflicts
}

/// Free the slots of all losers. Returns the number of agents killed.
pub fn apply<A: Agent>(conflicts: &Conflicts, pool: &mut Pool<A>) -> usize {
    conflicts
        .losers
        .iter()
        .filter(|&&i_slot| pool.free(i_slot).is_some())
        .count()
}
