//! Agent kinds and the slot pools that hold them.

use crate::world::Tile;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Mobile population an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Prey,
    Predator,
}

impl Kind {
    pub fn tile(self) -> Tile {
        match self {
            Kind::Prey => Tile::Prey,
            Kind::Predator => Tile::Predator,
        }
    }
}

/// Rank used by the conflict resolver, larger wins.
///
/// Higher reproduction age first, then lower starvation counter.
pub type Priority = (u32, Reverse<u32>);

/// Behavior shared by both agent kinds.
pub trait Agent: Send {
    const KIND: Kind;

    /// New agent with zeroed counters placed on `cell`.
    fn newborn(cell: usize) -> Self;

    fn cell(&self) -> usize;

    fn set_cell(&mut self, cell: usize);

    /// Generations since the last reproduction.
    fn age(&self) -> u32;

    fn set_age(&mut self, age: u32);

    fn priority(&self) -> Priority;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prey {
    pub cell: usize,
    pub age: u32,
}

impl Agent for Prey {
    const KIND: Kind = Kind::Prey;

    fn newborn(cell: usize) -> Self {
        Self { cell, age: 0 }
    }

    fn cell(&self) -> usize {
        self.cell
    }

    fn set_cell(&mut self, cell: usize) {
        self.cell = cell;
    }

    fn age(&self) -> u32 {
        self.age
    }

    fn set_age(&mut self, age: u32) {
        self.age = age;
    }

    fn priority(&self) -> Priority {
        (self.age, Reverse(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predator {
    pub cell: usize,
    pub age: u32,
    /// Generations since the last kill.
    pub hunger: u32,
}

impl Agent for Predator {
    const KIND: Kind = Kind::Predator;

    fn newborn(cell: usize) -> Self {
        Self {
            cell,
            age: 0,
            hunger: 0,
        }
    }

    fn cell(&self) -> usize {
        self.cell
    }

    fn set_cell(&mut self, cell: usize) {
        self.cell = cell;
    }

    fn age(&self) -> u32 {
        self.age
    }

    fn set_age(&mut self, age: u32) {
        self.age = age;
    }

    fn priority(&self) -> Priority {
        (self.age, Reverse(self.hunger))
    }
}

/// Pool slot, either holding a live agent or free for reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<A> {
    Occupied(A),
    Free,
}

impl<A> Slot<A> {
    pub fn agent(&self) -> Option<&A> {
        match self {
            Slot::Occupied(agt) => Some(agt),
            Slot::Free => None,
        }
    }

    pub fn agent_mut(&mut self) -> Option<&mut A> {
        match self {
            Slot::Occupied(agt) => Some(agt),
            Slot::Free => None,
        }
    }
}

/// Fixed-capacity array of agent slots.
///
/// Dead agents are tombstoned as [`Slot::Free`], never removed, so slot
/// indices stay valid for the whole run.
#[derive(Debug, Clone)]
pub struct Pool<A> {
    slots: Vec<Slot<A>>,
    n_live: usize,
    // No free slot exists below this index.
    free_hint: usize,
}

impl<A: Agent> Pool<A> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Free);
        Self {
            slots,
            n_live: 0,
            free_hint: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.n_live
    }

    pub fn is_empty(&self) -> bool {
        self.n_live == 0
    }

    /// Place `agt` into the lowest free slot and return its index.
    pub fn spawn(&mut self, agt: A) -> Result<usize> {
        let Some(i_slot) = (self.free_hint..self.slots.len())
            .find(|&i_slot| matches!(self.slots[i_slot], Slot::Free))
        else {
            bail!("pool of capacity {} is full", self.slots.len());
        };
        self.slots[i_slot] = Slot::Occupied(agt);
        self.n_live += 1;
        self.free_hint = i_slot + 1;
        Ok(i_slot)
    }

    /// Tombstone a slot, returning the agent it held.
    pub fn free(&mut self, i_slot: usize) -> Option<A> {
        match std::mem::replace(&mut self.slots[i_slot], Slot::Free) {
            Slot::Occupied(agt) => {
                self.n_live -= 1;
                self.free_hint = self.free_hint.min(i_slot);
                Some(agt)
            }
            Slot::Free => None,
        }
    }

    pub fn get(&self, i_slot: usize) -> Option<&A> {
        self.slots.get(i_slot).and_then(Slot::agent)
    }

    pub fn get_mut(&mut self, i_slot: usize) -> Option<&mut A> {
        self.slots.get_mut(i_slot).and_then(Slot::agent_mut)
    }

    /// Live agents with their slot indices, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &A)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i_slot, slot)| slot.agent().map(|agt| (i_slot, agt)))
    }

    /// Raw slots, for movement phases that hand each slot to its own task.
    ///
    /// Callers that free slots through this view must report the deaths
    /// with [`Pool::note_freed`].
    pub fn slots_mut(&mut self) -> &mut [Slot<A>] {
        &mut self.slots
    }

    /// Account for slots freed through [`Pool::slots_mut`].
    pub fn note_freed(&mut self, n_freed: usize) {
        self.n_live -= n_freed;
        self.free_hint = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_takes_lowest_free_slot() {
        let mut pool = Pool::<Prey>::new(4);
        assert_eq!(pool.spawn(Prey::newborn(10)).unwrap(), 0);
        assert_eq!(pool.spawn(Prey::newborn(11)).unwrap(), 1);
        assert_eq!(pool.spawn(Prey::newborn(12)).unwrap(), 2);
        assert_eq!(pool.len(), 3);

        assert_eq!(pool.free(1), Some(Prey::newborn(11)));
        assert_eq!(pool.free(1), None);
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.spawn(Prey::newborn(13)).unwrap(), 1);
        assert_eq!(pool.spawn(Prey::newborn(14)).unwrap(), 3);
        assert!(pool.spawn(Prey::newborn(15)).is_err());
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut pool = Pool::<Predator>::new(3);
        pool.spawn(Predator::newborn(0)).unwrap();
        pool.spawn(Predator::newborn(1)).unwrap();
        pool.spawn(Predator::newborn(2)).unwrap();
        pool.free(1);
        let cells: Vec<_> = pool.iter().map(|(i_slot, agt)| (i_slot, agt.cell)).collect();
        assert_eq!(cells, vec![(0, 0), (2, 2)]);
        assert!(pool.get(1).is_none());
        assert_eq!(pool.get(2).map(|agt| agt.cell), Some(2));
    }

    #[test]
    fn slots_freed_in_place_are_reused() {
        let mut pool = Pool::<Prey>::new(3);
        pool.spawn(Prey::newborn(0)).unwrap();
        pool.spawn(Prey::newborn(1)).unwrap();
        pool.slots_mut()[0] = Slot::Free;
        pool.note_freed(1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.spawn(Prey::newborn(2)).unwrap(), 0);
    }

    #[test]
    fn predator_priority_prefers_age_then_recent_food() {
        let old = Predator {
            cell: 0,
            age: 5,
            hunger: 4,
        };
        let young = Predator {
            cell: 0,
            age: 3,
            hunger: 0,
        };
        let fed = Predator {
            cell: 0,
            age: 5,
            hunger: 1,
        };
        assert!(old.priority() > young.priority());
        assert!(fed.priority() > old.priority());
    }
}
