//! Generation engine.
//!
//! Drives the movement phases on a dedicated thread pool, reconciles the
//! claims they produce and commits each generation.

use crate::config::{Config, RunOptions};
use crate::ecosystem::Ecosystem;
use crate::model::{Agent, Pool, Predator, Prey, Slot};
use crate::resolver::{self, Claim};
use crate::rules::{self, Step};
use crate::stats::{Events, Record, Summary};
use crate::world::{Snapshot, Tile, World};
use anyhow::{Context, Result, bail};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use rmp_serde::encode;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Result of one predator's movement task.
enum Hunt {
    Moved(Claim),
    Starved,
}

/// Simulation engine.
///
/// Owns the world, both agent pools and the run counters, and advances the
/// ecosystem one generation at a time. Each generation is computed into a
/// snapshot of the world that replaces it once every overlap is resolved.
pub struct Engine {
    cfg: Config,
    opts: RunOptions,
    world: World,
    prey: Pool<Prey>,
    predators: Pool<Predator>,
    /// Index of the next generation.
    i_gen: u32,
    n_gen_left: u32,
    n_agt: usize,
    thread_pool: ThreadPool,
}

impl Engine {
    /// Create a new `Engine` from an initial ecosystem.
    pub fn new(eco: Ecosystem, opts: RunOptions) -> Result<Self> {
        let Ecosystem { cfg, placements } = eco;

        let mut world = World::new(cfg.width, cfg.height);
        let mut prey = Pool::new(cfg.n_cells());
        let mut predators = Pool::new(cfg.n_cells());
        for placement in placements {
            let loc = placement.loc;
            let idx = world
                .index(loc.x, loc.y)
                .with_context(|| format!("cell {loc} is outside the grid"))?;
            if world.tile(idx) != Tile::Empty {
                bail!("cell {loc} is already occupied");
            }
            world.set_tile(idx, placement.tile);
            match placement.tile {
                Tile::Prey => {
                    prey.spawn(Prey::newborn(idx))?;
                }
                Tile::Predator => {
                    predators.spawn(Predator::newborn(idx))?;
                }
                Tile::Rock | Tile::Empty => {}
            }
        }

        let n_agt = prey.len() + predators.len();
        if n_agt != cfg.n_agt {
            log::warn!(
                "header announces {} agents, but {n_agt} were placed",
                cfg.n_agt
            );
        }

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(opts.n_threads)
            .build()
            .context("failed to build thread pool")?;

        Ok(Self {
            n_gen_left: cfg.n_gen,
            cfg,
            opts,
            world,
            prey,
            predators,
            i_gen: 0,
            n_agt,
            thread_pool,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn prey(&self) -> &Pool<Prey> {
        &self.prey
    }

    pub fn predators(&self) -> &Pool<Predator> {
        &self.predators
    }

    /// Number of generations completed so far.
    pub fn i_gen(&self) -> u32 {
        self.i_gen
    }

    pub fn n_gen_left(&self) -> u32 {
        self.n_gen_left
    }

    /// Current population, prey plus predators.
    pub fn n_agt(&self) -> usize {
        self.n_agt
    }

    /// Current state as an ecosystem with the remaining generation budget.
    pub fn ecosystem(&self) -> Ecosystem {
        let cfg = Config {
            n_gen: self.n_gen_left,
            n_agt: self.n_agt,
            ..self.cfg.clone()
        };
        Ecosystem::from_world(cfg, &self.world)
    }

    /// Write the current state to a text file.
    ///
    /// The engine itself is left untouched if writing fails.
    pub fn save_state<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        self.ecosystem().save(file)
    }

    /// Run the remaining generations.
    ///
    /// If `trajectory` is given, one MessagePack record per generation is
    /// written to it, including the cell layout.
    pub fn perform_simulation(&mut self, trajectory: Option<&Path>) -> Result<Summary> {
        let mut writer = match trajectory {
            Some(file) => {
                let file =
                    File::create(file).with_context(|| format!("failed to create {file:?}"))?;
                Some(BufWriter::new(file))
            }
            None => None,
        };

        let mut summary = Summary::new(self.prey.len(), self.predators.len());

        let n_gen_total = self.n_gen_left;
        let gens_per_log = (n_gen_total / 10).max(1);
        while self.n_gen_left > 0 {
            let mut record = self
                .perform_generation()
                .with_context(|| format!("failed to perform generation {}", self.i_gen))?;

            if let Some(writer) = writer.as_mut() {
                record.cells = Some(self.world.cells().to_vec());
                encode::write(writer, &record).context("failed to serialize record")?;
            }
            summary.add(&record);

            let n_done = n_gen_total - self.n_gen_left;
            if n_done % gens_per_log == 0 || self.n_gen_left == 0 {
                let progress = 100.0 * n_done as f64 / n_gen_total as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        if let Some(mut writer) = writer {
            writer.flush().context("failed to flush writer stream")?;
        }

        Ok(summary)
    }

    /// Advance the ecosystem by one generation.
    pub fn perform_generation(&mut self) -> Result<Record> {
        if self.n_gen_left == 0 {
            bail!("generation budget is exhausted");
        }

        let mut events = Events::default();
        let snap = self.world.snapshot();

        let prey_claims = self.move_prey(&snap);
        let conflicts = resolver::detect(&prey_claims, &self.prey);
        events.conflicts += conflicts.n_cells;
        events.prey_lost = resolver::apply(&conflicts, &mut self.prey);

        let mid_world = self.prey_resolved_world(&snap);
        let (pred_claims, n_starved) = self.move_predators(&mid_world, &snap);
        events.predators_starved = n_starved;
        let conflicts = resolver::detect(&pred_claims, &self.predators);
        events.conflicts += conflicts.n_cells;
        events.predators_lost = resolver::apply(&conflicts, &mut self.predators);

        events.prey_eaten = self.remove_eaten(&snap);

        let (prey_born, prey_deferred) =
            reproduce(&mut self.prey, &prey_claims, self.cfg.gen_proc_prey, &snap)
                .context("failed to reproduce prey")?;
        let (predators_born, predators_deferred) = reproduce(
            &mut self.predators,
            &pred_claims,
            self.cfg.gen_proc_pred,
            &snap,
        )
        .context("failed to reproduce predators")?;
        events.prey_born = prey_born;
        events.predators_born = predators_born;
        events.births_deferred = prey_deferred + predators_deferred;

        self.n_agt = self.n_agt + events.n_born() - events.n_dead();
        self.world = snap.into_world();

        if cfg!(debug_assertions) {
            self.verify().context("invariant violated")?;
        }

        let record = Record {
            i_gen: self.i_gen,
            n_prey: self.prey.len(),
            n_predators: self.predators.len(),
            events,
            cells: None,
        };
        log::debug!(
            "generation {}: {} prey, {} predators, {events:?}",
            record.i_gen,
            record.n_prey,
            record.n_predators
        );

        self.i_gen += 1;
        self.n_gen_left -= 1;

        Ok(record)
    }

    /// Check that occupied cells and live agents are in one-to-one correspondence.
    pub fn verify(&self) -> Result<()> {
        check_pool(&self.world, &self.prey)?;
        check_pool(&self.world, &self.predators)?;

        let n_prey_tiles = self.world.count(Tile::Prey);
        if n_prey_tiles != self.prey.len() {
            bail!(
                "{n_prey_tiles} prey cells, but {} live prey",
                self.prey.len()
            );
        }
        let n_pred_tiles = self.world.count(Tile::Predator);
        if n_pred_tiles != self.predators.len() {
            bail!(
                "{n_pred_tiles} predator cells, but {} live predators",
                self.predators.len()
            );
        }

        let n_live = self.prey.len() + self.predators.len();
        if self.n_agt != n_live {
            bail!("population is {}, but {n_live} agents are live", self.n_agt);
        }
        Ok(())
    }

    fn move_prey(&mut self, snap: &Snapshot) -> Vec<Claim> {
        let Self {
            world,
            prey,
            thread_pool,
            i_gen,
            opts,
            ..
        } = self;
        let (world, i_gen, policy) = (&*world, *i_gen, opts.prey_policy);

        thread_pool.install(|| {
            prey.slots_mut()
                .par_iter_mut()
                .enumerate()
                .filter_map(|(i_slot, slot)| {
                    let agt = slot.agent_mut()?;
                    let origin = agt.cell;
                    let dest = rules::prey_step(world, origin, i_gen, policy).dest(origin);
                    snap.mark(dest, Tile::Prey);
                    agt.cell = dest;
                    log::trace!("prey {i_slot}: {} -> {}", world.loc(origin), world.loc(dest));
                    Some(Claim {
                        i_slot,
                        origin,
                        dest,
                    })
                })
                .collect()
        })
    }

    /// Frozen view read by predators: rocks and resolved prey from the
    /// snapshot plus every predator at its position before this generation.
    fn prey_resolved_world(&self, snap: &Snapshot) -> World {
        let mut world = snap.freeze();
        for (_, agt) in self.predators.iter() {
            world.set_tile(agt.cell, Tile::Predator);
        }
        world
    }

    fn move_predators(&mut self, mid_world: &World, snap: &Snapshot) -> (Vec<Claim>, usize) {
        let Self {
            predators,
            thread_pool,
            i_gen,
            cfg,
            ..
        } = self;
        let (i_gen, gen_food) = (*i_gen, cfg.gen_food_pred);

        let outcomes: Vec<Hunt> = thread_pool.install(|| {
            predators
                .slots_mut()
                .par_iter_mut()
                .enumerate()
                .filter_map(|(i_slot, slot)| {
                    let agt = slot.agent_mut()?;
                    let origin = agt.cell;
                    let step = rules::predator_step(mid_world, origin, i_gen);
                    match step {
                        Step::Hunt(_) => agt.hunger = 0,
                        Step::Move(_) | Step::Stay => {
                            agt.hunger += 1;
                            if agt.hunger >= gen_food {
                                log::trace!("predator {i_slot} starved at {}", mid_world.loc(origin));
                                *slot = Slot::Free;
                                return Some(Hunt::Starved);
                            }
                        }
                    }
                    let dest = step.dest(origin);
                    snap.mark(dest, Tile::Predator);
                    agt.cell = dest;
                    log::trace!(
                        "predator {i_slot}: {} -> {} ({step:?})",
                        mid_world.loc(origin),
                        mid_world.loc(dest)
                    );
                    Some(Hunt::Moved(Claim {
                        i_slot,
                        origin,
                        dest,
                    }))
                })
                .collect()
        });

        let mut claims = Vec::with_capacity(outcomes.len());
        let mut n_starved = 0;
        for outcome in outcomes {
            match outcome {
                Hunt::Moved(claim) => claims.push(claim),
                Hunt::Starved => n_starved += 1,
            }
        }
        predators.note_freed(n_starved);

        (claims, n_starved)
    }

    /// Remove prey whose cell was taken by a predator.
    fn remove_eaten(&mut self, snap: &Snapshot) -> usize {
        let eaten: Vec<_> = self
            .prey
            .iter()
            .filter(|(_, agt)| snap.tile(agt.cell) == Tile::Predator)
            .map(|(i_slot, _)| i_slot)
            .collect();
        for &i_slot in &eaten {
            self.prey.free(i_slot);
        }
        eaten.len()
    }
}

/// Age every surviving claimant and let those at `threshold` that moved
/// leave an offspring on the cell they came from.
///
/// The offspring is placed only if that cell is still empty; otherwise the
/// birth is deferred and the parent keeps its age. Returns the number of
/// births and of deferred births.
fn reproduce<A: Agent>(
    pool: &mut Pool<A>,
    claims: &[Claim],
    threshold: u32,
    snap: &Snapshot,
) -> Result<(usize, usize)> {
    let mut births = Vec::new();
    let mut n_deferred = 0;
    for claim in claims {
        let Some(agt) = pool.get_mut(claim.i_slot) else {
            continue;
        };
        let age = agt.age().saturating_add(1);
        if age < threshold {
            agt.set_age(age);
        } else if claim.moved() && snap.tile(claim.origin) == Tile::Empty {
            agt.set_age(0);
            births.push(claim.origin);
        } else {
            agt.set_age(age);
            n_deferred += 1;
        }
    }

    for &cell in &births {
        pool.spawn(A::newborn(cell))?;
        snap.mark(cell, A::KIND.tile());
    }
    Ok((births.len(), n_deferred))
}

fn check_pool<A: Agent>(world: &World, pool: &Pool<A>) -> Result<()> {
    let tile = A::KIND.tile();
    for (i_slot, agt) in pool.iter() {
        let found = world.tile(agt.cell());
        if found != tile {
            bail!(
                "slot {i_slot} of {:?} sits on {} which holds {found:?}",
                A::KIND,
                world.loc(agt.cell())
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PreyPolicy;

    fn engine(contents: &str) -> Engine {
        engine_with(contents, RunOptions::default())
    }

    fn engine_with(contents: &str, opts: RunOptions) -> Engine {
        let eco = Ecosystem::parse(contents).unwrap();
        Engine::new(eco, opts).unwrap()
    }

    fn tile_at(engine: &Engine, x: usize, y: usize) -> Tile {
        engine.world().occupant_at(x, y).unwrap()
    }

    #[test]
    fn lone_prey_moves_east_in_first_generation() {
        let mut engine = engine("100 100 100 1 3 3 1\nRABBIT 1 1\n");
        let record = engine.perform_generation().unwrap();

        assert_eq!(tile_at(&engine, 1, 1), Tile::Empty);
        assert_eq!(tile_at(&engine, 2, 1), Tile::Prey);
        assert_eq!(record.n_prey, 1);
        assert_eq!(engine.prey().get(0).map(|agt| (agt.cell, agt.age)), Some((5, 1)));
        assert_eq!(engine.n_gen_left(), 0);
        assert!(engine.perform_generation().is_err());
    }

    #[test]
    fn older_prey_wins_shared_destination() {
        // Both prey can only reach (2,2): (1,2) is boxed by rock, (2,1) too.
        let contents = "100 100 100 1 3 3 2\n\
                        ROCK 0 2\nROCK 1 1\nROCK 2 0\n\
                        RABBIT 1 2\nRABBIT 2 1\n";
        let mut engine = engine(contents);
        engine.prey.get_mut(0).unwrap().age = 3;
        engine.prey.get_mut(1).unwrap().age = 5;

        let record = engine.perform_generation().unwrap();

        assert_eq!(record.events.conflicts, 1);
        assert_eq!(record.events.prey_lost, 1);
        assert_eq!(engine.n_agt(), 1);
        assert!(engine.prey().get(0).is_none());
        assert_eq!(engine.prey().get(1).map(|agt| agt.age), Some(6));
        assert_eq!(tile_at(&engine, 2, 2), Tile::Prey);
        assert_eq!(tile_at(&engine, 1, 2), Tile::Empty);
        assert_eq!(tile_at(&engine, 2, 1), Tile::Empty);
    }

    #[test]
    fn boxed_in_agents_never_move_or_vanish() {
        let contents = "100 100 100 20 3 3 1\n\
                        ROCK 1 0\nROCK 0 1\nROCK 2 1\nROCK 1 2\nRABBIT 1 1\n";
        let mut engine = engine(contents);
        engine.perform_simulation(None).unwrap();
        assert_eq!(tile_at(&engine, 1, 1), Tile::Prey);
        assert_eq!(engine.n_agt(), 1);
        assert_eq!(engine.prey().get(0).map(|agt| agt.age), Some(20));
    }

    #[test]
    fn predator_starves_exactly_at_threshold() {
        let contents = "100 100 3 5 3 1 1\nFOX 0 0\n";
        let mut engine = engine(contents);

        for _ in 0..2 {
            let record = engine.perform_generation().unwrap();
            assert_eq!(record.n_predators, 1);
            assert_eq!(record.events.predators_starved, 0);
        }
        let record = engine.perform_generation().unwrap();
        assert_eq!(record.n_predators, 0);
        assert_eq!(record.events.predators_starved, 1);
        assert_eq!(engine.n_agt(), 0);
        assert_eq!(engine.world().count(Tile::Predator), 0);
    }

    #[test]
    fn predator_eats_adjacent_prey() {
        // Prey at (1,0) is boxed in and stays; the predator at (0,0) hunts it.
        let contents = "100 100 2 1 3 2 2\n\
                        FOX 0 0\nRABBIT 1 0\nROCK 2 0\nROCK 1 1\n";
        let mut engine = engine(contents);
        let record = engine.perform_generation().unwrap();

        assert_eq!(record.events.prey_eaten, 1);
        assert_eq!(record.n_prey, 0);
        assert_eq!(record.n_predators, 1);
        assert_eq!(tile_at(&engine, 1, 0), Tile::Predator);
        assert_eq!(tile_at(&engine, 0, 0), Tile::Empty);
        assert_eq!(engine.predators().get(0).map(|agt| agt.hunger), Some(0));
    }

    #[test]
    fn feeding_resets_starvation() {
        // The predator would starve at the end of generation 0 without food.
        let contents = "100 100 1 1 3 2 2\n\
                        FOX 0 0\nRABBIT 1 0\nROCK 2 0\nROCK 1 1\n";
        let mut engine = engine(contents);
        let record = engine.perform_generation().unwrap();
        assert_eq!(record.events.predators_starved, 0);
        assert_eq!(record.n_predators, 1);
    }

    #[test]
    fn reproduction_leaves_offspring_on_prior_cell() {
        let contents = "1 100 100 1 3 1 1\nRABBIT 0 0\n";
        let mut engine = engine(contents);
        let record = engine.perform_generation().unwrap();

        assert_eq!(record.events.prey_born, 1);
        assert_eq!(record.n_prey, 2);
        assert_eq!(engine.n_agt(), 2);
        assert_eq!(tile_at(&engine, 0, 0), Tile::Prey);
        assert_eq!(tile_at(&engine, 1, 0), Tile::Prey);
        assert_eq!(engine.prey().get(0).map(|agt| (agt.cell, agt.age)), Some((1, 0)));
        assert_eq!(engine.prey().get(1).map(|agt| (agt.cell, agt.age)), Some((0, 0)));
    }

    #[test]
    fn reproduction_waits_until_agent_can_move() {
        let contents = "1 100 100 1 1 1 1\nRABBIT 0 0\n";
        let mut engine = engine(contents);
        let record = engine.perform_generation().unwrap();
        assert_eq!(record.events.prey_born, 0);
        assert_eq!(record.events.births_deferred, 1);
        assert_eq!(engine.prey().get(0).map(|agt| agt.age), Some(1));
    }

    #[test]
    fn predator_offspring_and_parent_hunger() {
        let contents = "100 2 10 2 4 1 1\nFOX 0 0\n";
        let mut engine = engine(contents);
        engine.perform_generation().unwrap();
        let record = engine.perform_generation().unwrap();
        assert_eq!(record.events.predators_born, 1);
        assert_eq!(record.n_predators, 2);
        let parent = engine.predators().get(0).unwrap();
        assert_eq!((parent.age, parent.hunger), (0, 2));
        let child = engine.predators().get(1).unwrap();
        assert_eq!((child.age, child.hunger), (0, 0));
    }

    #[test]
    fn prey_policy_decides_moves_into_prey_cells() {
        // (0,0) is boxed by rock to the south and prey to the east.
        let contents = "100 100 100 1 2 2 2\n\
                        RABBIT 0 0\nRABBIT 1 0\nROCK 0 1\nROCK 1 1\n";

        let mut strict = engine(contents);
        let record = strict.perform_generation().unwrap();
        assert_eq!(record.n_prey, 2);
        assert_eq!(record.events.conflicts, 0);

        let opts = RunOptions::new(1, PreyPolicy::Permissive).unwrap();
        let mut loose = engine_with(contents, opts);
        let record = loose.perform_generation().unwrap();
        // The prey swap cells, which is not a conflict.
        assert_eq!(record.n_prey, 2);
        assert_eq!(loose.prey().get(0).map(|agt| agt.cell), Some(1));
        assert_eq!(loose.prey().get(1).map(|agt| agt.cell), Some(0));
    }

    #[test]
    fn invariants_hold_on_a_busy_grid() {
        let mut engine = engine(&busy_ecosystem());
        while engine.n_gen_left() > 0 {
            engine.perform_generation().unwrap();
            engine.verify().unwrap();
        }
    }

    #[test]
    fn outcome_does_not_depend_on_thread_count() {
        let contents = busy_ecosystem();
        let mut states = Vec::new();
        for (n_threads, policy) in [
            (1, PreyPolicy::EmptyOnly),
            (4, PreyPolicy::EmptyOnly),
            (1, PreyPolicy::Permissive),
            (3, PreyPolicy::Permissive),
        ] {
            let opts = RunOptions::new(n_threads, policy).unwrap();
            let mut engine = engine_with(&contents, opts);
            engine.perform_simulation(None).unwrap();
            states.push(engine.ecosystem().to_string());
        }
        assert_eq!(states[0], states[1]);
        assert_eq!(states[2], states[3]);
    }

    #[test]
    fn final_ecosystem_reports_remaining_budget() {
        let mut engine = engine("100 100 100 2 3 3 1\nRABBIT 1 1\nROCK 0 0\n");
        engine.perform_simulation(None).unwrap();
        let eco = engine.ecosystem();
        assert_eq!(eco.cfg.n_gen, 0);
        assert_eq!(eco.cfg.n_agt, 1);
        assert_eq!(eco.placements.len(), 2);
    }

    #[test]
    fn rejects_placements_on_occupied_cells() {
        let mut eco = Ecosystem::parse("1 1 1 1 3 3 1\nRABBIT 1 1\n").unwrap();
        eco.placements.push(eco.placements[0]);
        assert!(Engine::new(eco, RunOptions::default()).is_err());
    }

    fn busy_ecosystem() -> String {
        let (width, height) = (12, 9);
        let mut lines = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let kind = match (x * 7 + y * 3) % 11 {
                    0 => "ROCK",
                    1 | 4 | 6 => "RABBIT",
                    2 => "FOX",
                    _ => continue,
                };
                lines.push(format!("{kind} {x} {y}"));
            }
        }
        let n_agt = lines.iter().filter(|line| !line.starts_with("ROCK")).count();
        format!("2 4 3 30 {width} {height} {n_agt}\n{}\n", lines.join("\n"))
    }
}
