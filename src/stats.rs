//! Per-generation records and run statistics.

use crate::world::Tile;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, ops::AddAssign, path::Path};

pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Counts of what happened during one generation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub prey_born: usize,
    pub predators_born: usize,
    /// Prey removed because a predator took their cell.
    pub prey_eaten: usize,
    pub predators_starved: usize,
    /// Prey killed by losing a shared-cell conflict.
    pub prey_lost: usize,
    /// Predators killed by losing a shared-cell conflict.
    pub predators_lost: usize,
    /// Cells claimed by more than one agent of the same kind.
    pub conflicts: usize,
    /// Agents that reached their threshold but could not place an offspring.
    pub births_deferred: usize,
}

impl Events {
    pub fn n_born(&self) -> usize {
        self.prey_born + self.predators_born
    }

    pub fn n_dead(&self) -> usize {
        self.prey_eaten + self.predators_starved + self.prey_lost + self.predators_lost
    }
}

impl AddAssign for Events {
    fn add_assign(&mut self, other: Self) {
        self.prey_born += other.prey_born;
        self.predators_born += other.predators_born;
        self.prey_eaten += other.prey_eaten;
        self.predators_starved += other.predators_starved;
        self.prey_lost += other.prey_lost;
        self.predators_lost += other.predators_lost;
        self.conflicts += other.conflicts;
        self.births_deferred += other.births_deferred;
    }
}

/// Record of the simulation after one committed generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct Record {
    /// Index of the generation, starting at 0.
    pub i_gen: u32,

    pub n_prey: usize,
    pub n_predators: usize,

    pub events: Events,

    /// Flat cell layout, row-major.
    pub cells: Option<Vec<Tile>>,
}

/// Running statistics over a whole simulation.
pub struct Summary {
    n_gen: u32,
    n_prey: usize,
    n_predators: usize,
    totals: Events,
    acc_prey: Accumulator,
    acc_predators: Accumulator,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryReport {
    pub n_gen: u32,
    pub final_prey: usize,
    pub final_predators: usize,
    pub totals: Events,
    pub prey: AccumulatorReport,
    pub predators: AccumulatorReport,
}

impl Summary {
    pub fn new(n_prey: usize, n_predators: usize) -> Self {
        Self {
            n_gen: 0,
            n_prey,
            n_predators,
            totals: Events::default(),
            acc_prey: Accumulator::new(),
            acc_predators: Accumulator::new(),
        }
    }

    pub fn add(&mut self, record: &Record) {
        self.n_gen += 1;
        self.n_prey = record.n_prey;
        self.n_predators = record.n_predators;
        self.totals += record.events;
        self.acc_prey.add(record.n_prey as f64);
        self.acc_predators.add(record.n_predators as f64);
    }

    pub fn totals(&self) -> &Events {
        &self.totals
    }

    pub fn report(&self) -> SummaryReport {
        SummaryReport {
            n_gen: self.n_gen,
            final_prey: self.n_prey,
            final_predators: self.n_predators,
            totals: self.totals,
            prey: self.acc_prey.report(),
            predators: self.acc_predators.report(),
        }
    }

    /// Write the report as TOML.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let contents = toml::to_string(&self.report()).context("failed to serialize report")?;
        fs::write(file, contents).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_mean_and_std_dev() {
        let mut acc = Accumulator::new();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        let report = acc.report();
        assert!((report.mean - 5.0).abs() < 1e-12);
        assert!((report.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn accumulator_needs_two_values_for_std_dev() {
        let mut acc = Accumulator::new();
        assert!(acc.report().mean.is_nan());
        acc.add(3.0);
        assert_eq!(acc.report().mean, 3.0);
        assert!(acc.report().std_dev.is_nan());
    }

    #[test]
    fn summary_tracks_last_record_and_totals() {
        let mut summary = Summary::new(4, 2);
        let events = Events {
            prey_born: 1,
            prey_eaten: 2,
            ..Events::default()
        };
        for (i_gen, n_prey) in [(0, 3), (1, 2)] {
            summary.add(&Record {
                i_gen,
                n_prey,
                n_predators: 2,
                events,
                cells: None,
            });
        }

        let report = summary.report();
        assert_eq!(report.n_gen, 2);
        assert_eq!(report.final_prey, 2);
        assert_eq!(report.final_predators, 2);
        assert_eq!(report.totals.prey_born, 2);
        assert_eq!(report.totals.prey_eaten, 4);
        assert_eq!(summary.totals().n_dead(), 4);
        assert!((report.prey.mean - 2.5).abs() < 1e-12);
    }
}
