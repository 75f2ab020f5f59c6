//! Simulation parameters and run options.

use crate::rules::PreyPolicy;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, ops::RangeBounds};

const N_HEADER_VALS: usize = 7;

/// Largest accepted grid side, keeps `width * height` well inside `usize`.
const MAX_SIDE: i64 = 1 << 15;

/// Simulation configuration parameters.
///
/// Read from the header line of an ecosystem file and validated before any
/// grid is built. See [`Config::from_header`] for parsing.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Generations a prey must live before it can reproduce.
    pub gen_proc_prey: u32,
    /// Generations a predator must live before it can reproduce.
    pub gen_proc_pred: u32,
    /// Generations a predator survives without eating.
    pub gen_food_pred: u32,

    /// Number of generations to simulate.
    pub n_gen: u32,

    /// Grid width (number of columns).
    pub width: usize,
    /// Grid height (number of rows).
    pub height: usize,

    /// Initial number of agents (prey plus predators).
    pub n_agt: usize,
}

impl Config {
    /// Parse a [`Config`] from the seven whitespace-separated integers of a header line.
    ///
    /// # Errors
    /// Returns an error if the line does not hold exactly seven integers
    /// or if any value is out of its valid range.
    pub fn from_header(line: &str) -> Result<Self> {
        let vals = line
            .split_whitespace()
            .map(|tok| {
                tok.parse::<i64>()
                    .with_context(|| format!("failed to parse {tok:?} as an integer"))
            })
            .collect::<Result<Vec<_>>>()?;

        let &[
            gen_proc_prey,
            gen_proc_pred,
            gen_food_pred,
            n_gen,
            width,
            height,
            n_agt,
        ] = vals.as_slice()
        else {
            bail!(
                "header must hold {N_HEADER_VALS} integers, but holds {}",
                vals.len()
            );
        };

        check_num(gen_proc_prey, 1..=u32::MAX as i64)
            .context("invalid prey reproduction threshold")?;
        check_num(gen_proc_pred, 1..=u32::MAX as i64)
            .context("invalid predator reproduction threshold")?;
        check_num(gen_food_pred, 1..=u32::MAX as i64)
            .context("invalid predator starvation threshold")?;
        check_num(n_gen, 0..=u32::MAX as i64).context("invalid number of generations")?;
        check_num(width, 1..=MAX_SIDE).context("invalid grid width")?;
        check_num(height, 1..=MAX_SIDE).context("invalid grid height")?;
        check_num(n_agt, 1..=width * height).context("invalid initial number of agents")?;

        Ok(Self {
            gen_proc_prey: gen_proc_prey as u32,
            gen_proc_pred: gen_proc_pred as u32,
            gen_food_pred: gen_food_pred as u32,
            n_gen: n_gen as u32,
            width: width as usize,
            height: height as usize,
            n_agt: n_agt as usize,
        })
    }

    /// Format the seven values as a header line.
    pub fn header_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {}",
            self.gen_proc_prey,
            self.gen_proc_pred,
            self.gen_food_pred,
            self.n_gen,
            self.width,
            self.height,
            self.n_agt
        )
    }

    pub fn n_cells(&self) -> usize {
        self.width * self.height
    }
}

/// Run options supplied on the command line rather than in the ecosystem file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Size of the worker thread pool used by the movement phases.
    pub n_threads: usize,
    /// Whether prey may step into cells held by other prey.
    pub prey_policy: PreyPolicy,
}

impl RunOptions {
    pub fn new(n_threads: usize, prey_policy: PreyPolicy) -> Result<Self> {
        check_num(n_threads, 1..=1024).context("invalid number of threads")?;
        Ok(Self {
            n_threads,
            prey_policy,
        })
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            n_threads: 1,
            prey_policy: PreyPolicy::default(),
        }
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
