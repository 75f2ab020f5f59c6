//! Text format of initial and final states.
//!
//! The first line holds the seven configuration values, every other
//! non-blank line places one occupant as `<KIND> <x> <y>`.

use crate::config::{Config, check_num};
use crate::world::{Loc, Tile, World};
use anyhow::{Context, Result, bail};
use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// One occupant placed on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub tile: Tile,
    pub loc: Loc,
}

/// Configuration plus the occupants of every non-empty cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Ecosystem {
    pub cfg: Config,
    pub placements: Vec<Placement>,
}

impl Ecosystem {
    /// Load an [`Ecosystem`] from a text file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid
    /// ecosystem description (see [`Ecosystem::parse`]).
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {file:?}"))
    }

    /// Parse an ecosystem description.
    ///
    /// Kinds are `ROCK`, `RABBIT` or `PREY`, and `FOX` or `PREDATOR`.
    /// Coordinates outside the grid and cells placed twice are rejected.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents.lines().enumerate();

        let (_, header) = lines.next().context("missing header line")?;
        let cfg = Config::from_header(header).context("invalid header line")?;

        let mut placed = vec![false; cfg.n_cells()];
        let mut placements = Vec::new();
        for (i_line, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let placement = parse_placement(line, &cfg)
                .with_context(|| format!("invalid line {}: {line:?}", i_line + 1))?;

            let idx = placement.loc.y * cfg.width + placement.loc.x;
            if placed[idx] {
                bail!(
                    "line {}: cell {} is placed more than once",
                    i_line + 1,
                    placement.loc
                );
            }
            placed[idx] = true;
            placements.push(placement);
        }

        Ok(Self { cfg, placements })
    }

    /// Describe `world` under `cfg`, listing cells in row-major order.
    pub fn from_world(cfg: Config, world: &World) -> Self {
        let placements = world
            .cells()
            .iter()
            .enumerate()
            .filter(|&(_, &tile)| tile != Tile::Empty)
            .map(|(idx, &tile)| Placement {
                tile,
                loc: world.loc(idx),
            })
            .collect();
        Self { cfg, placements }
    }

    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        write!(writer, "{self}").context("failed to write ecosystem")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.cfg.header_line())?;
        for Placement { tile, loc } in &self.placements {
            writeln!(f, "{} {} {}", tag(*tile), loc.x, loc.y)?;
        }
        Ok(())
    }
}

fn tag(tile: Tile) -> &'static str {
    match tile {
        Tile::Empty => "EMPTY",
        Tile::Rock => "ROCK",
        Tile::Prey => "PREY",
        Tile::Predator => "PREDATOR",
    }
}

fn parse_placement(line: &str, cfg: &Config) -> Result<Placement> {
    let toks: Vec<_> = line.split_whitespace().collect();
    let &[kind, x, y] = toks.as_slice() else {
        bail!("expected `<KIND> <x> <y>`, but found {} fields", toks.len());
    };

    let tile = match kind {
        "ROCK" => Tile::Rock,
        "RABBIT" | "PREY" => Tile::Prey,
        "FOX" | "PREDATOR" => Tile::Predator,
        _ => bail!("unknown kind {kind:?}"),
    };

    let x: usize = x
        .parse()
        .with_context(|| format!("failed to parse x coordinate {x:?}"))?;
    let y: usize = y
        .parse()
        .with_context(|| format!("failed to parse y coordinate {y:?}"))?;
    check_num(x, 0..cfg.width).context("x coordinate outside the grid")?;
    check_num(y, 0..cfg.height).context("y coordinate outside the grid")?;

    Ok(Placement {
        tile,
        loc: Loc::new(x, y),
    })
}
