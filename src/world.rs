//! Grid of cells and the snapshot used as the write target of a generation.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Occupant of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tile {
    #[default]
    Empty = 0,
    Rock = 1,
    Prey = 2,
    Predator = 3,
}

impl Tile {
    fn from_u8(byte: u8) -> Self {
        match byte {
            1 => Tile::Rock,
            2 => Tile::Prey,
            3 => Tile::Predator,
            _ => Tile::Empty,
        }
    }

    /// Character used by the text render.
    pub fn glyph(self) -> char {
        match self {
            Tile::Empty => ' ',
            Tile::Rock => '*',
            Tile::Prey => 'R',
            Tile::Predator => 'F',
        }
    }

    pub fn is_mobile(self) -> bool {
        matches!(self, Tile::Prey | Tile::Predator)
    }
}

/// Fixed terrain of a cell, independent of mobile occupants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terrain {
    Rock,
    Open,
}

/// Cell coordinates, `x` is the column and `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub x: usize,
    pub y: usize,
}

impl Loc {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Flat grid of tiles indexed by `y * width + x`, no wraparound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    width: usize,
    height: usize,
    cells: Vec<Tile>,
}

impl World {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width != 0 && height != 0);
        Self {
            width,
            height,
            cells: vec![Tile::Empty; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Tile] {
        &self.cells
    }

    /// Cell index of `(x, y)`, or `None` outside the grid.
    pub fn index(&self, x: usize, y: usize) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    pub fn loc(&self, idx: usize) -> Loc {
        Loc::new(idx % self.width, idx / self.width)
    }

    pub fn occupant_at(&self, x: usize, y: usize) -> Option<Tile> {
        self.index(x, y).map(|idx| self.cells[idx])
    }

    pub fn terrain_at(&self, x: usize, y: usize) -> Option<Terrain> {
        self.occupant_at(x, y).map(|tile| match tile {
            Tile::Rock => Terrain::Rock,
            _ => Terrain::Open,
        })
    }

    pub fn tile(&self, idx: usize) -> Tile {
        self.cells[idx]
    }

    pub fn set_tile(&mut self, idx: usize, tile: Tile) {
        self.cells[idx] = tile;
    }

    /// Neighbors of a cell in the fixed order north, south, east, west.
    pub fn neighbors(&self, idx: usize) -> [Option<usize>; 4] {
        let Loc { x, y } = self.loc(idx);
        [
            y.checked_sub(1).and_then(|y| self.index(x, y)),
            self.index(x, y + 1),
            self.index(x + 1, y),
            x.checked_sub(1).and_then(|x| self.index(x, y)),
        ]
    }

    /// Cleared copy of the grid: rocks kept, mobile occupants removed.
    pub fn snapshot(&self) -> Snapshot {
        let cells = self
            .cells
            .iter()
            .map(|&tile| match tile {
                Tile::Rock => AtomicU8::new(Tile::Rock as u8),
                _ => AtomicU8::new(Tile::Empty as u8),
            })
            .collect();
        Snapshot {
            width: self.width,
            height: self.height,
            cells,
        }
    }

    pub fn count(&self, tile: Tile) -> usize {
        self.cells.iter().filter(|&&t| t == tile).count()
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = "-".repeat(self.width + 2);
        writeln!(f, "{border}")?;
        for row in self.cells.chunks(self.width) {
            let line: String = row.iter().map(|tile| tile.glyph()).collect();
            writeln!(f, "|{line}|")?;
        }
        write!(f, "{border}")
    }
}

/// Write target of one generation.
///
/// Movement tasks store tags into it concurrently. Several tasks may store
/// into the same cell, which is fine since every store of a phase writes the
/// tag of that phase's kind and overlaps are reconciled afterwards.
#[derive(Debug)]
pub struct Snapshot {
    width: usize,
    height: usize,
    cells: Vec<AtomicU8>,
}

impl Snapshot {
    pub fn mark(&self, idx: usize, tile: Tile) {
        self.cells[idx].store(tile as u8, Ordering::Relaxed);
    }

    pub fn tile(&self, idx: usize) -> Tile {
        Tile::from_u8(self.cells[idx].load(Ordering::Relaxed))
    }

    /// Read-only copy of the current contents.
    pub fn freeze(&self) -> World {
        World {
            width: self.width,
            height: self.height,
            cells: (0..self.cells.len()).map(|idx| self.tile(idx)).collect(),
        }
    }

    pub fn into_world(self) -> World {
        World {
            width: self.width,
            height: self.height,
            cells: self
                .cells
                .into_iter()
                .map(|cell| Tile::from_u8(cell.into_inner()))
                .collect(),
        }
    }
}
