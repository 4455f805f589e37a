//! Grid geometry shared across the wildgrid crates: integer tile coordinates,
//! walkability rasters, Bresenham line-of-sight checks, and deterministic A*
//! pathfinding over the 8-connected grid.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Integer tile coordinate on a square grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    /// Sentinel for "no tile", used by dense caches where an `Option` per
    /// cell would be wasteful. Public APIs return `Option<Coord>` instead.
    pub const INVALID: Coord = Coord { x: -1, y: -1 };

    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.x >= 0 && self.y >= 0
    }

    /// Squared Euclidean distance, exact in integer arithmetic.
    #[must_use]
    pub const fn sqr_distance(self, other: Coord) -> i32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    #[must_use]
    pub fn distance(self, other: Coord) -> f32 {
        (self.sqr_distance(other) as f32).sqrt()
    }

    /// Chebyshev adjacency: true for the 8 surrounding tiles and for the
    /// tile itself.
    #[must_use]
    pub const fn are_neighbours(self, other: Coord) -> bool {
        (self.x - other.x).abs() <= 1 && (self.y - other.y).abs() <= 1
    }
}

impl Add for Coord {
    type Output = Coord;

    fn add(self, rhs: Coord) -> Coord {
        Coord::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Coord {
    type Output = Coord;

    fn sub(self, rhs: Coord) -> Coord {
        Coord::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The 8 step offsets around a tile, row-major.
pub const STEP_OFFSETS: [Coord; 8] = [
    Coord::new(-1, -1),
    Coord::new(0, -1),
    Coord::new(1, -1),
    Coord::new(-1, 0),
    Coord::new(1, 0),
    Coord::new(-1, 1),
    Coord::new(0, 1),
    Coord::new(1, 1),
];

/// Walkability raster over a square grid. Out-of-bounds reads are always
/// unwalkable, so callers can probe offsets without their own bounds checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMask {
    size: u32,
    cells: Vec<bool>,
}

impl GridMask {
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            size,
            cells: vec![false; (size as usize).pow(2)],
        }
    }

    /// Wraps an existing row-major cell vector. `cells` must hold exactly
    /// `size * size` entries.
    #[must_use]
    pub fn from_cells(size: u32, cells: Vec<bool>) -> Self {
        debug_assert_eq!(cells.len(), (size as usize).pow(2));
        Self { size, cells }
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn in_bounds(&self, coord: Coord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && (coord.x as u32) < self.size
            && (coord.y as u32) < self.size
    }

    const fn offset(&self, coord: Coord) -> usize {
        coord.y as usize * self.size as usize + coord.x as usize
    }

    #[must_use]
    pub fn get(&self, coord: Coord) -> bool {
        self.in_bounds(coord) && self.cells[self.offset(coord)]
    }

    pub fn set(&mut self, coord: Coord, walkable: bool) {
        if self.in_bounds(coord) {
            let idx = self.offset(coord);
            self.cells[idx] = walkable;
        }
    }

    /// Number of walkable tiles.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell).count()
    }
}

/// Line of sight between two tiles. Every tile strictly between `from` and
/// `to` along the Bresenham line must be walkable; the endpoints themselves
/// are exempt, so an unwalkable target tile (a shoreline) can still be seen.
#[must_use]
pub fn tile_is_visible(mask: &GridMask, from: Coord, to: Coord) -> bool {
    let w = to.x - from.x;
    let h = to.y - from.y;
    let dx1 = w.signum();
    let dy1 = h.signum();
    let mut longest = w.abs();
    let mut shortest = h.abs();
    let (dx2, dy2) = if longest > shortest {
        (dx1, 0)
    } else {
        std::mem::swap(&mut longest, &mut shortest);
        (0, dy1)
    };

    let mut x = from.x;
    let mut y = from.y;
    let mut numerator = longest / 2;
    for i in 0..=longest {
        if i != 0 && i != longest && !mask.get(Coord::new(x, y)) {
            return false;
        }
        numerator += shortest;
        if numerator >= longest {
            numerator -= longest;
            x += dx1;
            y += dy1;
        } else {
            x += dx2;
            y += dy2;
        }
    }
    true
}

const CARDINAL_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

fn octile(from: Coord, to: Coord) -> u32 {
    let dx = (from.x - to.x).unsigned_abs();
    let dy = (from.y - to.y).unsigned_abs();
    let (long, short) = if dx > dy { (dx, dy) } else { (dy, dx) };
    DIAGONAL_COST * short + CARDINAL_COST * (long - short)
}

/// A* over the 8-connected walkable grid with octile costs (10 cardinal,
/// 14 diagonal) and an octile heuristic, so returned paths are shortest
/// under those weights.
///
/// The path excludes `start` and ends at `goal`, or at a walkable tile
/// adjacent to `goal` when `goal` itself is unwalkable (shoreline targets
/// are approached, not entered). Returns `Some(vec![])` when no step is
/// needed and `None` when no route exists. Ties in the open set break on
/// insertion order, so equal-cost searches are reproducible.
#[must_use]
pub fn find_path(mask: &GridMask, start: Coord, goal: Coord) -> Option<Vec<Coord>> {
    if !mask.get(start) || !mask.in_bounds(goal) {
        return None;
    }
    let goal_walkable = mask.get(goal);
    let arrived =
        |coord: Coord| if goal_walkable { coord == goal } else { coord.are_neighbours(goal) };
    if arrived(start) {
        return Some(Vec::new());
    }

    let mut open: BinaryHeap<Reverse<(u32, u64, Coord)>> = BinaryHeap::new();
    let mut g_costs: HashMap<Coord, u32> = HashMap::new();
    let mut came_from: HashMap<Coord, Coord> = HashMap::new();
    let mut closed: HashSet<Coord> = HashSet::new();
    let mut seq = 0u64;

    g_costs.insert(start, 0);
    open.push(Reverse((octile(start, goal), seq, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if !closed.insert(current) {
            continue;
        }
        if arrived(current) {
            return Some(rebuild(&came_from, start, current));
        }
        let current_g = g_costs[&current];
        for step in STEP_OFFSETS {
            let next = current + step;
            if !mask.get(next) || closed.contains(&next) {
                continue;
            }
            let step_cost = if step.x != 0 && step.y != 0 {
                DIAGONAL_COST
            } else {
                CARDINAL_COST
            };
            let tentative = current_g + step_cost;
            if g_costs.get(&next).is_none_or(|&g| tentative < g) {
                g_costs.insert(next, tentative);
                came_from.insert(next, current);
                seq += 1;
                open.push(Reverse((tentative + octile(next, goal), seq, next)));
            }
        }
    }
    None
}

fn rebuild(came_from: &HashMap<Coord, Coord>, start: Coord, end: Coord) -> Vec<Coord> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            break;
        }
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
