//! Static world structure: terrain inputs and the precomputed caches every
//! sensing query leans on. A [`WorldGrid`] is built once per world and never
//! changes afterwards, so lookups during the tick loop are plain reads.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wildgrid_geom::{Coord, GridMask, STEP_OFFSETS, tile_is_visible};

use crate::{MAX_VIEW_DISTANCE, Position};

/// Errors raised while parsing or validating terrain input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TerrainError {
    #[error("terrain map is empty")]
    Empty,
    #[error("terrain map must be square: {rows} rows of {columns} tiles")]
    NotSquare { rows: usize, columns: usize },
    #[error("terrain row {row} has {found} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown terrain tile {0:?} in row {1}")]
    UnknownTile(char, usize),
    #[error("terrain field {field} holds {found} entries, expected {expected}")]
    WrongLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Raw terrain handed to the world: per-tile walkability, shore flags (water
/// tiles with open land on a cardinal side), and world-space tile centres.
/// Row-major, `size * size` entries each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainData {
    pub size: u32,
    pub walkable: Vec<bool>,
    pub shore: Vec<bool>,
    pub tile_centres: Vec<Position>,
}

impl TerrainData {
    /// Parses the ASCII fixture format: `~` water, `.` open land, `#`
    /// blocked land. Rows are lines; surrounding blank lines and indentation
    /// are ignored. Shore flags are derived and tile centres are
    /// unit-spaced.
    pub fn from_ascii(text: &str) -> Result<Self, TerrainError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if rows.is_empty() {
            return Err(TerrainError::Empty);
        }
        let size = rows[0].chars().count();
        if rows.len() != size {
            return Err(TerrainError::NotSquare {
                rows: rows.len(),
                columns: size,
            });
        }

        let mut walkable = Vec::with_capacity(size * size);
        let mut water = Vec::with_capacity(size * size);
        for (row_idx, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != size {
                return Err(TerrainError::RaggedRow {
                    row: row_idx,
                    expected: size,
                    found,
                });
            }
            for tile in row.chars() {
                match tile {
                    '.' => {
                        walkable.push(true);
                        water.push(false);
                    }
                    '~' => {
                        walkable.push(false);
                        water.push(true);
                    }
                    '#' => {
                        walkable.push(false);
                        water.push(false);
                    }
                    other => return Err(TerrainError::UnknownTile(other, row_idx)),
                }
            }
        }

        let at = |x: i32, y: i32, cells: &[bool]| -> bool {
            x >= 0
                && y >= 0
                && (x as usize) < size
                && (y as usize) < size
                && cells[y as usize * size + x as usize]
        };
        let mut shore = vec![false; size * size];
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                if at(x, y, &water) {
                    shore[y as usize * size + x as usize] = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                        .into_iter()
                        .any(|(dx, dy)| at(x + dx, y + dy, &walkable));
                }
            }
        }

        let tile_centres = (0..size * size)
            .map(|idx| Position {
                x: (idx % size) as f32,
                y: (idx / size) as f32,
            })
            .collect();

        Ok(Self {
            size: size as u32,
            walkable,
            shore,
            tile_centres,
        })
    }

    /// Consistency check for hand-built values; `from_ascii` output always
    /// passes.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.size == 0 {
            return Err(TerrainError::Empty);
        }
        let expected = (self.size as usize).pow(2);
        for (field, found) in [
            ("walkable", self.walkable.len()),
            ("shore", self.shore.len()),
            ("tile_centres", self.tile_centres.len()),
        ] {
            if found != expected {
                return Err(TerrainError::WrongLength {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// Immutable spatial structure backing every sensing query: final
/// walkability (terrain plus scattered trees), shore flags, tile centres,
/// per-tile walkable neighbours, and the closest visible shore tile within
/// [`MAX_VIEW_DISTANCE`] of every walkable tile.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    size: u32,
    mask: GridMask,
    shore: Vec<bool>,
    tile_centres: Vec<Position>,
    walkable_coords: Vec<Coord>,
    neighbours: Vec<Vec<Coord>>,
    water_map: Vec<Coord>,
}

impl WorldGrid {
    /// Builds the caches. Trees are scattered first (each open tile blocks
    /// with `tree_probability`), then the neighbour and water maps are
    /// computed over the final mask, so trees obstruct both movement and
    /// sight.
    pub fn build(terrain: &TerrainData, tree_probability: f64, rng: &mut impl Rng) -> Self {
        let size = terrain.size;
        let mut mask = GridMask::from_cells(size, terrain.walkable.clone());
        if tree_probability > 0.0 {
            for y in 0..size as i32 {
                for x in 0..size as i32 {
                    let coord = Coord::new(x, y);
                    if mask.get(coord) && rng.random_bool(tree_probability) {
                        mask.set(coord, false);
                    }
                }
            }
        }

        let mut walkable_coords = Vec::new();
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let coord = Coord::new(x, y);
                if mask.get(coord) {
                    walkable_coords.push(coord);
                }
            }
        }

        let neighbours = build_neighbours(&mask);
        let water_map = build_water_map(&mask, &terrain.shore);

        Self {
            size,
            mask,
            shore: terrain.shore.clone(),
            tile_centres: terrain.tile_centres.clone(),
            walkable_coords,
            neighbours,
            water_map,
        }
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn mask(&self) -> &GridMask {
        &self.mask
    }

    const fn offset(&self, coord: Coord) -> usize {
        coord.y as usize * self.size as usize + coord.x as usize
    }

    /// Whether `coord` is open ground: in bounds, not water, not a tree.
    #[must_use]
    pub fn is_walkable(&self, coord: Coord) -> bool {
        self.mask.get(coord)
    }

    #[must_use]
    pub fn is_shore(&self, coord: Coord) -> bool {
        self.mask.in_bounds(coord) && self.shore[self.offset(coord)]
    }

    /// World-space centre of a tile.
    #[must_use]
    pub fn tile_centre(&self, coord: Coord) -> Option<Position> {
        self.mask
            .in_bounds(coord)
            .then(|| self.tile_centres[self.offset(coord)])
    }

    /// Walkable neighbours of `coord`, 8-connected; empty off the grid.
    #[must_use]
    pub fn walkable_neighbours(&self, coord: Coord) -> &[Coord] {
        if self.mask.in_bounds(coord) {
            &self.neighbours[self.offset(coord)]
        } else {
            &[]
        }
    }

    /// Closest shore tile visible from `coord`, if any lies within view.
    #[must_use]
    pub fn closest_visible_water(&self, coord: Coord) -> Option<Coord> {
        if !self.mask.in_bounds(coord) {
            return None;
        }
        let water = self.water_map[self.offset(coord)];
        water.is_valid().then_some(water)
    }

    /// Open tiles available for spawning, row-major.
    #[must_use]
    pub fn walkable_coords(&self) -> &[Coord] {
        &self.walkable_coords
    }
}

fn build_neighbours(mask: &GridMask) -> Vec<Vec<Coord>> {
    let size = mask.size() as i32;
    let mut neighbours = vec![Vec::new(); (size as usize).pow(2)];
    for y in 0..size {
        for x in 0..size {
            let coord = Coord::new(x, y);
            if !mask.get(coord) {
                continue;
            }
            neighbours[(y * size + x) as usize] = STEP_OFFSETS
                .into_iter()
                .map(|step| coord + step)
                .filter(|&next| mask.get(next))
                .collect();
        }
    }
    neighbours
}

/// Offsets reachable within view, sorted ascending by squared distance so
/// the first visible shore hit is the closest one.
fn view_offsets() -> Vec<Coord> {
    let origin = Coord::new(0, 0);
    let mut offsets = Vec::new();
    for oy in -MAX_VIEW_DISTANCE..=MAX_VIEW_DISTANCE {
        for ox in -MAX_VIEW_DISTANCE..=MAX_VIEW_DISTANCE {
            if ox == 0 && oy == 0 {
                continue;
            }
            let offset = Coord::new(ox, oy);
            if offset.sqr_distance(origin) <= MAX_VIEW_DISTANCE * MAX_VIEW_DISTANCE {
                offsets.push(offset);
            }
        }
    }
    offsets.sort_by_key(|offset| offset.sqr_distance(origin));
    offsets
}

fn build_water_map(mask: &GridMask, shore: &[bool]) -> Vec<Coord> {
    let size = mask.size() as usize;
    let offsets = view_offsets();
    let shore_at = |coord: Coord| -> bool {
        coord.x >= 0
            && coord.y >= 0
            && (coord.x as usize) < size
            && (coord.y as usize) < size
            && shore[coord.y as usize * size + coord.x as usize]
    };
    (0..size * size)
        .into_par_iter()
        .map(|idx| {
            let coord = Coord::new((idx % size) as i32, (idx / size) as i32);
            if !mask.get(coord) {
                return Coord::INVALID;
            }
            offsets
                .iter()
                .map(|&offset| coord + offset)
                .find(|&target| shore_at(target) && tile_is_visible(mask, coord, target))
                .unwrap_or(Coord::INVALID)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    /// A tree wall with one gap separates the north field from the south
    /// shoreline.
    const WALLED_SHORE: &str = "
        .....
        .....
        ##.##
        .....
        ~~~~~
    ";

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(1)
    }

    fn grid(text: &str) -> WorldGrid {
        let terrain = TerrainData::from_ascii(text).expect("fixture parses");
        WorldGrid::build(&terrain, 0.0, &mut rng())
    }

    #[test]
    fn ascii_parsing_classifies_tiles() {
        let terrain = TerrainData::from_ascii(WALLED_SHORE).expect("fixture parses");
        assert_eq!(terrain.size, 5);
        terrain.validate().expect("derived data is consistent");
        let idx = |x: usize, y: usize| y * 5 + x;
        assert!(terrain.walkable[idx(0, 0)]);
        assert!(!terrain.walkable[idx(0, 2)], "tree tiles are blocked");
        assert!(!terrain.walkable[idx(0, 4)], "water tiles are blocked");
        // Every water tile here touches open land above it.
        assert!((0..5).all(|x| terrain.shore[idx(x, 4)]));
        assert!(!terrain.shore[idx(0, 2)], "trees are not shoreline");
        assert_eq!(terrain.tile_centres[idx(3, 4)], Position { x: 3.0, y: 4.0 });
    }

    #[test]
    fn ascii_parsing_rejects_malformed_maps() {
        assert_eq!(TerrainData::from_ascii("   \n  "), Err(TerrainError::Empty));
        assert!(matches!(
            TerrainData::from_ascii("...\n..\n..."),
            Err(TerrainError::RaggedRow { row: 1, .. })
        ));
        assert!(matches!(
            TerrainData::from_ascii("...\n..."),
            Err(TerrainError::NotSquare { rows: 2, columns: 3 })
        ));
        assert!(matches!(
            TerrainData::from_ascii("..\n.x"),
            Err(TerrainError::UnknownTile('x', 1))
        ));
    }

    #[test]
    fn hand_built_terrain_is_length_checked() {
        let mut terrain = TerrainData::from_ascii(WALLED_SHORE).expect("fixture parses");
        terrain.shore.pop();
        assert!(matches!(
            terrain.validate(),
            Err(TerrainError::WrongLength { field: "shore", .. })
        ));
    }

    #[test]
    fn neighbour_map_respects_blocking() {
        let grid = grid(WALLED_SHORE);
        assert_eq!(grid.walkable_neighbours(Coord::new(0, 0)).len(), 3);
        // (1, 1) loses (0, 2) and (1, 2) to the tree wall.
        assert_eq!(grid.walkable_neighbours(Coord::new(1, 1)).len(), 6);
        // (0, 3) is hemmed in by trees above and water below.
        assert_eq!(grid.walkable_neighbours(Coord::new(0, 3)), &[Coord::new(1, 3)]);
        assert!(grid.walkable_neighbours(Coord::new(0, 4)).is_empty());
        assert!(grid.walkable_neighbours(Coord::new(-3, 0)).is_empty());
    }

    #[test]
    fn water_map_finds_closest_visible_shore() {
        let grid = grid(WALLED_SHORE);
        // Straight south is blocked by the wall; the nearest shore with a
        // clear line threads the gap at (2, 2).
        assert_eq!(grid.closest_visible_water(Coord::new(0, 0)), Some(Coord::new(3, 4)));
        assert_eq!(grid.closest_visible_water(Coord::new(2, 0)), Some(Coord::new(2, 4)));
        assert_eq!(grid.closest_visible_water(Coord::new(2, 3)), Some(Coord::new(2, 4)));
        // Blocked tiles carry no entry.
        assert_eq!(grid.closest_visible_water(Coord::new(0, 2)), None);
        assert_eq!(grid.closest_visible_water(Coord::new(0, 4)), None);
    }

    #[test]
    fn water_map_is_bounded_by_view_distance() {
        let far = "
            ~.......................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
            ........................
        ";
        let grid = grid(far);
        assert_eq!(grid.closest_visible_water(Coord::new(1, 1)), Some(Coord::new(0, 0)));
        assert_eq!(grid.closest_visible_water(Coord::new(23, 23)), None);
    }

    #[test]
    fn tree_scatter_blocks_tiles_before_caches_are_built() {
        let terrain = TerrainData::from_ascii(WALLED_SHORE).expect("fixture parses");
        let open = WorldGrid::build(&terrain, 0.0, &mut rng());
        assert_eq!(open.walkable_coords().len(), 16);

        let forest = WorldGrid::build(&terrain, 1.0, &mut rng());
        assert!(forest.walkable_coords().is_empty());
        assert_eq!(forest.closest_visible_water(Coord::new(0, 0)), None);
        assert!(forest.walkable_neighbours(Coord::new(1, 1)).is_empty());
    }
}
