//! Region-bucketed spatial maps.
//!
//! A [`RegionMap`] tracks the coords of one population (one species, in the
//! ecosystem's case) on a square grid, bucketing keys into coarse square
//! regions so radius queries only touch the regions the query square can
//! intersect. Mutations are O(1) through a back-pointer table; queries scan
//! regions row-major and buckets in insertion order, so results are
//! deterministic for a given operation history.

use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;
use wildgrid_geom::Coord;

/// Errors produced when configuring a [`RegionMap`].
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Where a key currently lives: region index plus slot within that bucket.
#[derive(Debug, Clone, Copy)]
struct BucketSlot {
    region: usize,
    slot: usize,
}

#[derive(Debug, Clone, Copy)]
struct Record<K> {
    key: K,
    coord: Coord,
}

/// Spatial map over coarse square region buckets.
#[derive(Debug, Clone)]
pub struct RegionMap<K> {
    size: u32,
    region_size: u32,
    regions_per_side: u32,
    buckets: Vec<Vec<Record<K>>>,
    slots: HashMap<K, BucketSlot>,
}

impl<K: Copy + Eq + Hash> RegionMap<K> {
    /// Creates an empty map over a `size x size` grid partitioned into
    /// square regions of side `region_size`.
    pub fn new(size: u32, region_size: u32) -> Result<Self, IndexError> {
        if size == 0 {
            return Err(IndexError::InvalidConfig("grid size must be positive"));
        }
        if region_size == 0 {
            return Err(IndexError::InvalidConfig("region size must be positive"));
        }
        let regions_per_side = size.div_ceil(region_size);
        Ok(Self {
            size,
            region_size,
            regions_per_side,
            buckets: vec![Vec::new(); (regions_per_side as usize).pow(2)],
            slots: HashMap::new(),
        })
    }

    fn region_of(&self, coord: Coord) -> usize {
        debug_assert!(
            coord.x >= 0
                && coord.y >= 0
                && (coord.x as u32) < self.size
                && (coord.y as u32) < self.size,
            "coord {coord} outside the {0}x{0} grid",
            self.size
        );
        let rx = (coord.x as u32 / self.region_size).min(self.regions_per_side - 1);
        let ry = (coord.y as u32 / self.region_size).min(self.regions_per_side - 1);
        (ry * self.regions_per_side + rx) as usize
    }

    fn region_axis_span(&self, centre: i32, radius: i32) -> (u32, u32) {
        let lo = (centre - radius).clamp(0, self.size as i32 - 1) as u32 / self.region_size;
        let hi = (centre + radius).clamp(0, self.size as i32 - 1) as u32 / self.region_size;
        (lo, hi)
    }

    /// Adds `key` at `coord`. A key that is already present is relocated
    /// instead of duplicated.
    pub fn insert(&mut self, key: K, coord: Coord) {
        if self.slots.contains_key(&key) {
            self.shift(key, coord);
            return;
        }
        let region = self.region_of(coord);
        let bucket = &mut self.buckets[region];
        bucket.push(Record { key, coord });
        self.slots.insert(
            key,
            BucketSlot {
                region,
                slot: bucket.len() - 1,
            },
        );
    }

    /// Removes `key`, returning whether it was present. The displaced
    /// record's back-pointer is patched after the swap-remove.
    pub fn remove(&mut self, key: K) -> bool {
        let Some(BucketSlot { region, slot }) = self.slots.remove(&key) else {
            return false;
        };
        let bucket = &mut self.buckets[region];
        bucket.swap_remove(slot);
        if let Some(moved) = bucket.get(slot) {
            self.slots.insert(moved.key, BucketSlot { region, slot });
        }
        true
    }

    /// Moves `key` to `to`, returning whether it was present. Moves within
    /// one region update the record in place.
    pub fn shift(&mut self, key: K, to: Coord) -> bool {
        let Some(&BucketSlot { region, slot }) = self.slots.get(&key) else {
            return false;
        };
        if region == self.region_of(to) {
            self.buckets[region][slot].coord = to;
            return true;
        }
        self.remove(key);
        self.insert(key, to);
        true
    }

    /// Closest key within `radius` tiles (exact Euclidean filter), or `None`
    /// for an empty neighbourhood. Ties keep the first record encountered in
    /// scan order, so results are reproducible.
    #[must_use]
    pub fn nearest_within(&self, coord: Coord, radius: u32) -> Option<K> {
        let sqr_radius = (radius * radius) as i32;
        let (min_rx, max_rx) = self.region_axis_span(coord.x, radius as i32);
        let (min_ry, max_ry) = self.region_axis_span(coord.y, radius as i32);
        let mut best: Option<(i32, K)> = None;
        for ry in min_ry..=max_ry {
            for rx in min_rx..=max_rx {
                let bucket = &self.buckets[(ry * self.regions_per_side + rx) as usize];
                for record in bucket {
                    let sqr = coord.sqr_distance(record.coord);
                    if sqr <= sqr_radius && best.is_none_or(|(best_sqr, _)| sqr < best_sqr) {
                        best = Some((sqr, record.key));
                    }
                }
            }
        }
        best.map(|(_, key)| key)
    }

    /// Every key within `radius` tiles, in deterministic scan order.
    #[must_use]
    pub fn all_within(&self, coord: Coord, radius: u32) -> Vec<K> {
        let sqr_radius = (radius * radius) as i32;
        let (min_rx, max_rx) = self.region_axis_span(coord.x, radius as i32);
        let (min_ry, max_ry) = self.region_axis_span(coord.y, radius as i32);
        let mut found = Vec::new();
        for ry in min_ry..=max_ry {
            for rx in min_rx..=max_rx {
                let bucket = &self.buckets[(ry * self.regions_per_side + rx) as usize];
                for record in bucket {
                    if coord.sqr_distance(record.coord) <= sqr_radius {
                        found.push(record.key);
                    }
                }
            }
        }
        found
    }

    /// Current coord of `key`, if present.
    #[must_use]
    pub fn coord_of(&self, key: K) -> Option<Coord> {
        self.slots
            .get(&key)
            .map(|&BucketSlot { region, slot }| self.buckets[region][slot].coord)
    }

    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
