//! Uniform-grid 2D spatial index over the XZ plane.
//!
//! [`SpatialHash`] is generic over the handle type it indexes (`H`) so it has
//! no dependency on the entity/component model in `meridian-sim`; systems
//! that need spatial queries pass in whatever handle they use to name an
//! entity and get back copies of handles, never references into the index
//! itself. This is the "entity-index + component-table" separation: the
//! index owns cell membership, callers own everything else.

#![deny(unsafe_code)]

use std::collections::HashMap;
use std::hash::Hash;

use meridian_geom::Fixed;

/// Integer grid cell coordinate, `(floor(x / cell_size), floor(z / cell_size))`.
pub type Cell = (i64, i64);

/// A uniform grid over the XZ plane, bucketing handles by cell.
///
/// Every handle with a position has at most one cell membership at a time;
/// `insert`/`update` maintain that invariant. `query` returns a superset of
/// candidates for a circular region — callers must still apply a precise
/// distance test, matching §4.1's "Queries return a superset; precise
/// intersection is the caller's responsibility."
#[derive(Debug, Clone)]
pub struct SpatialHash<H> {
    cell_size: Fixed,
    cells: HashMap<Cell, Vec<H>>,
    membership: HashMap<H, Cell>,
}

impl<H> SpatialHash<H>
where
    H: Copy + Eq + Hash,
{
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        assert!(cell_size.raw() > 0, "cell_size must be positive");
        Self {
            cell_size,
            cells: HashMap::new(),
            membership: HashMap::new(),
        }
    }

    #[must_use]
    pub fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// The cell a raw XZ position falls into: `floor(pos / cell_size)`.
    #[must_use]
    pub fn cell_of(&self, x: Fixed, z: Fixed) -> Cell {
        (
            x.raw().div_euclid(self.cell_size.raw()),
            z.raw().div_euclid(self.cell_size.raw()),
        )
    }

    /// Insert `handle` at `(x, z)`. Idempotent: inserting the same handle at
    /// the same cell twice does not create a duplicate entry.
    pub fn insert(&mut self, handle: H, x: Fixed, z: Fixed) {
        let cell = self.cell_of(x, z);
        if let Some(&existing) = self.membership.get(&handle) {
            if existing == cell {
                return;
            }
            self.remove_from_cell(existing, handle);
        }
        self.cells.entry(cell).or_default().push(handle);
        self.membership.insert(handle, cell);
    }

    /// Move `handle` from `old` to `new`. A no-op if both positions hash to
    /// the same cell.
    pub fn update(&mut self, handle: H, old: (Fixed, Fixed), new: (Fixed, Fixed)) {
        let old_cell = self.cell_of(old.0, old.1);
        let new_cell = self.cell_of(new.0, new.1);
        if old_cell == new_cell {
            // Still record membership in case `handle` wasn't tracked yet.
            self.membership.entry(handle).or_insert(old_cell);
            return;
        }
        self.remove_from_cell(old_cell, handle);
        self.cells.entry(new_cell).or_default().push(handle);
        self.membership.insert(handle, new_cell);
    }

    /// Remove `handle` entirely from the index.
    pub fn remove(&mut self, handle: H) {
        if let Some(cell) = self.membership.remove(&handle) {
            self.remove_from_cell(cell, handle);
        }
    }

    fn remove_from_cell(&mut self, cell: Cell, handle: H) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.retain(|h| *h != handle);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    /// Candidate handles in every cell overlapping the axis-aligned bounding
    /// box of a circle at `(x, z)` with radius `r`. Copy-out: the returned
    /// `Vec` is independent of the index, so it's safe to mutate the index
    /// (including `query`-driven `update`/`remove`) while iterating results.
    #[must_use]
    pub fn query(&self, x: Fixed, z: Fixed, r: Fixed) -> Vec<H> {
        let min_cell = self.cell_of(x - r, z - r);
        let max_cell = self.cell_of(x + r, z + r);

        let mut out = Vec::new();
        for ci in min_cell.0..=max_cell.0 {
            for cj in min_cell.1..=max_cell.1 {
                if let Some(bucket) = self.cells.get(&(ci, cj)) {
                    out.extend_from_slice(bucket);
                }
            }
        }
        out
    }

    /// Current cell membership for `handle`, if tracked.
    #[must_use]
    pub fn cell_for(&self, handle: H) -> Option<Cell> {
        self.membership.get(&handle).copied()
    }

    /// Number of distinct handles currently indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Empty every cell but keep the allocated `HashMap` capacity, so a
    /// per-tick `BroadPhase::rebuild` doesn't re-allocate buckets every tick.
    pub fn clear(&mut self) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        self.cells.retain(|_, bucket| !bucket.is_empty());
        self.membership.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(m: f64) -> Fixed {
        Fixed::from_meters_f64(m)
    }

    #[test]
    fn cell_of_floors_toward_negative_infinity() {
        let hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        assert_eq!(hash.cell_of(fx(9.9), fx(0.0)), (0, 0));
        assert_eq!(hash.cell_of(fx(10.0), fx(0.0)), (1, 0));
        assert_eq!(hash.cell_of(fx(-0.1), fx(0.0)), (-1, 0));
        assert_eq!(hash.cell_of(fx(-10.0), fx(0.0)), (-1, 0));
    }

    #[test]
    fn insert_is_idempotent_within_a_cell() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(1.0), fx(1.0));
        hash.insert(1, fx(2.0), fx(2.0)); // same cell, different sub-position
        assert_eq!(hash.len(), 1);
        assert_eq!(hash.query(fx(0.0), fx(0.0), fx(20.0)), vec![1]);
    }

    #[test]
    fn update_moves_between_cells() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(1.0), fx(1.0));
        hash.update(1, (fx(1.0), fx(1.0)), (fx(15.0), fx(1.0)));

        assert_eq!(hash.cell_for(1), Some((1, 0)));
        assert!(hash.query(fx(0.0), fx(0.0), fx(5.0)).is_empty());
        assert_eq!(hash.query(fx(15.0), fx(1.0), fx(1.0)), vec![1]);
    }

    #[test]
    fn update_same_cell_is_noop() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(1.0), fx(1.0));
        hash.update(1, (fx(1.0), fx(1.0)), (fx(2.0), fx(2.0)));
        assert_eq!(hash.cell_for(1), Some((0, 0)));
    }

    #[test]
    fn query_returns_superset_across_cell_boundary() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(9.0), fx(0.0));
        hash.insert(2, fx(11.0), fx(0.0));

        let candidates = hash.query(fx(10.0), fx(0.0), fx(2.0));
        assert!(candidates.contains(&1));
        assert!(candidates.contains(&2));
    }

    #[test]
    fn remove_drops_handle_and_empties_bucket() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(1.0), fx(1.0));
        hash.remove(1);
        assert!(hash.is_empty());
        assert!(hash.query(fx(0.0), fx(0.0), fx(50.0)).is_empty());
    }

    #[test]
    fn clear_empties_but_retains_allocation() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        for i in 0..50u32 {
            hash.insert(i, fx(f64::from(i)), fx(0.0));
        }
        hash.clear();
        assert!(hash.is_empty());
        assert!(hash.cells.capacity() > 0);
    }

    #[test]
    fn copy_out_semantics_allow_mutation_during_use() {
        let mut hash: SpatialHash<u32> = SpatialHash::new(fx(10.0));
        hash.insert(1, fx(0.0), fx(0.0));
        hash.insert(2, fx(1.0), fx(0.0));

        let results = hash.query(fx(0.0), fx(0.0), fx(5.0));
        for handle in results {
            hash.remove(handle); // would deadlock/invalidate a live iterator; fine for an owned Vec
        }
        assert!(hash.is_empty());
    }
}
