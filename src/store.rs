//! The concurrent set of canonical polycubes, sharded two levels deep:
//! by bounding box shape, then by cube hash. Workers inserting into
//! different shards never contend.

use std::collections::BTreeMap;

use hashbrown::HashSet;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::cube::{Dim, OwnedCube};

/// Sub-buckets per shape. Tunable; eight keeps writer contention low
/// without wasting memory on small shapes.
pub const NUM_SHARDS: usize = 8;

/// One lock-protected hash set of canonical cubes.
#[derive(Default)]
pub struct Shard {
    set: RwLock<HashSet<OwnedCube>>,
}

impl Shard {
    /// Insert-if-absent. The contains check runs under the shared lock so
    /// that the common duplicate case never takes the writer lock.
    fn insert(&self, cube: OwnedCube) {
        if !self.set.read().contains(&cube) {
            self.set.write().insert(cube);
        }
    }

    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared read access to the cubes, for snapshotting into caches.
    pub fn cubes(&self) -> RwLockReadGuard<'_, HashSet<OwnedCube>> {
        self.set.read()
    }

    fn clear(&self) {
        let mut set = self.set.write();
        set.clear();
        set.shrink_to_fit();
    }
}

/// All cubes of one bounding box shape.
pub struct ShapeBucket {
    byhash: [Shard; NUM_SHARDS],
}

impl Default for ShapeBucket {
    fn default() -> Self {
        ShapeBucket {
            byhash: std::array::from_fn(|_| Shard::default()),
        }
    }
}

impl ShapeBucket {
    fn insert(&self, cube: OwnedCube) {
        let idx = (cube.hash_value() % NUM_SHARDS as u64) as usize;
        self.byhash[idx].insert(cube);
    }

    pub fn len(&self) -> u64 {
        self.byhash.iter().map(|s| s.len() as u64).sum()
    }

    pub fn shards(&self) -> &[Shard] {
        &self.byhash
    }
}

/// The full population, keyed by canonical bounding box shape.
///
/// `init` creates every bucket the target size can need up front; after
/// that the map itself is never mutated and workers share the store freely.
#[derive(Default)]
pub struct ShapeStore {
    byshape: BTreeMap<Dim, ShapeBucket>,
}

impl ShapeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create one empty bucket per admissible shape for size `n`.
    pub fn init(&mut self, n: usize) {
        for shape in Self::generate_shapes(n) {
            self.byshape.entry(shape).or_default();
        }
    }

    /// Deterministic ordered list of the shapes a polycube of `n` cubes can
    /// canonicalize to. Shared with cache files as the shape-index order.
    pub fn generate_shapes(n: usize) -> Vec<Dim> {
        let mut shapes = Vec::new();
        for x in 0..n {
            for y in x..n.saturating_sub(x) {
                for z in y..n.saturating_sub(x + y) {
                    if (x + 1) * (y + 1) * (z + 1) < n {
                        continue;
                    }
                    shapes.push(Dim::new(x as u8, y as u8, z as u8));
                }
            }
        }
        shapes
    }

    /// Insert `cube` into the bucket for its canonical `shape`.
    ///
    /// Inserting under a shape `init` did not create is a programmer error.
    pub fn insert(&self, cube: OwnedCube, shape: Dim) {
        let bucket = self
            .byshape
            .get(&shape)
            .unwrap_or_else(|| panic!("no bucket was initialized for shape {shape:?}"));
        bucket.insert(cube);
    }

    /// Total cube count. Takes shared locks, so concurrent inserts may or
    /// may not be observed.
    pub fn len(&self) -> u64 {
        self.byshape.values().map(ShapeBucket::len).sum()
    }

    pub fn shape_len(&self, shape: Dim) -> u64 {
        self.byshape.get(&shape).map_or(0, ShapeBucket::len)
    }

    /// Drop the contents of one shape bucket to cap peak memory once its
    /// cubes have been persisted.
    pub fn clear_shape(&self, shape: Dim) {
        if let Some(bucket) = self.byshape.get(&shape) {
            for shard in bucket.shards() {
                shard.clear();
            }
        }
    }

    pub fn num_shapes(&self) -> usize {
        self.byshape.len()
    }

    /// Buckets in ascending shape order.
    pub fn shapes(&self) -> impl Iterator<Item = (&Dim, &ShapeBucket)> {
        self.byshape.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{Cube, Point};

    #[test]
    fn shape_counts_for_small_sizes() {
        assert_eq!(ShapeStore::generate_shapes(1), vec![Dim::new(0, 0, 0)]);
        assert_eq!(ShapeStore::generate_shapes(2), vec![Dim::new(0, 0, 1)]);
        assert_eq!(
            ShapeStore::generate_shapes(3),
            vec![Dim::new(0, 0, 2), Dim::new(0, 1, 1)]
        );
        assert_eq!(ShapeStore::generate_shapes(4).len(), 4);
        assert_eq!(ShapeStore::generate_shapes(5).len(), 6);
    }

    #[test]
    fn shapes_are_ordered_and_admissible() {
        for n in 1..=12 {
            let shapes = ShapeStore::generate_shapes(n);
            for pair in shapes.windows(2) {
                assert!(pair[0] < pair[1]);
            }
            for shape in shapes {
                assert!(shape.admissible(n), "{shape:?} inadmissible for n={n}");
            }
        }
    }

    #[test]
    fn insert_deduplicates() {
        let mut store = ShapeStore::new();
        store.init(2);

        let domino = || Cube::from_points(vec![Point::new(0, 0, 0), Point::new(0, 0, 1)]);
        store.insert(domino(), Dim::new(0, 0, 1));
        store.insert(domino(), Dim::new(0, 0, 1));

        assert_eq!(store.len(), 1);
        assert_eq!(store.shape_len(Dim::new(0, 0, 1)), 1);
    }

    #[test]
    #[should_panic]
    fn inserting_unknown_shape_panics() {
        let mut store = ShapeStore::new();
        store.init(2);
        store.insert(
            Cube::from_points(vec![Point::new(0, 0, 0)]),
            Dim::new(0, 0, 0),
        );
    }

    #[test]
    fn clear_shape_empties_one_bucket() {
        let mut store = ShapeStore::new();
        store.init(3);
        store.insert(
            Cube::from_points(vec![
                Point::new(0, 0, 0),
                Point::new(0, 0, 1),
                Point::new(0, 0, 2),
            ]),
            Dim::new(0, 0, 2),
        );
        store.insert(
            Cube::from_points(vec![
                Point::new(0, 0, 1),
                Point::new(0, 1, 0),
                Point::new(0, 1, 1),
            ]),
            Dim::new(0, 1, 1),
        );

        assert_eq!(store.len(), 2);
        store.clear_shape(Dim::new(0, 0, 2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.shape_len(Dim::new(0, 0, 2)), 0);
    }

    #[test]
    fn concurrent_inserts_land_once() {
        let mut store = ShapeStore::new();
        store.init(3);
        let line = || {
            Cube::from_points(vec![
                Point::new(0, 0, 0),
                Point::new(0, 0, 1),
                Point::new(0, 0, 2),
            ])
        };

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        store.insert(line(), Dim::new(0, 0, 2));
                    }
                });
            }
        });

        assert_eq!(store.len(), 1);
    }
}
