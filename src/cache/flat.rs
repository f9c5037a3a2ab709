//! In-memory seed source, the no-file counterpart of the mapped reader.

use crate::cache::{CubeSource, ShapeRange};
use crate::cube::{Dim, Point};
use crate::store::ShapeStore;

/// Every cube of one size flattened into a single coordinate buffer with
/// one range per shape, in ascending shape order. Ranges are handed out as
/// borrowed cubes exactly like the mapped reader's.
pub struct FlatCache {
    xyz: Vec<Point>,
    shapes: Vec<(std::ops::Range<usize>, Dim)>,
    n: usize,
}

impl FlatCache {
    /// Snapshot every bucket of `store`.
    pub fn from_store(store: &ShapeStore, n: usize) -> Self {
        let mut xyz = Vec::with_capacity(store.len() as usize * n);
        let mut shapes = Vec::with_capacity(store.num_shapes());
        for (shape, bucket) in store.shapes() {
            let start = xyz.len();
            for shard in bucket.shards() {
                for cube in shard.cubes().iter() {
                    xyz.extend_from_slice(cube.points());
                }
            }
            shapes.push((start..xyz.len(), *shape));
        }
        FlatCache { xyz, shapes, n }
    }
}

impl CubeSource for FlatCache {
    fn n(&self) -> usize {
        self.n
    }

    fn len(&self) -> u64 {
        (self.xyz.len() / self.n) as u64
    }

    fn num_shapes(&self) -> usize {
        self.shapes.len()
    }

    fn cubes_by_shape(&self, sid: usize) -> ShapeRange<'_> {
        let Some((range, shape)) = self.shapes.get(sid) else {
            return ShapeRange::empty(self.n, Dim::default());
        };
        ShapeRange::new(&self.xyz[range.clone()], self.n, *shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::Cube;

    #[test]
    fn ranges_follow_shape_order() {
        let mut store = ShapeStore::new();
        store.init(3);
        let line = vec![Point::new(0, 0, 0), Point::new(0, 0, 1), Point::new(0, 0, 2)];
        let bent = vec![Point::new(0, 0, 1), Point::new(0, 1, 0), Point::new(0, 1, 1)];
        store.insert(Cube::from_points(line.clone()), Dim::new(0, 0, 2));
        store.insert(Cube::from_points(bent.clone()), Dim::new(0, 1, 1));

        let flat = FlatCache::from_store(&store, 3);
        assert_eq!(flat.n(), 3);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat.num_shapes(), 2);

        let lines = flat.cubes_by_shape(0);
        assert_eq!(lines.shape(), Dim::new(0, 0, 2));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.get(0).points(), &line[..]);

        let bents = flat.cubes_by_shape(1);
        assert_eq!(bents.shape(), Dim::new(0, 1, 1));
        assert_eq!(bents.iter().count(), 1);
        assert_eq!(bents.get(0).points(), &bent[..]);

        // out of bounds yields an empty range
        assert!(flat.cubes_by_shape(7).is_empty());
    }
}
