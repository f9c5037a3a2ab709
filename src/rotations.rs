//! The 24 proper rotations of the cube and canonical-form selection.

use crate::cube::{Dim, Point};

/// Rotation table. Each row is `(ix, iy, iz, sx, sy, sz)`: which input axis
/// supplies each output axis, and with which sign. Index 0 is the identity.
/// Reflections are deliberately absent.
pub const LUT: [[i8; 6]; 24] = [
    [0, 1, 2, 1, 1, 1], // identity
    [0, 1, 2, -1, -1, 1],
    [0, 1, 2, -1, 1, -1],
    [0, 1, 2, 1, -1, -1],
    [0, 2, 1, -1, -1, -1],
    [0, 2, 1, -1, 1, 1],
    [0, 2, 1, 1, -1, 1],
    [0, 2, 1, 1, 1, -1],
    [1, 0, 2, -1, -1, -1],
    [1, 0, 2, -1, 1, 1],
    [1, 0, 2, 1, -1, 1],
    [1, 0, 2, 1, 1, -1],
    [1, 2, 0, -1, -1, 1],
    [1, 2, 0, -1, 1, -1],
    [1, 2, 0, 1, -1, -1],
    [1, 2, 0, 1, 1, 1],
    [2, 0, 1, -1, -1, 1],
    [2, 0, 1, -1, 1, -1],
    [2, 0, 1, 1, -1, -1],
    [2, 0, 1, 1, 1, 1],
    [2, 1, 0, -1, -1, -1],
    [2, 1, 0, -1, 1, 1],
    [2, 1, 0, 1, -1, 1],
    [2, 1, 0, 1, 1, -1],
];

#[inline]
fn coord(p: Point, axis: i8) -> i8 {
    match axis {
        0 => p.x,
        1 => p.y,
        _ => p.z,
    }
}

#[inline]
fn extent(shape: Dim, axis: i8) -> u8 {
    match axis {
        0 => shape.x,
        1 => shape.y,
        _ => shape.z,
    }
}

/// Apply rotation `i` to `input` within its bounding box `shape`.
///
/// Returns the rotated shape and fills `out`, or returns `None` and leaves
/// `out` untouched when the rotated shape would violate the x <= y <= z
/// normal form.
pub fn rotate(i: usize, shape: Dim, input: &[Point], out: &mut Vec<Point>) -> Option<Dim> {
    let lut = &LUT[i];
    let out_shape = Dim::new(
        extent(shape, lut[0]),
        extent(shape, lut[1]),
        extent(shape, lut[2]),
    );
    if !out_shape.sorted() {
        return None;
    }

    out.clear();
    out.reserve(input.len());
    for &p in input {
        let mut next = [0i8; 3];
        for k in 0..3 {
            let v = coord(p, lut[k]);
            next[k] = if lut[k + 3] < 0 {
                extent(shape, lut[k]) as i8 - v
            } else {
                v
            };
        }
        out.push(Point::new(next[0], next[1], next[2]));
    }
    Some(out_shape)
}

/// Scan all 24 rotations of `points` within `shape`, keeping the
/// lexicographically largest sorted coordinate sequence. The winner ends up
/// in `best` and its shape is returned; `rotated` is scratch.
///
/// Some rotation always survives the normal-form filter, since some
/// permutation sorts any shape.
pub fn best_rotation(
    points: &[Point],
    shape: Dim,
    rotated: &mut Vec<Point>,
    best: &mut Vec<Point>,
) -> Dim {
    let mut best_shape = None;
    for i in 0..LUT.len() {
        let Some(out_shape) = rotate(i, shape, points, rotated) else {
            continue;
        };
        rotated.sort_unstable();
        if best_shape.is_none() || rotated.as_slice() > best.as_slice() {
            std::mem::swap(best, rotated);
            best_shape = Some(out_shape);
        }
    }
    best_shape.expect("no rotation satisfied the sorted-shape normal form")
}

/// Canonical form of an arbitrary coordinate sequence: translate so every
/// minimum is zero, then pick the winning rotation.
pub fn canonical_form(points: &[Point]) -> (Vec<Point>, Dim) {
    let mut min = [i8::MAX; 3];
    for p in points {
        min[0] = min[0].min(p.x);
        min[1] = min[1].min(p.y);
        min[2] = min[2].min(p.z);
    }
    let shifted: Vec<Point> = points
        .iter()
        .map(|p| Point::new(p.x - min[0], p.y - min[1], p.z - min[2]))
        .collect();
    let shape = Dim::bounding(&shifted);

    let mut rotated = Vec::with_capacity(points.len());
    let mut best = Vec::new();
    let dim = best_rotation(&shifted, shape, &mut rotated, &mut best);
    (best, dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;

    #[test]
    fn index_zero_is_identity() {
        let cube = [Point::new(0, 0, 0), Point::new(0, 0, 1)];
        let mut out = Vec::new();
        let shape = rotate(0, Dim::new(0, 0, 1), &cube, &mut out);
        assert_eq!(shape, Some(Dim::new(0, 0, 1)));
        assert_eq!(out, cube);
    }

    /// Every table entry must be a proper rotation: permutation parity times
    /// the product of the signs is +1.
    #[test]
    fn table_has_no_reflections() {
        for (i, lut) in LUT.iter().enumerate() {
            let perm = [lut[0], lut[1], lut[2]];
            let mut parity = 1i32;
            for a in 0..3 {
                for b in (a + 1)..3 {
                    if perm[a] > perm[b] {
                        parity = -parity;
                    }
                }
            }
            let signs = lut[3] as i32 * lut[4] as i32 * lut[5] as i32;
            assert_eq!(parity * signs, 1, "entry {i} is not a proper rotation");
        }
    }

    /// On an asymmetric polycube in a cubic box all 24 rotations are valid
    /// and pairwise distinct.
    #[test]
    fn all_rotations_are_distinct() {
        let cube = [
            Point::new(0, 0, 0),
            Point::new(1, 0, 0),
            Point::new(1, 1, 0),
            Point::new(1, 1, 2),
            Point::new(2, 1, 2),
        ];
        let shape = Dim::new(2, 2, 2);

        let mut images = HashSet::new();
        for i in 0..24 {
            let mut out = Vec::new();
            let rotated = rotate(i, shape, &cube, &mut out);
            assert_eq!(rotated, Some(shape));
            out.sort_unstable();
            images.insert(out);
        }
        assert_eq!(images.len(), 24);
    }

    /// A domino along x: only the 8 rotations that move the long axis to z
    /// survive the normal-form filter.
    #[test]
    fn domino_along_x_keeps_eight_rotations() {
        let cube = [Point::new(0, 0, 0), Point::new(1, 0, 0)];
        let shape = Dim::new(1, 0, 0);

        let mut valid = 0;
        for i in 0..24 {
            let mut out = Vec::new();
            let before = vec![Point::new(7, 7, 7)];
            let mut untouched = before.clone();
            if let Some(rotated) = rotate(i, shape, &cube, &mut out) {
                assert_eq!(rotated, Dim::new(0, 0, 1));
                out.sort_unstable();
                assert_eq!(out, [Point::new(0, 0, 0), Point::new(0, 0, 1)]);
                valid += 1;
            } else {
                // the output buffer must not be written on rejection
                rotate(i, shape, &cube, &mut untouched);
                assert_eq!(untouched, before);
            }
        }
        assert_eq!(valid, 8);
    }

    #[test]
    fn canonical_form_is_idempotent() {
        let samples: [&[Point]; 3] = [
            &[Point::new(0, 0, 0), Point::new(1, 0, 0)],
            &[Point::new(0, 0, 0), Point::new(0, 1, 0), Point::new(0, 1, 1)],
            &[
                Point::new(0, 0, 0),
                Point::new(1, 0, 0),
                Point::new(1, 1, 0),
                Point::new(1, 1, 1),
            ],
        ];
        for points in samples {
            let (canon, dim) = canonical_form(points);
            let (again, dim2) = canonical_form(&canon);
            assert_eq!(canon, again);
            assert_eq!(dim, dim2);
            assert!(dim.sorted());
        }
    }

    /// Rotating the input first must never change the canonical form.
    #[test]
    fn canonical_form_is_rotation_invariant() {
        let points = [
            Point::new(0, 0, 0),
            Point::new(1, 0, 0),
            Point::new(1, 1, 0),
            Point::new(1, 1, 2),
            Point::new(2, 1, 2),
        ];
        let shape = Dim::new(2, 2, 2);
        let (canon, dim) = canonical_form(&points);

        for i in 0..24 {
            let mut out = Vec::new();
            rotate(i, shape, &points, &mut out).unwrap();
            let (canon_i, dim_i) = canonical_form(&out);
            assert_eq!(canon_i, canon, "rotation {i} changed the canonical form");
            assert_eq!(dim_i, dim);
        }
    }
}
