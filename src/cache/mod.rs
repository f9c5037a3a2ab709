//! The on-disk cube cache.
//!
//! A cache file holds every canonical polycube of one size, grouped by
//! bounding box shape so that a later run can stream exactly the shapes it
//! needs. Little-endian throughout, identified by the magic bytes "PCUB".
//!
//! Layout:
//!
//! | offset | field |
//! |--------|-------|
//! | 0      | header: magic u32, n u32, numShapes u32, pad, numPolycubes u64 |
//! | 24     | shape table: numShapes records of dim0..dim2 u8, reserved u8, pad, offset u64, size u64 |
//! | ...    | packed xyz triples, 3 bytes each, per shape in table order |
//!
//! Header and shape records both occupy 24 bytes on disk (the trailing u64
//! fields are 8-byte aligned). Stored offsets are written correctly but
//! never trusted on read; see [`reader::CacheReader`].

mod flat;
mod reader;
mod writer;

pub use flat::FlatCache;
pub use reader::{CacheReader, CubeIter, ShapeRange};
pub use writer::CacheWriter;

use std::path::{Path, PathBuf};

use crate::cube::Dim;

/// "PCUB", little endian.
pub const MAGIC: u32 = 0x4255_4350;

/// Bytes per coordinate triple.
pub const XYZ_SIZE: usize = 3;

pub(crate) const HEADER_SIZE: usize = 24;
pub(crate) const ENTRY_SIZE: usize = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub magic: u32,
    pub n: u32,
    pub num_shapes: u32,
    pub num_polycubes: u64,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.n.to_le_bytes());
        buf[8..12].copy_from_slice(&self.num_shapes.to_le_bytes());
        buf[16..24].copy_from_slice(&self.num_polycubes.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Header {
        Header {
            magic: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            n: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            num_shapes: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            num_polycubes: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ShapeEntry {
    pub dim: Dim,
    pub offset: u64,
    pub size: u64,
}

impl ShapeEntry {
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0] = self.dim.x;
        buf[1] = self.dim.y;
        buf[2] = self.dim.z;
        // buf[3] reserved, buf[4..8] alignment padding
        buf[8..16].copy_from_slice(&self.offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> ShapeEntry {
        ShapeEntry {
            dim: Dim::new(buf[0], buf[1], buf[2]),
            offset: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            size: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

/// `cubes_<n>.bin`
pub fn cache_path(base: &Path, n: usize) -> PathBuf {
    base.join(format!("cubes_{n}.bin"))
}

/// `cubes_<n>_<dx>-<dy>-<dz>.bin`
pub fn split_cache_path(base: &Path, n: usize, shape: Dim) -> PathBuf {
    base.join(format!(
        "cubes_{n}_{}-{}-{}.bin",
        shape.x, shape.y, shape.z
    ))
}

/// A source of same-size cubes addressable by shape index.
///
/// Implemented by the mapped [`CacheReader`] and the in-memory
/// [`FlatCache`]; the generator streams seeds through this seam without
/// caring where they live.
pub trait CubeSource {
    /// Cube size of every polycube in the source.
    fn n(&self) -> usize;

    /// Total polycube count.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of shape-table entries. Indices map through
    /// [`crate::store::ShapeStore::generate_shapes`] for this source's size.
    fn num_shapes(&self) -> usize;

    /// Cubes of shape index `sid`; empty range when out of bounds or the
    /// shape holds no cubes.
    fn cubes_by_shape(&self, sid: usize) -> ShapeRange<'_>;

    /// Residency hint: shape `sid` is about to be streamed.
    fn prefetch(&self, _sid: usize) {}

    /// Residency hint: shape `sid` will not be streamed again soon.
    fn release(&self, _sid: usize) {}
}

/// Seeds for one generation level, wherever they live.
pub enum Seeds {
    Flat(FlatCache),
    Mapped(CacheReader),
}

impl CubeSource for Seeds {
    fn n(&self) -> usize {
        match self {
            Seeds::Flat(c) => c.n(),
            Seeds::Mapped(c) => c.n(),
        }
    }

    fn len(&self) -> u64 {
        match self {
            Seeds::Flat(c) => c.len(),
            Seeds::Mapped(c) => c.len(),
        }
    }

    fn num_shapes(&self) -> usize {
        match self {
            Seeds::Flat(c) => c.num_shapes(),
            Seeds::Mapped(c) => c.num_shapes(),
        }
    }

    fn cubes_by_shape(&self, sid: usize) -> ShapeRange<'_> {
        match self {
            Seeds::Flat(c) => c.cubes_by_shape(sid),
            Seeds::Mapped(c) => c.cubes_by_shape(sid),
        }
    }

    fn prefetch(&self, sid: usize) {
        if let Seeds::Mapped(c) = self {
            c.prefetch(sid);
        }
    }

    fn release(&self, sid: usize) {
        if let Seeds::Mapped(c) = self {
            c.release(sid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_codec_round_trip() {
        let header = Header {
            magic: MAGIC,
            n: 9,
            num_shapes: 23,
            num_polycubes: 48311,
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"PCUB");
        assert_eq!(Header::decode(&bytes), header);
    }

    #[test]
    fn entry_codec_round_trip() {
        let entry = ShapeEntry {
            dim: Dim::new(1, 2, 3),
            offset: 0x1122334455,
            size: 27,
        };
        let bytes = entry.encode();
        assert_eq!(bytes.len(), ENTRY_SIZE);
        assert_eq!(ShapeEntry::decode(&bytes), entry);
    }

    #[test]
    fn file_names() {
        let base = Path::new("cache");
        assert_eq!(cache_path(base, 11), Path::new("cache/cubes_11.bin"));
        assert_eq!(
            split_cache_path(base, 11, Dim::new(0, 2, 5)),
            Path::new("cache/cubes_11_0-2-5.bin")
        );
    }
}
