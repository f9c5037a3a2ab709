//! Memory mapped cache reading.

use std::path::{Path, PathBuf};

use crate::cache::{CubeSource, Header, ShapeEntry, ENTRY_SIZE, HEADER_SIZE, MAGIC, XYZ_SIZE};
use crate::cube::{Cube, Dim, Point, MAX_CUBES};
use crate::error::{Error, Result};
use crate::mapped::{MappedFile, Region};

/// A run of same-shape cubes borrowed from a mapped region or a flat
/// buffer. Cheap to copy; the cubes it yields live as long as the backing
/// storage.
#[derive(Clone, Copy)]
pub struct ShapeRange<'a> {
    points: &'a [Point],
    n: usize,
    shape: Dim,
}

impl<'a> ShapeRange<'a> {
    pub(crate) fn new(points: &'a [Point], n: usize, shape: Dim) -> Self {
        debug_assert!(n > 0 && points.len() % n == 0);
        ShapeRange { points, n, shape }
    }

    pub(crate) fn empty(n: usize, shape: Dim) -> Self {
        ShapeRange {
            points: &[],
            n,
            shape,
        }
    }

    /// Number of cubes in the range.
    pub fn len(&self) -> usize {
        self.points.len() / self.n
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn shape(&self) -> Dim {
        self.shape
    }

    /// Borrowed view of cube `i`.
    pub fn get(&self, i: usize) -> Cube<'a> {
        Cube::borrowed(&self.points[i * self.n..(i + 1) * self.n])
    }

    pub fn iter(&self) -> CubeIter<'a> {
        CubeIter {
            range: *self,
            idx: 0,
        }
    }
}

impl<'a> IntoIterator for ShapeRange<'a> {
    type Item = Cube<'a>;
    type IntoIter = CubeIter<'a>;

    fn into_iter(self) -> CubeIter<'a> {
        self.iter()
    }
}

pub struct CubeIter<'a> {
    range: ShapeRange<'a>,
    idx: usize,
}

impl<'a> Iterator for CubeIter<'a> {
    type Item = Cube<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.range.len() {
            return None;
        }
        let cube = self.range.get(self.idx);
        self.idx += 1;
        Some(cube)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.range.len() - self.idx;
        (left, Some(left))
    }
}

impl ExactSizeIterator for CubeIter<'_> {}

/// A cache file mapped read-only.
///
/// Stored shape-table offsets are not trusted: files written with leading
/// empty shapes have carried bogus offsets in the past, so the real offsets
/// are recomputed as the running sum of entry sizes.
#[derive(Debug)]
pub struct CacheReader {
    path: PathBuf,
    region: Region,
    header: Header,
    shapes: Vec<ShapeEntry>,
}

impl CacheReader {
    /// Map `path` and validate the header and shape table.
    ///
    /// An unusable file (missing, short, wrong magic) is a recoverable
    /// [`Error::CacheUnreadable`]; a file that lies about its contents is a
    /// fatal [`Error::CacheCorrupt`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let unreadable = |reason: String| Error::CacheUnreadable {
            path: path.clone(),
            reason,
        };
        let corrupt = |reason: String| Error::CacheCorrupt {
            path: path.clone(),
            reason,
        };

        let file = MappedFile::open(&path).map_err(|e| unreadable(e.to_string()))?;
        let file_len = file.len().map_err(|e| unreadable(e.to_string()))?;
        if (file_len as usize) < HEADER_SIZE {
            return Err(unreadable(format!("only {file_len} bytes")));
        }

        let region = file.map(0, file_len as usize)?;
        let header = Header::decode(&region.bytes()[..HEADER_SIZE]);
        if header.magic != MAGIC {
            return Err(unreadable(format!("bad magic {:#010x}", header.magic)));
        }
        if header.n == 0 || header.n as usize > MAX_CUBES {
            return Err(corrupt(format!("impossible cube size {}", header.n)));
        }

        let n = header.n as usize;
        let cube_size = (n * XYZ_SIZE) as u64;
        let table_end = HEADER_SIZE as u64 + header.num_shapes as u64 * ENTRY_SIZE as u64;
        if table_end > file_len {
            return Err(corrupt("truncated shape table".into()));
        }

        let mut shapes = Vec::with_capacity(header.num_shapes as usize);
        let mut offset = table_end;
        let mut total_cubes = 0u64;
        for i in 0..header.num_shapes as usize {
            let start = HEADER_SIZE + i * ENTRY_SIZE;
            let mut entry = ShapeEntry::decode(&region.bytes()[start..start + ENTRY_SIZE]);
            if !entry.dim.admissible(n) {
                return Err(corrupt(format!(
                    "shape entry {i} is {:?}, inadmissible for n = {n}",
                    entry.dim
                )));
            }
            if entry.size % cube_size != 0 {
                return Err(corrupt(format!(
                    "shape entry {i} holds {} bytes, not a multiple of the {cube_size} byte cube",
                    entry.size
                )));
            }
            entry.offset = offset;
            offset += entry.size;
            total_cubes += entry.size / cube_size;
            shapes.push(entry);
        }
        if offset > file_len {
            return Err(corrupt("truncated cube data".into()));
        }
        if total_cubes != header.num_polycubes {
            return Err(corrupt(format!(
                "header claims {} polycubes, shape table sums to {total_cubes}",
                header.num_polycubes
            )));
        }

        Ok(CacheReader {
            path,
            region,
            header,
            shapes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of cubes recorded for shape index `sid`.
    pub fn shape_len(&self, sid: usize) -> u64 {
        self.shapes
            .get(sid)
            .map_or(0, |e| e.size / (self.header.n as u64 * XYZ_SIZE as u64))
    }

    /// Shape of entry `sid`, for table dumps.
    pub fn shape(&self, sid: usize) -> Option<Dim> {
        self.shapes.get(sid).map(|e| e.dim)
    }
}

impl CubeSource for CacheReader {
    fn n(&self) -> usize {
        self.header.n as usize
    }

    fn len(&self) -> u64 {
        self.header.num_polycubes
    }

    fn num_shapes(&self) -> usize {
        self.shapes.len()
    }

    fn cubes_by_shape(&self, sid: usize) -> ShapeRange<'_> {
        let n = self.header.n as usize;
        let Some(entry) = self.shapes.get(sid) else {
            return ShapeRange::empty(n, Dim::default());
        };
        if entry.size == 0 {
            return ShapeRange::empty(n, entry.dim);
        }
        let bytes = &self.region.bytes()[entry.offset as usize..(entry.offset + entry.size) as usize];
        ShapeRange::new(bytemuck::cast_slice(bytes), n, entry.dim)
    }

    fn prefetch(&self, sid: usize) {
        if let Some(entry) = self.shapes.get(sid) {
            self.region
                .will_need(entry.offset as usize, entry.size as usize);
        }
    }

    fn release(&self, sid: usize) {
        if let Some(entry) = self.shapes.get(sid) {
            self.region
                .dont_need(entry.offset as usize, entry.size as usize);
        }
    }
}
