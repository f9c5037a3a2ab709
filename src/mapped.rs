//! Memory mapped file I/O used by the cache codec.
//!
//! Callers work with natural byte offsets; page alignment is handled
//! internally by over-mapping down to the previous page boundary. Ranges
//! that fall outside a mapped window can still be reached through the
//! direct pread/pwrite fallbacks.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use memmap2::{Advice, Mmap, MmapMut, MmapOptions, UncheckedAdvice};

use crate::error::{Error, Result};

pub const PAGE_SIZE: u64 = 4096;

pub const fn round_up(x: u64) -> u64 {
    (x + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1)
}

pub const fn round_down(x: u64) -> u64 {
    x & !(PAGE_SIZE - 1)
}

/// An open file that regions can be mapped out of.
pub struct MappedFile {
    file: File,
    rw: bool,
}

impl MappedFile {
    /// Open an existing file read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(MappedFile { file, rw: false })
    }

    /// Create or replace the file read-write, sized up to a whole page.
    /// Truncate to the exact byte count before closing.
    pub fn create(path: impl AsRef<Path>, size: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(round_up(size))?;
        Ok(MappedFile { file, rw: true })
    }

    pub fn is_rw(&self) -> bool {
        self.rw
    }

    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Resize the backing file. Read-write files only.
    pub fn truncate(&self, size: u64) -> io::Result<()> {
        assert!(self.rw, "truncate on a read-only file");
        self.file.set_len(size)
    }

    /// Block until all file data reaches the disk.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Map `len` bytes at `offset` read-only. `offset` need not be page
    /// aligned.
    pub fn map(&self, offset: u64, len: usize) -> Result<Region> {
        let base = round_down(offset);
        let pad = (offset - base) as usize;
        let map = unsafe { MmapOptions::new().offset(base).len(len + pad).map(&self.file) }
            .map_err(|e| Error::mapping(format!("mapping {len} bytes at {offset}: {e}")))?;
        Ok(Region {
            map,
            pad,
            len,
            file: self.file.try_clone().map_err(Error::Io)?,
        })
    }

    /// Map `len` bytes at `offset` read-write.
    pub fn map_mut(&self, offset: u64, len: usize) -> Result<RegionMut> {
        assert!(self.rw, "writable mapping of a read-only file");
        let base = round_down(offset);
        let pad = (offset - base) as usize;
        let map = unsafe {
            MmapOptions::new()
                .offset(base)
                .len(len + pad)
                .map_mut(&self.file)
        }
        .map_err(|e| Error::mapping(format!("mapping {len} bytes rw at {offset}: {e}")))?;
        Ok(RegionMut {
            map,
            base,
            pad,
            len,
            file: self.file.try_clone().map_err(Error::Io)?,
        })
    }
}

/// A read-only window into a [`MappedFile`].
#[derive(Debug)]
pub struct Region {
    map: Mmap,
    pad: usize,
    len: usize,
    file: File,
}

impl Region {
    pub fn bytes(&self) -> &[u8] {
        &self.map[self.pad..self.pad + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hint that `len` bytes at `offset` (relative to this region) will be
    /// read soon. Advisory only; failures are ignored.
    pub fn will_need(&self, offset: usize, len: usize) {
        if let Some((start, len)) = self.page_range(offset, len) {
            let _ = self.map.advise_range(Advice::WillNeed, start, len);
        }
    }

    /// Hint that `len` bytes at `offset` will not be needed again, letting
    /// the kernel drop the pages. The mapping is a shared file mapping, so
    /// dropped pages are refetched from the file on the next access.
    pub fn dont_need(&self, offset: usize, len: usize) {
        if let Some((start, len)) = self.page_range(offset, len) {
            let _ = unsafe {
                self.map
                    .unchecked_advise_range(UncheckedAdvice::DontNeed, start, len)
            };
        }
    }

    fn page_range(&self, offset: usize, len: usize) -> Option<(usize, usize)> {
        let start = round_down((self.pad + offset) as u64) as usize;
        let end = (self.pad + offset + len).min(self.map.len());
        (start < end).then(|| (start, end - start))
    }

    /// Read a range straight from the backing file, mapped or not.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }
}

/// A read-write window into a [`MappedFile`].
pub struct RegionMut {
    map: MmapMut,
    base: u64,
    pad: usize,
    len: usize,
    file: File,
}

impl RegionMut {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let range = self.pad..self.pad + self.len;
        &mut self.map[range]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map[self.pad..self.pad + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start writing dirty pages back without waiting for them.
    pub fn flush_async(&self) -> io::Result<()> {
        self.map.flush_async()
    }

    /// Write all dirty pages back and wait until they hit the file.
    pub fn flush(&self) -> io::Result<()> {
        self.map.flush()
    }

    /// Grow the window to `new_len` bytes, extending the backing file as
    /// needed. The mapped address may move; all previous slices into the
    /// region are invalidated by the borrow on `self`.
    pub fn grow(&mut self, new_len: usize) -> Result<()> {
        let map_len = self.pad + new_len;
        let file_end = self.base + map_len as u64;
        self.file.set_len(round_up(file_end)).map_err(Error::Io)?;

        #[cfg(target_os = "linux")]
        {
            use memmap2::RemapOptions;
            unsafe { self.map.remap(map_len, RemapOptions::new().may_move(true)) }
                .map_err(|e| Error::mapping(format!("remap to {new_len} bytes: {e}")))?;
        }
        #[cfg(not(target_os = "linux"))]
        {
            self.map = unsafe {
                MmapOptions::new()
                    .offset(self.base)
                    .len(map_len)
                    .map_mut(&self.file)
            }
            .map_err(|e| Error::mapping(format!("remap to {new_len} bytes: {e}")))?;
        }

        self.len = new_len;
        Ok(())
    }

    /// Write a range straight into the backing file, mapped or not.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }
}
