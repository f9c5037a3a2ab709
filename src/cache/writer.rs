//! Cache writing through a mapped region.

use std::path::Path;

use rayon::prelude::*;

use crate::cache::{Header, ShapeEntry, ENTRY_SIZE, HEADER_SIZE, MAGIC, XYZ_SIZE};
use crate::error::Result;
use crate::mapped::MappedFile;
use crate::store::{Shard, ShapeStore};

pub struct CacheWriter;

impl CacheWriter {
    /// Snapshot `store` into the cache file at `path`.
    ///
    /// The file is created at its final (page rounded) size, the header and
    /// shape table are filled in ascending shape order, and every shard's
    /// cubes are copied into a disjoint byte range of the mapped data
    /// region — the bulk copies run on the rayon pool. The file is then
    /// truncated to its exact byte count and synced.
    ///
    /// The magic bytes are filled in last, once everything else is flushed,
    /// so a torn write leaves a file that later loads reject as a miss
    /// instead of corrupt data.
    ///
    /// Callers must not insert into `store` while the snapshot runs; the
    /// generator's job barrier guarantees this. An empty store writes
    /// nothing.
    pub fn save(path: impl AsRef<Path>, store: &ShapeStore, n: usize) -> Result<()> {
        let total = store.len();
        if total == 0 {
            return Ok(());
        }

        let cube_size = n * XYZ_SIZE;
        let data_start = HEADER_SIZE + store.num_shapes() * ENTRY_SIZE;
        // per-shard counts are stable for the duration of the save
        let counts: Vec<Vec<usize>> = store
            .shapes()
            .map(|(_, bucket)| bucket.shards().iter().map(Shard::len).collect())
            .collect();
        let data_len: usize = counts
            .iter()
            .flatten()
            .map(|count| count * cube_size)
            .sum();
        let total_size = (data_start + data_len) as u64;

        let file = MappedFile::create(path, total_size)?;
        let mut region = file.map_mut(0, total_size as usize)?;
        let bytes = region.bytes_mut();

        let header = Header {
            magic: MAGIC,
            n: n as u32,
            num_shapes: store.num_shapes() as u32,
            num_polycubes: total,
        };
        bytes[..HEADER_SIZE].copy_from_slice(&header.encode());
        // magic goes in last, after everything else has hit the disk
        bytes[..4].fill(0);

        let mut offset = data_start as u64;
        for (i, ((shape, _), shard_counts)) in store.shapes().zip(&counts).enumerate() {
            let size = (shard_counts.iter().sum::<usize>() * cube_size) as u64;
            let entry = ShapeEntry {
                dim: *shape,
                offset,
                size,
            };
            let start = HEADER_SIZE + i * ENTRY_SIZE;
            bytes[start..start + ENTRY_SIZE].copy_from_slice(&entry.encode());
            offset += size;
        }

        // one disjoint destination slice per shard
        let mut tasks: Vec<(&mut [u8], &Shard)> = Vec::new();
        let mut rest = &mut bytes[data_start..];
        for ((_, bucket), shard_counts) in store.shapes().zip(&counts) {
            for (shard, count) in bucket.shards().iter().zip(shard_counts) {
                let (dest, tail) = std::mem::take(&mut rest).split_at_mut(count * cube_size);
                rest = tail;
                if *count > 0 {
                    tasks.push((dest, shard));
                }
            }
        }

        tasks.into_par_iter().for_each(|(dest, shard)| {
            let cubes = shard.cubes();
            let mut off = 0;
            for cube in cubes.iter() {
                let src: &[u8] = bytemuck::cast_slice(cube.points());
                dest[off..off + cube_size].copy_from_slice(src);
                off += cube_size;
            }
        });

        region.flush()?;
        region.bytes_mut()[..4].copy_from_slice(&MAGIC.to_le_bytes());
        region.flush()?;
        file.truncate(total_size)?;
        file.sync()?;
        Ok(())
    }
}
