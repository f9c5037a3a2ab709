//! Crate-wide error kinds.
//!
//! Cache-read failures come in two flavors: an unusable file is a
//! recoverable miss (the generator regenerates the seeds), while a corrupt
//! file aborts the run. Everything else is fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing file, short header, wrong magic. Treated as a cache miss.
    #[error("cache file {path:?} is not usable: {reason}")]
    CacheUnreadable { path: PathBuf, reason: String },

    /// The file parses but its contents cannot be trusted.
    #[error("cache file {path:?} is corrupt: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("memory mapping failed: {reason}{maps}")]
    Mapping { reason: String, maps: String },

    #[error("counted {counted} polycubes of size {n}, but the results table says {expected}")]
    ResultMismatch { n: usize, counted: u64, expected: u64 },
}

impl Error {
    /// Recoverable cache miss: the generator falls back to recursion.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::CacheUnreadable { .. })
    }

    /// Mapping failures append the process map table to the diagnostic
    /// where the platform provides one.
    pub(crate) fn mapping(reason: impl std::fmt::Display) -> Self {
        #[cfg(target_os = "linux")]
        let maps = match std::fs::read_to_string("/proc/self/maps") {
            Ok(maps) => format!("\n/proc/self/maps:\n{maps}"),
            Err(_) => String::new(),
        };
        #[cfg(not(target_os = "linux"))]
        let maps = String::new();

        Error::Mapping {
            reason: reason.to_string(),
            maps,
        }
    }
}
