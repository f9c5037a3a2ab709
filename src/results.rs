//! Published polycube counts, used to self-check every run.

use crate::error::{Error, Result};

/// a(1..=16), from <http://kevingong.com/Polyominoes/Enumeration.html>
pub const RESULTS: [u64; 16] = [
    1,
    1,
    2,
    8,
    29,
    166,
    1023,
    6922,
    48311,
    346543,
    2522522,
    18598427,
    138462649,
    1039496297,
    7859514470,
    59795121480,
];

/// Compare `count` against the table. Sizes beyond the table pass.
pub fn check(n: usize, count: u64) -> Result<()> {
    if n >= 2 && n <= RESULTS.len() && RESULTS[n - 1] != count {
        return Err(Error::ResultMismatch {
            n,
            counted: count,
            expected: RESULTS[n - 1],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_counts_pass() {
        assert!(check(2, 1).is_ok());
        assert!(check(6, 166).is_ok());
        assert!(check(16, 59795121480).is_ok());
    }

    #[test]
    fn mismatch_is_reported() {
        assert!(matches!(
            check(6, 165),
            Err(Error::ResultMismatch {
                n: 6,
                counted: 165,
                expected: 166,
            })
        ));
    }

    #[test]
    fn sizes_beyond_the_table_pass() {
        assert!(check(17, 12345).is_ok());
    }
}
