//! Key splitting for very large value domains
//!
//! Object ids and array indexes can take billions of values, far too many
//! for one set of postings lists. Such a key is split into two partial keys
//! made of its even and odd bits; each partial key indexes its own set and
//! a lookup intersects the two partial postings lists.
//!
//! ```text
//! key  = b7 b6 b5 b4 b3 b2 b1 b0
//! even =          b6 b4 b2 b0
//! odd  =          b7 b5 b3 b1
//! ```
//!
//! With 31 usable bits each partial key stays below 65 536.

use crate::storage::{StorageError, StorageResult};

/// Largest key that can be split
pub const MAX_SPLIT_KEY: u64 = i32::MAX as u64;

/// Split `key` into its (even bits, odd bits) partial keys
pub fn split_key(key: u64) -> StorageResult<(u32, u32)> {
    if key > MAX_SPLIT_KEY {
        return Err(StorageError::IndexOverflow(key));
    }
    Ok((compact_bits(key), compact_bits(key >> 1)))
}

/// Inverse of `split_key`
pub fn join_key(even: u32, odd: u32) -> u64 {
    spread_bits(even) | (spread_bits(odd) << 1)
}

/// Keep every other bit of `x`, starting with bit 0
fn compact_bits(x: u64) -> u32 {
    let mut out = 0u32;
    for i in 0..16 {
        out |= (((x >> (2 * i)) & 1) as u32) << i;
    }
    out
}

fn spread_bits(x: u32) -> u64 {
    let mut out = 0u64;
    for i in 0..16 {
        out |= (((x >> i) & 1) as u64) << (2 * i);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_small_keys() {
        assert_eq!(split_key(0).unwrap(), (0, 0));
        assert_eq!(split_key(1).unwrap(), (1, 0));
        assert_eq!(split_key(2).unwrap(), (0, 1));
        assert_eq!(split_key(0b1011).unwrap(), (0b01, 0b11));
    }

    #[test]
    fn test_split_overflow() {
        assert!(split_key(MAX_SPLIT_KEY).is_ok());
        assert!(matches!(
            split_key(MAX_SPLIT_KEY + 1),
            Err(StorageError::IndexOverflow(_))
        ));
    }

    #[test]
    fn test_parts_stay_small() {
        let (even, odd) = split_key(MAX_SPLIT_KEY).unwrap();
        assert!(even < 1 << 16);
        assert!(odd < 1 << 16);
    }

    proptest! {
        #[test]
        fn prop_split_join_inverse(key in 0u64..=MAX_SPLIT_KEY) {
            let (even, odd) = split_key(key).unwrap();
            prop_assert_eq!(join_key(even, odd), key);
        }
    }
}
