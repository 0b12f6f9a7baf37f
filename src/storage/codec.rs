//! Tuple page codec
//!
//! Implements delta encoding + LZ4 compression for pages of tuples.
//!
//! Strategy:
//! 1. Keys are already sorted; store the first key and the deltas
//! 2. Store role bytes (role-tagged tuples only)
//! 3. Serialize to compact binary format with bincode
//! 4. LZ4 compress the result, keeping the raw form if LZ4 does not help
//!
//! The first byte of an encoded page is its `CompressionType`.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Role, Tuple};
use serde::{Deserialize, Serialize};

/// Fixed overhead of a bincode-encoded page: flag + base key + two length prefixes
const ENCODING_OVERHEAD: usize = 1 + 8 + 8 + 8;

/// Compression type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(StorageError::Corruption(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Intermediate format for delta-encoded tuples
#[derive(Debug, Serialize, Deserialize)]
struct EncodedPage {
    /// First key of the page
    base_key: u64,
    /// Differences from the previous key (first entry is 0)
    key_deltas: Vec<u64>,
    /// One role byte per tuple, empty for plain tuples
    roles: Vec<i8>,
}

/// Worst-case encoded size of one tuple
fn tuple_size<T: Tuple>() -> usize {
    if T::ROLE_TAGGED {
        9
    } else {
        8
    }
}

/// Number of tuples that always fit in `payload_capacity` bytes once encoded
pub fn page_capacity<T: Tuple>(payload_capacity: usize) -> usize {
    payload_capacity.saturating_sub(ENCODING_OVERHEAD) / tuple_size::<T>()
}

/// Encode a run of tuples (in key order) into page bytes
pub fn encode_page<T: Tuple>(tuples: &[T]) -> StorageResult<Vec<u8>> {
    let base_key = tuples.first().map(|t| t.key()).unwrap_or(0);

    let mut key_deltas = Vec::with_capacity(tuples.len());
    let mut prev_key = base_key;
    for tuple in tuples {
        key_deltas.push(tuple.key().wrapping_sub(prev_key));
        prev_key = tuple.key();
    }

    let roles: Vec<i8> = if T::ROLE_TAGGED {
        tuples
            .iter()
            .map(|t| t.role().unwrap_or(Role::ANY).0)
            .collect()
    } else {
        Vec::new()
    };

    let page = EncodedPage {
        base_key,
        key_deltas,
        roles,
    };

    let serialized =
        bincode::serialize(&page).map_err(|e| StorageError::Serialization(e.to_string()))?;

    let compressed = lz4_flex::compress_prepend_size(&serialized);

    let (compression, body) = if compressed.len() < serialized.len() {
        (CompressionType::Lz4, compressed)
    } else {
        (CompressionType::None, serialized)
    };

    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(compression as u8);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode page bytes produced by `encode_page`
pub fn decode_page<T: Tuple>(data: &[u8]) -> StorageResult<Vec<T>> {
    let (flag, body) = data
        .split_first()
        .ok_or_else(|| StorageError::Corruption("empty tuple page".to_string()))?;

    let page: EncodedPage = match CompressionType::try_from(*flag)? {
        CompressionType::None => bincode::deserialize(body)?,
        CompressionType::Lz4 => {
            let decompressed = lz4_flex::decompress_size_prepended(body).map_err(|e| {
                StorageError::Compression(format!("LZ4 decompression failed: {}", e))
            })?;
            bincode::deserialize(&decompressed)?
        }
    };

    if T::ROLE_TAGGED && page.roles.len() != page.key_deltas.len() {
        return Err(StorageError::Corruption(format!(
            "page has {} keys but {} roles",
            page.key_deltas.len(),
            page.roles.len()
        )));
    }

    let mut tuples = Vec::with_capacity(page.key_deltas.len());
    let mut key = page.base_key;
    for (i, delta) in page.key_deltas.iter().enumerate() {
        key = key.wrapping_add(*delta);
        let role = page.roles.get(i).map(|r| Role(*r));
        tuples.push(T::from_parts(key, role));
    }

    Ok(tuples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::{PlainTuple, RoleTuple, Stamp};

    #[test]
    fn test_encode_decode_empty() {
        let encoded = encode_page::<PlainTuple>(&[]).unwrap();
        let decoded: Vec<PlainTuple> = decode_page(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_role_tuples_keep_roles() {
        let tuples = vec![
            RoleTuple::new(10, Role::TARGET),
            RoleTuple::new(10, Role(2)),
            RoleTuple::new(15, Role::RESULT),
        ];
        let encoded = encode_page(&tuples).unwrap();
        let decoded: Vec<RoleTuple> = decode_page(&encoded).unwrap();
        assert_eq!(decoded, tuples);
    }

    #[test]
    fn test_dense_keys_compress() {
        let tuples: Vec<PlainTuple> = (1000..1400).map(PlainTuple::new).collect();
        let encoded = encode_page(&tuples).unwrap();
        assert_eq!(encoded[0], CompressionType::Lz4 as u8);
        assert!(encoded.len() < tuples.len() * 8 / 4);

        let decoded: Vec<PlainTuple> = decode_page(&encoded).unwrap();
        assert_eq!(decoded, tuples);
    }

    #[test]
    fn test_worst_case_fits_capacity() {
        // Pseudo-random large deltas barely compress.
        let payload = 4096 - 8;
        let capacity = page_capacity::<RoleTuple>(payload);
        let mut key = 0u64;
        let tuples: Vec<RoleTuple> = (0..capacity as u64)
            .map(|i| {
                key = key.wrapping_add(i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 8);
                RoleTuple::new(key, Role((i % 100) as i8))
            })
            .collect();
        let encoded = encode_page(&tuples).unwrap();
        assert!(encoded.len() <= payload);
    }

    #[test]
    fn test_duplicate_stamps() {
        let stamps = vec![Stamp { timestamp: 10 }, Stamp { timestamp: 10 }, Stamp { timestamp: 20 }];
        let decoded: Vec<Stamp> = decode_page(&encode_page(&stamps).unwrap()).unwrap();
        assert_eq!(decoded, stamps);
    }

    #[test]
    fn test_unknown_flag_is_corruption() {
        let err = decode_page::<PlainTuple>(&[9, 0, 0]).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }
}
