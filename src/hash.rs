//! Implementation of murmur hash: [https://sites.google.com/site/murmurhash/]

use crate::byteutils::u32_from_le_bytes;

pub fn murmur_hash(key: &[u8], seed: u32) -> u32 {
    // 'M' and 'R' are mixing constants generated offline.
    const M: u32 = 0x5bd1e995;
    const R: u32 = 24;

    let mut h: u32 = seed ^ key.len() as u32;

    // Mix 4 bytes at a time into the hash
    let mut chunks = key.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32_from_le_bytes(chunk);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

const ROW_KEY_SEED: u32 = 0x71f2e1a3;

/// Hash of a row identity: the table id followed by the encoded rowkey.
pub fn row_key_hash(table_id: u64, rowkey: &[u8]) -> u32 {
    let h = murmur_hash(&table_id.to_le_bytes(), ROW_KEY_SEED);
    murmur_hash(rowkey, h)
}

#[cfg(test)]
mod tests {
    use crate::hash::{murmur_hash, row_key_hash};

    #[test]
    fn test_hash() {
        let h1 = murmur_hash("hello".as_bytes(), 0xbc9f1d34);
        let h2 = murmur_hash("hellp".as_bytes(), 0xbc9f1d34);
        let h3 = murmur_hash(String::from("hello").as_bytes(), 0xbc9f1d34);
        assert_eq!(h1, h3);
        assert!(hamming_distance(h1, h2) >= 16);

        let key = [0x23, 0xc9, 0x00, 0x00];
        let h3 = murmur_hash(&key, 0xf123cf13);
        assert_eq!(h3, 4037331841);
    }

    #[test]
    fn test_row_key_hash() {
        let k = b"\x02\x01\x00\x00\x00\x00\x00\x00\x00";
        assert_eq!(row_key_hash(3001, k), row_key_hash(3001, k));
        assert_ne!(row_key_hash(3001, k), row_key_hash(3002, k));
    }

    fn hamming_distance(n1: u32, n2: u32) -> u32 {
        (n1 ^ n2).count_ones()
    }
}
