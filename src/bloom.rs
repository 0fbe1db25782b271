use crate::hash::murmur_hash;
use std::cmp::max;

const BITS_PER_KEY: usize = 10;

/// K =~ ln(2) * BITS_PER_KEY = 6
const K: u8 = 6;

const SEED: u32 = 0xc7b4e193;

/// Bloom filter over encoded rowkeys, one per macro block.
pub struct BloomFilter(pub(crate) Vec<u8>);

impl BloomFilter {
    pub fn create_filter(num_keys: usize) -> BloomFilter {
        let dst: Vec<u8> = vec![0; Self::get_bytes(num_keys)];
        debug_assert_eq!(dst.len(), dst.capacity());
        BloomFilter(dst)
    }

    /// Wrap filter bytes loaded from a macro block. Returns `None` for a
    /// buffer too short to have been produced by [BloomFilter::create_filter].
    pub fn from_bytes(bytes: &[u8]) -> Option<BloomFilter> {
        if bytes.len() < 8 {
            None
        } else {
            Some(BloomFilter(bytes.to_vec()))
        }
    }

    /// For small n, we can see a very high false positive rate.  Fix it
    /// by enforcing a minimum bloom filter length.
    #[inline]
    pub(crate) fn get_bytes(num_keys: usize) -> usize {
        let bits = max(num_keys * BITS_PER_KEY, 64);
        (bits + 7) / 8
    }

    pub fn add(&mut self, key: &[u8]) {
        let mut h = murmur_hash(key, SEED);
        let delta = h.rotate_right(17);
        let bits = self.len() * 8;
        for _ in 0..K {
            h = h.wrapping_add(delta);
            let bit_pos = h % bits;
            self.0[(bit_pos / 8) as usize] |= 1 << (bit_pos % 8);
        }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        let mut h = murmur_hash(key, SEED);
        let delta = h.rotate_right(17);
        let bits = self.len() * 8;
        for _ in 0..K {
            h = h.wrapping_add(delta);
            let bit_pos = h % bits;
            if (self.0[(bit_pos / 8) as usize] & (1 << (bit_pos % 8))) == 0 {
                return false;
            }
        }
        true
    }

    pub fn len(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::bloom::BloomFilter;

    #[test]
    fn test_bloom_filter() {
        let mut filter = BloomFilter::create_filter(1000);
        for i in 0..1000u64 {
            filter.add(&i.to_le_bytes());
        }
        for i in 0..1000u64 {
            assert!(filter.may_contain(&i.to_le_bytes()));
        }
        let false_positive = (1000..11000u64)
            .filter(|i| filter.may_contain(&i.to_le_bytes()))
            .count();
        assert!(false_positive < 500, "{}", false_positive);
    }

    #[test]
    fn test_from_bytes() {
        let mut filter = BloomFilter::create_filter(3);
        assert_eq!(filter.len(), 8);
        filter.add(b"key01");
        let loaded = BloomFilter::from_bytes(filter.as_bytes()).unwrap();
        assert!(loaded.may_contain(b"key01"));
        assert!(BloomFilter::from_bytes(&[0u8; 4]).is_none());
    }
}
