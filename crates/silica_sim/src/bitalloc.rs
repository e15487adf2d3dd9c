//! Bucketed allocator for signal offsets in the packed state vector.
//!
//! Signals of width 1, 2, 4, 8, 16, and 32 are carved out of dedicated
//! 64-bit words per width class, so that no sub-word signal ever straddles a
//! word boundary and the word-at-a-time accessors of
//! [`BitVectorState`](silica_common::BitVectorState) apply. Wider signals get
//! whole word-aligned ranges.

/// Width classes served from shared words.
const BUCKET_WIDTHS: [u32; 6] = [1, 2, 4, 8, 16, 32];

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    offset: usize,
    remaining: u32,
}

/// Allocates bit offsets in a growing state vector.
#[derive(Debug, Clone, Default)]
pub struct BitAllocator {
    buckets: [Bucket; BUCKET_WIDTHS.len()],
    total: usize,
}

impl BitAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `width` bits and returns their offset.
    ///
    /// Widths up to 32 are rounded up to their width class and packed into
    /// shared words; wider allocations start word-aligned.
    pub fn allocate(&mut self, width: u32) -> usize {
        debug_assert!(width > 0, "zero-width allocation");
        match BUCKET_WIDTHS.iter().position(|&w| width <= w) {
            Some(class) => {
                let slot = BUCKET_WIDTHS[class];
                let bucket = &mut self.buckets[class];
                if bucket.remaining < slot {
                    bucket.offset = self.total;
                    bucket.remaining = WORD_BITS as u32;
                    self.total += WORD_BITS;
                }
                let offset = bucket.offset;
                bucket.offset += slot as usize;
                bucket.remaining -= slot;
                offset
            }
            None => {
                let offset = self.total;
                self.total += (width as usize).div_ceil(WORD_BITS) * WORD_BITS;
                offset
            }
        }
    }

    /// Total number of bits allocated so far (including bucket slack).
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_bits_pack_into_one_word() {
        let mut a = BitAllocator::new();
        let offsets: Vec<usize> = (0..64).map(|_| a.allocate(1)).collect();
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[63], 63);
        assert_eq!(a.total(), 64);
        let next = a.allocate(1);
        assert_eq!(next, 64);
        assert_eq!(a.total(), 128);
    }

    #[test]
    fn widths_round_up_to_class() {
        let mut a = BitAllocator::new();
        let first = a.allocate(3); // served from the 4-bit bucket
        let second = a.allocate(3);
        assert_eq!(second - first, 4);
    }

    #[test]
    fn no_slot_straddles_a_word() {
        let mut a = BitAllocator::new();
        for _ in 0..100 {
            for &w in &[1u32, 2, 3, 5, 8, 12, 17, 32] {
                let off = a.allocate(w);
                let slot = BUCKET_WIDTHS.iter().find(|&&b| w <= b).copied().unwrap();
                assert_eq!(
                    off / 64,
                    (off + slot as usize - 1) / 64,
                    "width {w} at offset {off} straddles"
                );
            }
        }
    }

    #[test]
    fn wide_allocations_are_word_aligned() {
        let mut a = BitAllocator::new();
        a.allocate(5);
        let wide = a.allocate(100);
        assert_eq!(wide % 64, 0);
        let next = a.allocate(64);
        assert_eq!(next % 64, 0);
        assert!(next >= wide + 128);
    }

    #[test]
    fn classes_use_separate_words() {
        let mut a = BitAllocator::new();
        let one = a.allocate(1);
        let two = a.allocate(2);
        assert_ne!(one / 64, two / 64);
    }

    #[test]
    fn total_covers_all_allocations() {
        let mut a = BitAllocator::new();
        let mut end = 0;
        for w in [1u32, 7, 33, 64, 65, 2, 31] {
            let off = a.allocate(w);
            end = end.max(off + w as usize);
        }
        assert!(a.total() >= end);
    }
}
