use roaring::RoaringBitmap;
use std::fmt;

use crate::error::{Result, SegdexError};

const WORD_BITS: u32 = 64;

/// A bitmap over document ids `[0, size)`.
///
/// Used for deletion tombstones and filter results. Setting a bit past the
/// current size grows the vector.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct BitVector {
    words: Vec<u64>,
    size: u32,
    count: u32,
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVector")
            .field("size", &self.size)
            .field("count", &self.count)
            .finish()
    }
}

impl BitVector {
    /// An all-clear vector of `size` bits
    pub fn new(size: u32) -> Self {
        Self {
            words: vec![0; word_count(size)],
            size,
            count: 0,
        }
    }

    /// An all-set vector of `size` bits
    pub fn full(size: u32) -> Self {
        let mut bv = Self::new(size);
        for w in bv.words.iter_mut() {
            *w = u64::MAX;
        }
        bv.mask_tail();
        bv.count = size;
        bv
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of set bits
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, bit: u32) -> bool {
        if bit >= self.size {
            return false;
        }
        let (w, mask) = locate(bit);
        self.words[w] & mask != 0
    }

    /// Set a bit, returning true if it was previously clear
    pub fn set(&mut self, bit: u32) -> bool {
        if bit >= self.size {
            self.resize(bit + 1);
        }
        let (w, mask) = locate(bit);
        if self.words[w] & mask != 0 {
            return false;
        }
        self.words[w] |= mask;
        self.count += 1;
        true
    }

    /// Clear a bit, returning true if it was previously set
    pub fn clear(&mut self, bit: u32) -> bool {
        if bit >= self.size {
            return false;
        }
        let (w, mask) = locate(bit);
        if self.words[w] & mask == 0 {
            return false;
        }
        self.words[w] &= !mask;
        self.count -= 1;
        true
    }

    pub fn clear_all(&mut self) {
        for w in self.words.iter_mut() {
            *w = 0;
        }
        self.count = 0;
    }

    /// Grow or shrink to `size` bits; new bits are clear
    pub fn resize(&mut self, size: u32) {
        self.words.resize(word_count(size), 0);
        self.size = size;
        self.mask_tail();
        self.recount();
    }

    /// First set bit at or after `from`
    pub fn next_set_bit(&self, from: u32) -> Option<u32> {
        self.scan(from, |w| w)
    }

    /// First clear bit at or after `from`
    pub fn next_unset_bit(&self, from: u32) -> Option<u32> {
        self.scan(from, |w| !w)
    }

    /// Iterate set bits in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        let mut next = self.next_set_bit(0);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .checked_add(1)
                .and_then(|from| self.next_set_bit(from));
            Some(current)
        })
    }

    pub fn and(&self, other: &BitVector) -> BitVector {
        self.combine(other, |a, b| a & b)
    }

    pub fn or(&self, other: &BitVector) -> BitVector {
        self.combine(other, |a, b| a | b)
    }

    pub fn xor(&self, other: &BitVector) -> BitVector {
        self.combine(other, |a, b| a ^ b)
    }

    pub fn and_not(&self, other: &BitVector) -> BitVector {
        self.combine(other, |a, b| a & !b)
    }

    /// Complement within the current size
    pub fn not(&self) -> BitVector {
        let mut out = self.clone();
        for w in out.words.iter_mut() {
            *w = !*w;
        }
        out.mask_tail();
        out.recount();
        out
    }

    pub fn to_roaring(&self) -> RoaringBitmap {
        self.iter().collect()
    }

    pub fn from_roaring(bitmap: &RoaringBitmap, size: u32) -> BitVector {
        let mut bv = BitVector::new(size);
        for bit in bitmap.iter() {
            bv.set(bit);
        }
        bv
    }

    /// Persisted form: size as little-endian u32 followed by a roaring bitmap
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bitmap = self.to_roaring();
        let mut out = Vec::with_capacity(4 + bitmap.serialized_size());
        out.extend_from_slice(&self.size.to_le_bytes());
        bitmap.serialize_into(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BitVector> {
        if bytes.len() < 4 {
            return Err(SegdexError::corrupt("bit vector: missing size header"));
        }
        let size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let bitmap = RoaringBitmap::deserialize_from(&bytes[4..])
            .map_err(|e| SegdexError::corrupt(format!("bit vector: {}", e)))?;
        if let Some(max) = bitmap.max() {
            if max >= size {
                return Err(SegdexError::corrupt(format!(
                    "bit vector: bit {} outside size {}",
                    max, size
                )));
            }
        }
        Ok(BitVector::from_roaring(&bitmap, size))
    }

    fn scan(&self, from: u32, view: impl Fn(u64) -> u64) -> Option<u32> {
        if from >= self.size {
            return None;
        }
        let (mut w, _) = locate(from);
        let mut word = view(self.words[w]) & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                let bit = w as u32 * WORD_BITS + word.trailing_zeros();
                return if bit < self.size { Some(bit) } else { None };
            }
            w += 1;
            if w >= self.words.len() {
                return None;
            }
            word = view(self.words[w]);
        }
    }

    fn combine(&self, other: &BitVector, op: impl Fn(u64, u64) -> u64) -> BitVector {
        let size = self.size.max(other.size);
        let mut out = BitVector::new(size);
        for (i, w) in out.words.iter_mut().enumerate() {
            let a = self.words.get(i).copied().unwrap_or(0);
            let b = other.words.get(i).copied().unwrap_or(0);
            *w = op(a, b);
        }
        out.mask_tail();
        out.recount();
        out
    }

    fn mask_tail(&mut self) {
        let tail = self.size % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }

    fn recount(&mut self) {
        self.count = self.words.iter().map(|w| w.count_ones()).sum();
    }
}

impl FromIterator<u32> for BitVector {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bv = BitVector::new(0);
        for bit in iter {
            bv.set(bit);
        }
        bv
    }
}

fn word_count(size: u32) -> usize {
    size.div_ceil(WORD_BITS) as usize
}

fn locate(bit: u32) -> (usize, u64) {
    ((bit / WORD_BITS) as usize, 1u64 << (bit % WORD_BITS))
}
