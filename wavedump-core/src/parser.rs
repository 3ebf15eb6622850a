#![allow(clippy::unusual_byte_groupings)]
//! Low-level extraction of fields from little-endian event words.
//!
//! Every read here is bounds-checked and returns `None` when the span is too
//! short, so callers turn truncated input into a fault instead of a panic.

use crate::layout::{BitField, CompositeField, SampleWidth};
use byteorder::{ByteOrder, LittleEndian};

/// Bytes in one event word.
pub const WORD_BYTES: usize = 4;

/// Reads the 32-bit word at `index` from a little-endian byte span.
#[inline]
pub fn word_at(bytes: &[u8], index: usize) -> Option<u32> {
    let start = index.checked_mul(WORD_BYTES)?;
    let end = start.checked_add(WORD_BYTES)?;
    bytes.get(start..end).map(LittleEndian::read_u32)
}

/// Extracts `width` bits starting at `shift` from a word.
#[inline]
pub fn extract_bits(word: u32, shift: u32, width: u32) -> u32 {
    let value = word >> shift;
    if width >= 32 {
        value
    } else {
        value & ((1u32 << width) - 1)
    }
}

/// Reads a single bit field from a header span.
#[inline]
pub fn read_field(bytes: &[u8], field: &BitField) -> Option<u32> {
    word_at(bytes, field.word).map(|word| extract_bits(word, field.shift, field.width))
}

/// Reads a composite field, concatenating its parts low-to-high.
pub fn read_composite(bytes: &[u8], field: &CompositeField) -> Option<u32> {
    let mut value = 0u64;
    let mut offset = 0u32;
    for part in &field.0 {
        value |= u64::from(read_field(bytes, part)?) << offset;
        offset += part.width;
    }
    Some(value as u32)
}

// ============================================================================
// ZLE control word
// Bits: [31] data (1) / skip (0) | [30:21] unused | [20:0] run length
// ============================================================================

/// Set on control words followed by recorded samples.
pub const ZLE_DATA_FLAG: u32 = 0x8000_0000;

/// Run length bits of a control word.
pub const ZLE_LENGTH_MASK: u32 = 0x001F_FFFF;

/// Returns true if recorded samples follow this control word.
#[inline]
pub fn zle_is_data(word: u32) -> bool {
    word & ZLE_DATA_FLAG != 0
}

/// Extracts the run length from a control word.
#[inline]
pub fn zle_length(word: u32) -> u32 {
    word & ZLE_LENGTH_MASK
}

/// Unpacks little-endian samples from `bytes` into `out`.
///
/// `bytes` must hold exactly `out.len()` samples of the given width.
pub fn unpack_samples(bytes: &[u8], width: SampleWidth, mask: u16, out: &mut [u16]) {
    match width {
        SampleWidth::Bits8 => {
            for (sample, &byte) in out.iter_mut().zip(bytes) {
                *sample = u16::from(byte) & mask;
            }
        }
        SampleWidth::Bits16 => {
            for (sample, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *sample = LittleEndian::read_u16(chunk) & mask;
            }
        }
    }
}

/// Forward cursor over an immutable byte span.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Starts at the first byte of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to consume.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let span = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(span)
    }

    /// Consumes the next little-endian word.
    pub fn read_u32(&mut self) -> Option<u32> {
        self.take(WORD_BYTES).map(LittleEndian::read_u32)
    }
}
