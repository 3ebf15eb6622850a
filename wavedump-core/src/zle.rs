//! Zero-length-encoding (ZLE) run reconstruction.
//!
//! A ZLE channel payload is a sequence of 32-bit control words. A data word
//! is followed by the samples of one recorded run; a skip word stands for a
//! run the board discarded. Rebuilding the trace places every recorded run at
//! its absolute position inside the acquisition window and fills the rest
//! with the sentinel.

use crate::layout::{BoardLayout, SampleWidth, ZleLengthUnit};
use crate::parser::{self, ByteCursor};
use thiserror::Error;

/// Inconsistency between a control-word stream and the window length.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZleFault {
    #[error("record length is zero")]
    EmptyWindow,

    #[error("run of {count} samples at sample {position} overruns window of {window}")]
    Overrun {
        position: usize,
        count: usize,
        window: usize,
    },

    #[error("control words exhausted at sample {position} of {window}")]
    Exhausted { position: usize, window: usize },

    #[error("data run at sample {position} needs {needed} bytes, {available} left")]
    MissingData {
        position: usize,
        needed: usize,
        available: usize,
    },

    #[error("run length {count} is not a multiple of {per_word} samples per word")]
    Unaligned { count: usize, per_word: usize },

    #[error("{bytes} payload bytes left after the window end")]
    Leftover { bytes: usize },
}

/// Reconstruction parameters taken from a [`BoardLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZleWindow {
    /// Trace length in samples
    pub length: usize,
    pub sample_width: SampleWidth,
    pub sample_mask: u16,
    pub length_unit: ZleLengthUnit,
    pub sentinel: u16,
}

impl ZleWindow {
    /// Takes the window parameters from a layout.
    pub fn from_layout(layout: &BoardLayout) -> Self {
        Self {
            length: layout.record_length,
            sample_width: layout.sample_width,
            sample_mask: layout.sample_mask(),
            length_unit: layout.zle_length_unit,
            sentinel: layout.sentinel,
        }
    }

    /// Converts a control word run length to samples.
    #[inline]
    fn run_samples(&self, length: u32) -> Result<usize, ZleFault> {
        let length = length as usize;
        let per_word = self.sample_width.samples_per_word();
        match self.length_unit {
            ZleLengthUnit::Words => Ok(length * per_word),
            ZleLengthUnit::Samples if length % per_word == 0 => Ok(length),
            ZleLengthUnit::Samples => Err(ZleFault::Unaligned {
                count: length,
                per_word,
            }),
        }
    }
}

/// Rebuilds a full-length trace from a ZLE channel payload.
///
/// `payload` holds the control words only; any leading size word has already
/// been consumed. The result is always exactly `window.length` samples.
pub fn reconstruct(payload: &[u8], window: &ZleWindow) -> Result<Vec<u16>, ZleFault> {
    if window.length == 0 {
        return Err(ZleFault::EmptyWindow);
    }

    let mut trace = vec![window.sentinel; window.length];
    let mut cursor = ByteCursor::new(payload);
    let mut position = 0usize;

    while position < window.length {
        let control = cursor.read_u32().ok_or(ZleFault::Exhausted {
            position,
            window: window.length,
        })?;

        let count = window.run_samples(parser::zle_length(control))?;
        let end = position
            .checked_add(count)
            .filter(|&end| end <= window.length)
            .ok_or(ZleFault::Overrun {
                position,
                count,
                window: window.length,
            })?;

        if parser::zle_is_data(control) {
            let needed = count * window.sample_width.bytes();
            let available = cursor.remaining();
            let data = cursor.take(needed).ok_or(ZleFault::MissingData {
                position,
                needed,
                available,
            })?;
            parser::unpack_samples(
                data,
                window.sample_width,
                window.sample_mask,
                &mut trace[position..end],
            );
        }

        position = end;
    }

    if !cursor.is_empty() {
        return Err(ZleFault::Leftover {
            bytes: cursor.remaining(),
        });
    }

    Ok(trace)
}
