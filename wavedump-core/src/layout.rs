//! Board layouts: the parameter sets describing one digitizer family's
//! event header.
//!
//! CAEN boards share the same framing (a little-endian header of 32-bit words
//! followed by per-channel payloads) but differ in field positions, sample
//! width and time tag resolution. A [`BoardLayout`] names every field as a
//! [`BitField`] so the same decoder serves several families. Layouts can be
//! built from the presets below or loaded from TOML:
//!
//! ```toml
//! name = "custom"
//! header_words = 4
//! size = { word = 0, width = 28 }
//! size_unit = "words"
//! magic = { mask = 0xF0000000, value = 0xA0000000 }
//! board_id = { word = 1, shift = 27, width = 5 }
//! channels = { mask = [{ word = 1, width = 8 }] }
//! event_counter = { word = 2, width = 24 }
//! trigger_time_tag = { word = 3, width = 31 }
//! zle_flag = { word = 1, shift = 24, width = 1 }
//! record_length = 1024
//! ```

use crate::decoder::DecodeError;
use crate::parser::{WORD_BYTES, ZLE_LENGTH_MASK};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A contiguous run of bits inside one 32-bit header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitField {
    /// Index of the header word holding the field
    pub word: usize,
    /// Position of the least significant bit
    #[serde(default)]
    pub shift: u32,
    /// Number of bits (1-32)
    pub width: u32,
}

impl BitField {
    /// Creates a new bit field.
    pub const fn new(word: usize, shift: u32, width: u32) -> Self {
        Self { word, shift, width }
    }

    /// Largest value the field can hold.
    pub fn max_value(&self) -> u64 {
        (1u64 << self.width) - 1
    }

    fn check(&self, name: &str, header_words: usize) -> Result<(), DecodeError> {
        if self.width == 0 || self.width > 32 {
            return Err(DecodeError::InvalidLayout(format!(
                "{name}: width {} outside 1..=32",
                self.width
            )));
        }
        if self.shift.checked_add(self.width).map_or(true, |end| end > 32) {
            return Err(DecodeError::InvalidLayout(format!(
                "{name}: bits {}..{} exceed a 32-bit word",
                self.shift,
                u64::from(self.shift) + u64::from(self.width)
            )));
        }
        if self.word >= header_words {
            return Err(DecodeError::InvalidLayout(format!(
                "{name}: word {} outside a {header_words}-word header",
                self.word
            )));
        }
        Ok(())
    }
}

/// Several bit fields concatenated low-to-high into one value.
///
/// Sixteen-channel boards split the channel mask over two header words; the
/// first part supplies the low bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeField(pub Vec<BitField>);

impl CompositeField {
    /// Total width in bits.
    pub fn width(&self) -> u32 {
        self.0.iter().map(|part| part.width).sum()
    }
}

/// How an event names the channels it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelect {
    /// Enable mask, bit k set when channel k is present
    Mask(CompositeField),
    /// Single-channel records carrying the channel index
    Index(BitField),
}

/// Unit of the header's total event size field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeUnit {
    /// 32-bit words
    Words,
    /// Bytes
    Bytes,
}

impl SizeUnit {
    /// Number of bytes in one unit.
    pub fn bytes(self) -> u64 {
        match self {
            Self::Words => WORD_BYTES as u64,
            Self::Bytes => 1,
        }
    }
}

/// Storage width of one sample in the channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleWidth {
    /// One byte per sample, four samples per word (V1721 family)
    Bits8,
    /// Two bytes per sample, two samples per word
    Bits16,
}

impl SampleWidth {
    /// Bytes per stored sample.
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
        }
    }

    /// Samples packed into one 32-bit word.
    pub fn samples_per_word(self) -> usize {
        WORD_BYTES / self.bytes()
    }

    /// Bits in the sample container.
    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }
}

/// Unit of the length carried by a ZLE control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZleLengthUnit {
    /// 32-bit words of packed samples (what the hardware writes)
    Words,
    /// Samples, always a multiple of the samples per word
    Samples,
}

/// Fixed bits word 0 of every header must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Magic {
    pub mask: u32,
    pub value: u32,
}

impl Magic {
    /// Returns true if `word` carries the expected bits.
    #[inline]
    pub fn matches(&self, word: u32) -> bool {
        word & self.mask == self.value
    }
}

/// Clock parameters of the trigger time tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeTagClock {
    /// Value at which the tag wraps back to zero
    pub modulus: u64,
    /// Duration of one tick in nanoseconds
    pub tick_ns: f64,
}

/// Header description of one board family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardLayout {
    /// Free-form label used in log output
    #[serde(default)]
    pub name: String,
    /// Length of the common header in 32-bit words
    pub header_words: usize,
    /// Total event size, header included
    pub size: BitField,
    pub size_unit: SizeUnit,
    #[serde(default)]
    pub magic: Option<Magic>,
    pub board_id: BitField,
    pub channels: ChannelSelect,
    pub event_counter: BitField,
    /// Trigger time tag; its width sets the wrap modulus
    pub trigger_time_tag: BitField,
    /// Event-level flag marking every channel as ZLE-encoded
    #[serde(default)]
    pub zle_flag: Option<BitField>,
    #[serde(default)]
    pub pattern: Option<BitField>,
    /// One size word per enabled channel follows the header
    #[serde(default)]
    pub size_table: bool,
    #[serde(default = "default_sample_width")]
    pub sample_width: SampleWidth,
    /// Significant bits per sample; upper container bits are masked off
    #[serde(default = "default_sample_bits")]
    pub sample_bits: u32,
    #[serde(default = "default_tick_ns")]
    pub tick_ns: f64,
    /// ZLE acquisition window in samples
    #[serde(default)]
    pub record_length: usize,
    #[serde(default = "default_zle_length_unit")]
    pub zle_length_unit: ZleLengthUnit,
    /// Fill value for samples outside recorded ZLE runs
    #[serde(default)]
    pub sentinel: u16,
}

fn default_sample_width() -> SampleWidth {
    SampleWidth::Bits16
}

fn default_sample_bits() -> u32 {
    16
}

fn default_tick_ns() -> f64 {
    8.0
}

fn default_zle_length_unit() -> ZleLengthUnit {
    ZleLengthUnit::Words
}

impl BoardLayout {
    /// CAEN V1720: 8 channels, 12-bit samples, 4-word header.
    pub fn v1720() -> Self {
        Self::v17xx("V1720", SampleWidth::Bits16, 12)
    }

    /// CAEN V1730: 16 channels, 14-bit samples, 4-word header.
    pub fn v1730() -> Self {
        Self::v17xx("V1730", SampleWidth::Bits16, 14)
    }

    /// CAEN V1721: 8 channels, 8-bit samples packed four to a word.
    pub fn v1721() -> Self {
        Self::v17xx("V1721", SampleWidth::Bits8, 8)
    }

    /// Shared V17xx header.
    ///
    /// ```text
    /// word 0: [31:28] 0xA | [27:0] event size in words
    /// word 1: [31:27] board id | [24] ZLE | [23:8] pattern | [7:0] mask low
    /// word 2: [31:24] mask high | [23:0] event counter
    /// word 3: [31] overflow | [30:0] trigger time tag
    /// ```
    fn v17xx(name: &str, sample_width: SampleWidth, sample_bits: u32) -> Self {
        Self {
            name: name.to_string(),
            header_words: 4,
            size: BitField::new(0, 0, 28),
            size_unit: SizeUnit::Words,
            magic: Some(Magic {
                mask: 0xF000_0000,
                value: 0xA000_0000,
            }),
            board_id: BitField::new(1, 27, 5),
            channels: ChannelSelect::Mask(CompositeField(vec![
                BitField::new(1, 0, 8),
                BitField::new(2, 24, 8),
            ])),
            event_counter: BitField::new(2, 0, 24),
            trigger_time_tag: BitField::new(3, 0, 31),
            zle_flag: Some(BitField::new(1, 24, 1)),
            pattern: Some(BitField::new(1, 8, 16)),
            size_table: false,
            sample_width,
            sample_bits,
            tick_ns: default_tick_ns(),
            record_length: 0,
            zle_length_unit: ZleLengthUnit::Words,
            sentinel: 0,
        }
    }

    /// WaveDump per-channel binary record (`OUTPUT_FILE_HEADER YES`).
    ///
    /// ```text
    /// word 0: event size in bytes, header included
    /// word 1: board id
    /// word 2: pattern
    /// word 3: channel
    /// word 4: event counter
    /// word 5: trigger time tag
    /// ```
    pub fn wavedump_channel() -> Self {
        Self {
            name: "WaveDump channel".to_string(),
            header_words: 6,
            size: BitField::new(0, 0, 32),
            size_unit: SizeUnit::Bytes,
            magic: None,
            board_id: BitField::new(1, 0, 32),
            channels: ChannelSelect::Index(BitField::new(3, 0, 32)),
            event_counter: BitField::new(4, 0, 32),
            trigger_time_tag: BitField::new(5, 0, 31),
            zle_flag: None,
            pattern: Some(BitField::new(2, 0, 32)),
            size_table: false,
            sample_width: SampleWidth::Bits16,
            sample_bits: 16,
            tick_ns: default_tick_ns(),
            record_length: 0,
            zle_length_unit: ZleLengthUnit::Words,
            sentinel: 0,
        }
    }

    /// Sets the ZLE record length in samples.
    pub fn with_record_length(mut self, record_length: usize) -> Self {
        self.record_length = record_length;
        self
    }

    /// Parses a layout from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self, DecodeError> {
        let layout: Self =
            toml::from_str(text).map_err(|e| DecodeError::InvalidLayout(e.to_string()))?;
        layout.validate()?;
        Ok(layout)
    }

    /// Reads a layout from a TOML file and validates it.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| DecodeError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    /// Length of the common header in bytes.
    #[inline]
    pub fn header_bytes(&self) -> usize {
        self.header_words * WORD_BYTES
    }

    /// Mask applied to every decoded sample.
    #[inline]
    pub fn sample_mask(&self) -> u16 {
        ((1u32 << self.sample_bits) - 1) as u16
    }

    /// Longest ZLE window a single control word can describe.
    pub fn max_record_length(&self) -> usize {
        match self.zle_length_unit {
            ZleLengthUnit::Words => ZLE_LENGTH_MASK as usize * self.sample_width.samples_per_word(),
            ZleLengthUnit::Samples => ZLE_LENGTH_MASK as usize,
        }
    }

    /// Wrap modulus and tick duration of the trigger time tag.
    pub fn clock(&self) -> TimeTagClock {
        TimeTagClock {
            modulus: 1u64 << self.trigger_time_tag.width,
            tick_ns: self.tick_ns,
        }
    }

    /// Checks that every field fits the header and every parameter is usable.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.header_words == 0 {
            return Err(DecodeError::InvalidLayout(
                "header must hold at least one word".to_string(),
            ));
        }

        let words = self.header_words;
        self.size.check("size", words)?;
        self.board_id.check("board_id", words)?;
        self.event_counter.check("event_counter", words)?;
        self.trigger_time_tag.check("trigger_time_tag", words)?;
        if let Some(field) = &self.zle_flag {
            field.check("zle_flag", words)?;
        }
        if let Some(field) = &self.pattern {
            field.check("pattern", words)?;
        }

        match &self.channels {
            ChannelSelect::Mask(mask) => {
                if mask.0.is_empty() {
                    return Err(DecodeError::InvalidLayout(
                        "channel mask has no parts".to_string(),
                    ));
                }
                for part in &mask.0 {
                    part.check("channels.mask", words)?;
                }
                if mask.width() > 32 {
                    return Err(DecodeError::InvalidLayout(format!(
                        "channel mask of {} bits exceeds 32 channels",
                        mask.width()
                    )));
                }
            }
            ChannelSelect::Index(field) => field.check("channels.index", words)?,
        }

        let max_size = self.size.max_value() * self.size_unit.bytes();
        if max_size < self.header_bytes() as u64 {
            return Err(DecodeError::InvalidLayout(format!(
                "size field of {} bits cannot describe a {}-byte header",
                self.size.width,
                self.header_bytes()
            )));
        }

        if !(self.tick_ns.is_finite() && self.tick_ns > 0.0) {
            return Err(DecodeError::InvalidLayout(format!(
                "tick duration {} ns must be positive",
                self.tick_ns
            )));
        }

        if self.sample_bits == 0 || self.sample_bits > self.sample_width.bits() {
            return Err(DecodeError::InvalidLayout(format!(
                "{} significant bits do not fit a {}-bit sample",
                self.sample_bits,
                self.sample_width.bits()
            )));
        }

        if self.record_length > self.max_record_length() {
            return Err(DecodeError::InvalidLayout(format!(
                "record length {} exceeds {} samples",
                self.record_length,
                self.max_record_length()
            )));
        }

        Ok(())
    }
}
