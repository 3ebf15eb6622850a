//! Core types for framed and decoded digitizer events.

use std::collections::BTreeMap;

/// Physical channel index (0-31).
pub type ChannelId = u8;

/// The complete byte span of one event record.
///
/// Frames are produced by [`EventStreamReader`](crate::reader::EventStreamReader)
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventFrame {
    offset: u64,
    bytes: Vec<u8>,
}

impl RawEventFrame {
    /// Creates a frame from the bytes found at `offset`.
    pub fn new(offset: u64, bytes: Vec<u8>) -> Self {
        Self { offset, bytes }
    }

    /// File offset of the first header byte.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Frame bytes, header included.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fixed-layout metadata at the start of every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    /// Total event size in bytes, header included
    pub size_bytes: usize,
    pub board_id: u32,
    /// Bit k set when channel k is enabled
    pub channel_mask: u32,
    /// Hardware event counter (wraps at the field width)
    pub event_counter: u32,
    /// Trigger time tag in clock ticks
    pub trigger_time_tag: u32,
    /// Every enabled channel is zero-length encoded
    pub zle: bool,
    pub pattern: Option<u32>,
    /// Per-channel payload sizes in 32-bit words, one per enabled channel
    pub channel_sizes: Option<Vec<u32>>,
    /// Bytes taken by the header and any size table
    pub header_bytes: usize,
}

impl EventHeader {
    /// Iterates enabled channels in ascending order.
    pub fn enabled_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        (0..32u8).filter(move |&ch| self.channel_mask & (1u32 << ch) != 0)
    }

    /// Number of enabled channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_mask.count_ones() as usize
    }
}

/// Readout mode of one enabled channel within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Complete trace stored contiguously
    Full { bytes: usize },
    /// Enabled but carries no data
    Suppressed,
    /// Control-word encoded runs
    Zle { bytes: usize },
}

/// One channel's waveform over the acquisition window.
///
/// For ZLE channels, samples outside the recorded runs hold the layout
/// sentinel and can only be told apart from recorded values by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTrace {
    /// Trace name, `b<board>tr<channel>`
    pub name: String,
    pub channel: ChannelId,
    pub samples: Vec<u16>,
}

impl ChannelTrace {
    /// Creates a trace named after its board and channel.
    pub fn new(board_id: u32, channel: ChannelId, samples: Vec<u16>) -> Self {
        Self {
            name: format!("b{}tr{}", board_id, channel),
            channel,
            samples,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A fully decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event_counter: u32,
    /// Raw trigger time tag in clock ticks
    pub trigger_time_tag: u32,
    /// Microseconds since the start of the stream, wraps accounted for
    pub elapsed_us: f64,
    /// File offset of the frame
    pub file_offset: u64,
    /// Enabled, non-suppressed channels
    pub traces: BTreeMap<ChannelId, ChannelTrace>,
}

impl DecodedEvent {
    /// Returns the trace of `channel`, if it was recorded.
    pub fn trace(&self, channel: ChannelId) -> Option<&ChannelTrace> {
        self.traces.get(&channel)
    }
}
