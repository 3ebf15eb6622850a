//! Stateless event decoder.
//!
//! This module turns one [`RawEventFrame`] into a [`DecodedEvent`]: it parses
//! the header through the board layout, works out which channels are present
//! and how each is encoded, and rebuilds every trace. The only state carried
//! between events is the caller-owned [`TimeTagState`].

use crate::layout::{BitField, BoardLayout, ChannelSelect, TimeTagClock};
use crate::parser::{self, ByteCursor, WORD_BYTES};
use crate::time::TimeTagState;
use crate::types::{
    ChannelId, ChannelMode, ChannelTrace, DecodedEvent, EventHeader, RawEventFrame,
};
use crate::zle::{self, ZleFault, ZleWindow};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading or decoding an event stream.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot open {path:?}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated frame at offset {offset}: declares {declared} bytes, {available} available")]
    TruncatedFrame {
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("malformed header at offset {offset}: {reason}")]
    MalformedHeader { offset: u64, reason: String },

    #[error("size mismatch at offset {offset}: header declares {declared} bytes, channels account for {consumed}")]
    SizeMismatch {
        offset: u64,
        declared: u64,
        consumed: u64,
    },

    #[error("ZLE decode fault at offset {offset}, channel {channel}: {fault}")]
    ZleDecodeFault {
        offset: u64,
        channel: ChannelId,
        #[source]
        fault: ZleFault,
    },

    #[error("invalid board layout: {0}")]
    InvalidLayout(String),
}

impl DecodeError {
    /// File offset of the frame the error refers to, when there is one.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::TruncatedFrame { offset, .. }
            | Self::MalformedHeader { offset, .. }
            | Self::SizeMismatch { offset, .. }
            | Self::ZleDecodeFault { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// One enabled channel's slice of the frame.
#[derive(Debug)]
struct ChannelSpan<'f> {
    channel: ChannelId,
    mode: ChannelMode,
    payload: &'f [u8],
}

impl<'f> ChannelSpan<'f> {
    fn new(channel: ChannelId, zle: bool, payload: &'f [u8]) -> Self {
        let bytes = payload.len();
        let mode = if bytes == 0 {
            ChannelMode::Suppressed
        } else if zle {
            ChannelMode::Zle { bytes }
        } else {
            ChannelMode::Full { bytes }
        };
        Self {
            channel,
            mode,
            payload,
        }
    }
}

/// Decoder for one board layout.
///
/// Holds no per-stream state, so a single decoder can be shared between
/// threads decoding independent frames.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    layout: BoardLayout,
    window: ZleWindow,
    clock: TimeTagClock,
}

impl EventDecoder {
    /// Creates a decoder after validating the layout.
    pub fn new(layout: BoardLayout) -> Result<Self, DecodeError> {
        layout.validate()?;
        Ok(Self {
            window: ZleWindow::from_layout(&layout),
            clock: layout.clock(),
            layout,
        })
    }

    /// Layout the decoder was built with.
    pub fn layout(&self) -> &BoardLayout {
        &self.layout
    }

    /// Parses the fixed header (and size table, if any) of a frame.
    pub fn parse_header(&self, frame: &RawEventFrame) -> Result<EventHeader, DecodeError> {
        let layout = &self.layout;
        let bytes = frame.bytes();
        let offset = frame.offset();

        let header_bytes = layout.header_bytes();
        if bytes.len() < header_bytes {
            return Err(DecodeError::MalformedHeader {
                offset,
                reason: format!(
                    "frame of {} bytes is shorter than the {}-byte header",
                    bytes.len(),
                    header_bytes
                ),
            });
        }

        if let Some(magic) = &layout.magic {
            let word = header_field(frame, &BitField::new(0, 0, 32))?;
            if !magic.matches(word) {
                return Err(DecodeError::MalformedHeader {
                    offset,
                    reason: format!(
                        "word 0 ({word:#010x}) lacks marker bits {:#010x}",
                        magic.value
                    ),
                });
            }
        }

        let size_bytes = u64::from(header_field(frame, &layout.size)?) * layout.size_unit.bytes();

        let channel_mask = match &layout.channels {
            ChannelSelect::Mask(mask) => {
                parser::read_composite(bytes, mask).ok_or_else(|| DecodeError::MalformedHeader {
                    offset,
                    reason: "channel mask outside the header".to_string(),
                })?
            }
            ChannelSelect::Index(field) => {
                let channel = header_field(frame, field)?;
                if channel >= 32 {
                    return Err(DecodeError::MalformedHeader {
                        offset,
                        reason: format!("channel index {channel} out of range"),
                    });
                }
                1u32 << channel
            }
        };

        let zle = match &layout.zle_flag {
            Some(field) => header_field(frame, field)? != 0,
            None => false,
        };

        let pattern = layout
            .pattern
            .as_ref()
            .map(|field| header_field(frame, field))
            .transpose()?;

        let mut header_len = header_bytes;
        let channel_sizes = if layout.size_table {
            let count = channel_mask.count_ones() as usize;
            let sizes = (0..count)
                .map(|i| {
                    parser::word_at(bytes, layout.header_words + i).ok_or_else(|| {
                        DecodeError::MalformedHeader {
                            offset,
                            reason: format!("size table of {count} words runs past the frame"),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            header_len += count * WORD_BYTES;
            Some(sizes)
        } else {
            None
        };

        Ok(EventHeader {
            size_bytes: usize::try_from(size_bytes).map_err(|_| DecodeError::MalformedHeader {
                offset,
                reason: format!("event size {size_bytes} does not fit in memory"),
            })?,
            board_id: header_field(frame, &layout.board_id)?,
            channel_mask,
            event_counter: header_field(frame, &layout.event_counter)?,
            trigger_time_tag: header_field(frame, &layout.trigger_time_tag)?,
            zle,
            pattern,
            channel_sizes,
            header_bytes: header_len,
        })
    }

    /// Reports how each enabled channel of a frame is stored.
    pub fn channel_modes(
        &self,
        frame: &RawEventFrame,
    ) -> Result<Vec<(ChannelId, ChannelMode)>, DecodeError> {
        let header = self.parse_header(frame)?;
        check_frame_size(&header, frame)?;
        Ok(self
            .channel_spans(&header, frame)?
            .into_iter()
            .map(|span| (span.channel, span.mode))
            .collect())
    }

    /// Decodes one frame.
    ///
    /// `time` is the state left by the previous event of the same stream;
    /// the returned state must be passed to the next call. The state is not
    /// advanced when decoding fails.
    pub fn decode(
        &self,
        frame: &RawEventFrame,
        time: TimeTagState,
    ) -> Result<(DecodedEvent, TimeTagState), DecodeError> {
        let offset = frame.offset();
        let header = self.parse_header(frame)?;
        check_frame_size(&header, frame)?;

        let mut traces = BTreeMap::new();
        for span in self.channel_spans(&header, frame)? {
            let samples = match span.mode {
                ChannelMode::Suppressed => {
                    debug!(offset, channel = span.channel, "channel zero-suppressed");
                    continue;
                }
                ChannelMode::Full { .. } => self.full_trace(&header, frame, span.payload)?,
                ChannelMode::Zle { .. } => zle::reconstruct(span.payload, &self.window).map_err(
                    |fault| DecodeError::ZleDecodeFault {
                        offset,
                        channel: span.channel,
                        fault,
                    },
                )?,
            };
            traces.insert(
                span.channel,
                ChannelTrace::new(header.board_id, span.channel, samples),
            );
        }

        let (elapsed_us, time) = time.advance(header.trigger_time_tag, &self.clock);

        Ok((
            DecodedEvent {
                event_counter: header.event_counter,
                trigger_time_tag: header.trigger_time_tag,
                elapsed_us,
                file_offset: offset,
                traces,
            },
            time,
        ))
    }

    /// Recomputes elapsed times over events in stream order.
    ///
    /// Used after decoding frames in parallel, each with a fresh state.
    pub fn elapsed_pass(&self, events: &mut [DecodedEvent], mut time: TimeTagState) -> TimeTagState {
        for event in events {
            let (elapsed_us, next) = time.advance(event.trigger_time_tag, &self.clock);
            event.elapsed_us = elapsed_us;
            time = next;
        }
        time
    }

    /// Splits the frame after the header into per-channel payloads.
    ///
    /// Channel sizes come from the size table when the layout has one.
    /// Without it, ZLE channels lead with their own size word (32-bit words,
    /// the size word included) and full channels share the payload evenly.
    fn channel_spans<'f>(
        &self,
        header: &EventHeader,
        frame: &'f RawEventFrame,
    ) -> Result<Vec<ChannelSpan<'f>>, DecodeError> {
        let offset = frame.offset();
        let declared = header.size_bytes as u64;
        let mismatch = |consumed: usize| DecodeError::SizeMismatch {
            offset,
            declared,
            consumed: consumed as u64,
        };

        let mut cursor = ByteCursor::new(frame.bytes());
        cursor
            .take(header.header_bytes)
            .ok_or_else(|| mismatch(header.header_bytes))?;

        let channels: Vec<ChannelId> = header.enabled_channels().collect();
        let mut spans = Vec::with_capacity(channels.len());

        if let Some(sizes) = &header.channel_sizes {
            for (&channel, &words) in channels.iter().zip(sizes) {
                let len = words as usize * WORD_BYTES;
                let payload = cursor
                    .take(len)
                    .ok_or_else(|| mismatch(cursor.position() + len))?;
                spans.push(ChannelSpan::new(channel, header.zle, payload));
            }
        } else if header.zle {
            for &channel in &channels {
                let size = cursor
                    .read_u32()
                    .ok_or_else(|| mismatch(cursor.position() + WORD_BYTES))?;
                let len = size.saturating_sub(1) as usize * WORD_BYTES;
                let payload = cursor
                    .take(len)
                    .ok_or_else(|| mismatch(cursor.position() + len))?;
                spans.push(ChannelSpan::new(channel, true, payload));
            }
        } else if !channels.is_empty() {
            let remaining = cursor.remaining();
            let share = remaining / channels.len();
            if remaining % channels.len() != 0 {
                return Err(mismatch(cursor.position() + share * channels.len()));
            }
            for &channel in &channels {
                let payload = cursor
                    .take(share)
                    .ok_or_else(|| mismatch(cursor.position() + share))?;
                spans.push(ChannelSpan::new(channel, false, payload));
            }
        }

        if cursor.position() != header.size_bytes {
            return Err(mismatch(cursor.position()));
        }

        Ok(spans)
    }

    /// Reads a contiguous full-readout trace.
    fn full_trace(
        &self,
        header: &EventHeader,
        frame: &RawEventFrame,
        payload: &[u8],
    ) -> Result<Vec<u16>, DecodeError> {
        let width = self.layout.sample_width;
        let leftover = payload.len() % width.bytes();
        if leftover != 0 {
            return Err(DecodeError::SizeMismatch {
                offset: frame.offset(),
                declared: header.size_bytes as u64,
                consumed: (header.size_bytes - leftover) as u64,
            });
        }

        let mut samples = vec![0u16; payload.len() / width.bytes()];
        parser::unpack_samples(payload, width, self.layout.sample_mask(), &mut samples);
        Ok(samples)
    }
}

/// Reads one header field, reporting a malformed header if it is missing.
fn header_field(frame: &RawEventFrame, field: &BitField) -> Result<u32, DecodeError> {
    parser::read_field(frame.bytes(), field).ok_or_else(|| DecodeError::MalformedHeader {
        offset: frame.offset(),
        reason: format!("field at word {} outside the frame", field.word),
    })
}

fn check_frame_size(header: &EventHeader, frame: &RawEventFrame) -> Result<(), DecodeError> {
    if header.size_bytes != frame.len() {
        return Err(DecodeError::SizeMismatch {
            offset: frame.offset(),
            declared: header.size_bytes as u64,
            consumed: frame.len() as u64,
        });
    }
    Ok(())
}
