//! Decoder library for CAEN digitizer event streams.
//!
//! This crate decodes the binary event files written by WaveDump-class
//! acquisition software for CAEN waveform digitizers into per-channel sample
//! traces. It supports full readout, zero-suppressed channels and
//! zero-length-encoded (ZLE) channels.
//!
//! # Example
//!
//! ```no_run
//! use wavedump_core::{BoardLayout, EventStream};
//!
//! let layout = BoardLayout::v1720().with_record_length(2048);
//! let mut stream = EventStream::open("wave0.dat", layout).unwrap();
//!
//! while let Some(event) = stream.next_event().unwrap() {
//!     for trace in event.traces.values() {
//!         println!("{}: {} samples", trace.name, trace.len());
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - Header layouts described by parameters, with presets for V1720, V1721,
//!   V1730 and WaveDump per-channel records, or loaded from TOML
//! - Bounds-checked framing that never reads past the current frame
//! - Full-length ZLE trace reconstruction with a configurable sentinel
//! - Stateless decoder with a caller-owned time tag accumulator, so frames
//!   can be decoded in parallel

pub mod decoder;
pub mod layout;
pub mod parser;
pub mod reader;
pub mod stream;
pub mod time;
pub mod types;
pub mod zle;

// Re-export commonly used types
pub use decoder::{DecodeError, EventDecoder};
pub use layout::{BoardLayout, SampleWidth, SizeUnit, ZleLengthUnit};
pub use reader::EventStreamReader;
pub use stream::EventStream;
pub use time::TimeTagState;
pub use types::{ChannelId, ChannelMode, ChannelTrace, DecodedEvent, EventHeader, RawEventFrame};
pub use zle::ZleFault;
