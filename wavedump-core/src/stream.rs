//! Pull-based decoding session over one event stream.

use crate::decoder::{DecodeError, EventDecoder};
use crate::layout::BoardLayout;
use crate::reader::EventStreamReader;
use crate::time::TimeTagState;
use crate::types::DecodedEvent;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::warn;

/// A reader, a decoder and the time tag state of one stream.
///
/// Iterating yields one `Result` per frame. A decode fault is reported and
/// iteration may continue with the next frame; a read fault ends the stream.
///
/// ```no_run
/// use wavedump_core::{BoardLayout, EventStream};
///
/// let layout = BoardLayout::v1730().with_record_length(1024);
/// for event in EventStream::open("run_0.dat", layout).unwrap() {
///     match event {
///         Ok(event) => println!("{} channels at {} us", event.traces.len(), event.elapsed_us),
///         Err(e) => eprintln!("skipping: {e}"),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct EventStream<R> {
    reader: EventStreamReader<R>,
    decoder: EventDecoder,
    time: TimeTagState,
    finished: bool,
}

impl EventStream<File> {
    /// Opens a file for decoding with the given layout.
    pub fn open<P: AsRef<Path>>(path: P, layout: BoardLayout) -> Result<Self, DecodeError> {
        let reader = EventStreamReader::open(path, &layout)?;
        let decoder = EventDecoder::new(layout)?;
        Ok(Self::new(reader, decoder))
    }
}

impl<R: Read + Seek> EventStream<R> {
    /// Starts a session at the reader's current offset with a fresh time state.
    pub fn new(reader: EventStreamReader<R>, decoder: EventDecoder) -> Self {
        Self {
            reader,
            decoder,
            time: TimeTagState::new(),
            finished: false,
        }
    }

    /// Reads and decodes the next event.
    ///
    /// `Ok(None)` marks the end of the stream.
    pub fn next_event(&mut self) -> Result<Option<DecodedEvent>, DecodeError> {
        let Some(frame) = self.reader.next_frame()? else {
            return Ok(None);
        };
        let (event, time) = self.decoder.decode(&frame, self.time)?;
        self.time = time;
        Ok(Some(event))
    }

    /// Offset of the next frame to be read.
    #[inline]
    pub fn current_offset(&self) -> u64 {
        self.reader.current_offset()
    }

    /// Time tag state after the last successfully decoded event.
    #[inline]
    pub fn time_state(&self) -> TimeTagState {
        self.time
    }

    /// Layout used to frame and decode the stream.
    pub fn layout(&self) -> &BoardLayout {
        self.decoder.layout()
    }

    /// Releases the reader and with it the source.
    pub fn into_reader(self) -> EventStreamReader<R> {
        self.reader
    }
}

impl<R: Read + Seek> Iterator for EventStream<R> {
    type Item = Result<DecodedEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let frame = match self.reader.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };

        match self.decoder.decode(&frame, self.time) {
            Ok((event, time)) => {
                self.time = time;
                Some(Ok(event))
            }
            Err(e) => {
                warn!(offset = frame.offset(), error = %e, "skipping undecodable frame");
                Some(Err(e))
            }
        }
    }
}
