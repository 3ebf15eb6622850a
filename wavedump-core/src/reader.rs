//! Sequential framing of an event stream.
//!
//! The reader knows only where the size field lives in the header prefix. It
//! never reads past the end of the frame it is assembling, because
//! acquisition files may still be growing while they are read.

use crate::decoder::DecodeError;
use crate::layout::{BitField, BoardLayout, SizeUnit};
use crate::parser;
use crate::types::RawEventFrame;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

/// Forward-only frame reader over a seekable byte source.
#[derive(Debug)]
pub struct EventStreamReader<R> {
    source: R,
    offset: u64,
    prefix_len: usize,
    size: BitField,
    size_unit: SizeUnit,
}

impl EventStreamReader<File> {
    /// Opens a file with the cursor at offset 0.
    pub fn open<P: AsRef<Path>>(path: P, layout: &BoardLayout) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DecodeError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file, layout)
    }
}

impl<R: Read + Seek> EventStreamReader<R> {
    /// Wraps a source; framing starts at its current position.
    pub fn new(mut source: R, layout: &BoardLayout) -> Result<Self, DecodeError> {
        layout.validate()?;
        let offset = source.stream_position()?;
        Ok(Self {
            source,
            offset,
            prefix_len: layout.header_bytes(),
            size: layout.size,
            size_unit: layout.size_unit,
        })
    }

    /// Offset the next [`next_frame`](Self::next_frame) call starts from.
    #[inline]
    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    /// Releases the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Reads the next complete frame.
    ///
    /// Returns `Ok(None)` once fewer bytes than a header remain. On a
    /// truncated frame the cursor is left at the frame start, so the call
    /// can be repeated after the writer has appended more data.
    pub fn next_frame(&mut self) -> Result<Option<RawEventFrame>, DecodeError> {
        let start = self.offset;

        let mut bytes = vec![0u8; self.prefix_len];
        let got = read_up_to(&mut self.source, &mut bytes)?;
        if got < self.prefix_len {
            if got > 0 {
                warn!(offset = start, bytes = got, "partial event header at end of stream");
                self.source.seek(SeekFrom::Start(start))?;
            }
            return Ok(None);
        }

        let declared = parser::read_field(&bytes, &self.size)
            .map(|size| u64::from(size) * self.size_unit.bytes())
            .unwrap_or(0);
        if declared < self.prefix_len as u64 {
            self.source.seek(SeekFrom::Start(start))?;
            return Err(DecodeError::MalformedHeader {
                offset: start,
                reason: format!(
                    "declared size {declared} is smaller than the {}-byte header",
                    self.prefix_len
                ),
            });
        }

        let end = self.source.seek(SeekFrom::End(0))?;
        let available = end.saturating_sub(start);
        if declared > available {
            self.source.seek(SeekFrom::Start(start))?;
            return Err(DecodeError::TruncatedFrame {
                offset: start,
                declared,
                available,
            });
        }

        self.source
            .seek(SeekFrom::Start(start + self.prefix_len as u64))?;
        bytes.resize(declared as usize, 0);
        if let Err(e) = self.source.read_exact(&mut bytes[self.prefix_len..]) {
            if let Err(seek) = self.source.seek(SeekFrom::Start(start)) {
                warn!(offset = start, error = %seek, "cannot rewind to frame start");
            }
            return Err(match e.kind() {
                ErrorKind::UnexpectedEof => DecodeError::TruncatedFrame {
                    offset: start,
                    declared,
                    available,
                },
                _ => DecodeError::Io(e),
            });
        }

        self.offset = start + declared;
        debug!(offset = start, size = declared, "framed event");
        Ok(Some(RawEventFrame::new(start, bytes)))
    }
}

/// Fills `buf` as far as the source allows, returning the bytes read.
fn read_up_to<R: Read>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
