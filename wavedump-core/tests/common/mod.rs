//! Synthetic V17xx event builders shared by the integration tests.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

/// Board id written into every synthetic header.
pub const BOARD_ID: u32 = 1;

/// One run of a ZLE channel, lengths in 16-bit samples.
pub enum ZleRun {
    Skip(u32),
    Data(Vec<u16>),
}

fn header(size_words: u32, mask: u32, zle: bool, counter: u32, tag: u32) -> Vec<u32> {
    vec![
        0xA000_0000 | size_words,
        (BOARD_ID << 27) | (u32::from(zle) << 24) | (mask & 0xFF),
        ((mask >> 8) << 24) | (counter & 0x00FF_FFFF),
        tag & 0x7FFF_FFFF,
    ]
}

fn pack(samples: &[u16]) -> Vec<u32> {
    samples
        .chunks(2)
        .map(|pair| u32::from(pair[0]) | (u32::from(*pair.get(1).unwrap_or(&0)) << 16))
        .collect()
}

fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Full-readout event; every channel must carry the same number of samples.
pub fn full_event(counter: u32, tag: u32, channels: &[(u8, Vec<u16>)]) -> Vec<u8> {
    let mask = channels.iter().fold(0u32, |mask, (ch, _)| mask | (1 << ch));
    let payload: Vec<u32> = channels.iter().flat_map(|(_, s)| pack(s)).collect();
    let mut words = header(4 + payload.len() as u32, mask, false, counter, tag);
    words.extend(payload);
    to_bytes(&words)
}

/// ZLE event; a channel with no runs is written as zero-suppressed.
pub fn zle_event(counter: u32, tag: u32, channels: &[(u8, Vec<ZleRun>)]) -> Vec<u8> {
    let mask = channels.iter().fold(0u32, |mask, (ch, _)| mask | (1 << ch));
    let mut payload = Vec::new();
    for (_, runs) in channels {
        let mut body = Vec::new();
        for run in runs {
            match run {
                ZleRun::Skip(samples) => body.push(samples / 2),
                ZleRun::Data(samples) => {
                    body.push(0x8000_0000 | (samples.len() as u32 / 2));
                    body.extend(pack(samples));
                }
            }
        }
        payload.push(body.len() as u32 + 1);
        payload.extend(body);
    }
    let mut words = header(4 + payload.len() as u32, mask, true, counter, tag);
    words.extend(payload);
    to_bytes(&words)
}

/// Writes frames back to back into a temporary file.
pub fn write_file(frames: &[Vec<u8>]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    for frame in frames {
        file.write_all(frame).expect("write frame");
    }
    file.flush().expect("flush");
    file
}
