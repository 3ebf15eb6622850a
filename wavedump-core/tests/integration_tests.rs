//! Integration tests decoding synthetic event files from disk.
//!
//! Run with: cargo test --test integration_tests

mod common;

use common::{full_event, write_file, zle_event, ZleRun};
use std::fs::OpenOptions;
use std::io::Write;
use wavedump_core::{
    BoardLayout, DecodeError, EventDecoder, EventStream, EventStreamReader, TimeTagState,
};

/// Test that every event of a full-readout file is decoded in order.
#[test]
fn test_decode_full_readout_file() {
    let frames: Vec<_> = (0..3)
        .map(|i| {
            full_event(
                i,
                1000 * i,
                &[(0, vec![i as u16; 16]), (3, vec![100 + i as u16; 16])],
            )
        })
        .collect();
    let file = write_file(&frames);

    let events: Vec<_> = EventStream::open(file.path(), BoardLayout::v1720())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(events.len(), 3);
    let mut offset = 0u64;
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.event_counter, i as u32);
        assert_eq!(event.file_offset, offset);
        assert_eq!(event.traces.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
        assert_eq!(event.trace(3).unwrap().samples, vec![100 + i as u16; 16]);
        assert_eq!(event.trace(3).unwrap().name, "b1tr3");
        offset += frames[i].len() as u64;
    }
}

/// Test ZLE reconstruction and zero suppression through a file.
#[test]
fn test_decode_zle_file() {
    let run: Vec<u16> = (1..=10).collect();
    let frame = zle_event(
        7,
        0,
        &[
            (
                0,
                vec![ZleRun::Skip(20), ZleRun::Data(run.clone()), ZleRun::Skip(70)],
            ),
            (1, vec![]),
            (
                2,
                vec![ZleRun::Data(vec![500; 4]), ZleRun::Skip(96)],
            ),
        ],
    );
    let file = write_file(&[frame]);

    let layout = BoardLayout::v1720().with_record_length(100);
    let mut stream = EventStream::open(file.path(), layout).unwrap();
    let event = stream.next_event().unwrap().unwrap();
    assert!(stream.next_event().unwrap().is_none());

    assert_eq!(event.traces.keys().copied().collect::<Vec<_>>(), vec![0, 2]);

    let ch0 = &event.trace(0).unwrap().samples;
    assert_eq!(ch0.len(), 100);
    assert!(ch0[..20].iter().all(|&s| s == 0));
    assert_eq!(&ch0[20..30], run.as_slice());
    assert!(ch0[30..].iter().all(|&s| s == 0));

    let ch2 = &event.trace(2).unwrap().samples;
    assert_eq!(ch2.len(), 100);
    assert_eq!(&ch2[..4], &[500; 4]);
}

/// Test that elapsed time never decreases across a time tag wrap.
#[test]
fn test_elapsed_time_monotonic_across_wrap() {
    let tags = [0x7FF0_0000u32, 0x7FFF_0000, 0x7FFF_FFFF, 0x0000_0010, 0x0100_0000];
    let frames: Vec<_> = tags
        .iter()
        .enumerate()
        .map(|(i, &tag)| full_event(i as u32, tag, &[(0, vec![0; 4])]))
        .collect();
    let file = write_file(&frames);

    let mut stream = EventStream::open(file.path(), BoardLayout::v1720()).unwrap();
    let mut last = f64::MIN;
    let mut count = 0;
    while let Some(event) = stream.next_event().unwrap() {
        assert!(
            event.elapsed_us >= last,
            "elapsed time decreased at event {}: {} -> {}",
            event.event_counter,
            last,
            event.elapsed_us
        );
        last = event.elapsed_us;
        count += 1;
    }

    assert_eq!(count, tags.len());
    assert_eq!(stream.time_state().wrap_count(), 1);
}

/// Test that a truncated final frame is reported and never half-decoded.
#[test]
fn test_truncated_final_frame() {
    let first = full_event(0, 0, &[(0, vec![1; 8])]);
    let mut second = full_event(1, 10, &[(0, vec![2; 8])]);
    second.truncate(second.len() - 6);
    let first_len = first.len() as u64;
    let file = write_file(&[first, second]);

    let results: Vec<_> = EventStream::open(file.path(), BoardLayout::v1720())
        .unwrap()
        .collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(DecodeError::TruncatedFrame {
            offset,
            declared,
            available,
        }) => {
            assert_eq!(*offset, first_len);
            assert_eq!(*declared, 32);
            assert_eq!(*available, 26);
        }
        other => panic!("expected truncated frame, got {:?}", other),
    }
}

/// Test that a corrupt frame can be skipped and decoding resumes after it.
#[test]
fn test_resync_after_corrupt_frame() {
    let good = zle_event(0, 0, &[(0, vec![ZleRun::Skip(16)])]);
    // runs sum to 18 samples, overrunning the 16-sample window
    let bad = zle_event(1, 5, &[(0, vec![ZleRun::Skip(10), ZleRun::Data(vec![1; 8])])]);
    let after = zle_event(2, 9, &[(0, vec![ZleRun::Data(vec![3; 16])])]);
    let bad_offset = good.len() as u64;
    let file = write_file(&[good, bad, after]);

    let layout = BoardLayout::v1720().with_record_length(16);
    let results: Vec<_> = EventStream::open(file.path(), layout).unwrap().collect();

    assert_eq!(results.len(), 3);
    match &results[1] {
        Err(err @ DecodeError::ZleDecodeFault { channel: 0, .. }) => {
            assert_eq!(err.offset(), Some(bad_offset));
        }
        other => panic!("expected ZLE fault, got {:?}", other),
    }
    let last = results[2].as_ref().unwrap();
    assert_eq!(last.event_counter, 2);
    assert_eq!(last.trace(0).unwrap().samples, vec![3; 16]);
}

/// Test reading a file that is appended to while it is being read.
#[test]
fn test_growing_file() {
    let frame = full_event(0, 0, &[(0, vec![9; 8])]);
    let file = write_file(&[frame[..20].to_vec()]);

    let layout = BoardLayout::v1720();
    let mut reader = EventStreamReader::open(file.path(), &layout).unwrap();
    assert!(matches!(
        reader.next_frame(),
        Err(DecodeError::TruncatedFrame { offset: 0, .. })
    ));

    let mut writer = OpenOptions::new().append(true).open(file.path()).unwrap();
    writer.write_all(&frame[20..]).unwrap();
    writer.flush().unwrap();

    let raw = reader.next_frame().unwrap().unwrap();
    assert_eq!(raw.bytes(), frame.as_slice());
    assert!(reader.next_frame().unwrap().is_none());

    let decoder = EventDecoder::new(layout).unwrap();
    let (event, _) = decoder.decode(&raw, TimeTagState::new()).unwrap();
    assert_eq!(event.trace(0).unwrap().samples, vec![9; 8]);
}

/// Test loading a board layout from a TOML file.
#[test]
fn test_layout_from_toml_file() {
    let toml = r#"
        name = "V1730 ZLE"
        header_words = 4
        size = { word = 0, width = 28 }
        size_unit = "words"
        magic = { mask = 0xF0000000, value = 0xA0000000 }
        board_id = { word = 1, shift = 27, width = 5 }
        channels = { mask = [{ word = 1, width = 8 }, { word = 2, shift = 24, width = 8 }] }
        event_counter = { word = 2, width = 24 }
        trigger_time_tag = { word = 3, width = 31 }
        zle_flag = { word = 1, shift = 24, width = 1 }
        sample_bits = 14
        record_length = 8
        sentinel = 65535
    "#;
    let layout_file = write_file(&[toml.as_bytes().to_vec()]);
    let layout = BoardLayout::from_toml_file(layout_file.path()).unwrap();
    assert_eq!(layout.record_length, 8);

    let runs = vec![ZleRun::Skip(4), ZleRun::Data(vec![0x3FFF, 0]), ZleRun::Skip(2)];
    let frame = zle_event(0, 0, &[(9, runs)]);
    let file = write_file(&[frame]);
    let event = EventStream::open(file.path(), layout)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    let samples = &event.trace(9).unwrap().samples;
    assert_eq!(samples, &vec![0xFFFF, 0xFFFF, 0xFFFF, 0xFFFF, 0x3FFF, 0, 0xFFFF, 0xFFFF]);
}

/// Test that a missing file is reported as unavailable.
#[test]
fn test_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let err =
        EventStream::open(dir.path().join("missing.dat"), BoardLayout::v1720()).unwrap_err();
    assert!(matches!(err, DecodeError::SourceUnavailable { .. }));
}
