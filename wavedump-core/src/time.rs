//! Trigger time tag unwrapping.
//!
//! The hardware tag is a free-running counter that wraps at a fixed modulus.
//! The decoder itself is stateless, so the wrap count lives in a
//! [`TimeTagState`] the caller threads through successive events.

use crate::layout::TimeTagClock;
use tracing::debug;

/// Previous tag and wrap count carried from one event to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeTagState {
    previous_tag: Option<u32>,
    wrap_count: u64,
}

impl TimeTagState {
    /// State at the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag of the last event seen, if any.
    pub fn previous_tag(&self) -> Option<u32> {
        self.previous_tag
    }

    /// Number of wraps counted so far.
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count
    }

    /// Folds the next tag into the state.
    ///
    /// Returns the elapsed time in microseconds together with the state to
    /// use for the following event. A wrap is counted only when the tag
    /// falls back by more than half the modulus; smaller backward steps are
    /// jitter.
    pub fn advance(self, tag: u32, clock: &TimeTagClock) -> (f64, Self) {
        let mut wrap_count = self.wrap_count;

        if let Some(previous) = self.previous_tag {
            if tag < previous && u64::from(previous - tag) > clock.modulus / 2 {
                wrap_count += 1;
                debug!(previous, tag, wrap_count, "trigger time tag wrapped");
            }
        }

        let ticks = wrap_count * clock.modulus + u64::from(tag);
        let elapsed_us = ticks as f64 * clock.tick_ns / 1000.0;

        (
            elapsed_us,
            Self {
                previous_tag: Some(tag),
                wrap_count,
            },
        )
    }
}
