//! Incoming RTP sequence-number tracking: duplicate/out-of-order/gap
//! classification for a single stream's 16-bit sequence space.
//!
//! Grounded on the wrap-aware comparison idiom used throughout the pack
//! for 16-bit RTP sequence arithmetic (e.g.
//! `interceptor::nack::generator::generator_stream`'s `wrapping_sub`/
//! `UINT16SIZE_HALF` test for "is this forward or backward across a
//! wrap"), reshaped into a single signed-distance function and a small
//! validating tracker. This replaces the file previously here, which
//! generated *outgoing* sequence numbers with atomics — the wrong
//! direction for a tracker that only ever validates numbers supplied by
//! a peer.

/// Sequence gaps larger than this are still accepted but flagged.
pub const LARGE_GAP_THRESHOLD: i32 = 1000;

/// Signed, wrap-aware distance from `a` to `b`, in the range
/// `(-32768, 32768]`. Positive means `b` is ahead of `a` in sequence
/// order; zero means equal.
pub fn signed_distance(b: u16, a: u16) -> i32 {
    let raw = b as i32 - a as i32;
    let wrapped = raw.rem_euclid(65536);
    if wrapped > 32768 {
        wrapped - 65536
    } else {
        wrapped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub sequence_number: u16,
    pub is_gap: bool,
    pub gap_size: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Accepted(Observation),
    Duplicate,
    OutOfOrder,
}

/// Tracks the last accepted sequence number for one stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.last.is_some()
    }

    /// The sequence number expected next, if initialized.
    pub fn expected_next(&self) -> Option<u16> {
        self.last.map(|l| l.wrapping_add(1))
    }

    /// Feeds one observed sequence number through the tracker, updating
    /// its internal state only on acceptance.
    pub fn accept(&mut self, s: u16) -> SequenceOutcome {
        let last = match self.last {
            None => {
                self.last = Some(s);
                return SequenceOutcome::Accepted(Observation {
                    sequence_number: s,
                    is_gap: false,
                    gap_size: 0,
                });
            }
            Some(l) => l,
        };

        if s == last {
            return SequenceOutcome::Duplicate;
        }

        let d = signed_distance(s, last);
        if d <= 0 {
            return SequenceOutcome::OutOfOrder;
        }

        self.last = Some(s);
        SequenceOutcome::Accepted(Observation {
            sequence_number: s,
            is_gap: d > LARGE_GAP_THRESHOLD,
            // `d` counts the forward distance to `s` itself (d=1 for the
            // very next number, which skips nothing); the number of
            // sequence numbers skipped in between is one less.
            gap_size: d - 1,
        })
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
#[path = "sequence_test.rs"]
mod sequence_test;
