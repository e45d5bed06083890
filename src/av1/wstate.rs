//! W-bit fragmentation state machine.
//!
//! Grounded on `rtp::codecs::h264::H264Packet`'s FU-A handling, where
//! `fua_buffer: Option<BytesMut>` doubles as the "am I mid-fragment"
//! state: the start bit arms it, the end bit drains it, a start-without-
//! end or end-without-start is an error. Generalized here from that
//! two-state shape into the explicit `{idle, in_fragment}` states with a
//! memory of the last W value the transition table needs.

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle { last_w: Option<u8> },
    InFragment { last_w: u8 },
}

/// Accumulates fragment bytes across packets and tracks which W
/// transitions are legal from the current state, per the table:
///
/// | from | last W | input | action |
/// |------|--------|-------|--------|
/// | idle | —      | 0,1   | accept; in_fragment iff W=1 |
/// | idle | —      | 2,3   | reject: fragment_not_started |
/// | idle | 0      | 0,1   | accept |
/// | idle | 3      | 0,1   | accept |
/// | idle | 3      | 2,3   | reject: invalid_w_transition |
/// | in_fragment | 1,2 | 2  | accept; stay |
/// | in_fragment | 1,2 | 3  | accept; go idle |
/// | in_fragment | 1,2 | 0,1 | reject: incomplete_fragment |
#[derive(Debug)]
pub struct WState {
    mode: Mode,
    buffer: BytesMut,
    w_compatibility_mode: bool,
}

impl Default for WState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl WState {
    pub fn new(w_compatibility_mode: bool) -> Self {
        Self {
            mode: Mode::Idle { last_w: None },
            buffer: BytesMut::new(),
            w_compatibility_mode,
        }
    }

    pub fn is_in_fragment(&self) -> bool {
        matches!(self.mode, Mode::InFragment { .. })
    }

    /// Bytes currently held in the fragment accumulator; used for
    /// telemetry when a fragment is abandoned incomplete.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one packet's worth of unprefixed trailing-element bytes
    /// through the machine. Returns `Some(complete_obu_bytes)` once a
    /// fragment sequence finishes (or a bare W=0/1 element completes
    /// immediately), `None` while a fragment is still being accumulated.
    pub fn accept(&mut self, w: u8, element: Bytes) -> Result<Option<Bytes>> {
        match self.mode {
            Mode::Idle { last_w } => self.accept_from_idle(last_w, w, element),
            Mode::InFragment { last_w } => self.accept_from_in_fragment(last_w, w, element),
        }
    }

    fn accept_from_idle(&mut self, last_w: Option<u8>, w: u8, element: Bytes) -> Result<Option<Bytes>> {
        match w {
            0 => {
                self.mode = Mode::Idle { last_w: Some(0) };
                Ok(Some(element))
            }
            1 => {
                self.buffer.clear();
                self.buffer.extend_from_slice(&element);
                self.mode = Mode::InFragment { last_w: 1 };
                Ok(None)
            }
            2 | 3 => {
                if self.w_compatibility_mode && w == 3 && last_w.is_none() {
                    self.mode = Mode::Idle { last_w: Some(3) };
                    return Ok(Some(element));
                }
                match last_w {
                    Some(3) => {
                        self.reset();
                        Err(Error::InvalidWTransition)
                    }
                    _ => {
                        self.reset();
                        Err(Error::FragmentNotStarted)
                    }
                }
            }
            _ => {
                self.reset();
                Err(Error::InvalidWTransition)
            }
        }
    }

    fn accept_from_in_fragment(&mut self, last_w: u8, w: u8, element: Bytes) -> Result<Option<Bytes>> {
        if last_w != 1 && last_w != 2 {
            self.reset();
            return Err(Error::InvalidWTransition);
        }
        match w {
            2 => {
                self.buffer.extend_from_slice(&element);
                self.mode = Mode::InFragment { last_w: 2 };
                Ok(None)
            }
            3 => {
                self.buffer.extend_from_slice(&element);
                let complete = self.buffer.split().freeze();
                self.mode = Mode::Idle { last_w: Some(3) };
                Ok(Some(complete))
            }
            0 | 1 => {
                self.reset();
                Err(Error::IncompleteFragment)
            }
            _ => {
                self.reset();
                Err(Error::InvalidWTransition)
            }
        }
    }

    /// Discards any accumulated fragment and returns to idle with no
    /// memory of the last W value, as happens on a rejection or an
    /// externally detected discontinuity (sequence gap, timeout).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.mode = Mode::Idle { last_w: None };
    }
}

#[cfg(test)]
#[path = "wstate_test.rs"]
mod wstate_test;
