//! Temporal-unit (TU) boundary detection: decides which OBU starts a new
//! presentation unit, for marking which outgoing packet should carry the
//! RTP marker bit.
//!
//! Grounded on `rtp::codecs::av1::obu`'s OBU type constants and linear
//! walking style; the leading-bits frame-header reader is new work (no
//! file in the pack parses AV1 frame headers) but kept in the same
//! minimal bit-cursor idiom `leb128.rs` uses rather than pulling in a
//! full bitstream-reader dependency.

use crate::av1::obu::{Obu, ObuType};

struct BitReader<'a> {
    buf: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, bit_pos: 0 }
    }

    fn read_bit(&mut self) -> Option<u8> {
        let byte_index = self.bit_pos / 8;
        let bit_index = 7 - (self.bit_pos % 8);
        let byte = *self.buf.get(byte_index)?;
        self.bit_pos += 1;
        Some((byte >> bit_index) & 1)
    }

    fn read_bits(&mut self, n: u32) -> Option<u32> {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u32;
        }
        Some(v)
    }
}

/// AV1 frame_type values relevant to TU detection.
pub const FRAME_TYPE_KEY: u8 = 0;
pub const FRAME_TYPE_INTER: u8 = 1;
pub const FRAME_TYPE_INTRA_ONLY: u8 = 2;
pub const FRAME_TYPE_SWITCH: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaderBits {
    pub show_existing_frame: bool,
    pub frame_type: Option<u8>,
    pub show_frame: Option<bool>,
    pub error_resilient_mode: Option<bool>,
}

/// Reads only the leading bits of a frame header needed to classify it:
/// `show_existing_frame`, and — when that is clear — `frame_type` and
/// `show_frame`. Assumes `reduced_still_picture_header` is false, since
/// that flag lives in the sequence header and this detector is required
/// to work without one.
pub fn parse_frame_header_bits(payload: &[u8]) -> Option<FrameHeaderBits> {
    let mut r = BitReader::new(payload);
    let show_existing_frame = r.read_bit()? != 0;
    if show_existing_frame {
        return Some(FrameHeaderBits {
            show_existing_frame,
            frame_type: None,
            show_frame: None,
            error_resilient_mode: None,
        });
    }
    let frame_type = r.read_bits(2)? as u8;
    let show_frame = r.read_bit()? != 0;
    let error_resilient_mode = if frame_type == FRAME_TYPE_SWITCH || (frame_type == FRAME_TYPE_KEY && show_frame) {
        None
    } else {
        r.read_bit().map(|b| b != 0)
    };
    Some(FrameHeaderBits {
        show_existing_frame,
        frame_type: Some(frame_type),
        show_frame: Some(show_frame),
        error_resilient_mode,
    })
}

fn starts_new_tu(fh: &FrameHeaderBits) -> bool {
    !fh.show_existing_frame
        && matches!(
            fh.frame_type,
            Some(FRAME_TYPE_KEY) | Some(FRAME_TYPE_INTRA_ONLY) | Some(FRAME_TYPE_SWITCH)
        )
        && fh.show_frame == Some(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalUnitRange {
    pub start: usize,
    pub end: usize,
    pub frame_count: usize,
}

/// Splits `obus` into temporal-unit ranges. A new TU begins at a
/// `temporal_delimiter` OBU or at the first `frame_header`/`frame`/
/// `tile_group` OBU whose leading frame-header bits indicate a visible
/// key, switch, or intra-only frame.
pub fn detect_boundaries(obus: &[Obu]) -> Vec<TemporalUnitRange> {
    let mut ranges = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut frame_count = 0usize;

    for (i, obu) in obus.iter().enumerate() {
        let is_boundary = match obu.obu_type {
            ObuType::TemporalDelimiter => true,
            ObuType::FrameHeader | ObuType::Frame | ObuType::TileGroup => {
                parse_frame_header_bits(&obu.payload)
                    .map(|fh| starts_new_tu(&fh))
                    .unwrap_or(false)
            }
            _ => false,
        };

        if is_boundary {
            if let Some(start) = current_start {
                ranges.push(TemporalUnitRange {
                    start,
                    end: i,
                    frame_count,
                });
            }
            current_start = Some(i);
            frame_count = 0;
        } else if current_start.is_none() {
            current_start = Some(i);
        }

        if matches!(obu.obu_type, ObuType::Frame | ObuType::FrameHeader) {
            frame_count += 1;
        }
    }

    if let Some(start) = current_start {
        ranges.push(TemporalUnitRange {
            start,
            end: obus.len(),
            frame_count,
        });
    }

    ranges
}

#[cfg(test)]
#[path = "temporal_unit_test.rs"]
mod temporal_unit_test;
