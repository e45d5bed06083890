//! OBU header parsing and access-unit validation.
//!
//! Based on `rtp::codecs::av1::obu`: the header-byte bit layout, the
//! extension-byte convention, and `Obu`'s shape are kept; `parse_obus`'s
//! silent best-effort walk is replaced by a validating walk that returns
//! the spec's tagged errors instead of producing a wrong-but-non-panicking
//! result on malformed input.

use bytes::Bytes;

use crate::error::{Error, ObuErrorContext, Result};
use crate::av1::leb128;

pub const OBU_HAS_EXTENSION_BIT: u8 = 0b0000_0100;
pub const OBU_HAS_SIZE_BIT: u8 = 0b0000_0010;
pub const OBU_FORBIDDEN_BIT: u8 = 0b1000_0000;
pub const OBU_TYPE_MASK: u8 = 0b0111_1000;
pub const OBU_EXTENSION_RESERVED_MASK: u8 = 0b0001_1111;
/// `obu_reserved_1bit` in the AV1 spec's header syntax; must be zero.
pub const OBU_HEADER_RESERVED_BIT: u8 = 0b0000_0001;

/// Largest OBU payload size this core will accept, per spec.
pub const MAX_OBU_PAYLOAD_SIZE: usize = 256_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObuType {
    SequenceHeader,
    TemporalDelimiter,
    FrameHeader,
    TileGroup,
    Metadata,
    Frame,
    RedundantFrameHeader,
    TileList,
    Padding,
    Reserved(u8),
}

impl ObuType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ObuType::SequenceHeader,
            2 => ObuType::TemporalDelimiter,
            3 => ObuType::FrameHeader,
            4 => ObuType::TileGroup,
            5 => ObuType::Metadata,
            6 => ObuType::Frame,
            7 => ObuType::RedundantFrameHeader,
            8 => ObuType::TileList,
            15 => ObuType::Padding,
            other => ObuType::Reserved(other),
        }
    }

    /// True for OBU types a receiver may drop without losing decodability.
    pub fn is_discardable(&self) -> bool {
        matches!(
            self,
            ObuType::Metadata
                | ObuType::Padding
                | ObuType::TileList
                | ObuType::RedundantFrameHeader
                | ObuType::Reserved(_)
        )
    }
}

/// A single parsed OBU: header byte(s) plus its payload slice.
#[derive(Debug, Clone)]
pub struct Obu {
    pub header: u8,
    pub extension_header: u8,
    pub obu_type: ObuType,
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub payload: Bytes,
    /// Total bytes consumed from the source buffer: header(s) + leb128
    /// size prefix (if present) + payload.
    pub size: usize,
    /// True for the synthetic whole-access-unit "OBU" the payloader
    /// substitutes when OBU parsing/validation fails. Its `payload` is
    /// the raw access unit bytes with no header of its own to emit, so
    /// fragmenting it must not synthesize one.
    pub opaque: bool,
}

impl Obu {
    pub fn header_size(&self) -> usize {
        if self.opaque {
            0
        } else if has_extension(self.header) {
            2
        } else {
            1
        }
    }

    pub fn has_extension(&self) -> bool {
        has_extension(self.header)
    }

    pub fn has_size_field(&self) -> bool {
        has_size(self.header)
    }
}

pub fn has_extension(header: u8) -> bool {
    header & OBU_HAS_EXTENSION_BIT != 0
}

pub fn has_size(header: u8) -> bool {
    header & OBU_HAS_SIZE_BIT != 0
}

pub fn obu_type_of(header: u8) -> u8 {
    (header & OBU_TYPE_MASK) >> 3
}

/// Parses one OBU starting at the front of `buf`. Returns the parsed OBU
/// and the number of bytes consumed. Expects a size field to be present;
/// callers that must tolerate a final unsized element handle that
/// separately (see the payloader/depayloader, which never call this on a
/// trailing unsized OBU).
pub fn parse_one(buf: &Bytes) -> Result<Obu> {
    if buf.is_empty() {
        return Err(Error::IncompleteObu(ObuErrorContext {
            expected: 1,
            actual: 0,
            size: 0,
            max: MAX_OBU_PAYLOAD_SIZE,
        }));
    }
    let header = buf[0];
    if header & OBU_FORBIDDEN_BIT != 0 {
        return Err(Error::ForbiddenBitSet);
    }
    if header & OBU_HEADER_RESERVED_BIT != 0 {
        return Err(Error::MalformedHeader);
    }
    let extension_present = has_extension(header);
    let mut cursor = 1usize;

    let (extension_header, temporal_id, spatial_id) = if extension_present {
        if buf.len() < 2 {
            return Err(Error::MissingObuExtensionByte);
        }
        let ext = buf[1];
        if ext & OBU_EXTENSION_RESERVED_MASK != 0 {
            return Err(Error::ObuExtensionReservedBitsSet);
        }
        cursor += 1;
        (ext, ext >> 5, (ext >> 3) & 0b11)
    } else {
        (0u8, 0u8, 0u8)
    };

    if !has_size(header) {
        // No size field: payload extends to the end of `buf`. Legal only
        // for the final element of a packet (enforced by the caller).
        let payload = buf.slice(cursor..);
        let size = cursor + payload.len();
        return Ok(Obu {
            header,
            extension_header,
            obu_type: ObuType::from_raw(obu_type_of(header)),
            temporal_id,
            spatial_id,
            payload,
            size,
            opaque: false,
        });
    }

    if cursor >= buf.len() {
        return Err(Error::IncompleteObu(ObuErrorContext {
            expected: 1,
            actual: 0,
            size: 0,
            max: MAX_OBU_PAYLOAD_SIZE,
        }));
    }
    let (len, leb_size) = leb128::decode(&buf[cursor..]).map_err(|_| {
        Error::IncompleteObu(ObuErrorContext {
            expected: 1,
            actual: buf.len() - cursor,
            size: 0,
            max: MAX_OBU_PAYLOAD_SIZE,
        })
    })?;
    cursor += leb_size;
    let payload_len = len as usize;

    if payload_len == 0 {
        return Err(Error::ZeroLengthObu);
    }
    if payload_len > MAX_OBU_PAYLOAD_SIZE {
        return Err(Error::ObuTooLarge(ObuErrorContext {
            expected: payload_len,
            actual: buf.len().saturating_sub(cursor),
            size: payload_len,
            max: MAX_OBU_PAYLOAD_SIZE,
        }));
    }
    if cursor + payload_len > buf.len() {
        return Err(Error::IncompleteObu(ObuErrorContext {
            expected: payload_len,
            actual: buf.len() - cursor,
            size: payload_len,
            max: MAX_OBU_PAYLOAD_SIZE,
        }));
    }

    let payload = buf.slice(cursor..cursor + payload_len);
    let size = cursor + payload_len;
    Ok(Obu {
        header,
        extension_header,
        obu_type: ObuType::from_raw(obu_type_of(header)),
        temporal_id,
        spatial_id,
        payload,
        size,
        opaque: false,
    })
}

/// Walks `buf` splitting it into successive, fully size-prefixed OBUs.
/// The concatenation of the returned OBUs' original byte ranges equals
/// `buf`. Every OBU must carry a size field; an unsized trailing element
/// is reported as [`Error::PartialObuAtBoundary`] rather than consumed,
/// distinguishing "receiver starved mid-stream" from "malformed data".
pub fn validate_access_unit(buf: &Bytes) -> Result<Vec<Obu>> {
    let mut obus = Vec::new();
    let mut offset = 0usize;
    while offset < buf.len() {
        let remaining = buf.slice(offset..);
        if !has_size(remaining[0]) {
            return Err(Error::PartialObuAtBoundary);
        }
        let obu = parse_one(&remaining)?;
        offset += obu.size;
        obus.push(obu);
    }
    Ok(obus)
}

/// Like [`validate_access_unit`] but tolerates (and parses) a final
/// element that lacks a size field, as legitimate encoders may emit.
pub fn parse_obus(buf: &Bytes) -> Result<Vec<Obu>> {
    let mut obus = Vec::new();
    let mut offset = 0usize;
    while offset < buf.len() {
        let remaining = buf.slice(offset..);
        let obu = parse_one(&remaining)?;
        offset += obu.size;
        obus.push(obu);
    }
    Ok(obus)
}

#[cfg(test)]
#[path = "obu_test.rs"]
mod obu_test;
