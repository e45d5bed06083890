//! Aggregation-header codec: the one- or two-byte prefix carried by every
//! RTP packet produced by this payload format.
//!
//! Two wire forms are supported. Draft mode packs a start/end/first
//! fragment flag plus a 5-bit OBU count into a single byte, in the style
//! `rtp::codecs::av1`'s packetizer predates. Spec mode packs Z/Y/W/N/C/M/I
//! into a byte (`C` occupies a single bit so the seven named fields plus
//! the reserved `I` bit fit exactly), grounded on
//! `packetizer.rs::get_aggregation_header`'s Z/Y/W/N packing order and
//! extended with the C/M/I fields that function never had to emit.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Number of OBU elements above which W no longer encodes an exact count
/// and every element (including the last) is length-prefixed.
pub const MAX_OBUS_IN_W: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DraftHeader {
    pub starts_fragment: bool,
    pub ends_fragment: bool,
    pub first_packet_of_coded_video_sequence: bool,
    pub obu_count: u8,
}

impl DraftHeader {
    pub fn encode(&self) -> u8 {
        let mut b = 0u8;
        if self.starts_fragment {
            b |= 1 << 7;
        }
        if self.ends_fragment {
            b |= 1 << 6;
        }
        if self.first_packet_of_coded_video_sequence {
            b |= 1 << 5;
        }
        b | (self.obu_count & 0b0001_1111)
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            starts_fragment: byte & (1 << 7) != 0,
            ends_fragment: byte & (1 << 6) != 0,
            first_packet_of_coded_video_sequence: byte & (1 << 5) != 0,
            obu_count: byte & 0b0001_1111,
        }
    }
}

/// Decoded spec-mode header, before any trailing SS/IDS bytes are consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecHeader {
    /// First OBU element in this packet continues a fragment from the
    /// previous packet.
    pub z: bool,
    /// Last OBU element in this packet continues into the next packet.
    pub y: bool,
    /// Number of OBU elements explicitly present (0 means "all
    /// length-prefixed"; 1..=3 means that many elements, the last of
    /// which runs to the end of the payload unprefixed).
    pub w: u8,
    /// This packet begins a new coded video sequence.
    pub n: bool,
    /// OBU-count hint.
    pub c: bool,
    /// An IDS (layer-identifier) byte follows this header byte.
    pub m: bool,
}

impl SpecHeader {
    pub fn encode(&self) -> Result<u8> {
        if self.w > 3 {
            return Err(Error::InvalidWValue(self.w));
        }
        let mut b = 0u8;
        if self.z {
            b |= 1 << 7;
        }
        if self.y {
            b |= 1 << 6;
        }
        b |= (self.w & 0b11) << 4;
        if self.n {
            b |= 1 << 3;
        }
        if self.c {
            b |= 1 << 2;
        }
        if self.m {
            b |= 1 << 1;
        }
        // bit 0 (I) is always reserved zero.
        Ok(b)
    }

    pub fn decode(byte: u8) -> Result<Self> {
        if byte & 0b0000_0001 != 0 {
            return Err(Error::ReservedBitSet);
        }
        Ok(Self {
            z: byte & (1 << 7) != 0,
            y: byte & (1 << 6) != 0,
            w: (byte >> 4) & 0b11,
            n: byte & (1 << 3) != 0,
            c: byte & (1 << 2) != 0,
            m: byte & (1 << 1) != 0,
        })
    }
}

/// Decodes the layer-identifier (IDS) byte's raw fields, rejecting
/// nonzero reserved bits. Semantic validation against a cached
/// scalability structure happens in `layer_id.rs`.
pub fn decode_ids_byte(byte: u8) -> Result<(u8, u8)> {
    if byte & 0b0000_0111 != 0 {
        return Err(Error::ReservedIdsBitsSet);
    }
    Ok((byte >> 5, (byte >> 3) & 0b11))
}

pub fn encode_ids_byte(temporal_id: u8, spatial_id: u8) -> Result<u8> {
    if temporal_id > 7 {
        return Err(Error::InvalidTemporalId(temporal_id));
    }
    if spatial_id > 3 {
        return Err(Error::InvalidSpatialId(spatial_id));
    }
    Ok((temporal_id << 5) | (spatial_id << 3))
}

/// Result of decoding a spec-mode header together with whatever trailing
/// bytes it implied (IDS byte; SS descriptor bytes are decoded by the
/// caller via `scalability::decode`, since only it knows where the SS
/// ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSpecPrefix {
    pub header: SpecHeader,
    pub temporal_id: Option<u8>,
    pub spatial_id: Option<u8>,
    pub bytes_consumed: usize,
    pub ss_follows: bool,
}

/// Decodes the spec-mode fixed-size portion of the prefix: the header
/// byte and, if `m` is set, the IDS byte. Does not consume an SS
/// descriptor even if `z` is set; the caller must do that separately and
/// is told to via `ss_follows`.
pub fn decode_spec_prefix(buf: &Bytes) -> Result<DecodedSpecPrefix> {
    if buf.is_empty() {
        return Err(Error::ErrShortBuffer);
    }
    let header = SpecHeader::decode(buf[0])?;
    let mut cursor = 1usize;
    let (temporal_id, spatial_id) = if header.m {
        if buf.len() <= cursor {
            return Err(Error::MissingIdsByte);
        }
        let (t, s) = decode_ids_byte(buf[cursor])?;
        cursor += 1;
        (Some(t), Some(s))
    } else {
        (None, None)
    };
    Ok(DecodedSpecPrefix {
        header,
        temporal_id,
        spatial_id,
        bytes_consumed: cursor,
        ss_follows: header.z,
    })
}

#[cfg(test)]
#[path = "aggregation_header_test.rs"]
mod aggregation_header_test;
