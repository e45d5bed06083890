//! Scalability Structure (SS) codec: spatial-layer geometry and temporal
//! prediction structure, carried once per coded video sequence.
//!
//! Grounded on `rtp::codecs::vp9::Vp9Packet::parse_ssdata`: the `n_s/y/n_g`
//! header byte, the per-spatial-layer width/height loop, and the
//! per-picture-group `T|U|R` byte followed by `R` reference diffs are the
//! same shape here, adapted to AV1's field widths (3/1/4 instead of
//! VP9's 3/1/1, LEB128 p_diffs instead of raw bytes) and extended with an
//! encode direction, which `parse_ssdata` never needed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::av1::leb128;
use crate::error::{Error, Result};

pub const MAX_ENCODED_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialLayer {
    pub width: u16,
    pub height: u16,
    /// Present only when the structure's `y_flag` is clear.
    pub frame_rate: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureDescriptor {
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub p_diffs: Vec<u64>,
}

impl PictureDescriptor {
    pub fn reference_count(&self) -> usize {
        self.p_diffs.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalabilityStructure {
    pub n_s: u8,
    pub y_flag: bool,
    pub n_g: u8,
    pub spatial_layers: Vec<SpatialLayer>,
    pub picture_descriptors: Vec<PictureDescriptor>,
}

impl ScalabilityStructure {
    /// Highest temporal_id named by any picture descriptor; used by C5 to
    /// bound incoming layer-identifier bytes.
    pub fn max_temporal_id(&self) -> u8 {
        self.picture_descriptors
            .iter()
            .map(|d| d.temporal_id)
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        if self.n_s > 7 {
            return Err(Error::InvalidNs(self.n_s));
        }
        if self.spatial_layers.len() != self.n_s as usize + 1 {
            return Err(Error::SpatialLayerCountMismatch);
        }
        if self.n_g > 15 {
            return Err(Error::InvalidPictureDesc);
        }
        if self.picture_descriptors.len() != self.n_g as usize {
            return Err(Error::InvalidPictureDesc);
        }
        for layer in &self.spatial_layers {
            if layer.width == 0 || layer.height == 0 {
                return Err(Error::InvalidSpatialLayer);
            }
        }
        for desc in &self.picture_descriptors {
            if desc.temporal_id > 7 || desc.spatial_id > 3 || desc.p_diffs.len() > 7 {
                return Err(Error::InvalidPictureDesc);
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;
        let mut out = BytesMut::new();
        out.put_u8((self.n_s << 5) | ((self.y_flag as u8) << 4) | self.n_g);
        for layer in &self.spatial_layers {
            out.put_u16(layer.width);
            out.put_u16(layer.height);
            if !self.y_flag {
                out.put_u8(layer.frame_rate.unwrap_or(0));
            }
        }
        for desc in &self.picture_descriptors {
            out.put_u8((desc.temporal_id << 5) | (desc.spatial_id << 3) | desc.p_diffs.len() as u8);
            for &p in &desc.p_diffs {
                leb128::encode(p, &mut out);
            }
        }
        if out.len() > MAX_ENCODED_LEN {
            return Err(Error::SsTooLarge);
        }
        Ok(out.freeze())
    }

    /// Decodes a structure from the front of `buf`, returning it together
    /// with the number of bytes consumed; any trailing bytes are the
    /// caller's to interpret.
    pub fn decode(buf: &Bytes) -> Result<(ScalabilityStructure, usize)> {
        if buf.is_empty() {
            return Err(Error::ErrShortBuffer);
        }
        let b0 = buf[0];
        let n_s = b0 >> 5;
        let y_flag = b0 & 0b0001_0000 != 0;
        let n_g = b0 & 0b0000_1111;
        let mut cursor = 1usize;

        let num_layers = n_s as usize + 1;
        let mut spatial_layers = Vec::with_capacity(num_layers);
        for _ in 0..num_layers {
            let needed = if y_flag { 4 } else { 5 };
            if cursor + needed > buf.len() {
                return Err(Error::IncompleteSpatialLayers);
            }
            let width = u16::from_be_bytes([buf[cursor], buf[cursor + 1]]);
            let height = u16::from_be_bytes([buf[cursor + 2], buf[cursor + 3]]);
            cursor += 4;
            if width == 0 || height == 0 {
                return Err(Error::InvalidSpatialLayer);
            }
            let frame_rate = if y_flag {
                None
            } else {
                let fr = buf[cursor];
                cursor += 1;
                Some(fr)
            };
            spatial_layers.push(SpatialLayer {
                width,
                height,
                frame_rate,
            });
        }

        let mut picture_descriptors = Vec::with_capacity(n_g as usize);
        for _ in 0..n_g {
            if cursor >= buf.len() {
                return Err(Error::IncompletePictureDesc);
            }
            let b = buf[cursor];
            cursor += 1;
            let temporal_id = b >> 5;
            let spatial_id = (b >> 3) & 0b11;
            let reference_count = b & 0b111;
            let mut p_diffs = Vec::with_capacity(reference_count as usize);
            for _ in 0..reference_count {
                if cursor >= buf.len() {
                    return Err(Error::IncompletePictureDesc);
                }
                let (val, n) = leb128::decode(&buf[cursor..])
                    .map_err(|_| Error::IncompletePictureDesc)?;
                cursor += n;
                p_diffs.push(val);
            }
            picture_descriptors.push(PictureDescriptor {
                temporal_id,
                spatial_id,
                p_diffs,
            });
        }

        if cursor > MAX_ENCODED_LEN {
            return Err(Error::SsTooLarge);
        }

        Ok((
            ScalabilityStructure {
                n_s,
                y_flag,
                n_g,
                spatial_layers,
                picture_descriptors,
            },
            cursor,
        ))
    }
}

#[cfg(test)]
#[path = "scalability_test.rs"]
mod scalability_test;
