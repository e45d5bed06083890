//! Layer-identifier (IDS) byte: encode/decode plus validation of an
//! incoming pair against a cached [`ScalabilityStructure`].
//!
//! Grounded on `rtp::codecs::vp9::Vp9Packet::parse_layer_info_common`'s
//! "read one byte, split into bitfields, bound-check, bail with a typed
//! error" shape (there it is `T|U|S|D` against `MAX_SPATIAL_LAYERS`; here
//! it is `T|S|reserved` against a cached SS's picture descriptors).

use crate::av1::aggregation_header::{decode_ids_byte, encode_ids_byte};
use crate::av1::scalability::ScalabilityStructure;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerId {
    pub temporal_id: u8,
    pub spatial_id: u8,
}

impl LayerId {
    pub fn encode(&self) -> Result<u8> {
        encode_ids_byte(self.temporal_id, self.spatial_id)
    }

    pub fn decode(byte: u8) -> Result<Self> {
        let (temporal_id, spatial_id) = decode_ids_byte(byte)?;
        Ok(Self {
            temporal_id,
            spatial_id,
        })
    }

    /// Validates this layer id against a cached scalability structure,
    /// per spec: temporal_id must not exceed the highest temporal_id any
    /// picture descriptor names, and spatial_id must not exceed `n_s`.
    pub fn validate_against(&self, ss: &ScalabilityStructure) -> Result<()> {
        let max_t = ss.max_temporal_id();
        if self.temporal_id > max_t {
            return Err(Error::TemporalIdExceedsCapability {
                temporal_id: self.temporal_id,
                max: max_t,
            });
        }
        if self.spatial_id > ss.n_s {
            return Err(Error::SpatialIdExceedsCapability {
                spatial_id: self.spatial_id,
                max: ss.n_s,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "layer_id_test.rs"]
mod layer_id_test;
