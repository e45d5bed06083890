//! Payloader and depayloader configuration.
//!
//! `mtu` is stored already clamped to `[64, 9000]` by the setter rather
//! than validated and rejected, mirroring how the teacher's aggregation
//! planner (`packetizer.rs::packetize`) treats a degenerate `mtu < 3` as
//! a no-op rather than an error: bad configuration here narrows silently
//! instead of producing a fallible construction path that nothing in
//! this crate's propagation policy would know how to surface.

use crate::av1::scalability::ScalabilityStructure;

pub const MIN_MTU: usize = 64;
pub const MAX_MTU: usize = 9000;
pub const CLOCK_RATE: u32 = 90_000;

fn clamp_mtu(mtu: usize) -> usize {
    mtu.clamp(MIN_MTU, MAX_MTU)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMode {
    Draft,
    Spec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepayloaderHeaderMode {
    Draft,
    Spec,
    Auto,
}

#[derive(Debug, Clone)]
pub struct PayloaderConfig {
    mtu: usize,
    pub payload_type: u8,
    pub header_mode: HeaderMode,
    pub validate_obus: bool,
    /// Stamped onto the first packet of a video sequence when set.
    pub scalability_structure: Option<ScalabilityStructure>,
}

impl PayloaderConfig {
    pub fn new(mtu: usize, payload_type: u8, header_mode: HeaderMode) -> Self {
        Self {
            mtu: clamp_mtu(mtu),
            payload_type,
            header_mode,
            validate_obus: false,
            scalability_structure: None,
        }
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = clamp_mtu(mtu);
    }

    pub fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }
}

impl Default for PayloaderConfig {
    fn default() -> Self {
        Self::new(1200, 0, HeaderMode::Spec)
    }
}

#[derive(Debug, Clone)]
pub struct DepayloaderConfig {
    pub header_mode: DepayloaderHeaderMode,
    pub max_reorder_buffer: usize,
    pub max_seq_gap: i32,
    pub reorder_timeout_ms: u64,
    pub fragment_timeout_ms: u64,
    pub require_sequence_header: bool,
    pub max_temporal_id: Option<u8>,
    pub max_spatial_id: Option<u8>,
    pub per_layer_output: bool,
    pub w_compatibility_mode: bool,
}

impl Default for DepayloaderConfig {
    fn default() -> Self {
        Self {
            header_mode: DepayloaderHeaderMode::Auto,
            max_reorder_buffer: 10,
            max_seq_gap: 5,
            reorder_timeout_ms: 500,
            fragment_timeout_ms: 1000,
            require_sequence_header: false,
            max_temporal_id: None,
            max_spatial_id: None,
            per_layer_output: false,
            w_compatibility_mode: false,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
