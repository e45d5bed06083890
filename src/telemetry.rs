//! Typed telemetry events emitted by the payloader and depayloader.
//!
//! The `rtp` crate this is grounded on never logs internally (no
//! `log::` call anywhere under its `src/`); its codecs communicate
//! exclusively through typed return values and, for VP9, a caller
//! supplied `InitialPictureIDFn` callback. This module follows the same
//! discipline: every event kind is a variant here, and callers that want
//! logging or metrics hand in a `&mut dyn FnMut(TelemetryEvent)` sink
//! rather than this crate picking a logging framework for them.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AggregationComplete {
    pub total_obus: usize,
    pub packets: usize,
    pub aggregated_packets: usize,
    pub fragmented_packets: usize,
    pub single_obu_packets: usize,
    pub average_obus_per_packet: f64,
    pub aggregation_ratio: f64,
    pub payload_efficiency: f64,
    pub total_payload_bytes: usize,
    pub total_packet_bytes: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Discontinuity {
    pub timestamp: u32,
    pub reason: DiscontinuityReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscontinuityReason {
    InvalidWTransition,
    SequenceGap,
    ForceFlush,
    ReorderTimeout,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FragmentTimeout {
    pub timestamp: u32,
    pub bytes_discarded: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LayerFiltered {
    pub timestamp: u32,
    pub temporal_id: u8,
    pub spatial_id: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObuValidationError {
    pub reason: String,
    pub sequence_number: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SequenceGap {
    pub sequence_number: u16,
    pub gap_size: i32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReorderDrop {
    pub timestamp: u32,
    pub sequence_number: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum TelemetryEvent {
    #[serde(rename = "aggregation.complete")]
    AggregationComplete(AggregationComplete),
    #[serde(rename = "depayloader.discontinuity")]
    Discontinuity(Discontinuity),
    #[serde(rename = "depayloader.fragment_timeout")]
    FragmentTimeout(FragmentTimeout),
    #[serde(rename = "depayloader.layer_filtered")]
    LayerFiltered(LayerFiltered),
    #[serde(rename = "obu_validation.error")]
    ObuValidationError(ObuValidationError),
    #[serde(rename = "sequence.gap")]
    SequenceGap(SequenceGap),
    #[serde(rename = "reorder.drop")]
    ReorderDrop(ReorderDrop),
}

/// Sink callers pass to receive telemetry as it is produced. `None`
/// disables telemetry entirely at zero cost beyond the branch.
pub type Sink<'a> = Option<&'a mut dyn FnMut(TelemetryEvent)>;

pub fn emit(sink: &mut Sink<'_>, event: TelemetryEvent) {
    if let Some(f) = sink.as_mut() {
        f(event);
    }
}

#[cfg(test)]
#[path = "telemetry_test.rs"]
mod telemetry_test;
