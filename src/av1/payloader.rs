//! The AV1 RTP payloader: turns one encoder access unit into a sequence
//! of `(payload, marker)` RTP packet bodies.
//!
//! The per-OBU-element byte-copying loop (split header/extension/payload
//! bytes across fragment boundaries, omit the size field for the final
//! element of small packets) is grounded directly on
//! `rtp::codecs::av1::Av1Payloader::payload`; this version additionally
//! chooses between draft and spec aggregation-header encodings, stamps
//! the SS and IDS bytes spec mode calls for, and places the marker bit
//! from C8's temporal-unit boundaries rather than marking every packet.

use bytes::{BufMut, Bytes, BytesMut};

use crate::av1::aggregation::{self, AggregationMetrics, PlannedPacket, MAX_OBUS_TO_OMIT_SIZE};
use crate::av1::aggregation_header::{encode_ids_byte, DraftHeader, SpecHeader};
use crate::av1::obu::{self, Obu, ObuType, OBU_HAS_SIZE_BIT};
use crate::av1::temporal_unit;
use crate::av1::leb128;
use crate::config::{HeaderMode, PayloaderConfig};
use crate::telemetry::{self, AggregationComplete, Sink, TelemetryEvent};

const HEADER_OVERHEAD: usize = 1;

pub struct Payloader {
    config: PayloaderConfig,
}

impl Payloader {
    pub fn new(config: PayloaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PayloaderConfig {
        &self.config
    }

    /// Clamps to `[64, 9000]` and affects only subsequently fragmented
    /// access units.
    pub fn handle_mtu_update(&mut self, new_mtu: usize) {
        self.config.set_mtu(new_mtu);
    }

    fn parse(&self, access_unit: &Bytes) -> Vec<Obu> {
        let parsed = if self.config.validate_obus {
            obu::validate_access_unit(access_unit)
        } else {
            obu::parse_obus(access_unit)
        };
        parsed.unwrap_or_else(|_| vec![opaque_obu(access_unit)])
    }

    fn max_payload_size(&self) -> usize {
        self.config.mtu().saturating_sub(HEADER_OVERHEAD)
    }

    /// Pure metrics computation with no side effects; does not fragment.
    pub fn analyze(&self, access_unit: &Bytes) -> AggregationMetrics {
        let obus = self.parse(access_unit);
        let packets = aggregation::plan(&obus, self.max_payload_size());
        aggregation::metrics_for(&obus, &packets, HEADER_OVERHEAD)
    }

    /// Fragments `access_unit` into RTP packet payloads with marker bits
    /// set on the final packet of each temporal unit (and always on the
    /// access unit's final packet).
    pub fn fragment(&self, access_unit: &Bytes, sink: &mut Sink<'_>) -> Vec<(Bytes, bool)> {
        let obus = self.parse(access_unit);
        if obus.is_empty() {
            return vec![];
        }
        let packets = aggregation::plan(&obus, self.max_payload_size());
        let tu_ranges = temporal_unit::detect_boundaries(&obus);
        let has_sequence_header = obus.iter().any(|o| o.obu_type == ObuType::SequenceHeader);

        let mut out = Vec::with_capacity(packets.len());
        for packet_index in 0..packets.len() {
            let packet = &packets[packet_index];
            let is_last_packet = packet_index == packets.len() - 1;
            let last_obu_idx = packet.first_obu_index + packet.num_obu_elements - 1;
            let finishes_tu = !packet.ends_with_fragment(&obus)
                && tu_ranges.iter().any(|r| r.end == last_obu_idx + 1);
            let marker = is_last_packet || finishes_tu;

            let n_bit = packet_index == 0 && packet.first_obu_offset == 0 && has_sequence_header;
            let bytes = self.build_packet(&obus, &packets, packet_index, n_bit);
            out.push((bytes, marker));
        }

        let metrics = aggregation::metrics_for(&obus, &packets, HEADER_OVERHEAD);
        telemetry::emit(
            sink,
            TelemetryEvent::AggregationComplete(AggregationComplete {
                total_obus: metrics.total_obus,
                packets: metrics.packets,
                aggregated_packets: metrics.aggregated_packets,
                fragmented_packets: metrics.fragmented_packets,
                single_obu_packets: metrics.single_obu_packets,
                average_obus_per_packet: metrics.average_obus_per_packet(),
                aggregation_ratio: metrics.aggregation_ratio(),
                payload_efficiency: metrics.payload_efficiency(),
                total_payload_bytes: metrics.total_payload_bytes,
                total_packet_bytes: metrics.total_packet_bytes,
            }),
        );

        out
    }

    fn build_packet(&self, obus: &[Obu], packets: &[PlannedPacket], packet_index: usize, n_bit: bool) -> Bytes {
        let packet = &packets[packet_index];
        let mut out = BytesMut::with_capacity(HEADER_OVERHEAD + packet.packet_size);

        let z = packet.starts_with_fragment();
        let y = packet.ends_with_fragment(obus);
        let w = if packet.num_obu_elements <= MAX_OBUS_TO_OMIT_SIZE {
            packet.num_obu_elements as u8
        } else {
            0
        };

        let first_obu = &obus[packet.first_obu_index];
        let attach_ss = self.config.header_mode == HeaderMode::Spec
            && n_bit
            && self.config.scalability_structure.is_some();
        let attach_ids = self.config.header_mode == HeaderMode::Spec && first_obu.has_extension();

        match self.config.header_mode {
            HeaderMode::Draft => {
                let header = DraftHeader {
                    starts_fragment: z,
                    ends_fragment: y,
                    first_packet_of_coded_video_sequence: n_bit,
                    obu_count: w,
                };
                out.put_u8(header.encode());
            }
            HeaderMode::Spec => {
                let header = SpecHeader {
                    z: z || attach_ss,
                    y,
                    w,
                    n: n_bit,
                    c: false,
                    m: attach_ids,
                };
                // w is always in 0..=3 here; encode() only fails above that.
                out.put_u8(header.encode().expect("w bounded to 0..=3"));
                // IDS precedes SS on the wire: the depayloader consumes the
                // header and IDS byte together via `decode_spec_prefix`
                // before it ever looks for an SS descriptor.
                if attach_ids {
                    if let Ok(ids) = encode_ids_byte(first_obu.temporal_id, first_obu.spatial_id) {
                        out.put_u8(ids);
                    }
                }
                if attach_ss {
                    if let Some(ss) = self.config.scalability_structure.as_ref() {
                        if let Ok(encoded) = ss.encode() {
                            out.put_slice(&encoded);
                        }
                    }
                }
            }
        }

        let mut obu_offset = packet.first_obu_offset;
        for i in 0..packet.num_obu_elements.saturating_sub(1) {
            let element = &obus[packet.first_obu_index + i];
            let fragment_size = element.size - obu_offset;
            leb128::encode(fragment_size as u64, &mut out);
            write_obu_fragment(&mut out, element, obu_offset, fragment_size);
            obu_offset = 0;
        }

        let last = &obus[packet.first_obu_index + packet.num_obu_elements - 1];
        let must_write_size = packet.num_obu_elements > MAX_OBUS_TO_OMIT_SIZE;
        if must_write_size {
            leb128::encode(packet.last_obu_size as u64, &mut out);
        }
        write_obu_fragment(&mut out, last, obu_offset, packet.last_obu_size);

        out.freeze()
    }
}

/// Writes `fragment_size` bytes of `obu` starting at `offset` (relative
/// to the full encoded OBU, header bytes included) into `out`, emitting
/// the header/extension byte(s) when the fragment begins at offset 0/1.
fn write_obu_fragment(out: &mut BytesMut, element: &Obu, offset: usize, fragment_size: usize) {
    let mut remaining = fragment_size;
    let mut cursor = offset;
    if !element.opaque {
        if cursor == 0 && remaining > 0 {
            out.put_u8(element.header & !OBU_HAS_SIZE_BIT);
            cursor += 1;
            remaining -= 1;
        }
        if cursor <= 1 && element.has_extension() && remaining > 0 {
            out.put_u8(element.extension_header);
            cursor += 1;
            remaining -= 1;
        }
    }
    let header_size = element.header_size();
    let payload_offset = cursor.saturating_sub(header_size);
    out.put_slice(&element.payload[payload_offset..payload_offset + remaining]);
}

/// Wraps an unparseable access unit as a single opaque "OBU" spanning
/// the whole buffer, so the planner can still fragment it by raw bytes
/// when OBU structure could not be recovered. `payload` is exactly
/// `buf` with no synthetic header byte, since there is nothing to
/// re-encode: the bytes are carried through unchanged.
fn opaque_obu(buf: &Bytes) -> Obu {
    Obu {
        header: 0,
        extension_header: 0,
        obu_type: ObuType::Reserved(0),
        temporal_id: 0,
        spatial_id: 0,
        payload: buf.clone(),
        size: buf.len(),
        opaque: true,
    }
}

#[cfg(test)]
#[path = "payloader_test.rs"]
mod payloader_test;
