//! The AV1 RTP depayloader: turns a stream of `(payload, rtp-metadata)`
//! packets back into access units.
//!
//! The accumulate-fragments-drain-on-end-marker shape is grounded on
//! `rtp::codecs::h264::H264Packet`'s `Depacketizer`; the ahead-of-payload
//! multi-field header decode (aggregation header, then optionally SS,
//! then optionally an IDS byte) is grounded on
//! `rtp::codecs::vp9::Vp9Packet`'s `depacketize`. Per-timestamp ordering
//! is delegated to [`crate::reorder::ReorderBuffer`]: packets are fed to
//! it as they arrive, and only once it yields a contiguous (or
//! force-flushed) run for a timestamp does this module decode aggregation
//! headers and drive the W-bit state machine, so fragment reassembly
//! always happens against packets in true sequence order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::av1::aggregation_header::{self, DraftHeader, SpecHeader};
use crate::av1::layer_id::LayerId;
use crate::av1::leb128;
use crate::av1::obu::{self, Obu, ObuType, OBU_HAS_SIZE_BIT};
use crate::av1::scalability::ScalabilityStructure;
use crate::av1::temporal_unit;
use crate::av1::wstate::WState;
use crate::config::{DepayloaderConfig, DepayloaderHeaderMode};
use crate::error::{Error, ObuErrorContext, Result};
use crate::reorder::{Assembled, BufferedPacket, ReorderBuffer};
use crate::sequence::{SequenceOutcome, SequenceTracker};
use crate::telemetry::{
    self, Discontinuity, DiscontinuityReason, FragmentTimeout, LayerFiltered, Sink, TelemetryEvent,
};

/// Per-packet metadata the enclosing transport layer supplies. Sequence
/// number and timestamp are optional so offline tests can feed bare
/// payloads without constructing a full RTP stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtpMeta {
    pub marker: bool,
    pub sequence_number: Option<u16>,
    pub timestamp: Option<u32>,
    pub payload_type: u8,
    pub ssrc: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AuMetadata {
    pub temporal_id: u8,
    pub spatial_id: u8,
    pub n_flag: bool,
    pub y_flag: bool,
    pub has_ss: bool,
    pub scalability_structure: Option<ScalabilityStructure>,
    pub key_frame: bool,
}

#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub bytes: Bytes,
    pub pts: u32,
    pub metadata: AuMetadata,
    /// Set when reassembly of this AU involved a recovery action (a
    /// reorder force-flush or an abandoned fragment) that may have
    /// dropped bytes relative to what the sender emitted.
    pub discontinuity: bool,
}

pub struct Depayloader {
    config: DepayloaderConfig,
    resolved_mode: Option<DepayloaderHeaderMode>,
    sequence: SequenceTracker,
    reorder: ReorderBuffer,
    cached_ss: Option<ScalabilityStructure>,
    seen_sequence_header: bool,
    synthetic_seq: u16,
    synthetic_timestamp: u32,
}

impl Depayloader {
    pub fn new(config: DepayloaderConfig) -> Self {
        let reorder = ReorderBuffer::new(
            config.max_reorder_buffer,
            config.max_seq_gap,
            config.reorder_timeout_ms,
        );
        Self {
            config,
            resolved_mode: None,
            sequence: SequenceTracker::new(),
            reorder,
            cached_ss: None,
            seen_sequence_header: false,
            synthetic_seq: 0,
            synthetic_timestamp: 0,
        }
    }

    pub fn config(&self) -> &DepayloaderConfig {
        &self.config
    }

    /// True while `require_sequence_header` is configured and no
    /// sequence header has been observed yet; the core only raises this
    /// flag, leaving the decision to request a key frame from upstream to
    /// an external collaborator.
    pub fn wants_key_frame(&self) -> bool {
        self.config.require_sequence_header && !self.seen_sequence_header
    }

    fn next_sequence_number(&mut self, meta: &RtpMeta) -> u16 {
        match meta.sequence_number {
            Some(s) => s,
            None => {
                let s = self.synthetic_seq;
                self.synthetic_seq = self.synthetic_seq.wrapping_add(1);
                s
            }
        }
    }

    fn timestamp_for(&mut self, meta: &RtpMeta) -> u32 {
        match meta.timestamp {
            Some(t) => t,
            None => {
                let t = self.synthetic_timestamp;
                if meta.marker {
                    self.synthetic_timestamp = self.synthetic_timestamp.wrapping_add(1);
                }
                t
            }
        }
    }

    /// Feeds one packet through sequence validation and the reorder
    /// buffer, returning zero or one reassembled access units (zero is
    /// the common case: most packets just extend a pending timestamp).
    pub fn handle_packet(&mut self, payload: &Bytes, meta: RtpMeta, sink: &mut Sink<'_>) -> Vec<AccessUnit> {
        let seq = self.next_sequence_number(&meta);
        let timestamp = self.timestamp_for(&meta);

        if meta.sequence_number.is_some() {
            match self.sequence.accept(seq) {
                SequenceOutcome::Duplicate => return vec![],
                SequenceOutcome::OutOfOrder => {
                    // Within-reorder-window lateness; still handed to the
                    // reorder buffer, which is exactly the mechanism that
                    // tolerates this.
                }
                SequenceOutcome::Accepted(obs) if obs.is_gap => {
                    telemetry::emit(
                        sink,
                        TelemetryEvent::Discontinuity(Discontinuity {
                            timestamp,
                            reason: DiscontinuityReason::SequenceGap,
                        }),
                    );
                }
                SequenceOutcome::Accepted(_) => {}
            }
        }

        let now = std::time::Instant::now();
        let pkt = BufferedPacket {
            sequence_number: seq,
            payload: payload.clone(),
            marker: meta.marker,
        };
        match self.reorder.insert(timestamp, pkt, now, sink) {
            Some(assembled) => self.assemble_au(timestamp, assembled, sink).into_iter().collect(),
            None => vec![],
        }
    }

    /// Drives the reorder-timeout sweep; call periodically.
    pub fn tick(&mut self, sink: &mut Sink<'_>) {
        let now = std::time::Instant::now();
        self.reorder.expire(now, sink);
    }

    fn resolve_mode(&mut self, first_byte: u8) -> DepayloaderHeaderMode {
        match self.config.header_mode {
            DepayloaderHeaderMode::Draft => DepayloaderHeaderMode::Draft,
            DepayloaderHeaderMode::Spec => DepayloaderHeaderMode::Spec,
            DepayloaderHeaderMode::Auto => *self.resolved_mode.get_or_insert_with(|| {
                if SpecHeader::decode(first_byte).is_ok() {
                    DepayloaderHeaderMode::Spec
                } else {
                    DepayloaderHeaderMode::Draft
                }
            }),
        }
    }

    fn assemble_au(&mut self, timestamp: u32, assembled: Assembled, sink: &mut Sink<'_>) -> Option<AccessUnit> {
        let mut au_bytes = BytesMut::new();
        let mut wstate = WState::new(self.config.w_compatibility_mode);
        let mut metadata = AuMetadata::default();
        let mut n_flag_set = false;
        let mut layer_set = false;
        let mut has_sequence_header_in_au = false;
        let mut discontinuity = assembled.forced;

        for pkt in &assembled.packets {
            if pkt.payload.is_empty() {
                continue;
            }
            let mode = self.resolve_mode(pkt.payload[0]);
            let header = match self.decode_packet_header(mode, &pkt.payload) {
                Ok(h) => h,
                Err(_) => {
                    discontinuity = true;
                    continue;
                }
            };

            if !n_flag_set {
                metadata.n_flag = header.n;
                n_flag_set = true;
            }

            // Z=1 marks both "continues a prior fragment" and "an SS
            // follows" (spec §4.3), which collide on every ordinary
            // fragment-ending packet. Disambiguated by W-state: a Z=1
            // packet arriving while a fragment is already open is the
            // former; a Z=1 packet arriving from idle is the latter,
            // since nothing was ever open for it to continue.
            let mut consumed = header.bytes_consumed;
            if header.z && !wstate.is_in_fragment() {
                let rest = pkt.payload.slice(consumed..);
                match ScalabilityStructure::decode(&rest) {
                    Ok((ss, ss_consumed)) => {
                        consumed += ss_consumed;
                        self.cached_ss = Some(ss);
                    }
                    Err(_) => {
                        // Z=1 without a parseable SS: spec.md calls this an
                        // error rather than silently treating the bytes as
                        // OBU data.
                        discontinuity = true;
                        continue;
                    }
                }
            }

            if let (Some(t), Some(s)) = (header.temporal_id, header.spatial_id) {
                let layer_ok = match &self.cached_ss {
                    Some(ss) => LayerId {
                        temporal_id: t,
                        spatial_id: s,
                    }
                    .validate_against(ss)
                    .is_ok(),
                    None => true,
                };
                let within_caps = self.config.max_temporal_id.map_or(true, |m| t <= m)
                    && self.config.max_spatial_id.map_or(true, |m| s <= m);
                if !layer_ok || !within_caps {
                    telemetry::emit(
                        sink,
                        TelemetryEvent::LayerFiltered(LayerFiltered {
                            timestamp,
                            temporal_id: t,
                            spatial_id: s,
                        }),
                    );
                    wstate.reset();
                    continue;
                }
                if !layer_set {
                    metadata.temporal_id = t;
                    metadata.spatial_id = s;
                    layer_set = true;
                }
            }

            let body = pkt.payload.slice(consumed..);
            match self.route_elements(&mut wstate, &header, &body) {
                Ok(obus) => {
                    for obu in obus {
                        if obu.obu_type == ObuType::SequenceHeader {
                            has_sequence_header_in_au = true;
                        }
                        append_canonical(&mut au_bytes, &obu);
                    }
                }
                Err(_) => discontinuity = true,
            }
        }

        if wstate.is_in_fragment() {
            telemetry::emit(
                sink,
                TelemetryEvent::FragmentTimeout(FragmentTimeout {
                    timestamp,
                    bytes_discarded: wstate.buffered_len(),
                }),
            );
            discontinuity = true;
        }

        if let Some(ss) = &self.cached_ss {
            metadata.has_ss = true;
            metadata.y_flag = ss.y_flag;
            metadata.scalability_structure = Some(ss.clone());
        }
        metadata.key_frame = detect_key_frame(&au_bytes.clone().freeze());

        if has_sequence_header_in_au {
            self.seen_sequence_header = true;
        }
        if self.config.require_sequence_header && !self.seen_sequence_header {
            return None;
        }

        Some(AccessUnit {
            bytes: au_bytes.freeze(),
            pts: timestamp,
            metadata,
            discontinuity,
        })
    }

    fn decode_packet_header(&self, mode: DepayloaderHeaderMode, buf: &Bytes) -> Result<PacketHeader> {
        if buf.is_empty() {
            return Err(Error::ErrShortBuffer);
        }
        match mode {
            DepayloaderHeaderMode::Draft | DepayloaderHeaderMode::Auto => {
                let dh = DraftHeader::decode(buf[0]);
                Ok(PacketHeader {
                    z: dh.starts_fragment,
                    y: dh.ends_fragment,
                    count: dh.obu_count,
                    n: dh.first_packet_of_coded_video_sequence,
                    temporal_id: None,
                    spatial_id: None,
                    bytes_consumed: 1,
                })
            }
            DepayloaderHeaderMode::Spec => {
                let prefix = aggregation_header::decode_spec_prefix(buf)?;
                Ok(PacketHeader {
                    z: prefix.header.z,
                    y: prefix.header.y,
                    count: prefix.header.w,
                    n: prefix.header.n,
                    temporal_id: prefix.temporal_id,
                    spatial_id: prefix.spatial_id,
                    bytes_consumed: prefix.bytes_consumed,
                })
            }
        }
    }

    /// Inverts the payloader's element layout for one packet's OBU
    /// region: `count - 1` length-prefixed complete OBUs followed by one
    /// element that is either length-prefixed too (`count == 0`) or runs
    /// to the end of the packet. `count` and the Z/Y fragmentation flags
    /// are independent wire fields — a packet may aggregate several
    /// complete OBUs and still have its last element be a fragment
    /// boundary, so the W-bit state machine is driven by a symbol derived
    /// from Z/Y, never by `count` itself.
    fn route_elements(&self, wstate: &mut WState, header: &PacketHeader, body: &Bytes) -> Result<Vec<Obu>> {
        let mut out = Vec::new();
        let count = header.count;
        let symbol = fragment_symbol(header.z, header.y);
        if count == 0 {
            // All elements are individually length-prefixed; when the
            // packet's last element also starts or continues a fragment
            // (rare: only reachable once an access unit already has more
            // than three elements ahead of an oversized trailing OBU),
            // its prefixed span still isn't a complete OBU and is routed
            // through the state machine instead of being parsed directly.
            let mut cursor = 0usize;
            let mut elements = Vec::new();
            while cursor < body.len() {
                let (len, leb_size) = leb128::decode(&body[cursor..])?;
                cursor += leb_size;
                let len = len as usize;
                if cursor + len > body.len() {
                    return Err(Error::IncompleteObu(ObuErrorContext {
                        expected: len,
                        actual: body.len() - cursor,
                        size: len,
                        max: obu::MAX_OBU_PAYLOAD_SIZE,
                    }));
                }
                elements.push(body.slice(cursor..cursor + len));
                cursor += len;
            }
            let final_is_fragment = header.y;
            let final_elem = if final_is_fragment { elements.pop() } else { None };
            for e in &elements {
                out.push(obu::parse_one(e)?);
            }
            match final_elem {
                Some(e) => {
                    if let Some(complete) = wstate.accept(symbol, e)? {
                        out.push(obu::parse_one(&complete)?);
                    }
                }
                None => {
                    wstate.accept(symbol, Bytes::new())?;
                }
            }
            return Ok(out);
        }

        let mut cursor = 0usize;
        for _ in 0..(count - 1) {
            let (len, leb_size) = leb128::decode(&body[cursor..])?;
            cursor += leb_size;
            let len = len as usize;
            if cursor + len > body.len() {
                return Err(Error::IncompleteObu(ObuErrorContext {
                    expected: len,
                    actual: body.len() - cursor,
                    size: len,
                    max: obu::MAX_OBU_PAYLOAD_SIZE,
                }));
            }
            let element = body.slice(cursor..cursor + len);
            cursor += len;
            out.push(obu::parse_one(&element)?);
        }

        let final_element = body.slice(cursor..);
        if let Some(complete) = wstate.accept(symbol, final_element)? {
            out.push(obu::parse_one(&complete)?);
        }
        Ok(out)
    }
}

/// Maps a packet's Z (first element continues a previous fragment) / Y
/// (last element continues into the next packet) flags onto the W-bit
/// state machine's symbol alphabet: 0 no fragment role, 1 starts a
/// fragment, 2 continues one, 3 ends one.
fn fragment_symbol(z: bool, y: bool) -> u8 {
    match (z, y) {
        (false, false) => 0,
        (false, true) => 1,
        (true, true) => 2,
        (true, false) => 3,
    }
}

struct PacketHeader {
    z: bool,
    y: bool,
    count: u8,
    n: bool,
    temporal_id: Option<u8>,
    spatial_id: Option<u8>,
    bytes_consumed: usize,
}

/// Re-encodes a reassembled OBU in canonical sized form (extension byte
/// preserved, size field always present), matching the shape a
/// `validate_access_unit`-conforming encoder would have produced.
fn append_canonical(out: &mut BytesMut, obu: &Obu) {
    out.put_u8(obu.header | OBU_HAS_SIZE_BIT);
    if obu.has_extension() {
        out.put_u8(obu.extension_header);
    }
    leb128::encode(obu.payload.len() as u64, out);
    out.put_slice(&obu.payload);
}

fn detect_key_frame(au_bytes: &Bytes) -> bool {
    let obus = match obu::parse_obus(au_bytes) {
        Ok(obus) => obus,
        Err(_) => return false,
    };
    obus.iter().any(|o| {
        matches!(o.obu_type, ObuType::Frame | ObuType::FrameHeader)
            && temporal_unit::parse_frame_header_bits(&o.payload)
                .map(|fh| !fh.show_existing_frame && fh.frame_type == Some(temporal_unit::FRAME_TYPE_KEY))
                .unwrap_or(false)
    })
}

#[cfg(test)]
#[path = "depayloader_test.rs"]
mod depayloader_test;
