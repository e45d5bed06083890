use bytes::{BufMut, Bytes, BytesMut};

use super::*;
use crate::av1::aggregation_header::{encode_ids_byte, DraftHeader, SpecHeader};
use crate::av1::payloader::Payloader;
use crate::config::{HeaderMode, PayloaderConfig};

fn encode_obu(obu_type: u8, payload: &[u8]) -> Bytes {
    let mut out = BytesMut::new();
    out.put_u8((obu_type << 3) | OBU_HAS_SIZE_BIT);
    leb128::encode(payload.len() as u64, &mut out);
    out.put_slice(payload);
    out.freeze()
}

fn obu_header_no_size(obu_type: u8) -> u8 {
    obu_type << 3
}

fn spec_header(z: bool, y: bool, w: u8, n: bool) -> u8 {
    SpecHeader {
        z,
        y,
        w,
        n,
        c: false,
        m: false,
    }
    .encode()
    .unwrap()
}

fn meta(seq: u16, ts: u32, marker: bool) -> RtpMeta {
    RtpMeta {
        marker,
        sequence_number: Some(seq),
        timestamp: Some(ts),
        payload_type: 96,
        ssrc: 1,
    }
}

#[test]
fn single_packet_assembles_one_access_unit() {
    let payload = [1u8, 2, 3, 4];
    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(false, false, 1, false));
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&payload);

    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut sink: Sink<'_> = None;
    let aus = dep.handle_packet(&packet.freeze(), meta(1, 1000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    assert_eq!(aus[0].bytes, encode_obu(6, &payload));
    assert!(!aus[0].discontinuity);
}

#[test]
fn fragment_reassembles_across_three_packets_via_z_y_flags() {
    let full_payload = [5u8; 9];
    let element = {
        let mut b = BytesMut::new();
        b.put_u8(obu_header_no_size(6));
        b.put_slice(&full_payload);
        b.freeze()
    };
    // Split the 10-byte element (header + 9 payload bytes) into three
    // wire chunks; only Z/Y mark fragment role, not the element count.
    let chunk1 = element.slice(0..4);
    let chunk2 = element.slice(4..7);
    let chunk3 = element.slice(7..10);

    let mut p1 = BytesMut::new();
    p1.put_u8(spec_header(false, true, 1, false));
    p1.put_slice(&chunk1);

    let mut p2 = BytesMut::new();
    p2.put_u8(spec_header(true, true, 1, false));
    p2.put_slice(&chunk2);

    let mut p3 = BytesMut::new();
    p3.put_u8(spec_header(true, false, 1, false));
    p3.put_slice(&chunk3);

    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut sink: Sink<'_> = None;
    assert!(dep.handle_packet(&p1.freeze(), meta(1, 2000, false), &mut sink).is_empty());
    assert!(dep.handle_packet(&p2.freeze(), meta(2, 2000, false), &mut sink).is_empty());
    let aus = dep.handle_packet(&p3.freeze(), meta(3, 2000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    assert_eq!(aus[0].bytes, encode_obu(6, &full_payload));
}

#[test]
fn aggregated_packet_with_two_complete_obus_is_not_mistaken_for_a_fragment() {
    // w=2 (two explicitly-counted elements), z=false, y=false: the wire
    // element count and the fragment-role flags are independent, so this
    // must decode as two complete OBUs rather than tripping the W-bit
    // state machine's fragment-continuation checks.
    let first_payload = [1u8, 2, 3];
    let second_payload = [9u8, 9];

    let mut first_element = BytesMut::new();
    first_element.put_u8(obu_header_no_size(1));
    first_element.put_slice(&first_payload);

    let mut body = BytesMut::new();
    leb128::encode(first_element.len() as u64, &mut body);
    body.put_slice(&first_element);
    body.put_u8(obu_header_no_size(6));
    body.put_slice(&second_payload);

    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(false, false, 2, false));
    packet.put_slice(&body);

    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut sink: Sink<'_> = None;
    let aus = dep.handle_packet(&packet.freeze(), meta(1, 3000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    let expected = {
        let mut out = BytesMut::new();
        out.extend_from_slice(&encode_obu(1, &first_payload));
        out.extend_from_slice(&encode_obu(6, &second_payload));
        out.freeze()
    };
    assert_eq!(aus[0].bytes, expected);
}

#[test]
fn draft_mode_header_decodes_n_bit() {
    let payload = [7u8; 3];
    let header = DraftHeader {
        starts_fragment: false,
        ends_fragment: false,
        first_packet_of_coded_video_sequence: true,
        obu_count: 1,
    };
    let mut packet = BytesMut::new();
    packet.put_u8(header.encode());
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&payload);

    let mut cfg = DepayloaderConfig::default();
    cfg.header_mode = DepayloaderHeaderMode::Draft;
    let mut dep = Depayloader::new(cfg);
    let mut sink: Sink<'_> = None;
    let aus = dep.handle_packet(&packet.freeze(), meta(1, 4000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    assert!(aus[0].metadata.n_flag);
}

#[test]
fn auto_mode_resolves_to_spec_and_decodes_correctly() {
    let payload = [3u8; 2];
    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(false, false, 1, false));
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&payload);

    let mut cfg = DepayloaderConfig::default();
    cfg.header_mode = DepayloaderHeaderMode::Auto;
    let mut dep = Depayloader::new(cfg);
    let mut sink: Sink<'_> = None;
    let aus = dep.handle_packet(&packet.freeze(), meta(1, 5000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    assert_eq!(aus[0].bytes, encode_obu(6, &payload));
}

#[test]
fn require_sequence_header_suppresses_aus_until_one_arrives() {
    let mut cfg = DepayloaderConfig::default();
    cfg.require_sequence_header = true;
    let mut dep = Depayloader::new(cfg);
    let mut sink: Sink<'_> = None;

    let frame_only = [4u8; 2];
    let mut p1 = BytesMut::new();
    p1.put_u8(spec_header(false, false, 1, false));
    p1.put_u8(obu_header_no_size(6));
    p1.put_slice(&frame_only);
    assert!(dep.handle_packet(&p1.freeze(), meta(1, 6000, true), &mut sink).is_empty());
    assert!(dep.wants_key_frame());

    let seq_hdr_payload = [1u8, 2];
    let frame_payload = [9u8, 9];
    // The sequence header element is explicitly length-prefixed (w=2),
    // the frame element runs to the end of the packet.
    let mut seq_element = BytesMut::new();
    seq_element.put_u8(obu_header_no_size(1));
    seq_element.put_slice(&seq_hdr_payload);
    let mut body2 = BytesMut::new();
    leb128::encode(seq_element.len() as u64, &mut body2);
    body2.put_slice(&seq_element);
    body2.put_u8(obu_header_no_size(6));
    body2.put_slice(&frame_payload);

    let mut p2 = BytesMut::new();
    p2.put_u8(spec_header(false, false, 2, false));
    p2.put_slice(&body2);

    let aus = dep.handle_packet(&p2.freeze(), meta(2, 6001, true), &mut sink);
    assert_eq!(aus.len(), 1);
    assert!(!dep.wants_key_frame());
}

#[test]
fn layer_filtered_packet_emits_telemetry_and_is_dropped() {
    let mut cfg = DepayloaderConfig::default();
    cfg.max_temporal_id = Some(0);
    let mut dep = Depayloader::new(cfg);

    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(false, false, 1, false) | 0b0000_0010); // set m
    packet.put_u8(encode_ids_byte(2, 0).unwrap());
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&[1, 2, 3]);

    let mut events = Vec::new();
    {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut sink: Sink<'_> = Some(&mut record);
        let aus = dep.handle_packet(&packet.freeze(), meta(1, 7000, true), &mut sink);
        assert_eq!(aus.len(), 1);
        assert!(aus[0].bytes.is_empty());
    }
    assert!(events.iter().any(|e| matches!(
        e,
        TelemetryEvent::LayerFiltered(LayerFiltered {
            temporal_id: 2,
            spatial_id: 0,
            ..
        })
    )));
}

#[test]
fn scalability_structure_is_decoded_and_cursor_advances_past_it() {
    // n_s=0, y_flag=true, n_g=0: one spatial layer, no frame_rate byte,
    // no picture descriptors.
    let ss_bytes: [u8; 5] = [0b0001_0000, 0x02, 0x80, 0x01, 0xE0];
    let payload = [8u8, 8];

    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(true, false, 1, false));
    packet.put_slice(&ss_bytes);
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&payload);

    // A packet carrying an SS sets Z=1 per spec, which also feeds the W-bit
    // state machine as "ends a fragment" with no prior start; compatibility
    // mode is what lets a from-idle W=3 through as a complete element
    // (see the wstate open-question decision) rather than rejecting it.
    let mut cfg = DepayloaderConfig::default();
    cfg.w_compatibility_mode = true;
    let mut dep = Depayloader::new(cfg);
    let mut sink: Sink<'_> = None;
    let aus = dep.handle_packet(&packet.freeze(), meta(1, 8000, true), &mut sink);

    assert_eq!(aus.len(), 1);
    assert_eq!(aus[0].bytes, encode_obu(6, &payload));
    assert!(aus[0].metadata.has_ss);
    let ss = aus[0].metadata.scalability_structure.as_ref().unwrap();
    assert_eq!(ss.n_s, 0);
    assert!(ss.y_flag);
    assert_eq!(ss.spatial_layers[0].width, 640);
    assert_eq!(ss.spatial_layers[0].height, 480);
}

#[test]
fn incomplete_fragment_at_au_end_emits_fragment_timeout() {
    let chunk = [2u8; 3];
    let mut packet = BytesMut::new();
    packet.put_u8(spec_header(false, true, 1, false));
    packet.put_u8(obu_header_no_size(6));
    packet.put_slice(&chunk);

    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut events = Vec::new();
    {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut sink: Sink<'_> = Some(&mut record);
        let aus = dep.handle_packet(&packet.freeze(), meta(1, 9000, true), &mut sink);
        assert_eq!(aus.len(), 1);
        assert!(aus[0].discontinuity);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, TelemetryEvent::FragmentTimeout(FragmentTimeout { .. }))));
}

#[test]
fn round_trips_through_payloader_fragmentation() {
    let big_payload = vec![7u8; 400];
    let au = encode_obu(6, &big_payload);
    let mut pcfg = PayloaderConfig::new(100, 96, HeaderMode::Spec);
    pcfg.validate_obus = false;
    let payloader = Payloader::new(pcfg);
    let mut psink: Sink<'_> = None;
    let packets = payloader.fragment(&au, &mut psink);
    assert!(packets.len() > 1);

    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut sink: Sink<'_> = None;
    let mut assembled = Vec::new();
    for (i, (bytes, marker)) in packets.into_iter().enumerate() {
        let mut out = dep.handle_packet(&bytes, meta(i as u16 + 1, 10_000, marker), &mut sink);
        assembled.append(&mut out);
    }

    assert_eq!(assembled.len(), 1);
    assert_eq!(assembled[0].bytes, au);
}

#[test]
fn tick_with_nothing_pending_emits_no_events() {
    let mut dep = Depayloader::new(DepayloaderConfig::default());
    let mut events = Vec::new();
    {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut sink: Sink<'_> = Some(&mut record);
        dep.tick(&mut sink);
    }
    assert!(events.is_empty());
}
