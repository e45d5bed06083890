use std::time::{Duration, Instant};

use bytes::Bytes;

use super::*;

fn pkt(seq: u16, marker: bool) -> BufferedPacket {
    BufferedPacket {
        sequence_number: seq,
        payload: Bytes::from_static(b"x"),
        marker,
    }
}

#[test]
fn contiguous_run_assembles_on_marker() {
    let mut buf = ReorderBuffer::new(10, 5, 500);
    let now = Instant::now();
    let mut sink: Sink<'_> = None;
    assert!(buf.insert(100, pkt(10, false), now, &mut sink).is_none());
    assert!(buf.insert(100, pkt(11, false), now, &mut sink).is_none());
    let out = buf.insert(100, pkt(12, true), now, &mut sink).unwrap();
    assert!(!out.forced);
    assert_eq!(
        out.packets.iter().map(|p| p.sequence_number).collect::<Vec<_>>(),
        vec![10, 11, 12]
    );
}

#[test]
fn out_of_order_arrival_still_assembles_in_sequence_order() {
    let mut buf = ReorderBuffer::new(10, 5, 500);
    let now = Instant::now();
    let mut sink: Sink<'_> = None;
    assert!(buf.insert(200, pkt(5, false), now, &mut sink).is_none());
    assert!(buf.insert(200, pkt(4, false), now, &mut sink).is_none());
    let out = buf.insert(200, pkt(6, true), now, &mut sink).unwrap();
    assert_eq!(
        out.packets.iter().map(|p| p.sequence_number).collect::<Vec<_>>(),
        vec![4, 5, 6]
    );
}

#[test]
fn marker_seen_but_gap_exceeds_threshold_waits() {
    let mut buf = ReorderBuffer::new(10, 1, 500);
    let now = Instant::now();
    let mut sink: Sink<'_> = None;
    assert!(buf.insert(300, pkt(10, false), now, &mut sink).is_none());
    // Marker packet arrives far ahead of a gap bigger than max_seq_gap=1.
    assert!(buf.insert(300, pkt(20, true), now, &mut sink).is_none());
    assert_eq!(buf.pending_contexts(), 1);
}

#[test]
fn force_flush_on_buffer_overflow_emits_discontinuity() {
    let mut buf = ReorderBuffer::new(3, 5, 500);
    let now = Instant::now();
    let mut events = Vec::new();
    {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut sink: Sink<'_> = Some(&mut record);
        assert!(buf.insert(400, pkt(1, false), now, &mut sink).is_none());
        assert!(buf.insert(400, pkt(3, false), now, &mut sink).is_none());
        let out = buf.insert(400, pkt(5, false), now, &mut sink).unwrap();
        assert!(out.forced);
        // Gaps at 2 and 4 are skipped, not waited on.
        assert_eq!(
            out.packets.iter().map(|p| p.sequence_number).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }
    assert!(matches!(
        events[0],
        TelemetryEvent::Discontinuity(Discontinuity {
            reason: DiscontinuityReason::ForceFlush,
            ..
        })
    ));
}

#[test]
fn wrap_around_sequence_assembles_in_wrap_order() {
    let mut buf = ReorderBuffer::new(10, 5, 500);
    let now = Instant::now();
    let mut events = Vec::new();
    let out = {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut sink: Sink<'_> = Some(&mut record);
        assert!(buf.insert(500, pkt(65534, false), now, &mut sink).is_none());
        assert!(buf.insert(500, pkt(65535, false), now, &mut sink).is_none());
        buf.insert(500, pkt(1, true), now, &mut sink).unwrap()
    };
    // Gap at 0 is within max_seq_gap, so the run continues and reaches marker.
    assert_eq!(
        out.packets.iter().map(|p| p.sequence_number).collect::<Vec<_>>(),
        vec![65534, 65535, 1]
    );
    // Reaching the marker only by tolerating the skipped 0 is still a
    // discontinuity: downstream dropped bytes it never saw.
    assert!(out.forced);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        TelemetryEvent::Discontinuity(Discontinuity {
            reason: DiscontinuityReason::SequenceGap,
            ..
        })
    ));
}

#[test]
fn expire_drops_stale_contexts_with_one_discontinuity_each() {
    let mut buf = ReorderBuffer::new(10, 5, 50);
    let now = Instant::now();
    let mut sink: Sink<'_> = None;
    assert!(buf.insert(600, pkt(1, false), now, &mut sink).is_none());
    assert_eq!(buf.pending_contexts(), 1);

    let later = now + Duration::from_millis(100);
    let mut events = Vec::new();
    {
        let mut record = |e: TelemetryEvent| events.push(e);
        let mut expire_sink: Sink<'_> = Some(&mut record);
        buf.expire(later, &mut expire_sink);
    }
    assert_eq!(buf.pending_contexts(), 0);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        TelemetryEvent::Discontinuity(Discontinuity {
            reason: DiscontinuityReason::ReorderTimeout,
            ..
        })
    ));
}
