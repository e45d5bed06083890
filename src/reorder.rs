//! Per-RTP-timestamp reorder buffer: holds packets belonging to one
//! temporal/access unit until either the marker packet's run is
//! contiguous, the buffer fills, or a cleanup sweep times the context out.
//!
//! Grounded on `interceptor::nack::generator::generator_stream`'s
//! approach to tracking which of a wrap-around range of sequence numbers
//! have arrived; that module keeps a flat 65536-wide bitmap for one long
//! stream, which is the wrong shape here since each context is small and
//! short-lived (`max_reorder_buffer` defaults to 10). A `BTreeMap<u16, _>`
//! keyed by sequence number plays the same role at this size; forward
//! walks use wrapping arithmetic rather than the map's own key order,
//! since sequence order crosses the u16 wrap point the map does not know
//! about.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;

use crate::sequence;
use crate::telemetry::{self, Discontinuity, DiscontinuityReason, Sink, TelemetryEvent};

#[derive(Debug, Clone)]
pub struct BufferedPacket {
    pub sequence_number: u16,
    pub payload: Bytes,
    pub marker: bool,
}

/// A fully or partially assembled run of packets for one timestamp.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub timestamp: u32,
    pub packets: Vec<BufferedPacket>,
    /// True when force-flushed or timed out with a gap skipped; callers
    /// must treat this as a discontinuity downstream.
    pub forced: bool,
}

struct TimestampContext {
    packets: BTreeMap<u16, BufferedPacket>,
    min_seq: u16,
    max_seq: u16,
    marker_seen: bool,
    first_seen_at: Instant,
}

impl TimestampContext {
    fn new(now: Instant) -> Self {
        Self {
            packets: BTreeMap::new(),
            min_seq: 0,
            max_seq: 0,
            marker_seen: false,
            first_seen_at: now,
        }
    }

    fn insert(&mut self, pkt: BufferedPacket) {
        let s = pkt.sequence_number;
        if self.packets.is_empty() {
            self.min_seq = s;
            self.max_seq = s;
        } else {
            if sequence::signed_distance(s, self.min_seq) < 0 {
                self.min_seq = s;
            }
            if sequence::signed_distance(s, self.max_seq) > 0 {
                self.max_seq = s;
            }
        }
        self.marker_seen = self.marker_seen || pkt.marker;
        self.packets.insert(s, pkt);
    }

    /// Walks forward from `min_seq`, collecting present packets and
    /// halting once a run of missing sequence numbers exceeds
    /// `max_seq_gap`. Returns the run collected so far, whether it
    /// reached (and included) the marker packet, and whether any gap was
    /// tolerated along the way (skipped sequence numbers within
    /// `max_seq_gap` rather than a clean contiguous run).
    fn walk_contiguous(&self, max_seq_gap: i32) -> (Vec<BufferedPacket>, bool, bool) {
        let mut out = Vec::with_capacity(self.packets.len());
        let mut seq = self.min_seq;
        let mut missing_run = 0i32;
        let mut reached_marker = false;
        let mut gap_tolerated = false;
        loop {
            if sequence::signed_distance(seq, self.max_seq) > 0 {
                break;
            }
            match self.packets.get(&seq) {
                Some(pkt) => {
                    if missing_run > 0 {
                        gap_tolerated = true;
                    }
                    missing_run = 0;
                    let marker = pkt.marker;
                    out.push(pkt.clone());
                    if marker {
                        reached_marker = true;
                        break;
                    }
                }
                None => {
                    missing_run += 1;
                    if missing_run > max_seq_gap {
                        break;
                    }
                }
            }
            seq = seq.wrapping_add(1);
        }
        (out, reached_marker, gap_tolerated)
    }

    /// Collects every buffered packet in forward sequence order (wrap-
    /// aware, not raw key order), silently skipping gaps; used by the
    /// force-flush and timeout paths.
    fn collect_skipping_gaps(&self) -> Vec<BufferedPacket> {
        let mut out = Vec::with_capacity(self.packets.len());
        let mut seq = self.min_seq;
        loop {
            if let Some(pkt) = self.packets.get(&seq) {
                out.push(pkt.clone());
            }
            if sequence::signed_distance(seq, self.max_seq) >= 0 {
                break;
            }
            seq = seq.wrapping_add(1);
        }
        out
    }
}

pub struct ReorderBuffer {
    max_reorder_buffer: usize,
    max_seq_gap: i32,
    reorder_timeout: std::time::Duration,
    contexts: BTreeMap<u32, TimestampContext>,
}

impl ReorderBuffer {
    pub fn new(max_reorder_buffer: usize, max_seq_gap: i32, reorder_timeout_ms: u64) -> Self {
        Self {
            max_reorder_buffer,
            max_seq_gap,
            reorder_timeout: std::time::Duration::from_millis(reorder_timeout_ms),
            contexts: BTreeMap::new(),
        }
    }

    /// Inserts one packet for `timestamp`, returning an assembled run if
    /// this insertion completes (marker-contiguous) or force-flushes
    /// (buffer-size overflow) the context. The context is removed from
    /// internal state whenever it produces output.
    pub fn insert(
        &mut self,
        timestamp: u32,
        pkt: BufferedPacket,
        now: Instant,
        sink: &mut Sink<'_>,
    ) -> Option<Assembled> {
        let ctx = self
            .contexts
            .entry(timestamp)
            .or_insert_with(|| TimestampContext::new(now));
        ctx.insert(pkt);

        if ctx.marker_seen {
            let (run, reached_marker, gap_tolerated) = ctx.walk_contiguous(self.max_seq_gap);
            if reached_marker {
                self.contexts.remove(&timestamp);
                if gap_tolerated {
                    telemetry::emit(
                        sink,
                        TelemetryEvent::Discontinuity(Discontinuity {
                            timestamp,
                            reason: DiscontinuityReason::SequenceGap,
                        }),
                    );
                }
                return Some(Assembled {
                    timestamp,
                    packets: run,
                    forced: gap_tolerated,
                });
            }
        }

        if ctx.packets.len() >= self.max_reorder_buffer {
            let packets = ctx.collect_skipping_gaps();
            self.contexts.remove(&timestamp);
            telemetry::emit(
                sink,
                TelemetryEvent::Discontinuity(Discontinuity {
                    timestamp,
                    reason: DiscontinuityReason::ForceFlush,
                }),
            );
            return Some(Assembled {
                timestamp,
                packets,
                forced: true,
            });
        }

        None
    }

    /// Drops contexts older than the configured timeout, emitting one
    /// discontinuity event per dropped timestamp. Call periodically from
    /// a `tick(now)` entry point.
    pub fn expire(&mut self, now: Instant, sink: &mut Sink<'_>) {
        let stale: Vec<u32> = self
            .contexts
            .iter()
            .filter(|(_, ctx)| now.duration_since(ctx.first_seen_at) > self.reorder_timeout)
            .map(|(ts, _)| *ts)
            .collect();
        for ts in stale {
            self.contexts.remove(&ts);
            telemetry::emit(
                sink,
                TelemetryEvent::Discontinuity(Discontinuity {
                    timestamp: ts,
                    reason: DiscontinuityReason::ReorderTimeout,
                }),
            );
        }
    }

    pub fn pending_contexts(&self) -> usize {
        self.contexts.len()
    }
}

#[cfg(test)]
#[path = "reorder_test.rs"]
mod reorder_test;
