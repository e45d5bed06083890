//! Aggregation planner: greedy bin-packing of parsed OBUs into RTP
//! packet payloads bounded by MTU and a maximum OBU-per-packet count.
//!
//! The teacher's `packetizer::packetize` drives this with a `Vec` that
//! doubles as a stack: it pops the in-progress packet off the back,
//! mutates it, and pushes it straight back on, for every OBU. This
//! version keeps the same boundary arithmetic (the LEB128-prefix
//! deferral for small packets, the `MAX_OBUS_PER_PACKET` ceiling, the
//! oversized-last-fragment split) but drops the pop/push idiom: an
//! [`OpenPacket`] accumulator is held as its own local across the loop
//! and only turned into a [`PlannedPacket`] once it's actually full or
//! the OBU list runs out. Fragmenting an oversized OBU is handled by a
//! dedicated inner walk that pushes finished middle fragments straight
//! into the output, leaving only the final fragment as the new open
//! packet — so a following small OBU can still land in it, same as any
//! other element would.

use std::cmp::min;

use crate::av1::leb128;
use crate::av1::obu::Obu;

/// When a packet holds this many OBU elements or fewer, the final
/// element's length may be omitted (it runs to the end of the payload).
pub const MAX_OBUS_TO_OMIT_SIZE: usize = 3;
pub const MAX_OBUS_PER_PACKET: usize = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedPacket {
    pub first_obu_index: usize,
    pub num_obu_elements: usize,
    pub first_obu_offset: usize,
    pub last_obu_size: usize,
    pub packet_size: usize,
}

impl PlannedPacket {
    /// True when this packet's first OBU element is a continuation of a
    /// fragment begun in a previous packet.
    pub fn starts_with_fragment(&self) -> bool {
        self.first_obu_offset > 0
    }

    /// True when this packet's last OBU element continues into a
    /// following packet, given the true size of that OBU.
    pub fn ends_with_fragment(&self, obus: &[Obu]) -> bool {
        let last_obu_offset = if self.num_obu_elements == 1 {
            self.first_obu_offset
        } else {
            0
        };
        let last_index = self.first_obu_index + self.num_obu_elements - 1;
        last_obu_offset + self.last_obu_size < obus[last_index].size
    }
}

/// The packet currently being filled. Unlike [`PlannedPacket`], which is
/// a finished, read-only record, this also tracks how much of the MTU
/// budget is still free so the main loop can decide whether one more
/// element fits.
struct OpenPacket {
    first_obu_index: usize,
    first_obu_offset: usize,
    num_obu_elements: usize,
    last_obu_size: usize,
    committed_bytes: usize,
}

impl OpenPacket {
    fn starting_at(obu_index: usize) -> Self {
        Self {
            first_obu_index: obu_index,
            first_obu_offset: 0,
            num_obu_elements: 0,
            last_obu_size: 0,
            committed_bytes: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.num_obu_elements == 0
    }

    /// Cost, in bytes, of giving the packet's current last element an
    /// explicit LEB128 length prefix — the price of it no longer being
    /// the final (and thus implicitly-sized) element once another
    /// follows it. Zero once the packet already holds more than
    /// `MAX_OBUS_TO_OMIT_SIZE` elements, since every one of those
    /// already carries its own explicit length.
    fn prefix_cost_if_extended(&self) -> usize {
        if self.is_empty() || self.num_obu_elements > MAX_OBUS_TO_OMIT_SIZE {
            0
        } else {
            leb128::encoded_len(self.last_obu_size as u64)
        }
    }

    fn seal(self) -> PlannedPacket {
        PlannedPacket {
            first_obu_index: self.first_obu_index,
            num_obu_elements: self.num_obu_elements,
            first_obu_offset: self.first_obu_offset,
            last_obu_size: self.last_obu_size,
            packet_size: self.committed_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregationMetrics {
    pub total_obus: usize,
    pub packets: usize,
    pub aggregated_packets: usize,
    pub fragmented_packets: usize,
    pub single_obu_packets: usize,
    pub total_payload_bytes: usize,
    pub total_packet_bytes: usize,
}

impl AggregationMetrics {
    pub fn average_obus_per_packet(&self) -> f64 {
        if self.packets == 0 {
            0.0
        } else {
            self.total_obus as f64 / self.packets as f64
        }
    }

    pub fn aggregation_ratio(&self) -> f64 {
        if self.packets == 0 {
            0.0
        } else {
            self.aggregated_packets as f64 / self.packets as f64
        }
    }

    pub fn payload_efficiency(&self) -> f64 {
        if self.total_packet_bytes == 0 {
            0.0
        } else {
            self.total_payload_bytes as f64 / self.total_packet_bytes as f64
        }
    }
}

/// Plans how to split `obus` across RTP packets bounded by
/// `max_payload_size` (already excluding the aggregation header's own
/// byte). Returns an empty plan for an empty input.
pub fn plan(obus: &[Obu], max_payload_size: usize) -> Vec<PlannedPacket> {
    if obus.is_empty() || max_payload_size == 0 {
        return vec![];
    }

    let mut sealed = Vec::new();
    let mut open = OpenPacket::starting_at(0);
    let mut free_bytes = max_payload_size;

    for (obu_index, obu) in obus.iter().enumerate() {
        let is_last_obu = obu_index + 1 == obus.len();

        // Adding another element to `open` would make its current last
        // element no longer the last, so it would need an explicit
        // length prefix it didn't need before. Reserve that cost, or
        // seal `open` and start fresh if there isn't room for it plus
        // at least one byte of the new element.
        let extension_cost = open.prefix_cost_if_extended();
        let floor = if open.num_obu_elements >= MAX_OBUS_TO_OMIT_SIZE { 2 } else { 1 };
        let mut applied_extension_cost = 0;
        if free_bytes < extension_cost + floor || open.num_obu_elements >= MAX_OBUS_PER_PACKET {
            sealed.push(std::mem::replace(&mut open, OpenPacket::starting_at(obu_index)).seal());
            free_bytes = max_payload_size;
        } else if extension_cost > 0 {
            open.committed_bytes += extension_cost;
            free_bytes -= extension_cost;
            applied_extension_cost = extension_cost;
        }

        open.num_obu_elements += 1;
        let needs_explicit_size = open.num_obu_elements > MAX_OBUS_TO_OMIT_SIZE;

        let whole_cost = obu.size + if needs_explicit_size { leb128::encoded_len(obu.size as u64) } else { 0 };
        if whole_cost < free_bytes {
            open.last_obu_size = obu.size;
            open.committed_bytes += whole_cost;
            free_bytes -= whole_cost;
            continue;
        }

        // `obu` doesn't fit whole: its head becomes `open`'s final
        // element and the rest is carried forward in packets of its
        // own.
        let first_cap = if needs_explicit_size {
            max_fragment_size(free_bytes)
        } else {
            free_bytes
        };
        let first_len = min(obu.size.saturating_sub(1), first_cap);
        if first_len == 0 {
            // No room at all for even a one-byte head: leave `obu`
            // entirely to the packets that follow.
            open.num_obu_elements -= 1;
            open.committed_bytes -= applied_extension_cost;
        } else {
            let head_prefix = if needs_explicit_size { leb128::encoded_len(first_len as u64) } else { 0 };
            open.last_obu_size = first_len;
            open.committed_bytes += first_len + head_prefix;
        }
        sealed.push(std::mem::replace(&mut open, OpenPacket::starting_at(obu_index)).seal());

        let mut offset = first_len;
        while offset + max_payload_size < obu.size {
            let mut middle = OpenPacket::starting_at(obu_index);
            middle.first_obu_offset = offset;
            middle.num_obu_elements = 1;
            middle.last_obu_size = max_payload_size;
            middle.committed_bytes = max_payload_size;
            sealed.push(middle.seal());
            offset += max_payload_size;
        }

        let mut tail_len = obu.size - offset;
        if is_last_obu && tail_len > max_payload_size {
            // The very last OBU of the access unit left a tail bigger
            // than one packet can hold; split it in two so the final
            // packet isn't left oversized relative to its predecessor.
            let mut head_half = tail_len / 2;
            if head_half >= tail_len {
                head_half = tail_len - 1;
            }
            tail_len -= head_half;
            let mut penultimate = OpenPacket::starting_at(obu_index);
            penultimate.first_obu_offset = offset;
            penultimate.num_obu_elements = 1;
            penultimate.last_obu_size = head_half;
            penultimate.committed_bytes = head_half;
            sealed.push(penultimate.seal());
            offset += head_half;
        }

        // The final fragment stays open rather than sealed: like any
        // other just-placed element, a following small OBU may still
        // have room to join it.
        open = OpenPacket::starting_at(obu_index);
        open.first_obu_offset = offset;
        open.num_obu_elements = 1;
        open.last_obu_size = tail_len;
        open.committed_bytes = tail_len;
        free_bytes = max_payload_size - tail_len;
    }

    if !open.is_empty() {
        sealed.push(open.seal());
    }

    sealed
}

/// Largest OBU fragment size whose own LEB128-encoded length still fits
/// alongside it within `remaining_bytes`.
fn max_fragment_size(remaining_bytes: usize) -> usize {
    if remaining_bytes <= 1 {
        return 0;
    }
    let mut i = 1usize;
    loop {
        if remaining_bytes < (1usize << (7 * i)) + i {
            return remaining_bytes - i;
        }
        i += 1;
    }
}

/// Computes the metrics record for a finished plan.
pub fn metrics_for(obus: &[Obu], packets: &[PlannedPacket], header_overhead: usize) -> AggregationMetrics {
    let mut m = AggregationMetrics {
        total_obus: obus.len(),
        packets: packets.len(),
        ..Default::default()
    };
    for p in packets {
        if p.num_obu_elements > 1 {
            m.aggregated_packets += 1;
        } else if p.starts_with_fragment() || p.ends_with_fragment(obus) {
            m.fragmented_packets += 1;
        } else {
            m.single_obu_packets += 1;
        }
        m.total_payload_bytes += p.packet_size;
        m.total_packet_bytes += p.packet_size + header_overhead;
    }
    m
}

#[cfg(test)]
#[path = "aggregation_test.rs"]
mod aggregation_test;
