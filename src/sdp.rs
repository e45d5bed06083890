//! `a=rtpmap`/`a=fmtp` line codec for negotiating this payload format over SDP.
//!
//! The tokenizer (`split(';')` then `splitn(2, '=')`, lowercased keys,
//! unknown keys ignored) is grounded on
//! `rtp_transceiver::fmtp::parse_fmtp`. That function returns an untyped
//! `HashMap<String, String>` because its only consumer is
//! `fmtp_consist`'s generic key/value comparison; this format needs typed,
//! range-validated fields with a tagged error per key, so parsing here
//! builds an [`Av1Fmtp`] directly instead of handing back a map.

use std::fmt::Write as _;

use bytes::Bytes;

use crate::config::CLOCK_RATE;
use crate::error::{Error, Result};

/// AV1 level strings in index order; level-idx 0 is "2.0", 23 is "7.3".
/// Indices 24..=31 are reserved for future levels and carry no string form.
const LEVEL_IDX_STRINGS: [&str; 24] = [
    "2.0", "2.1", "2.2", "2.3", "3.0", "3.1", "3.2", "3.3", "4.0", "4.1", "4.2", "4.3", "5.0", "5.1", "5.2", "5.3",
    "6.0", "6.1", "6.2", "6.3", "7.0", "7.1", "7.2", "7.3",
];

pub fn level_idx_to_string(idx: u8) -> Option<&'static str> {
    LEVEL_IDX_STRINGS.get(idx as usize).copied()
}

pub fn level_idx_from_string(s: &str) -> Option<u8> {
    LEVEL_IDX_STRINGS.iter().position(|&known| known == s).map(|i| i as u8)
}

/// A parsed `a=fmtp` parameter set for an AV1 payload type. Every field is
/// optional: fmtp lines may set any subset, and an absent field means
/// "unspecified", not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Av1Fmtp {
    pub profile: Option<u8>,
    pub level_idx: Option<u8>,
    pub tier: Option<u8>,
    pub cm: Option<u8>,
    pub tid: Option<u8>,
    pub lid: Option<u8>,
    pub ss_data: Option<Bytes>,
}

impl Av1Fmtp {
    /// Parses the value portion of an `a=fmtp:<pt> ...` line (the part
    /// after the payload type). Unknown keys are ignored rather than
    /// rejected, since future fmtp parameters must not break existing
    /// negotiation.
    pub fn parse(line: &str) -> Result<Self> {
        let mut out = Self::default();
        for param in line.split(';') {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let mut parts = param.splitn(2, '=');
            let key = parts.next().unwrap_or("").trim().to_lowercase();
            let value = parts.next().unwrap_or("").trim();
            match key.as_str() {
                "profile" => out.profile = Some(parse_bounded(value, 2, Error::InvalidProfile)?),
                "level-idx" => out.level_idx = Some(parse_level_idx(value)?),
                "tier" => out.tier = Some(parse_bounded(value, 1, Error::InvalidTier)?),
                "cm" => out.cm = Some(parse_bounded(value, 1, Error::InvalidCm)?),
                "tid" | "temporal_id" => out.tid = Some(parse_bounded(value, 7, Error::InvalidTemporalId)?),
                "lid" | "spatial_id" => out.lid = Some(parse_bounded(value, 3, Error::InvalidSpatialId)?),
                "ss-data" => out.ss_data = Some(decode_hex(value)?),
                _ => {}
            }
        }
        if out.tier == Some(1) && out.profile.unwrap_or(0) == 0 {
            return Err(Error::TierIllegalWithProfileZero);
        }
        Ok(out)
    }

    /// Renders the `k=v;k=v` body of an `a=fmtp` line in the fixed key
    /// order profile, level-idx, tier, cm, tid, lid, ss-data. Returns
    /// `None` when no field is set, since a bare `a=fmtp:<pt>` line with
    /// no parameters is meaningless.
    pub fn generate(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(v) = self.profile {
            parts.push(format!("profile={}", v));
        }
        if let Some(v) = self.level_idx {
            match level_idx_to_string(v) {
                Some(s) => parts.push(format!("level-idx={}", s)),
                None => parts.push(format!("level-idx={}", v)),
            }
        }
        if let Some(v) = self.tier {
            parts.push(format!("tier={}", v));
        }
        if let Some(v) = self.cm {
            parts.push(format!("cm={}", v));
        }
        if let Some(v) = self.tid {
            parts.push(format!("tid={}", v));
        }
        if let Some(v) = self.lid {
            parts.push(format!("lid={}", v));
        }
        if let Some(ss) = &self.ss_data {
            parts.push(format!("ss-data={}", encode_hex(ss)));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(";"))
        }
    }
}

/// Builds the `a=rtpmap:<pt> AV1/90000` line.
pub fn rtpmap_line(payload_type: u8) -> String {
    format!("a=rtpmap:{} AV1/{}", payload_type, CLOCK_RATE)
}

/// Builds the `a=fmtp:<pt> ...` line, or `None` when `fmtp` has nothing set.
pub fn fmtp_line(payload_type: u8, fmtp: &Av1Fmtp) -> Option<String> {
    fmtp.generate().map(|body| format!("a=fmtp:{} {}", payload_type, body))
}

fn parse_bounded(value: &str, max: u8, err: fn(u8) -> Error) -> Result<u8> {
    let v: u8 = value.parse().map_err(|_| err(0))?;
    if v > max {
        return Err(err(v));
    }
    Ok(v)
}

fn parse_level_idx(value: &str) -> Result<u8> {
    if let Some(idx) = level_idx_from_string(value) {
        return Ok(idx);
    }
    let v: u8 = value.parse().map_err(|_| Error::InvalidLevelIdxString)?;
    if v > 31 {
        return Err(Error::InvalidLevelIdx(v));
    }
    Ok(v)
}

fn decode_hex(s: &str) -> Result<Bytes> {
    if s.len() % 2 != 0 {
        return Err(Error::InvalidSsDataHex);
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks(2) {
        let hi = hex_nibble(chunk[0]).ok_or(Error::InvalidSsDataHex)?;
        let lo = hex_nibble(chunk[1]).ok_or(Error::InvalidSsDataHex)?;
        out.push((hi << 4) | lo);
    }
    Ok(Bytes::from(out))
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn encode_hex(bytes: &Bytes) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes.iter() {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

#[cfg(test)]
#[path = "sdp_test.rs"]
mod sdp_test;
