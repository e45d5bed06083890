use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Context attached to an OBU-size parse failure: what was expected vs.
/// what was actually available, and the relevant size ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObuErrorContext {
    pub expected: usize,
    pub actual: usize,
    pub size: usize,
    pub max: usize,
}

impl std::fmt::Display for ObuErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "expected {} bytes, found {} (size={}, max={})",
            self.expected, self.actual, self.size, self.max
        )
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // --- C1 LEB128 -----------------------------------------------------
    #[error("leb128 value truncated after {0} bytes")]
    Leb128Truncated(usize),
    #[error("leb128 value spans more than 8 bytes")]
    Leb128TooManyBytes,

    // --- C2 OBU parser/validator ----------------------------------------
    #[error("incomplete obu: {0}")]
    IncompleteObu(ObuErrorContext),
    #[error("zero-length obu")]
    ZeroLengthObu,
    #[error("obu too large: {0}")]
    ObuTooLarge(ObuErrorContext),
    #[error("forbidden bit set in obu header")]
    ForbiddenBitSet,
    #[error("malformed obu header")]
    MalformedHeader,
    #[error("obu extension reserved bits set")]
    ObuExtensionReservedBitsSet,
    #[error("missing obu extension byte")]
    MissingObuExtensionByte,
    #[error("final obu truncated at access-unit boundary")]
    PartialObuAtBoundary,

    // --- C3 aggregation-header -------------------------------------------
    #[error("reserved bit set in aggregation header")]
    ReservedBitSet,
    #[error("reserved bits set in ids byte")]
    ReservedIdsBitsSet,
    #[error("m flag set but no ids byte present")]
    MissingIdsByte,
    #[error("invalid w value: {0}")]
    InvalidWValue(u8),
    #[error("temporal_id {0} is not representable in 3 bits")]
    InvalidTemporalId(u8),
    #[error("spatial_id {0} is not representable in 2 bits")]
    InvalidSpatialId(u8),
    #[error("z flag set but scalability structure did not parse")]
    ZSetWithoutSs,

    // --- C4 scalability structure -----------------------------------------
    #[error("invalid n_s: {0}")]
    InvalidNs(u8),
    #[error("spatial layer count does not match n_s")]
    SpatialLayerCountMismatch,
    #[error("invalid spatial layer (width/height must be > 0)")]
    InvalidSpatialLayer,
    #[error("invalid picture descriptor")]
    InvalidPictureDesc,
    #[error("scalability structure encodes to more than 255 bytes")]
    SsTooLarge,
    #[error("incomplete spatial layer list")]
    IncompleteSpatialLayers,
    #[error("incomplete picture descriptor list")]
    IncompletePictureDesc,

    // --- C6 W-bit state machine -------------------------------------------
    #[error("invalid w transition")]
    InvalidWTransition,
    #[error("fragment_not_started: w=2/3 received before a fragment began")]
    FragmentNotStarted,
    #[error("incomplete_fragment: fragment abandoned before completion")]
    IncompleteFragment,

    // --- C7 sequence number -----------------------------------------------
    #[error("duplicate sequence number")]
    DuplicateSequenceNumber,
    #[error("out-of-order sequence number")]
    OutOfOrderSequenceNumber,

    // --- C5 layer-id capability --------------------------------------------
    #[error("temporal_id {temporal_id} exceeds cached capability {max}")]
    TemporalIdExceedsCapability { temporal_id: u8, max: u8 },
    #[error("spatial_id {spatial_id} exceeds cached capability {max}")]
    SpatialIdExceedsCapability { spatial_id: u8, max: u8 },

    // --- generic short-buffer guard, used by several leaf parsers ---------
    #[error("buffer too short")]
    ErrShortBuffer,

    // --- C13 SDP/fmtp -------------------------------------------------------
    #[error("profile {0} is not in 0..=2")]
    InvalidProfile(u8),
    #[error("level-idx {0} is not in 0..=31")]
    InvalidLevelIdx(u8),
    #[error("level-idx string does not match a known level")]
    InvalidLevelIdxString,
    #[error("tier=1 is illegal with profile=0")]
    TierIllegalWithProfileZero,
    #[error("tier {0} is not 0 or 1")]
    InvalidTier(u8),
    #[error("cm {0} is not 0 or 1")]
    InvalidCm(u8),
    #[error("ss-data is not valid hex")]
    InvalidSsDataHex,
}
