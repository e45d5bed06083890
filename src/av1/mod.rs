//! AV1-specific codecs: OBU/LEB128 parsing, the aggregation header and
//! scalability-structure wire formats, the W-bit fragmentation state
//! machine, and the payloader/depayloader built on top of them.

pub mod aggregation;
pub mod aggregation_header;
pub mod depayloader;
pub mod layer_id;
pub mod leb128;
pub mod obu;
pub mod payloader;
pub mod scalability;
pub mod temporal_unit;
pub mod wstate;
