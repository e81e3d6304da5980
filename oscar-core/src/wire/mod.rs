//! The binary wire codec: FLAP framing, SNAC headers, and TLVs.

pub mod codec;
pub mod flap;
pub mod icq;
pub mod snac;
pub mod tlv;

pub use codec::{Endian, PrefixWidth, Reader, Writer};
pub use flap::{FlapClient, FlapFrame, FrameType, FLAP_START_MARKER};
pub use snac::{SnacFrame, SnacHeader};
pub use tlv::{Tlv, TlvFraming, TlvList};
