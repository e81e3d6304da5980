//! SNAC frame header. The typed body of a SNAC is the business
//! of per-food-group handlers, which are out of scope; this module
//! only owns the header every food group shares and the opaque body the
//! connection driver forwards to the out-of-scope dispatcher.

use bytes::Bytes;

use super::codec::{Endian, Reader, Writer};
use crate::error::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnacHeader {
    pub food_group: u16,
    pub sub_group: u16,
    pub flags: u16,
    pub request_id: u32,
}

impl SnacHeader {
    pub fn decode(r: &mut Reader<'_>) -> Result<SnacHeader, WireError> {
        Ok(SnacHeader {
            food_group: r.read_u16()?,
            sub_group: r.read_u16()?,
            flags: r.read_u16()?,
            request_id: r.read_u32()?,
        })
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), WireError> {
        w.write_u16(self.food_group);
        w.write_u16(self.sub_group);
        w.write_u16(self.flags);
        w.write_u32(self.request_id);
        Ok(())
    }
}

/// A whole SNAC frame: header plus an opaque body. The body stays an
/// untyped byte slice because decoding it into a concrete food-group
/// payload is outside this crate's scope -- it is the dispatcher's job.
#[derive(Debug, Clone)]
pub struct SnacFrame {
    pub header: SnacHeader,
    pub body: Bytes,
}

impl SnacFrame {
    pub fn decode(payload: &[u8]) -> Result<SnacFrame, WireError> {
        let mut r = Reader::new(payload, Endian::Big);
        let header = SnacHeader::decode(&mut r)?;
        Ok(SnacFrame {
            header,
            body: Bytes::copy_from_slice(r.rest()),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new(Endian::Big);
        self.header.encode(&mut w).expect("header encode is infallible");
        w.write_bytes(&self.body);
        w.into_bytes()
    }

    /// The standard error-reply shape: `(foodGroup, 0x0001)` carrying a
    /// code and a TLV rest-block.
    pub fn error_reply(food_group: u16, request_id: u32, code: u16, tlvs: &crate::wire::tlv::TlvList) -> SnacFrame {
        let mut w = Writer::new(Endian::Big);
        w.write_u16(code);
        tlvs.encode(&mut w, crate::wire::tlv::TlvFraming::Rest)
            .expect("tlv encode is infallible for in-memory buffers");
        SnacFrame {
            header: SnacHeader {
                food_group,
                sub_group: 0x0001,
                flags: 0,
                request_id,
            },
            body: w.into_bytes(),
        }
    }
}
