//! ICQ message envelopes. Inside a SNAC body these marker types switch
//! subsequent decoding to little-endian, modeled as a property of the
//! reader/writer context ([`Endian::Little`]) rather than a runtime
//! type check.

use bytes::Bytes;

use super::codec::{Endian, PrefixWidth, Reader, Writer};
use crate::error::WireError;

/// `ICQMessageRequestEnvelope`: an outgoing ICQ message wrapped for
/// delivery through the legacy ICQ message food group. `message_type` and
/// `flags` are protocol constants opaque to this crate; `message` is the
/// little-endian, null-terminated string format ICQ payloads use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcqMessageRequestEnvelope {
    pub message_type: u16,
    pub flags: u16,
    pub message: String,
    pub trailing: Bytes,
}

impl IcqMessageRequestEnvelope {
    pub fn decode(outer_rest: &[u8]) -> Result<IcqMessageRequestEnvelope, WireError> {
        let mut r = Reader::new(outer_rest, Endian::Big);
        let mut r = r.with_endian(Endian::Little);
        let message_type = r.read_u16()?;
        let flags = r.read_u16()?;
        let message = r.read_len_prefixed_string(PrefixWidth::U16, true)?;
        let trailing = Bytes::copy_from_slice(r.rest());
        Ok(IcqMessageRequestEnvelope {
            message_type,
            flags,
            message,
            trailing,
        })
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut w = Writer::new(Endian::Little);
        w.write_u16(self.message_type);
        w.write_u16(self.flags);
        w.write_len_prefixed_string(PrefixWidth::U16, &self.message, true)?;
        w.write_bytes(&self.trailing);
        Ok(w.into_bytes())
    }
}

/// `ICQMessageReplyEnvelope`: the server->client counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcqMessageReplyEnvelope {
    pub message_type: u16,
    pub status: u16,
    pub message: String,
}

impl IcqMessageReplyEnvelope {
    pub fn decode(outer_rest: &[u8]) -> Result<IcqMessageReplyEnvelope, WireError> {
        let mut r = Reader::new(outer_rest, Endian::Big);
        let mut r = r.with_endian(Endian::Little);
        let message_type = r.read_u16()?;
        let status = r.read_u16()?;
        let message = r.read_len_prefixed_string(PrefixWidth::U16, true)?;
        Ok(IcqMessageReplyEnvelope {
            message_type,
            status,
            message,
        })
    }

    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut w = Writer::new(Endian::Little);
        w.write_u16(self.message_type);
        w.write_u16(self.status);
        w.write_len_prefixed_string(PrefixWidth::U16, &self.message, true)?;
        Ok(w.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips_little_endian() {
        let env = IcqMessageRequestEnvelope {
            message_type: 0x0001,
            flags: 0x0000,
            message: "hello".to_string(),
            trailing: Bytes::new(),
        };
        let encoded = env.encode().unwrap();
        // message_type is little-endian: 0x0001 -> 01 00
        assert_eq!(&encoded[0..2], &[0x01, 0x00]);
        let decoded = IcqMessageRequestEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn reply_envelope_round_trips() {
        let env = IcqMessageReplyEnvelope {
            message_type: 0x0002,
            status: 0x0000,
            message: "ok".to_string(),
        };
        let encoded = env.encode().unwrap();
        let decoded = IcqMessageReplyEnvelope::decode(&encoded).unwrap();
        assert_eq!(decoded, env);
    }
}
