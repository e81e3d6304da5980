//! TLV (tag-length-value) elements and lists.

use bytes::Bytes;

use super::codec::{Endian, PrefixWidth, Reader, Writer};
use crate::error::WireError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u16,
    pub value: Bytes,
}

impl Tlv {
    pub fn new(tag: u16, value: impl Into<Bytes>) -> Tlv {
        Tlv {
            tag,
            value: value.into(),
        }
    }

    pub fn from_u8(tag: u16, v: u8) -> Tlv {
        Tlv::new(tag, vec![v])
    }

    pub fn from_u16(tag: u16, v: u16) -> Tlv {
        let mut w = Writer::new(Endian::Big);
        w.write_u16(v);
        Tlv::new(tag, w.into_bytes())
    }

    pub fn from_u32(tag: u16, v: u32) -> Tlv {
        let mut w = Writer::new(Endian::Big);
        w.write_u32(v);
        Tlv::new(tag, w.into_bytes())
    }

    pub fn from_str(tag: u16, s: &str) -> Tlv {
        Tlv::new(tag, s.as_bytes().to_vec())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Tlv, WireError> {
        let tag = r.read_u16()?;
        let value = r.read_len_prefixed_bytes(PrefixWidth::U16)?;
        Ok(Tlv::new(tag, value.to_vec()))
    }

    pub fn encode(&self, w: &mut Writer) -> Result<(), WireError> {
        w.write_u16(self.tag);
        w.write_len_prefixed_bytes(PrefixWidth::U16, &self.value)
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.value.first().copied()
    }

    pub fn as_u16(&self) -> Option<u16> {
        if self.value.len() < 2 {
            return None;
        }
        let mut r = Reader::new(&self.value, Endian::Big);
        r.read_u16().ok()
    }

    pub fn as_u32(&self) -> Option<u32> {
        if self.value.len() < 4 {
            return None;
        }
        let mut r = Reader::new(&self.value, Endian::Big);
        r.read_u32().ok()
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }
}

/// How a `TlvList` is framed within its enclosing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvFraming {
    /// `len_prefix` block: a u16 byte-length prefix precedes the list.
    LengthPrefixed,
    /// `count_prefix` block: a u16 element-count prefix precedes the list.
    CountPrefixed,
    /// Trailing "rest" block: consumes to the end of the enclosing
    /// payload, no prefix at all.
    Rest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList(pub Vec<Tlv>);

impl TlvList {
    pub fn new() -> TlvList {
        TlvList(Vec::new())
    }

    pub fn append(&mut self, tlv: Tlv) {
        self.0.push(tlv);
    }

    pub fn append_list(&mut self, mut other: TlvList) {
        self.0.append(&mut other.0);
    }

    /// Updates every element with a matching tag to `value`, leaving
    /// element order and non-matching elements untouched.
    pub fn replace_by_tag(&mut self, tag: u16, value: impl Into<Bytes>) {
        let value = value.into();
        for tlv in self.0.iter_mut().filter(|t| t.tag == tag) {
            tlv.value = value.clone();
        }
    }

    pub fn get(&self, tag: u16) -> Option<&Tlv> {
        self.0.iter().find(|t| t.tag == tag)
    }

    pub fn get_all(&self, tag: u16) -> impl Iterator<Item = &Tlv> {
        self.0.iter().filter(move |t| t.tag == tag)
    }

    pub fn get_u8(&self, tag: u16) -> Option<u8> {
        self.get(tag).and_then(Tlv::as_u8)
    }

    pub fn get_u16(&self, tag: u16) -> Option<u16> {
        self.get(tag).and_then(Tlv::as_u16)
    }

    pub fn get_u32(&self, tag: u16) -> Option<u32> {
        self.get(tag).and_then(Tlv::as_u32)
    }

    pub fn get_str(&self, tag: u16) -> Option<&str> {
        self.get(tag).and_then(Tlv::as_str)
    }

    pub fn get_bytes(&self, tag: u16) -> Option<&[u8]> {
        self.get(tag).map(Tlv::as_bytes)
    }

    pub fn decode(r: &mut Reader<'_>, framing: TlvFraming) -> Result<TlvList, WireError> {
        match framing {
            TlvFraming::LengthPrefixed => {
                let body = r.read_len_prefixed_bytes(PrefixWidth::U16)?;
                let mut inner = Reader::new(body, r.endian());
                let mut list = TlvList::new();
                while inner.remaining() > 0 {
                    list.append(Tlv::decode(&mut inner)?);
                }
                Ok(list)
            }
            TlvFraming::CountPrefixed => {
                let items = r.read_count_prefixed(PrefixWidth::U16, Tlv::decode)?;
                Ok(TlvList(items))
            }
            TlvFraming::Rest => {
                let mut list = TlvList::new();
                while r.remaining() > 0 {
                    list.append(Tlv::decode(r)?);
                }
                Ok(list)
            }
        }
    }

    pub fn encode(&self, w: &mut Writer, framing: TlvFraming) -> Result<(), WireError> {
        match framing {
            TlvFraming::LengthPrefixed => w.write_len_prefixed_with(PrefixWidth::U16, |body| {
                for tlv in &self.0 {
                    tlv.encode(body)?;
                }
                Ok(())
            }),
            TlvFraming::CountPrefixed => {
                w.write_count_prefixed(PrefixWidth::U16, &self.0, |w, tlv| tlv.encode(w))
            }
            TlvFraming::Rest => {
                for tlv in &self.0 {
                    tlv.encode(w)?;
                }
                Ok(())
            }
        }
    }
}

impl FromIterator<Tlv> for TlvList {
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        TlvList(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_lookup_distinguishes_not_found_from_zero_value() {
        let mut list = TlvList::new();
        list.append(Tlv::from_u8(0x01, 0));
        assert_eq!(list.get_u8(0x01), Some(0));
        assert_eq!(list.get_u8(0x02), None);
    }

    #[test]
    fn replace_by_tag_updates_every_matching_element() {
        let mut list = TlvList::new();
        list.append(Tlv::from_u8(0x01, 1));
        list.append(Tlv::from_u8(0x02, 2));
        list.append(Tlv::from_u8(0x01, 3));
        list.replace_by_tag(0x01, vec![9u8]);
        assert_eq!(list.get_all(0x01).count(), 2);
        assert!(list.get_all(0x01).all(|t| t.as_u8() == Some(9)));
        assert_eq!(list.get_u8(0x02), Some(2));
    }

    #[test]
    fn length_prefixed_round_trip() {
        let mut list = TlvList::new();
        list.append(Tlv::from_str(0x01, "hello"));
        list.append(Tlv::from_u32(0x02, 42));
        let mut w = Writer::new(Endian::Big);
        list.encode(&mut w, TlvFraming::LengthPrefixed).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes, Endian::Big);
        let decoded = TlvList::decode(&mut r, TlvFraming::LengthPrefixed).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn count_prefixed_round_trip() {
        let mut list = TlvList::new();
        list.append(Tlv::from_u16(0x01, 7));
        list.append(Tlv::from_u16(0x01, 8));
        let mut w = Writer::new(Endian::Big);
        list.encode(&mut w, TlvFraming::CountPrefixed).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes, Endian::Big);
        let decoded = TlvList::decode(&mut r, TlvFraming::CountPrefixed).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn rest_framing_consumes_to_end() {
        let mut list = TlvList::new();
        list.append(Tlv::from_u8(0x01, 1));
        list.append(Tlv::from_u8(0x02, 2));
        let mut w = Writer::new(Endian::Big);
        list.encode(&mut w, TlvFraming::Rest).unwrap();
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes, Endian::Big);
        let decoded = TlvList::decode(&mut r, TlvFraming::Rest).unwrap();
        assert_eq!(decoded, list);
        assert_eq!(r.remaining(), 0);
    }
}
