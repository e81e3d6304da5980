//! FLAP framing.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::codec::{Endian, PrefixWidth, Reader, Writer};
use super::tlv::{TlvFraming, TlvList};
use crate::error::WireError;

pub const FLAP_START_MARKER: u8 = 0x2A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Signon = 1,
    Data = 2,
    Error = 3,
    Signoff = 4,
    KeepAlive = 5,
}

impl FrameType {
    fn from_u8(v: u8) -> Result<FrameType, WireError> {
        Ok(match v {
            1 => FrameType::Signon,
            2 => FrameType::Data,
            3 => FrameType::Error,
            4 => FrameType::Signoff,
            5 => FrameType::KeepAlive,
            other => return Err(WireError::BadStartMarker(other)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct FlapFrame {
    pub frame_type: FrameType,
    pub sequence: u16,
    pub payload: Bytes,
}

impl FlapFrame {
    /// Reads one FLAP frame header + payload from `r`. Does not handle the
    /// "disconnect variant" (no length suffix) -- that shape is only ever
    /// sent, never received.
    pub async fn read(r: &mut (impl AsyncRead + Unpin)) -> Result<FlapFrame, WireError> {
        let mut header = [0u8; 6];
        r.read_exact(&mut header)
            .await
            .map_err(|_| WireError::Truncated { need: 6, have: 0 })?;
        if header[0] != FLAP_START_MARKER {
            return Err(WireError::BadStartMarker(header[0]));
        }
        let frame_type = FrameType::from_u8(header[1])?;
        let sequence = u16::from_be_bytes([header[2], header[3]]);
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut payload = vec![0u8; len];
        r.read_exact(&mut payload)
            .await
            .map_err(|_| WireError::Truncated { need: len, have: 0 })?;
        Ok(FlapFrame {
            frame_type,
            sequence,
            payload: Bytes::from(payload),
        })
    }

    /// Encodes the standard frame shape: marker, type, sequence, u16
    /// length prefix, payload.
    pub fn encode(&self) -> Bytes {
        let mut w = Writer::new(Endian::Big);
        w.write_u8(FLAP_START_MARKER);
        w.write_u8(self.frame_type as u8);
        w.write_u16(self.sequence);
        // write_len_prefixed_bytes always emits the length suffix, which
        // is what every frame type except the legacy disconnect variant
        // wants.
        w.write_len_prefixed_bytes(PrefixWidth::U16, &self.payload)
            .expect("payload under u16::MAX");
        w.into_bytes()
    }

    /// Encodes the legacy "old signoff" variant: exactly 6 bytes, no
    /// length suffix and no payload.
    pub fn encode_disconnect(sequence: u16) -> Bytes {
        let mut w = Writer::new(Endian::Big);
        w.write_u8(FLAP_START_MARKER);
        w.write_u8(FrameType::Signoff as u8);
        w.write_u16(sequence);
        w.into_bytes()
    }
}

struct WriterState<W> {
    writer: W,
    next_sequence: u32,
}

/// Owns a monotonically increasing FLAP sequence number and a
/// reader/writer pair. The writer and the sequence counter share a
/// single mutex, and the counter only advances once the write it was
/// assigned to has actually gone out: a failed write must not burn a
/// sequence number, and two frames racing for the lock must land on
/// the wire in the same order as the sequence values they carry. Reads
/// are unsynchronized since only one reader is expected per connection.
pub struct FlapClient<R, W> {
    reader: Mutex<R>,
    writer: Mutex<WriterState<W>>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> FlapClient<R, W> {
    pub fn new(reader: R, writer: W) -> FlapClient<R, W> {
        FlapClient {
            reader: Mutex::new(reader),
            writer: Mutex::new(WriterState { writer, next_sequence: 0 }),
        }
    }

    async fn write_frame(&self, frame_type: FrameType, payload: Bytes) -> Result<(), WireError> {
        let mut state = self.writer.lock().await;
        let sequence = (state.next_sequence & 0xffff) as u16;
        let frame = FlapFrame {
            frame_type,
            sequence,
            payload,
        };
        let bytes = frame.encode();
        state
            .writer
            .write_all(&bytes)
            .await
            .map_err(|_| WireError::Truncated { need: bytes.len(), have: 0 })?;
        state.next_sequence = state.next_sequence.wrapping_add(1);
        Ok(())
    }

    pub async fn send_signon(&self, payload: Bytes) -> Result<(), WireError> {
        self.write_frame(FrameType::Signon, payload).await
    }

    pub async fn receive_signon(&self) -> Result<FlapFrame, WireError> {
        let mut reader = self.reader.lock().await;
        let frame = FlapFrame::read(&mut *reader).await?;
        if frame.frame_type != FrameType::Signon {
            return Err(WireError::BadStartMarker(frame.frame_type as u8));
        }
        Ok(frame)
    }

    pub async fn send_data(&self, payload: Bytes) -> Result<(), WireError> {
        self.write_frame(FrameType::Data, payload).await
    }

    pub async fn send_keepalive(&self) -> Result<(), WireError> {
        self.write_frame(FrameType::KeepAlive, Bytes::new()).await
    }

    pub async fn receive_any(&self) -> Result<FlapFrame, WireError> {
        let mut reader = self.reader.lock().await;
        FlapFrame::read(&mut *reader).await
    }

    /// Legacy clients that predate multi-connection support expect a bare
    /// 6-byte frame with no payload-length suffix so they show
    /// "connection lost".
    pub async fn send_old_signoff(&self) -> Result<(), WireError> {
        let mut state = self.writer.lock().await;
        let sequence = (state.next_sequence & 0xffff) as u16;
        let bytes = FlapFrame::encode_disconnect(sequence);
        state
            .writer
            .write_all(&bytes)
            .await
            .map_err(|_| WireError::Truncated { need: bytes.len(), have: 0 })?;
        state.next_sequence = state.next_sequence.wrapping_add(1);
        Ok(())
    }

    /// Later clients expect a full signoff frame carrying a TLV block (and
    /// thus the regular payload-length suffix) so they can display a
    /// disconnection reason.
    pub async fn send_new_signoff(&self, reason: TlvList) -> Result<(), WireError> {
        let mut w = Writer::new(Endian::Big);
        reason.encode(&mut w, TlvFraming::Rest)?;
        self.write_frame(FrameType::Signoff, w.into_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::tlv::Tlv;

    #[tokio::test]
    async fn flap_sequence_increases_strictly_per_direction() {
        let (client_side, server_side) = tokio::io::duplex(4096);
        let (server_read, mut server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);
        let client = FlapClient::new(client_read, client_write);

        client.send_data(Bytes::from_static(b"a")).await.unwrap();
        client.send_data(Bytes::from_static(b"b")).await.unwrap();
        client.send_data(Bytes::from_static(b"c")).await.unwrap();

        let mut server_read = server_read;
        let f1 = FlapFrame::read(&mut server_read).await.unwrap();
        let f2 = FlapFrame::read(&mut server_read).await.unwrap();
        let f3 = FlapFrame::read(&mut server_read).await.unwrap();
        assert!(f1.sequence < f2.sequence);
        assert!(f2.sequence < f3.sequence);
        server_write.shutdown().await.ok();
    }

    #[tokio::test]
    async fn concurrent_sends_write_frames_in_sequence_order() {
        let (client_side, server_side) = tokio::io::duplex(65536);
        let (server_read, _server_write) = tokio::io::split(server_side);
        let (client_read, client_write) = tokio::io::split(client_side);
        let client = std::sync::Arc::new(FlapClient::new(client_read, client_write));

        let mut tasks = Vec::new();
        for i in 0..50u8 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                client.send_data(Bytes::from(vec![i])).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut server_read = server_read;
        let mut sequences = Vec::new();
        for _ in 0..50 {
            sequences.push(FlapFrame::read(&mut server_read).await.unwrap().sequence);
        }
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        assert_eq!(sequences, sorted, "frames must land on the wire in sequence order");
        assert_eq!(sorted, (0u16..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn old_signoff_is_exactly_six_bytes_no_length_suffix() {
        let (a, b) = tokio::io::duplex(64);
        let (_ar, aw) = tokio::io::split(a);
        let (mut br, _bw) = tokio::io::split(b);
        let client = FlapClient::new(tokio::io::empty(), aw);
        client.send_old_signoff().await.unwrap();
        let mut buf = [0u8; 6];
        br.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], FLAP_START_MARKER);
        assert_eq!(buf[1], FrameType::Signoff as u8);
    }

    #[tokio::test]
    async fn new_signoff_carries_a_tlv_block_with_length_prefix() {
        let (a, b) = tokio::io::duplex(256);
        let (_ar, aw) = tokio::io::split(a);
        let (mut br, _bw) = tokio::io::split(b);
        let client = FlapClient::new(tokio::io::empty(), aw);
        let mut reason = TlvList::new();
        reason.append(Tlv::from_u16(0x0009, 0x0001));
        client.send_new_signoff(reason).await.unwrap();
        let frame = FlapFrame::read(&mut br).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Signoff);
        assert!(!frame.payload.is_empty());
    }
}
