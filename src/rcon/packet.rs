use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Client -> server: authentication request
pub const SERVERDATA_AUTH: i32 = 0x03;
/// Client -> server: command execution request
pub const SERVERDATA_EXECCOMMAND: i32 = 0x02;
/// Server -> client: authentication result (shares the value of EXECCOMMAND)
pub const SERVERDATA_AUTH_RESPONSE: i32 = 0x02;
/// Server -> client: command output
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0x00;

/// Request id used for the authentication handshake
pub const ID_AUTH: i32 = 0x999;

/// Default upper bound for a single encoded packet in bytes
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4096;

/// Bytes taken by the size field
const SIZE_FIELD_LEN: usize = 4;
/// id + type + two terminating NUL bytes
const MIN_SIZE_FIELD: usize = 10;
/// Offset of the body inside an encoded packet
const BODY_OFFSET: usize = 12;

/// Errors produced while encoding or decoding packets
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Packet size too big: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Packet truncated: {0} bytes")]
    Truncated(usize),

    #[error("Invalid packet size field: {0}")]
    InvalidSize(i32),

    #[error("Socket read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded RCON packet
///
/// `size` is the value of the leading size field, i.e. the byte count that
/// follows it (`body + 10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub size: i32,
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

/// Encode a packet: little-endian `size`, `id`, `type`, body bytes, two NULs.
///
/// Fails with [`PacketError::TooLarge`] when the encoded length exceeds
/// `max_packet_size`.
pub fn encode(
    kind: i32,
    id: i32,
    body: &str,
    max_packet_size: usize,
) -> Result<Vec<u8>, PacketError> {
    let total = body.len() + SIZE_FIELD_LEN + MIN_SIZE_FIELD;
    if total > max_packet_size {
        return Err(PacketError::TooLarge {
            size: total,
            max: max_packet_size,
        });
    }

    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&((total - SIZE_FIELD_LEN) as i32).to_le_bytes());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf.extend_from_slice(&[0, 0]);
    Ok(buf)
}

/// Decode one complete packet.
///
/// The body is everything between offset 12 and the two trailing NULs.
pub fn decode(buf: &[u8]) -> Result<Packet, PacketError> {
    if buf.len() < SIZE_FIELD_LEN + MIN_SIZE_FIELD {
        return Err(PacketError::Truncated(buf.len()));
    }

    let size = read_i32(buf, 0);
    let id = read_i32(buf, 4);
    let kind = read_i32(buf, 8);
    let body = String::from_utf8_lossy(&buf[BODY_OFFSET..buf.len() - 2]).into_owned();

    Ok(Packet {
        size,
        id,
        kind,
        body,
    })
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

/// Accumulates raw socket reads and splits them into packets by the size prefix.
///
/// A single read may carry several packets, or only part of one.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_packet_size: usize,
}

impl FrameBuffer {
    pub fn new(max_packet_size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_packet_size),
            max_packet_size,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete packet, if the buffer holds one.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, PacketError> {
        if self.buf.len() < SIZE_FIELD_LEN {
            return Ok(None);
        }

        let size = read_i32(&self.buf, 0);
        if size < MIN_SIZE_FIELD as i32 {
            return Err(PacketError::InvalidSize(size));
        }

        let total = size as usize + SIZE_FIELD_LEN;
        if total > self.max_packet_size {
            return Err(PacketError::TooLarge {
                size: total,
                max: self.max_packet_size,
            });
        }
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..total).collect();
        decode(&frame).map(Some)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Read from `reader` until a full packet is available.
///
/// Returns `Ok(None)` when the peer closed the stream.
pub async fn read_packet<R>(
    reader: &mut R,
    frames: &mut FrameBuffer,
) -> Result<Option<Packet>, PacketError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(packet) = frames.next_packet()? {
            return Ok(Some(packet));
        }

        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        frames.extend(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(SERVERDATA_EXECCOMMAND, 7, "status", 4096).unwrap();

        assert_eq!(bytes.len(), 6 + 14);
        assert_eq!(&bytes[0..4], &16i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..18], b"status");
        assert_eq!(&bytes[18..], &[0, 0]);
    }

    #[test]
    fn test_encode_empty_body() {
        let bytes = encode(SERVERDATA_RESPONSE_VALUE, 1, "", 4096).unwrap();
        assert_eq!(bytes.len(), 14);

        let packet = decode(&bytes).unwrap();
        assert_eq!(packet.size, 10);
        assert_eq!(packet.body, "");
    }

    #[test]
    fn test_encode_too_large() {
        let body = "x".repeat(100);
        let err = encode(SERVERDATA_EXECCOMMAND, 1, &body, 64).unwrap_err();
        assert!(matches!(err, PacketError::TooLarge { size: 114, max: 64 }));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(decode(&[1, 2, 3]), Err(PacketError::Truncated(3))));
    }

    #[test]
    fn test_frame_buffer_split_and_coalesced() {
        let mut data = encode(SERVERDATA_RESPONSE_VALUE, 5, "", 4096).unwrap();
        data.extend(encode(SERVERDATA_AUTH_RESPONSE, ID_AUTH, "", 4096).unwrap());

        let mut frames = FrameBuffer::new(4096);
        frames.extend(&data[..9]);
        assert!(frames.next_packet().unwrap().is_none());

        frames.extend(&data[9..]);
        let first = frames.next_packet().unwrap().unwrap();
        let second = frames.next_packet().unwrap().unwrap();
        assert_eq!(first.id, 5);
        assert_eq!(second.id, ID_AUTH);
        assert_eq!(second.kind, SERVERDATA_AUTH_RESPONSE);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_frame_buffer_rejects_bad_size() {
        let mut frames = FrameBuffer::new(4096);
        frames.extend(&3i32.to_le_bytes());
        assert!(matches!(
            frames.next_packet(),
            Err(PacketError::InvalidSize(3))
        ));
    }

    #[tokio::test]
    async fn test_read_packet_across_reads() {
        let bytes = encode(SERVERDATA_RESPONSE_VALUE, 42, "hostname: test", 4096).unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&bytes[..6])
            .read(&bytes[6..])
            .build();
        let mut frames = FrameBuffer::new(4096);

        let packet = read_packet(&mut reader, &mut frames).await.unwrap().unwrap();
        assert_eq!(packet.id, 42);
        assert_eq!(packet.body, "hostname: test");

        assert!(read_packet(&mut reader, &mut frames).await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            kind in 0i32..4,
            id in any::<i32>(),
            body in "[ -~]{0,200}",
        ) {
            let bytes = encode(kind, id, &body, DEFAULT_MAX_PACKET_SIZE).unwrap();
            let packet = decode(&bytes).unwrap();

            prop_assert_eq!(packet.size as usize, body.len() + 10);
            prop_assert_eq!(packet.id, id);
            prop_assert_eq!(packet.kind, kind);
            prop_assert_eq!(packet.body, body);
        }
    }
}
