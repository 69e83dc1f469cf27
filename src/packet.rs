use bytes::{BufMut, Bytes, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::proto::PacketHeaderProto;

/// Most data bytes a single packet may carry.
pub const OUTBOUND_PACKET_SIZE: usize = 65536;

/// Bytes covered by one checksum.
pub const OUTBOUND_CHUNK_SIZE: usize = 512;

/// Seqno reserved for heartbeat packets; never assigned to data packets.
pub const HEARTBEAT_SEQNO: i64 = -1;

/// One outbound packet: up to [`OUTBOUND_PACKET_SIZE`] bytes of block data
/// plus one big-endian CRC32 per [`OUTBOUND_CHUNK_SIZE`] chunk.
#[derive(Clone, Debug)]
pub struct Packet {
    pub seqno: i64,
    pub offset: i64,
    pub last: bool,
    pub checksums: Bytes,
    pub data: Bytes,
}

impl Packet {
    /// Builds a data packet, computing a CRC32 (IEEE) over every chunk of
    /// `data`. The final chunk may be shorter than a full chunk.
    pub fn new(seqno: i64, offset: i64, data: Bytes) -> Self {
        let mut checksums = BytesMut::with_capacity(data.len().div_ceil(OUTBOUND_CHUNK_SIZE) * 4);
        for chunk in data.chunks(OUTBOUND_CHUNK_SIZE) {
            checksums.put_u32(crc32fast::hash(chunk));
        }

        Packet {
            seqno,
            offset,
            last: false,
            checksums: checksums.freeze(),
            data,
        }
    }

    /// The terminal packet: no data, no checksums, just a marker that the
    /// block is finished.
    pub fn last(seqno: i64, offset: i64) -> Self {
        Packet {
            seqno,
            offset,
            last: true,
            checksums: Bytes::new(),
            data: Bytes::new(),
        }
    }

    /// A keepalive packet. Header-only, with the reserved heartbeat seqno.
    pub fn heartbeat() -> Self {
        Packet {
            seqno: HEARTBEAT_SEQNO,
            offset: 0,
            last: false,
            checksums: Bytes::new(),
            data: Bytes::new(),
        }
    }

    /// Encodes the full wire frame for this packet:
    ///
    /// ```text
    /// +-----------------------------------------------------------+
    /// |  uint32 length of the packet payload                      |
    /// +-----------------------------------------------------------+
    /// |  size of the PacketHeaderProto, uint16                    |
    /// +-----------------------------------------------------------+
    /// |  PacketHeaderProto                                        |
    /// +-----------------------------------------------------------+
    /// |  N checksums, 4 bytes each                                |
    /// +-----------------------------------------------------------+
    /// |  N chunks of payload data                                 |
    /// +-----------------------------------------------------------+
    /// ```
    ///
    /// The length field counts data, checksums, and itself, but not the
    /// header proto; datanodes reject frames that deviate from this.
    pub fn framed(&self) -> Bytes {
        let header = PacketHeaderProto {
            offset_in_block: self.offset,
            seqno: self.seqno,
            last_packet_in_block: self.last,
            data_len: self.data.len() as i32,
            sync_block: None,
        };
        let info = header.encode_to_vec();

        let payload_length = self.data.len() + self.checksums.len() + 4;
        let mut frame =
            BytesMut::with_capacity(6 + info.len() + self.checksums.len() + self.data.len());
        frame.put_u32(payload_length as u32);
        frame.put_u16(info.len() as u16);
        frame.put_slice(&info);
        frame.put_slice(&self.checksums);
        frame.put_slice(&self.data);
        frame.freeze()
    }
}

/// Reads one varint-length-prefixed protobuf message from the socket, the
/// framing datanodes use for pipeline acks.
pub(crate) async fn read_prefixed_message<M, R>(reader: &mut R) -> std::io::Result<M>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    let len = read_varint(reader).await?;
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;

    M::decode(buf.as_slice())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<u64> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let byte = reader.read_u8().await?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "message length varint too long",
    ))
}
