use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::block::BlockDescriptor;
use crate::error::{ErrorCell, StreamError};
use crate::packet::{Packet, OUTBOUND_CHUNK_SIZE, OUTBOUND_PACKET_SIZE};

use super::acker::Acker;
use super::heartbeat::Heartbeater;
use super::SharedConn;

/// Sent-but-unacked packets allowed in flight before `write` blocks.
const MAX_PACKETS_IN_FLIGHT: usize = 5;

/// Streams the bytes of one block to a datanode as checksummed packets.
///
/// The caller drives `write` and `finish`; two background tasks share the
/// socket with it. The acker owns the read half and matches pipeline acks
/// against the in-flight queue, and the heartbeater emits a keepalive frame
/// on the write half whenever the stream goes quiet.
pub struct BlockWriteStream {
    block: BlockDescriptor,

    /// Write half of the datanode socket, shared with the heartbeater
    conn: SharedConn,

    /// Bytes accepted from the caller but not yet packetised
    buf: BytesMut,

    /// Block offset the next packet starts at
    offset: i64,

    /// Seqno assigned to the next packet
    seqno: i64,

    closed: bool,

    /// In-flight queue; dropping the sender tells the acker no more
    /// packets are coming
    packets: Option<mpsc::Sender<Packet>>,

    /// First error latched by the acker
    ack_error: ErrorCell,

    acker: Option<JoinHandle<()>>,

    /// Fires for the heartbeater and any interested collaborator once the
    /// stream terminates
    shutdown: watch::Sender<bool>,
}

impl BlockWriteStream {
    /// Takes over a socket that has already completed the write-block
    /// handshake and is ready for packets. `offset` is the byte position
    /// in the block where this stream begins; nonzero for appends.
    pub fn new<S>(socket: S, block: BlockDescriptor, offset: i64) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(socket);
        let conn: SharedConn = Arc::new(Mutex::new(Box::new(write_half)));

        let (packets_tx, packets_rx) = mpsc::channel(MAX_PACKETS_IN_FLIGHT);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ack_error = ErrorCell::default();

        let acker = Acker::new(
            Box::new(read_half),
            packets_rx,
            ack_error.clone(),
            &block,
        );
        let acker = tokio::spawn(acker.run());

        tokio::spawn(Heartbeater::new(conn.clone(), shutdown_rx).run());

        BlockWriteStream {
            block,
            conn,
            buf: BytesMut::new(),
            offset,
            seqno: 1,
            closed: false,
            packets: Some(packets_tx),
            ack_error,
            acker: Some(acker),
            shutdown: shutdown_tx,
        }
    }

    /// Appends `buf` to the stream, sending out full packets as they
    /// accumulate. Blocks when too many packets are unacked.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if let Some(err) = self.ack_error.get() {
            return Err(err);
        }

        self.buf.extend_from_slice(buf);
        self.flush(false).await?;
        Ok(buf.len())
    }

    /// Flushes the remaining buffered bytes, sends the terminal empty
    /// packet, and waits for every ack before reporting. Idempotent.
    pub async fn finish(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = self.write_trailer().await;

        // Stop the heartbeater and close the in-flight queue, then wait
        // for the acker to drain. No background task outlives the stream.
        let _ = self.shutdown.send(true);
        self.packets = None;
        if let Some(acker) = self.acker.take() {
            let _ = acker.await;
        }

        // Check one more time for any ack errors.
        if let Some(err) = self.ack_error.get() {
            return Err(err);
        }
        result
    }

    /// The block this stream is writing.
    pub fn block(&self) -> &BlockDescriptor {
        &self.block
    }

    /// A receiver that observes `true` once the stream has terminated,
    /// successfully or otherwise.
    pub fn on_close(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    async fn write_trailer(&mut self) -> Result<(), StreamError> {
        if let Some(err) = self.ack_error.get() {
            return Err(err);
        }

        self.flush(true).await?;

        // The last packet has no data; it's just a marker that the block
        // is finished.
        self.send_packet(Packet::last(self.seqno, self.offset)).await
    }

    /// Parcels the buffered bytes out into packets and sends them. Without
    /// `force`, only full-size packets leave the buffer.
    async fn flush(&mut self, force: bool) -> Result<(), StreamError> {
        while !self.buf.is_empty() && (force || self.buf.len() >= OUTBOUND_PACKET_SIZE) {
            let packet = self.make_packet();
            self.offset += packet.data.len() as i64;
            self.seqno += 1;
            self.send_packet(packet).await?;
        }
        Ok(())
    }

    fn make_packet(&mut self) -> Packet {
        let packet_length = next_packet_length(self.buf.len(), self.offset);
        let data = self.buf.split_to(packet_length).freeze();
        Packet::new(self.seqno, self.offset, data)
    }

    async fn send_packet(&mut self, packet: Packet) -> Result<(), StreamError> {
        let frame = packet.framed();

        // Enqueue before touching the socket, so an ack can never arrive
        // for a packet the acker does not know about. A full queue blocks
        // here; that is the backpressure against unacked packets.
        if let Some(packets) = &self.packets {
            if packets.send(packet).await.is_err() {
                return Err(self.ack_error.get().unwrap_or(StreamError::Closed));
            }
        }

        let mut conn = self.conn.lock().await;
        conn.write_all(&frame)
            .await
            .map_err(|err| StreamError::Write(err.to_string()))?;
        conn.flush()
            .await
            .map_err(|err| StreamError::Write(err.to_string()))
    }
}

/// Length of the next packet to carve off the buffer. Packets normally
/// stop at [`OUTBOUND_PACKET_SIZE`], but when the stream sits at an
/// unaligned offset (an append into a partial chunk) the packet is cut
/// short at the next chunk boundary; datanodes require a partial chunk to
/// arrive in a packet of its own.
fn next_packet_length(buffered: usize, offset: i64) -> usize {
    let mut packet_length = buffered.min(OUTBOUND_PACKET_SIZE);

    let alignment = (offset % OUTBOUND_CHUNK_SIZE as i64) as usize;
    if alignment > 0 && packet_length > OUTBOUND_CHUNK_SIZE - alignment {
        packet_length = OUTBOUND_CHUNK_SIZE - alignment;
    }
    packet_length
}
