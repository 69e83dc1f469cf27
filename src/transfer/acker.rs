use tokio::io::{AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::block::BlockDescriptor;
use crate::error::{ErrorCell, StreamError};
use crate::packet::{read_prefixed_message, Packet, HEARTBEAT_SEQNO};
use crate::proto::{PipelineAckProto, Status};

/// Background task that matches pipeline acks against the in-flight queue.
///
/// It owns the read half of the socket outright. Acks must arrive in the
/// order the packets were sent; the first deviation latches an error and
/// stops the loop.
pub(crate) struct Acker {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    packets: mpsc::Receiver<Packet>,
    error: ErrorCell,
    block_id: u64,
    pipeline_len: usize,
}

impl Acker {
    pub fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        packets: mpsc::Receiver<Packet>,
        error: ErrorCell,
        block: &BlockDescriptor,
    ) -> Self {
        Acker {
            reader: BufReader::new(reader),
            packets,
            error,
            block_id: block.block_id,
            pipeline_len: block.pipeline_len(),
        }
    }

    pub async fn run(mut self) {
        'packets: while let Some(packet) = self.packets.recv().await {
            loop {
                // A failure to read the ack at all counts against the
                // datanode we are connected to.
                let ack: PipelineAckProto = match read_prefixed_message(&mut self.reader).await {
                    Ok(ack) => ack,
                    Err(err) => {
                        self.latch(StreamError::AckRead(err.to_string()));
                        break 'packets;
                    }
                };

                if let Some(err) = self.check_reply(&ack) {
                    self.latch(err);
                    break 'packets;
                }

                // Heartbeats are acked too, but they do not correspond to
                // any packet in flight; read again.
                if ack.seqno == HEARTBEAT_SEQNO {
                    continue;
                }

                if ack.seqno != packet.seqno {
                    self.latch(StreamError::InvalidSeqno {
                        expected: packet.seqno,
                        got: ack.seqno,
                    });
                    break 'packets;
                }

                break;
            }
        }

        // Once an error is latched, keep taking packets off the queue (but
        // no longer off the socket) until the writer closes it. Otherwise
        // the writer could block forever on a full queue before it notices.
        while self.packets.recv().await.is_some() {}
    }

    fn check_reply(&self, ack: &PipelineAckProto) -> Option<StreamError> {
        if ack.reply.len() != self.pipeline_len {
            debug!(
                block_id = self.block_id,
                expected = self.pipeline_len,
                got = ack.reply.len(),
                "ack reply count does not match pipeline length"
            );
        }

        for (pipeline_index, &status) in ack.reply.iter().enumerate() {
            if status != Status::Success as i32 {
                return Some(StreamError::AckStatus {
                    pipeline_index,
                    seqno: ack.seqno,
                    status: Status::try_from(status).unwrap_or(Status::Error),
                });
            }
        }
        None
    }

    fn latch(&self, err: StreamError) {
        warn!(block_id = self.block_id, %err, "block write ack failure");
        self.error.set(err);
    }
}
