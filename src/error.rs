use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::proto::Status;

/// Error types for the block write stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// A replica in the pipeline replied with a non-success status.
    #[error("ack error from datanode at pipeline index {pipeline_index}: {status:?} (seqno {seqno})")]
    AckStatus {
        pipeline_index: usize,
        seqno: i64,
        status: Status,
    },

    /// An ack arrived out of order with respect to the in-flight queue.
    #[error("invalid ack sequence number: expected {expected}, got {got}")]
    InvalidSeqno { expected: i64, got: i64 },

    /// Reading or decoding an ack from the socket failed.
    #[error("reading ack: {0}")]
    AckRead(String),

    /// Writing a packet to the socket failed.
    #[error("writing to datanode: {0}")]
    Write(String),

    /// The stream was already finished.
    #[error("write stream is closed")]
    Closed,
}

/// First-error latch shared between the acker and the writer.
///
/// The acker sets it at most once; later set attempts are ignored so the
/// first failure is the one the writer observes.
#[derive(Clone, Default)]
pub(crate) struct ErrorCell(Arc<OnceLock<StreamError>>);

impl ErrorCell {
    pub fn set(&self, err: StreamError) {
        let _ = self.0.set(err);
    }

    pub fn get(&self) -> Option<StreamError> {
        self.0.get().cloned()
    }
}
