//! Client-side write stream for a single HDFS block.
//!
//! A [`BlockWriteStream`] takes over a datanode socket that has already
//! completed the write-block handshake and pushes the block's bytes as
//! length-prefixed, checksummed packets, while background tasks read
//! pipeline acks back and keep the connection alive with heartbeats.

pub mod proto {
    tonic::include_proto!("datatransfer");
}

pub mod block;
pub mod error;
pub mod packet;
pub mod transfer;

pub use block::BlockDescriptor;
pub use error::StreamError;
pub use transfer::BlockWriteStream;
