use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

pub mod write_stream;
pub use write_stream::BlockWriteStream;

mod acker;
mod heartbeat;

/// Write half of the datanode socket, shared between the packet writer and
/// the heartbeater. The mutex is held for the duration of one whole frame
/// so frames never interleave.
pub(crate) type SharedConn = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;
