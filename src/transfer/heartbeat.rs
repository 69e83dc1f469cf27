use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::warn;

use crate::packet::Packet;

use super::SharedConn;

/// Keepalive period while the stream is quiet. Must stay under the
/// datanode's socket read timeout.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that keeps the pipeline from timing out during quiet
/// periods by writing a header-only heartbeat frame on the shared socket.
pub(crate) struct Heartbeater {
    conn: SharedConn,
    shutdown: watch::Receiver<bool>,
}

impl Heartbeater {
    pub fn new(conn: SharedConn, shutdown: watch::Receiver<bool>) -> Self {
        Heartbeater { conn, shutdown }
    }

    pub async fn run(self) {
        let Heartbeater { conn, mut shutdown } = self;
        let mut ticker =
            time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A failed heartbeat is not fatal here; the writer or
                    // the acker will surface the real error.
                    if let Err(err) = beat(&conn).await {
                        warn!("datanode heartbeat error: {}", err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

async fn beat(conn: &SharedConn) -> std::io::Result<()> {
    let frame = Packet::heartbeat().framed();

    let mut conn = conn.lock().await;
    conn.write_all(&frame).await?;
    conn.flush().await
}
