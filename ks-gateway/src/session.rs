//! One logged-in concentrator connection
//!
//! The connection is shared between the per-connection loop (waiting for
//! heartbeats and faults) and the dispatcher (pushing commands). The
//! socket sits behind a mutex, and the idle wait takes it in short slices
//! so a command never stalls behind a five-minute read.

use ks_core::{KsError, KsResult};
use ks_link::Frame;
use ks_transport::DeviceConn;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// How long one idle read slice holds the connection lock
const READ_SLICE: Duration = Duration::from_millis(500);

pub struct Session {
    sn: String,
    peer: SocketAddr,
    write_timeout: Duration,
    conn: Mutex<DeviceConn>,
}

impl Session {
    pub fn new(sn: String, conn: DeviceConn, write_timeout: Duration) -> Self {
        let peer = conn.peer_addr();
        Self {
            sn,
            peer,
            write_timeout,
            conn: Mutex::new(conn),
        }
    }

    pub fn sn(&self) -> &str {
        &self.sn
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Wait for the next unsolicited frame, up to `idle_timeout`
    ///
    /// Returns the frame together with the held connection guard so the
    /// caller can answer it and run follow-up polls without the
    /// dispatcher getting in between. Between slices the lock is
    /// released; a slice that ends with no data just starts another one.
    ///
    /// # Errors
    /// `KsError::Timeout` once the whole idle window passes without a
    /// frame; any read or codec error is returned as-is.
    pub async fn next_frame(
        &self,
        idle_timeout: Duration,
    ) -> KsResult<(MutexGuard<'_, DeviceConn>, Frame)> {
        let deadline = Instant::now() + idle_timeout;
        loop {
            let mut conn = self.conn.lock().await;
            match conn.read_frame(READ_SLICE).await {
                Ok(frame) => return Ok((conn, frame)),
                Err(KsError::Timeout) => {
                    drop(conn);
                    if Instant::now() >= deadline {
                        return Err(KsError::Timeout);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Send a command and wait for the device's answer
    ///
    /// Holds the connection for the whole round trip so the answer cannot
    /// be consumed by the idle loop.
    pub async fn exchange(&self, request: &Frame, read_timeout: Duration) -> KsResult<Frame> {
        let mut conn = self.conn.lock().await;
        conn.write_frame(request, self.write_timeout).await?;
        conn.read_frame(read_timeout).await
    }

    /// Send a command that expects no answer
    pub async fn send(&self, request: &Frame) -> KsResult<()> {
        let mut conn = self.conn.lock().await;
        conn.write_frame(request, self.write_timeout).await
    }

    /// Force the connection closed; the read loop sees the error and
    /// tears the session down
    pub async fn disconnect(&self) -> KsResult<()> {
        let mut conn = self.conn.lock().await;
        conn.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_core::NodeId;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    async fn session_pair() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = DeviceConn::new(server).unwrap();
        (
            Session::new("182106230096".to_string(), conn, Duration::from_secs(1)),
            client,
        )
    }

    fn heartbeat() -> Frame {
        Frame::new(
            0x80,
            NodeId::new([0x18, 0x21, 0x06, 0x23, 0x00, 0x96]),
            0x8D,
            vec![0x18, 0x21, 0x06, 0x23, 0x00, 0x96, 0x71, 0x00],
        )
    }

    #[tokio::test]
    async fn test_next_frame_spans_slices() {
        let (session, mut client) = session_pair().await;
        let writer = tokio::spawn(async move {
            // arrive after the first read slice has expired
            tokio::time::sleep(Duration::from_millis(700)).await;
            client
                .write_all(&heartbeat().to_bytes().unwrap())
                .await
                .unwrap();
            client
        });
        let (_guard, frame) = session.next_frame(Duration::from_secs(5)).await.unwrap();
        assert_eq!(frame, heartbeat());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_next_frame_idle_timeout() {
        let (session, _client) = session_pair().await;
        let err = session
            .next_frame(Duration::from_millis(600))
            .await
            .unwrap_err();
        assert!(matches!(err, KsError::Timeout));
    }

    #[tokio::test]
    async fn test_disconnect_interrupts_peer() {
        let (session, client) = session_pair().await;
        session.disconnect().await.unwrap();
        drop(client);
        let err = session.next_frame(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, KsError::Io(_) | KsError::Timeout));
    }
}
