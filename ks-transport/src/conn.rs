use ks_core::{KsError, KsResult};
use ks_link::{Frame, MAX_FRAME_LEN};
use log::debug;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// One accepted terminal connection
///
/// Terminals send each frame in a single segment and never pipeline, so a
/// read yields exactly one frame or nothing.
#[derive(Debug)]
pub struct DeviceConn {
    stream: TcpStream,
    peer: SocketAddr,
}

impl DeviceConn {
    pub fn new(stream: TcpStream) -> KsResult<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Read one frame, waiting at most `timeout`
    ///
    /// # Errors
    /// - `KsError::Timeout` when no frame arrives in time
    /// - `KsError::Io` when the peer closed the connection
    /// - frame codec errors from [`Frame::parse`]
    pub async fn read_frame(&mut self, timeout: Duration) -> KsResult<Frame> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = tokio::time::timeout(timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| KsError::Timeout)??;
        if n == 0 {
            return Err(KsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        debug!("{} -> {:02X?}", self.peer, &buf[..n]);
        Frame::parse(&buf[..n])
    }

    /// Write one frame, waiting at most `timeout` for the socket to
    /// accept it
    ///
    /// # Errors
    /// `KsError::Timeout` when the peer stops draining its side and the
    /// send buffer fills up; the connection is unusable afterwards.
    pub async fn write_frame(&mut self, frame: &Frame, timeout: Duration) -> KsResult<()> {
        let raw = frame.to_bytes()?;
        debug!("{} <- {:02X?}", self.peer, &raw[..]);
        tokio::time::timeout(timeout, self.stream.write_all(&raw))
            .await
            .map_err(|_| KsError::Timeout)??;
        Ok(())
    }

    /// Shut the socket down, forcing any pending read to fail
    pub async fn shutdown(&mut self) -> KsResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
