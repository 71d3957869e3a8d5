//! Frame client speaking the relay's wire protocol.
//!
//! The protocol has no framing: the client writes exactly one frame and
//! reads exactly one frame back.

use std::{io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Client connection to a relay.
#[derive(Debug)]
pub struct FrameClient {
    stream: TcpStream,
    frame_bytes: usize,
}

impl FrameClient {
    /// Connect to `addr`, exchanging frames of `frame_bytes`.
    pub async fn connect(addr: SocketAddr, frame_bytes: usize) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, frame_bytes })
    }

    /// Bytes in one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Frame of the configured size filled with `fill`.
    pub fn frame(&self, fill: u8) -> Vec<u8> {
        vec![fill; self.frame_bytes]
    }

    /// Write raw bytes, which need not be a whole frame.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Read exactly one frame.
    pub async fn recv_frame(&mut self) -> io::Result<Vec<u8>> {
        let mut frame = vec![0u8; self.frame_bytes];
        self.stream.read_exact(&mut frame).await?;
        Ok(frame)
    }

    /// Send one frame and wait for the response.
    pub async fn roundtrip(&mut self, frame: &[u8]) -> io::Result<Vec<u8>> {
        self.send_bytes(frame).await?;
        self.recv_frame().await
    }

    /// Close the write half, signalling end of stream.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    /// Whether the server closes the connection within `within`.
    ///
    /// Any bytes that arrive first count as "not closed".
    pub async fn closed_within(&mut self, within: Duration) -> bool {
        let mut byte = [0u8; 1];
        match tokio::time::timeout(within, self.stream.read(&mut byte)).await {
            Ok(Ok(0) | Err(_)) => true,
            Ok(Ok(_)) | Err(_) => false,
        }
    }
}
