//! Transport
//!
//! Blocking byte transport under a session, plus length-prefixed frame
//! assembly on top of it.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use crate::config::ClientConfig;
use crate::error::{Result, ThinError};
use crate::protocol::codec::LENGTH_PREFIX;

/// Blocking byte pipe to a server
pub trait Transport {
    /// Write all of `bytes`
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read at most `max_bytes`; an empty result means the peer closed
    fn receive(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;

    /// Release the underlying connection
    fn close(&mut self) {}

    /// Send one complete request frame
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.send(frame)?;
        Ok(())
    }

    /// Receive one complete response frame, length prefix included
    ///
    /// Reads in chunks of at most `chunk_size` until the declared length has
    /// arrived. Frames declaring more than `max_size` payload bytes are
    /// rejected before their payload is read.
    fn receive_frame(&mut self, chunk_size: usize, max_size: usize) -> Result<Bytes> {
        let chunk_size = chunk_size.max(1);
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut total: Option<usize> = None;

        loop {
            if total.is_none() && buffer.len() >= LENGTH_PREFIX {
                let declared = (&buffer[..LENGTH_PREFIX]).get_i32_le();
                let declared = usize::try_from(declared).map_err(|_| {
                    ThinError::Protocol(format!("negative response length {}", declared))
                })?;
                if declared > max_size {
                    return Err(ThinError::Protocol(format!(
                        "Response too large: {} bytes (max {})",
                        declared, max_size
                    )));
                }
                total = Some(LENGTH_PREFIX + declared);
            }

            if let Some(total) = total {
                if buffer.len() >= total {
                    if buffer.len() > total {
                        tracing::warn!(extra = buffer.len() - total, "discarding bytes past response frame");
                        buffer.truncate(total);
                    }
                    return Ok(buffer.freeze());
                }
            }

            let want = match total {
                Some(total) => (total - buffer.len()).min(chunk_size),
                None => LENGTH_PREFIX - buffer.len(),
            };
            let chunk = self.receive(want)?;
            if chunk.is_empty() {
                return Err(ThinError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} response bytes", buffer.len()),
                )));
            }
            buffer.extend_from_slice(&chunk);
        }
    }
}

/// TCP transport
pub struct TcpTransport {
    stream: TcpStream,

    /// Peer address for logging
    peer_addr: String,
}

impl TcpTransport {
    /// Connect to the configured endpoint and apply socket options
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(config.addr())?;
        Self::from_stream(stream, config)
    }

    /// Wrap an already-connected stream
    pub fn from_stream(stream: TcpStream, config: &ClientConfig) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(config.nodelay)?;
        if config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
        }
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        tracing::debug!("Connected to {}", peer_addr);
        Ok(Self { stream, peer_addr })
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn receive(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max_bytes];
        loop {
            match self.stream.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn close(&mut self) {
        // Peer may already be gone
        let _ = self.stream.shutdown(Shutdown::Both);
        tracing::debug!("Closed connection to {}", self.peer_addr);
    }
}
