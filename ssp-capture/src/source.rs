//! Common frame source types and traits.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while connecting to or reading from a source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid endpoint address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Source is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a sensor streaming process publishes frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Upper bound on how long a single `poll` may block.
    pub poll_timeout: Duration,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, poll_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            poll_timeout,
        }
    }

    /// Resolve host and port into socket addresses.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>, CaptureError> {
        use std::net::ToSocketAddrs;

        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| CaptureError::InvalidAddress(format!("{}: {}", self, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(CaptureError::InvalidAddress(self.to_string()));
        }
        Ok(addrs)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", 9999, Duration::from_millis(1))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Owned raw buffers of one frame, as received from the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffers {
    /// Depth samples, little-endian u16 per pixel.
    pub depth: Option<Vec<u8>>,
    /// Color samples, RGBA8 per pixel.
    pub color: Option<Vec<u8>>,
}

impl FrameBuffers {
    pub fn new(depth: Option<Vec<u8>>, color: Option<Vec<u8>>) -> Self {
        Self { depth, color }
    }

    /// Encode depth samples as the little-endian byte layout sources deliver.
    pub fn depth_bytes(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|d| d.to_le_bytes()).collect()
    }

    pub fn as_pair(&self) -> FramePair<'_> {
        FramePair {
            depth: self.depth.as_deref(),
            color: self.color.as_deref(),
        }
    }
}

/// The newest frame a source has, borrowed from the source.
///
/// Only valid until the next `poll` or `close` on the same source; callers
/// copy out what they need before the tick ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePair<'a> {
    pub depth: Option<&'a [u8]>,
    pub color: Option<&'a [u8]>,
}

impl FramePair<'_> {
    pub fn is_empty(&self) -> bool {
        self.depth.is_none() && self.color.is_none()
    }
}

/// Connection to a sensor streaming endpoint.
///
/// Sources hold at most one frame: a newer frame replaces an unconsumed
/// older one. Once closed, a source never yields a frame again.
pub trait FrameSource {
    /// Return the newest frame received since the previous poll, waiting at
    /// most the endpoint's poll timeout. `None` means "no new frame".
    fn poll(&mut self) -> Option<FramePair<'_>>;

    /// Release all buffers and stop receiving. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bytes_are_little_endian() {
        assert_eq!(FrameBuffers::depth_bytes(&[1000, 1]), vec![0xE8, 0x03, 0x01, 0x00]);
    }

    #[test]
    fn test_pair_borrows_buffers() {
        let frame = FrameBuffers::new(None, Some(vec![1, 2, 3, 4]));
        let pair = frame.as_pair();
        assert!(pair.depth.is_none());
        assert_eq!(pair.color, Some(&[1u8, 2, 3, 4][..]));
        assert!(!pair.is_empty());
        assert!(FrameBuffers::default().as_pair().is_empty());
    }

    #[test]
    fn test_endpoint_resolves_localhost() {
        let endpoint = Endpoint::new("127.0.0.1", 9999, Duration::from_millis(1));
        let addrs = endpoint.resolve().unwrap();
        assert_eq!(addrs[0].port(), 9999);
        assert_eq!(endpoint.to_string(), "127.0.0.1:9999");
    }
}
