//! TCP subscriber for a remote sensor streaming process.
//!
//! # Wire Protocol
//!
//! ```text
//! ┌────────────────────┬────────────────────┬─────────────┬─────────────┐
//! │ Depth len (4 bytes)│ Color len (4 bytes)│ Depth bytes │ Color bytes │
//! │ Big-endian u32     │ Big-endian u32     │             │             │
//! └────────────────────┴────────────────────┴─────────────┴─────────────┘
//! ```
//!
//! A zero length means the buffer is absent from this frame. Depth bytes are
//! little-endian u16 samples, color bytes are RGBA8.

use crate::source::{CaptureError, Endpoint, FrameBuffers, FramePair, FrameSource};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest single buffer accepted from the wire (64 MiB).
pub const MAX_BUFFER_LEN: usize = 64 * 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Read one frame from `reader`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<FrameBuffers> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let depth_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let color_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let mut read_buffer = |len: usize| -> io::Result<Option<Vec<u8>>> {
        if len == 0 {
            return Ok(None);
        }
        if len > MAX_BUFFER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("buffer of {} bytes exceeds limit of {}", len, MAX_BUFFER_LEN),
            ));
        }
        let mut buffer = vec![0u8; len];
        reader.read_exact(&mut buffer)?;
        Ok(Some(buffer))
    };

    let depth = read_buffer(depth_len)?;
    let color = read_buffer(color_len)?;
    Ok(FrameBuffers { depth, color })
}

/// Write one frame to `writer` (the publisher side of [`read_frame`]).
pub fn write_frame<W: Write>(writer: &mut W, frame: &FrameBuffers) -> io::Result<()> {
    let len = |buffer: &Option<Vec<u8>>| -> io::Result<u32> {
        let len = buffer.as_ref().map_or(0, Vec::len);
        if len > MAX_BUFFER_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {} bytes exceeds limit of {}", len, MAX_BUFFER_LEN),
            ));
        }
        Ok(len as u32)
    };

    writer.write_all(&len(&frame.depth)?.to_be_bytes())?;
    writer.write_all(&len(&frame.color)?.to_be_bytes())?;
    if let Some(depth) = &frame.depth {
        writer.write_all(depth)?;
    }
    if let Some(color) = &frame.color {
        writer.write_all(color)?;
    }
    writer.flush()
}

/// Single-slot mailbox between the reader thread and `poll`.
#[derive(Default)]
struct LatestFrame {
    slot: Mutex<Option<FrameBuffers>>,
    ready: Condvar,
}

impl LatestFrame {
    fn lock(&self) -> MutexGuard<'_, Option<FrameBuffers>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Subscriber that keeps only the newest frame received over TCP.
pub struct TcpFrameSource {
    peer: SocketAddr,
    stream: Option<TcpStream>,
    latest: Arc<LatestFrame>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    poll_timeout: Duration,
    current: Option<FrameBuffers>,
}

impl TcpFrameSource {
    /// Connect to the endpoint and start receiving in the background.
    pub fn connect(endpoint: &Endpoint) -> Result<Self, CaptureError> {
        let mut last_error = None;
        for addr in endpoint.resolve()? {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream, endpoint.poll_timeout),
                Err(e) => {
                    debug!(%addr, error = %e, "Connection attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(CaptureError::Connection {
            addr: endpoint.to_string(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address")),
        })
    }

    /// Subscribe on an already connected stream.
    pub fn from_stream(stream: TcpStream, poll_timeout: Duration) -> Result<Self, CaptureError> {
        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        let reader_stream = stream.try_clone()?;
        let latest = Arc::new(LatestFrame::default());
        let running = Arc::new(AtomicBool::new(true));

        let latest_clone = latest.clone();
        let running_clone = running.clone();
        let reader = thread::Builder::new()
            .name("ssp-frame-reader".into())
            .spawn(move || Self::read_loop(reader_stream, latest_clone, running_clone))?;

        info!(%peer, "Initialised subscriber");

        Ok(Self {
            peer,
            stream: Some(stream),
            latest,
            running,
            reader: Some(reader),
            poll_timeout,
            current: None,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the reader thread is still receiving.
    pub fn is_receiving(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn read_loop(mut stream: TcpStream, latest: Arc<LatestFrame>, running: Arc<AtomicBool>) {
        let mut received = 0u64;
        let mut superseded = 0u64;

        while running.load(Ordering::Acquire) {
            match read_frame(&mut stream) {
                Ok(frame) => {
                    received += 1;
                    let mut slot = latest.lock();
                    if slot.replace(frame).is_some() {
                        superseded += 1;
                    }
                    drop(slot);
                    latest.ready.notify_one();
                }
                Err(e) => {
                    if running.load(Ordering::Acquire) && e.kind() != io::ErrorKind::UnexpectedEof {
                        warn!("Frame stream error: {}", e);
                    }
                    break;
                }
            }
        }

        running.store(false, Ordering::Release);
        debug!(received, superseded, "Frame reader stopped");
    }
}

impl FrameSource for TcpFrameSource {
    fn poll(&mut self) -> Option<FramePair<'_>> {
        self.current = None;
        if self.stream.is_none() {
            return None;
        }

        let mut slot = self.latest.lock();
        if slot.is_none() {
            slot = self
                .latest
                .ready
                .wait_timeout(slot, self.poll_timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        let frame = slot.take();
        drop(slot);

        self.current = frame;
        self.current.as_ref().map(FrameBuffers::as_pair)
    }

    fn close(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Frame reader thread panicked");
            }
        }

        // Anything buffered after the last poll is discarded, never resurrected.
        self.latest.lock().take();
        self.current = None;
        info!(peer = %self.peer, "Subscriber closed");
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for TcpFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn poll_until_frame(source: &mut TcpFrameSource) -> FrameBuffers {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(pair) = source.poll() {
                return FrameBuffers::new(
                    pair.depth.map(<[u8]>::to_vec),
                    pair.color.map(<[u8]>::to_vec),
                );
            }
            assert!(Instant::now() < deadline, "timed out waiting for a frame");
        }
    }

    #[test]
    fn test_frame_codec() {
        let frame = FrameBuffers::new(Some(vec![1, 2, 3, 4]), None);
        let mut wire = Vec::new();
        write_frame(&mut wire, &frame).unwrap();
        assert_eq!(&wire[..8], &[0, 0, 0, 4, 0, 0, 0, 0]);
        assert_eq!(read_frame(&mut wire.as_slice()).unwrap(), frame);
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        wire.extend_from_slice(&0u32.to_be_bytes());
        let err = read_frame(&mut wire.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&4u32.to_be_bytes());
        wire.extend_from_slice(&0u32.to_be_bytes());
        wire.extend_from_slice(&[1, 2]);
        assert!(read_frame(&mut wire.as_slice()).is_err());
    }

    #[test]
    fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let endpoint = Endpoint::new("127.0.0.1", port, Duration::from_millis(1));
        match TcpFrameSource::connect(&endpoint) {
            Err(CaptureError::Connection { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{}", port))
            }
            Err(other) => panic!("Expected Connection error, got {:?}", other),
            Ok(_) => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_receives_frames_and_close_is_sticky() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let first = FrameBuffers::new(Some(vec![9, 9]), Some(vec![1, 2, 3, 4]));
            write_frame(&mut stream, &first).unwrap();
            // Second frame only after the client has closed.
            go_rx.recv().unwrap();
            let _ = write_frame(&mut stream, &FrameBuffers::new(Some(vec![7, 7]), None));
        });

        let endpoint = Endpoint::new("127.0.0.1", port, Duration::from_millis(10));
        let mut source = TcpFrameSource::connect(&endpoint).unwrap();
        let frame = poll_until_frame(&mut source);
        assert_eq!(frame.depth, Some(vec![9, 9]));
        assert_eq!(frame.color, Some(vec![1, 2, 3, 4]));

        source.close();
        source.close();
        go_tx.send(()).unwrap();
        server.join().unwrap();

        assert!(source.is_closed());
        for _ in 0..10 {
            assert!(source.poll().is_none());
        }
    }

    #[test]
    fn test_poll_returns_only_newest_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for n in 1..=3u8 {
                write_frame(&mut stream, &FrameBuffers::new(Some(vec![n, n]), None)).unwrap();
            }
        });

        let endpoint = Endpoint::new("127.0.0.1", port, Duration::from_millis(10));
        let mut source = TcpFrameSource::connect(&endpoint).unwrap();
        server.join().unwrap();

        // The reader stops at end of stream, after all three frames landed.
        let deadline = Instant::now() + Duration::from_secs(5);
        while source.is_receiving() {
            assert!(Instant::now() < deadline, "reader never reached end of stream");
            thread::sleep(Duration::from_millis(5));
        }

        let pair = source.poll().expect("newest frame");
        assert_eq!(pair.depth, Some(&[3u8, 3][..]));
        assert!(pair.color.is_none());
        assert!(source.poll().is_none());
    }
}
