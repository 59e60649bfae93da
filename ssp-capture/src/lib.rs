//! SSP Capture - raw depth + color frame sources
//!
//! This crate provides implementations of the [`FrameSource`] trait, the
//! non-blocking "give me the newest frame pair" connection to a sensor
//! streaming endpoint:
//!
//! - [`ChannelFrameSource`]: in-process source fed by a [`FramePublisher`]
//! - [`TcpFrameSource`]: subscriber connected to a remote streaming process
//!
//! Sources keep only the newest frame. A [`FramePair`] borrows the source's
//! buffers, so it cannot outlive the next `poll` or `close`.
//!
//! ## Example
//!
//! ```ignore
//! use ssp_capture::{Endpoint, FrameSource, TcpFrameSource};
//!
//! let mut source = TcpFrameSource::connect(&Endpoint::default())?;
//! if let Some(frame) = source.poll() {
//!     // Copy out of `frame` before polling again...
//! }
//! source.close();
//! ```

mod channel;
mod source;
mod tcp;

pub use channel::{ChannelFrameSource, FramePublisher, frame_channel};
pub use source::{CaptureError, Endpoint, FrameBuffers, FramePair, FrameSource};
pub use tcp::{MAX_BUFFER_LEN, TcpFrameSource, read_frame, write_frame};
