//! In-process frame source fed through a channel.

use crate::source::{FrameBuffers, FramePair, FrameSource};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{info, trace};

/// Create a connected publisher/source pair.
pub fn frame_channel(poll_timeout: Duration) -> (FramePublisher, ChannelFrameSource) {
    let (sender, receiver) = mpsc::channel();
    (
        FramePublisher { sender },
        ChannelFrameSource {
            receiver: Some(receiver),
            poll_timeout,
            current: None,
            superseded: 0,
        },
    )
}

/// Producer half: pushes frames towards a [`ChannelFrameSource`].
#[derive(Debug, Clone)]
pub struct FramePublisher {
    sender: Sender<FrameBuffers>,
}

impl FramePublisher {
    /// Push a frame. Returns `false` once the source has been closed.
    pub fn publish(&self, frame: FrameBuffers) -> bool {
        self.sender.send(frame).is_ok()
    }
}

/// Latest-wins source over an in-process channel.
pub struct ChannelFrameSource {
    receiver: Option<Receiver<FrameBuffers>>,
    poll_timeout: Duration,
    current: Option<FrameBuffers>,
    superseded: u64,
}

impl ChannelFrameSource {
    /// Frames dropped because a newer one arrived before they were polled.
    pub fn superseded(&self) -> u64 {
        self.superseded
    }
}

impl FrameSource for ChannelFrameSource {
    fn poll(&mut self) -> Option<FramePair<'_>> {
        // The previous frame is released before anything else happens.
        self.current = None;
        let receiver = self.receiver.as_ref()?;

        let mut newest = match receiver.try_recv() {
            Ok(frame) => frame,
            Err(_) => match receiver.recv_timeout(self.poll_timeout) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            },
        };
        while let Ok(frame) = receiver.try_recv() {
            newest = frame;
            self.superseded += 1;
        }

        trace!(
            depth = newest.depth.is_some(),
            color = newest.color.is_some(),
            "Received frame"
        );
        self.current = Some(newest);
        self.current.as_ref().map(FrameBuffers::as_pair)
    }

    fn close(&mut self) {
        if self.receiver.take().is_some() {
            info!(superseded = self.superseded, "Channel frame source closed");
        }
        self.current = None;
    }

    fn is_closed(&self) -> bool {
        self.receiver.is_none()
    }
}

impl Drop for ChannelFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
