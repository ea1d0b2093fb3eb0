//! Generic `FrameSink` trait for anything that can put a [`CommandFrame`] on
//! the control bus.
//!
//! The dispatcher only ever talks to the trait, so the physical transport
//! (a CAN socket, a log, a test recorder) can be swapped without
//! touching scaling or gating logic.

use std::sync::Mutex;

use tracing::info;
use vesc_types::VescError;

use crate::frame::CommandFrame;

/// A bus transmit primitive.
///
/// `transmit` takes `&self` because it is called concurrently from every
/// inbound command channel; implementations synchronise internally if they
/// need to.
pub trait FrameSink: Send + Sync {
    /// Stable identifier for this sink, e.g. `"socketcan:can0"`.
    fn id(&self) -> &str;

    /// Hand one finished frame to the bus.
    ///
    /// # Errors
    ///
    /// Returns [`VescError::Transmit`] if the bus did not accept the frame.
    fn transmit(&self, frame: &CommandFrame) -> Result<(), VescError>;
}

/// Sink that only logs each frame. Used for dry runs on machines without a
/// CAN interface.
pub struct LogSink {
    id: String,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            id: "log".to_string(),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for LogSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn transmit(&self, frame: &CommandFrame) -> Result<(), VescError> {
        info!(sink = %self.id, frame = %frame, "frame transmitted");
        Ok(())
    }
}

/// Sink that keeps every transmitted frame in memory, in order.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<CommandFrame>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every frame received so far.
    pub fn frames(&self) -> Vec<CommandFrame> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CommandFrame>> {
        // A panic while pushing cannot leave the Vec half-written.
        self.frames
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl FrameSink for RecordingSink {
    fn id(&self) -> &str {
        "recording"
    }

    fn transmit(&self, frame: &CommandFrame) -> Result<(), VescError> {
        self.lock().push(*frame);
        Ok(())
    }
}
