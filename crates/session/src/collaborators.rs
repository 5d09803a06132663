//! Contracts between the session core and the outside world.

use crate::errors::SessionError;
use crate::frame::{Controls, Frame, Resolution};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives frames and asynchronous faults from a running stream.
///
/// Called on the stream's own thread at whatever rate the driver delivers.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: Frame);
    fn on_error(&self, error: SessionError);
}

/// A camera that can run one stream at a time.
pub trait CameraDevice: Send + Sync {
    fn name(&self) -> String;

    fn start_live_stream(
        &self,
        resolution: Resolution,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), SessionError>;

    /// Start a capture-quality stream; frames go to `sink` like live ones.
    fn start_still_stream(
        &self,
        resolution: Resolution,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), SessionError>;

    /// Stop the running stream, if any. Must not be called from `sink`.
    fn stop(&self);

    fn is_streaming(&self) -> bool;

    /// Snapshot the preserved controls (those named in configuration).
    fn save_controls(&self) -> Controls;

    fn load_controls(&self, controls: &Controls);

    /// Move `name` by `delta` steps, clamped to its range.
    /// Returns the resulting raw value.
    fn set_control(&self, name: &str, delta: i64) -> Result<i64, SessionError>;
}

/// One output directory of numbered frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo {
    pub label: String,
    pub path: PathBuf,
    /// Frames currently stored in the batch.
    pub frame_count: usize,
}

/// Output naming and directory bookkeeping.
pub trait FrameStore: Send {
    fn has_open_batch(&self) -> bool;

    fn current_batch(&self) -> Option<BatchInfo>;

    fn open_new_batch(&mut self) -> Result<BatchInfo, SessionError>;

    /// Path of the next numbered file in the open batch. Nothing is
    /// recorded until [`FrameStore::commit_output`].
    fn next_output_path(&mut self) -> Result<PathBuf, SessionError>;

    /// Record `path` as written, making it the newest frame of the batch.
    fn commit_output(&mut self, path: &Path) -> Result<(), SessionError>;

    /// Delete the newest file. Returns its display name, or `None` if the
    /// batch holds nothing to remove.
    fn remove_last(&mut self) -> Result<Option<String>, SessionError>;

    /// Short name for notices, e.g. `batch-01/img-0003.jpg`.
    fn display_name(&self, path: &Path) -> String;
}

/// Writes a frame's pixels to disk.
pub trait FrameEncoder: Send + Sync {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), SessionError>;
}

/// Whatever shows the view to the operator.
pub trait Display: Send + Sync {
    fn request_redraw(&self, invalidate_layout: bool);

    /// Audible (or otherwise noticeable) end of a capture sequence.
    fn capture_completed(&self) {}
}
