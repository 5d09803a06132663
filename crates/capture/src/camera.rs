use crate::config::CameraConfig;
use crate::controls::{ControlTable, read_control, write_control};
use crate::device::{StreamFormat, apply_manual_controls, configure_format, open_device, open_stream_device};
use crate::source::FrameSource;
use anyhow::{Context, Result};
use common::retry::retry_with_backoff;
use session::{CameraDevice, Controls, FrameSink, Resolution, SessionError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use v4l::Device;

/// Consecutive dequeue or decode failures before the stream gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Live,
    Still,
}

impl StreamKind {
    fn thread_name(self) -> &'static str {
        match self {
            StreamKind::Live => "camera-live",
            StreamKind::Still => "camera-still",
        }
    }
}

struct RunningStream {
    kind: StreamKind,
    /// Set by `stop`, or by the stream thread itself when it gives up.
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl RunningStream {
    fn is_active(&self) -> bool {
        !self.stop.load(Ordering::Relaxed) && !self.handle.is_finished()
    }
}

/// A V4L2 camera. Each stream runs on its own thread with its own handle
/// to the device; a long-lived handle serves control reads and writes.
pub struct V4lCamera {
    path: PathBuf,
    name: String,
    control_device: Device,
    controls: ControlTable,
    preserve: Vec<String>,
    running: Mutex<Option<RunningStream>>,
}

impl V4lCamera {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let (device, path) =
            retry_with_backoff(|| open_device(&config.device_path), 10, 200, "Camera init")?;

        let caps = device.query_caps()?;
        tracing::info!("Camera opened: {} ({})", caps.card, caps.driver);

        let controls = match device.query_controls() {
            Ok(descriptions) => ControlTable::from(descriptions.as_slice()),
            Err(e) => {
                tracing::warn!("Failed to query camera controls: {}", e);
                ControlTable::default()
            }
        };
        tracing::debug!(count = controls.len(), "Camera controls discovered");

        apply_manual_controls(&device, &controls, &config.manual_controls);

        Ok(Self {
            path,
            name: caps.card,
            control_device: device,
            controls,
            preserve: config.preserve_controls.clone(),
            running: Mutex::new(None),
        })
    }

    pub fn controls(&self) -> &ControlTable {
        &self.controls
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningStream>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn start(
        &self,
        kind: StreamKind,
        resolution: Resolution,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), SessionError> {
        self.stop();

        let device = open_stream_device(&self.path).map_err(device_error)?;
        let format = configure_format(&device, resolution).map_err(device_error)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(kind.thread_name().into())
            .spawn(move || run_stream(device, format, kind, sink, thread_stop))
            .context("Failed to spawn stream thread")
            .map_err(device_error)?;

        tracing::info!(?kind, "Stream started at {}x{}", format.width, format.height);
        *self.lock_running() = Some(RunningStream { kind, stop, handle });
        Ok(())
    }
}

fn device_error(e: anyhow::Error) -> SessionError {
    SessionError::Device(format!("{:#}", e))
}

fn run_stream(
    device: Device,
    format: StreamFormat,
    kind: StreamKind,
    sink: Arc<dyn FrameSink>,
    stop: Arc<AtomicBool>,
) {
    let mut source = match FrameSource::new(&device, format) {
        Ok(source) => source,
        Err(e) => {
            stop.store(true, Ordering::Relaxed);
            sink.on_error(device_error(e));
            return;
        }
    };

    if kind == StreamKind::Still {
        let flushed = source.flush();
        if flushed > 0 {
            tracing::debug!("Flushed {} stale frames", flushed);
        }
    }

    let mut frame_count = 0u64;
    let mut failures = 0u32;
    while !stop.load(Ordering::Relaxed) {
        match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                frame_count += 1;
                sink.on_frame(frame);
            }
            Err(e) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                failures += 1;
                tracing::warn!("Frame #{} capture error: {:#}", frame_count, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    // Mark the stream dead before reporting, so a restart
                    // requested from the error path isn't skipped.
                    stop.store(true, Ordering::Relaxed);
                    sink.on_error(device_error(
                        e.context(format!("{} consecutive capture failures", failures)),
                    ));
                    break;
                }
            }
        }
    }

    tracing::debug!(?kind, frames = frame_count, "Stream stopped");
}

impl CameraDevice for V4lCamera {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn start_live_stream(
        &self,
        resolution: Resolution,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), SessionError> {
        self.start(StreamKind::Live, resolution, sink)
    }

    fn start_still_stream(
        &self,
        resolution: Resolution,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(), SessionError> {
        self.start(StreamKind::Still, resolution, sink)
    }

    fn stop(&self) {
        let Some(running) = self.lock_running().take() else {
            return;
        };
        running.stop.store(true, Ordering::Relaxed);

        if running.handle.thread().id() == thread::current().id() {
            tracing::warn!(kind = ?running.kind, "Stream stopped from its own thread; not joining");
            return;
        }
        if running.handle.join().is_err() {
            tracing::error!(kind = ?running.kind, "Stream thread panicked");
        }
    }

    /// False once the stream thread has given up, even before `stop`
    /// reaps it.
    fn is_streaming(&self) -> bool {
        self.lock_running().as_ref().is_some_and(RunningStream::is_active)
    }

    fn save_controls(&self) -> Controls {
        let mut saved = Controls::new();
        for name in &self.preserve {
            let Some(info) = self.controls.find(name) else {
                tracing::warn!(control = %name, "Preserved control not provided by camera");
                continue;
            };
            match read_control(&self.control_device, info) {
                Ok(value) => {
                    saved.insert(info.name.clone(), value);
                }
                Err(e) => tracing::warn!(control = %info.name, "Failed to read control: {:#}", e),
            }
        }
        saved
    }

    fn load_controls(&self, controls: &Controls) {
        for (name, value) in controls {
            let Some(info) = self.controls.find(name) else {
                continue;
            };
            // Drivers cache the last value and skip identical writes even
            // though a restarted stream reset the hardware.
            let restored = write_control(&self.control_device, info, info.nudge(*value))
                .and_then(|()| write_control(&self.control_device, info, *value));
            if let Err(e) = restored {
                tracing::warn!(control = %info.name, value, "Failed to restore control: {:#}", e);
            }
        }
    }

    fn set_control(&self, name: &str, delta: i64) -> Result<i64, SessionError> {
        let info = self
            .controls
            .find(name)
            .ok_or_else(|| SessionError::UnknownControl(name.to_string()))?;

        let current = read_control(&self.control_device, info).map_err(device_error)?;
        let value = info.adjusted(current, delta);
        write_control(&self.control_device, info, value).map_err(device_error)?;
        Ok(value)
    }
}

impl Drop for V4lCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    fn stream_with(stop: Arc<AtomicBool>, body: impl FnOnce() + Send + 'static) -> RunningStream {
        RunningStream {
            kind: StreamKind::Live,
            stop,
            handle: thread::spawn(body),
        }
    }

    #[test]
    fn running_stream_is_active_until_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let (release, parked) = mpsc::channel::<()>();
        let stream = stream_with(Arc::clone(&stop), move || {
            let _ = parked.recv();
        });
        assert!(stream.is_active());

        stop.store(true, Ordering::Relaxed);
        assert!(!stream.is_active());
        drop(release);
        stream.handle.join().unwrap();
    }

    #[test]
    fn stream_that_gave_up_is_not_active() {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let stream = stream_with(stop, move || thread_stop.store(true, Ordering::Relaxed));
        while !stream.handle.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!stream.is_active());
    }
}
