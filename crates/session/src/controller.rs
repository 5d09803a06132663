//! The façade the input layer drives.
//!
//! Locking order is `device`, then `store`, then `state`. `device` serializes
//! stream start/stop. Camera `stop` joins the stream thread, and that thread
//! takes `state` on every frame, so `stop` is never called with `state`
//! held. File system work happens under `store` only, never under `state`.

use crate::cache::RecentFrameCache;
use crate::clock::Clock;
use crate::collaborators::{BatchInfo, CameraDevice, Display, FrameEncoder, FrameSink, FrameStore};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::frame::{Controls, Frame};
use crate::messages::{MessageBus, MessageListener};
use crate::mode::{Mode, ModeStateMachine};
use crate::playback::PlaybackRun;
use crate::plugins::PluginRegistry;
use crate::sequencer::{CaptureOutcome, SnapshotJob};
use crate::timer::TimerHandle;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Duration;

pub const MAX_ONION_DEPTH: usize = 2;
const WELCOME_INTERVAL: Duration = Duration::from_millis(3000);
const WELCOME_KEY: &str = "welcome";

/// Everything the controller needs from the outside.
pub struct SessionParts {
    pub config: SessionConfig,
    pub camera: Arc<dyn CameraDevice>,
    pub store: Box<dyn FrameStore>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub display: Arc<dyn Display>,
    pub messages: MessageBus,
    pub plugins: PluginRegistry,
    pub clock: Arc<dyn Clock>,
}

/// What the display draws, read in one go.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub mode: Mode,
    pub live_frame: Option<Frame>,
    /// Overlay frames, oldest first. Empty in playback.
    pub onion_frames: Vec<Frame>,
    pub active_frame: Option<Frame>,
    pub active_index: Option<usize>,
    pub cached_frames: usize,
    pub onion_depth: usize,
    pub messages: Option<Vec<String>>,
}

pub(crate) struct SessionState {
    pub(crate) mode: ModeStateMachine,
    pub(crate) cache: RecentFrameCache,
    pub(crate) live_frame: Option<Frame>,
    pub(crate) job: Option<SnapshotJob>,
    pub(crate) playback: Option<PlaybackRun>,
    pub(crate) playback_generation: u64,
    pub(crate) saved_controls: Option<Controls>,
    pub(crate) onion_depth: usize,
    pub(crate) reported_controls: HashSet<String>,
    pub(crate) welcome: Option<TimerHandle>,
    pub(crate) closed: bool,
}

impl SessionState {
    /// Mode change that also stops any running playback.
    pub(crate) fn transition(&mut self, target: Mode) -> bool {
        let changed = self.mode.try_transition(target);
        if changed {
            self.playback = None;
        }
        changed
    }
}

pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) store: Mutex<Box<dyn FrameStore>>,
    pub(crate) snapshot_done: Condvar,
    pub(crate) device: Mutex<()>,
    pub(crate) camera: Arc<dyn CameraDevice>,
    pub(crate) encoder: Arc<dyn FrameEncoder>,
    pub(crate) display: Arc<dyn Display>,
    pub(crate) messages: MessageBus,
    pub(crate) plugins: PluginRegistry,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Stream callbacks hold the session weakly so a dropped controller
/// doesn't stay alive through a camera thread.
struct SessionSink {
    shared: Weak<Shared>,
}

impl FrameSink for SessionSink {
    fn on_frame(&self, frame: Frame) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_frame_delivered(frame);
        }
    }

    fn on_error(&self, error: SessionError) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_device_error(error);
        }
    }
}

/// Forwards bus changes to the display.
struct RedrawOnMessages {
    display: Arc<dyn Display>,
}

impl MessageListener for RedrawOnMessages {
    fn messages_changed(&self, _visible: &[String]) {
        self.display.request_redraw(false);
    }

    fn messages_cleared(&self) {
        self.display.request_redraw(false);
    }
}

/// A bus listener that asks `display` to redraw whenever notices change.
pub fn redraw_listener(display: Arc<dyn Display>) -> Arc<dyn MessageListener> {
    Arc::new(RedrawOnMessages { display })
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn lock_store(&self) -> MutexGuard<'_, Box<dyn FrameStore>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a fresh batch through the locked `store`. The cache only ever
    /// mirrors the open batch.
    pub(crate) fn open_batch(&self, store: &mut dyn FrameStore) -> Result<BatchInfo, SessionError> {
        let batch = store.open_new_batch()?;
        self.lock_state().cache.clear();
        Ok(batch)
    }

    /// Whether `action` must be skipped: the session is closed or a capture
    /// owns the device.
    fn refuses(&self, action: &str) -> bool {
        let state = self.lock_state();
        if state.mode.current() == Mode::Capturing {
            tracing::debug!(action, "Capture in progress, request ignored");
        }
        state.closed || state.mode.current() == Mode::Capturing
    }

    pub(crate) fn lock_device(&self) -> MutexGuard<'_, ()> {
        self.device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn wait_snapshot<'a>(
        &self,
        guard: MutexGuard<'a, SessionState>,
        timeout: Option<Duration>,
    ) -> MutexGuard<'a, SessionState> {
        match timeout {
            Some(timeout) => match self.snapshot_done.wait_timeout(guard, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            },
            None => self
                .snapshot_done
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }

    pub(crate) fn sink(self: &Arc<Self>) -> Arc<dyn FrameSink> {
        Arc::new(SessionSink {
            shared: Arc::downgrade(self),
        })
    }

    /// Stop the live stream, keeping its controls for the way back.
    /// Caller holds the device lock.
    pub(crate) fn pause_live(&self) {
        if !self.camera.is_streaming() {
            return;
        }
        let controls = self.camera.save_controls();
        self.camera.stop();
        self.lock_state().saved_controls = Some(controls);
    }

    pub(crate) fn request_live_view(self: &Arc<Self>) {
        let _device = self.lock_device();
        let (changed, saved_controls) = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            if state.mode.current() == Mode::Capturing {
                tracing::debug!("Capture in progress, live view request ignored");
                return;
            }
            let changed = state.transition(Mode::LiveView);
            (changed, state.saved_controls.clone())
        };

        if !changed && self.camera.is_streaming() {
            return;
        }

        match self
            .camera
            .start_live_stream(self.config.live_view_resolution, self.sink())
        {
            Ok(()) => {
                if let Some(controls) = &saved_controls {
                    self.camera.load_controls(controls);
                }
                tracing::info!(resolution = %self.config.live_view_resolution, "Live view started");
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not start live view");
                self.messages.add_unique(format!("Camera error: {}", e));
            }
        }
        self.display.request_redraw(true);
    }

    fn browse(self: &Arc<Self>, older: bool) {
        let _device = self.lock_device();
        let leaving_live = {
            let state = self.lock_state();
            if state.closed || state.cache.is_empty() {
                return;
            }
            match state.mode.current() {
                Mode::Capturing => {
                    tracing::debug!("Capture in progress, browse ignored");
                    return;
                }
                mode => mode == Mode::LiveView,
            }
        };

        if leaving_live {
            self.pause_live();
        }

        {
            let mut state = self.lock_state();
            state.transition(Mode::Playback);
            // Manual stepping takes over from a running playback.
            state.playback = None;
            if leaving_live {
                state.cache.show_newest();
            } else if older {
                state.cache.step_older();
            } else {
                state.cache.step_newer();
            }
        }
        self.display.request_redraw(true);
    }

    fn undo_last_capture(&self) {
        let removed = {
            // Held throughout so a capture cannot commit between the file
            // and the cache removal.
            let mut store = self.lock_store();
            if self.refuses("undo") {
                return;
            }
            let removed = store.remove_last();
            if let Ok(Some(_)) = removed {
                self.lock_state().cache.remove_newest();
            }
            removed
        };

        match removed {
            Ok(Some(name)) => {
                tracing::info!(file = %name, "Removed last capture");
                self.messages
                    .add_unique(format!("Last image ({}) removed.", name));
            }
            Ok(None) => self.messages.add_unique("Nothing to remove."),
            Err(e) => {
                tracing::error!(error = %e, "Could not remove last capture");
                self.messages
                    .add_unique(format!("Failed to remove last image: {}", e));
            }
        }
        self.display.request_redraw(true);
    }

    fn start_new_batch(&self) {
        let (finished, opened) = {
            let mut store = self.lock_store();
            if self.refuses("new batch") {
                return;
            }
            let finished = store.current_batch();
            (finished, self.open_batch(&mut **store))
        };

        match opened {
            Ok(batch) => {
                tracing::info!(batch = %batch.label, path = %batch.path.display(), "New batch");
                if let Some(previous) = finished.filter(|b| b.frame_count > 0) {
                    self.plugins.batch_finished(previous);
                }
                self.messages
                    .add_unique(format!("New batch: {}", batch.label));
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not open a new batch");
                self.messages
                    .add_unique(format!("Failed to create new batch: {}", e));
            }
        }
        self.display.request_redraw(true);
    }

    fn set_onion_depth(&self, depth: usize) {
        if depth > MAX_ONION_DEPTH {
            tracing::warn!(depth, max = MAX_ONION_DEPTH, "Onion depth clamped");
        }
        self.lock_state().onion_depth = depth.min(MAX_ONION_DEPTH);
        self.display.request_redraw(false);
    }

    fn cycle_onion_depth(&self) -> usize {
        let depth = {
            let mut state = self.lock_state();
            state.onion_depth = (state.onion_depth + 1) % (MAX_ONION_DEPTH + 1);
            state.onion_depth
        };
        self.messages
            .upsert("onion", format!("Onion skin layers: {}", depth));
        self.display.request_redraw(false);
        depth
    }

    fn adjust_device_control(&self, name: &str, delta: i64) {
        let result = {
            let _device = self.lock_device();
            self.camera.set_control(name, delta)
        };

        match result {
            Ok(value) => {
                tracing::debug!(control = name, value, "Control adjusted");
                self.messages
                    .upsert(name, format!("{} set to: {}", name, value));
            }
            Err(SessionError::UnknownControl(control)) => {
                let first = self.lock_state().reported_controls.insert(control.clone());
                if first {
                    tracing::warn!(control = %control, "Camera does not provide this control");
                }
            }
            Err(e) => {
                tracing::error!(control = name, error = %e, "Control adjustment failed");
                self.messages.add_unique(format!("Camera error: {}", e));
            }
        }
    }

    fn start_welcome(self: &Arc<Self>, hint: &str) {
        let lines = [
            "Welcome!".to_string(),
            format!("Camera: {}", self.camera.name()),
            hint.to_string(),
        ];
        self.messages.upsert(WELCOME_KEY, lines[0].clone());

        let bus = self.messages.clone();
        let mut next = 1;
        let timer = TimerHandle::repeating("welcome", WELCOME_INTERVAL, move || {
            match lines.get(next) {
                Some(line) => {
                    bus.upsert(WELCOME_KEY, line.clone());
                    next += 1;
                    ControlFlow::Continue(())
                }
                None => ControlFlow::Break(()),
            }
        });
        self.lock_state().welcome = Some(timer);
    }

    fn view(&self) -> ViewState {
        let view = {
            let state = self.lock_state();
            let mode = state.mode.current();
            let onion_frames = if mode == Mode::LiveView {
                state.cache.onion_frames(state.onion_depth)
            } else {
                Vec::new()
            };
            ViewState {
                mode,
                live_frame: state.live_frame.clone(),
                onion_frames,
                active_frame: state.cache.active_frame().cloned(),
                active_index: state.cache.active_index(),
                cached_frames: state.cache.len(),
                onion_depth: state.onion_depth,
                messages: None,
            }
        };
        ViewState {
            messages: self.messages.currently_visible(),
            ..view
        }
    }

    fn shutdown(&self) {
        let _device = self.lock_device();
        {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.playback = None;
            state.welcome = None;
            if let Some(job) = state.job.as_mut() {
                job.abort(CaptureOutcome::Failed(SessionError::Device(
                    "session shut down".into(),
                )));
            }
        }
        self.snapshot_done.notify_all();
        let finished = self.lock_store().current_batch();

        self.camera.stop();
        self.messages.dispose();

        if let Some(batch) = finished.filter(|b| b.frame_count > 0) {
            self.plugins.batch_finished(batch);
        }
        self.plugins.shutdown();
        tracing::info!("Session shut down");
    }
}

/// Drives one capture session.
///
/// Every method may be called from any thread. Requests that would clash
/// with a capture in progress are ignored.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(parts: SessionParts) -> Self {
        let SessionParts {
            config,
            camera,
            store,
            encoder,
            display,
            messages,
            plugins,
            clock,
        } = parts;

        let state = SessionState {
            mode: ModeStateMachine::new(),
            cache: RecentFrameCache::new(config.image_cache_size),
            live_frame: None,
            job: None,
            playback: None,
            playback_generation: 0,
            saved_controls: None,
            onion_depth: config.onion_depth.min(MAX_ONION_DEPTH),
            reported_controls: HashSet::new(),
            welcome: None,
            closed: false,
        };

        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                store: Mutex::new(store),
                snapshot_done: Condvar::new(),
                device: Mutex::new(()),
                camera,
                encoder,
                display,
                messages,
                plugins,
                clock,
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        self.shared.lock_state().mode.current()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn messages(&self) -> &MessageBus {
        &self.shared.messages
    }

    /// Begin an asynchronous capture. Returns immediately.
    pub fn request_snapshot(&self) {
        self.shared.request_snapshot();
    }

    /// Switch to (or restart) the live stream.
    pub fn request_live_view(&self) {
        self.shared.request_live_view();
    }

    /// Play the cached frames oldest to newest.
    pub fn request_playback(&self) {
        self.shared.request_playback();
    }

    pub fn show_older(&self) {
        self.shared.browse(true);
    }

    pub fn show_newer(&self) {
        self.shared.browse(false);
    }

    pub fn undo_last_capture(&self) {
        self.shared.undo_last_capture();
    }

    pub fn start_new_batch(&self) {
        self.shared.start_new_batch();
    }

    /// Layers of previous frames drawn over the live view, at most
    /// [`MAX_ONION_DEPTH`].
    pub fn set_onion_depth(&self, depth: usize) {
        self.shared.set_onion_depth(depth);
    }

    pub fn cycle_onion_depth(&self) -> usize {
        self.shared.cycle_onion_depth()
    }

    pub fn adjust_device_control(&self, name: &str, delta: i64) {
        self.shared.adjust_device_control(name, delta);
    }

    /// Rotate a few greeting notices through the bus.
    pub fn welcome(&self, hint: &str) {
        self.shared.start_welcome(hint);
    }

    /// Feed a frame as if the camera had delivered it.
    pub fn on_frame_delivered(&self, frame: Frame) {
        self.shared.on_frame_delivered(frame);
    }

    pub fn on_device_error(&self, error: SessionError) {
        self.shared.on_device_error(error);
    }

    /// The sink a camera stream reports into.
    pub fn frame_sink(&self) -> Arc<dyn FrameSink> {
        self.shared.sink()
    }

    pub fn view(&self) -> ViewState {
        self.shared.view()
    }

    /// Stop timers and the camera, flush the open batch to plugins.
    /// Later requests are ignored.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}
