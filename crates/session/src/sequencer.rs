//! The snapshot sequence: pause the device, wait out a settle delay against
//! the asynchronous frame feed, keep exactly one frame, then restore.

use crate::collaborators::BatchInfo;
use crate::config::SessionConfig;
use crate::controller::Shared;
use crate::errors::SessionError;
use crate::frame::{Controls, Frame};
use crate::mode::Mode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Message key of the progress notice for the running capture.
pub const CAPTURE_KEY: &str = "capture";

#[derive(Debug)]
pub enum CaptureOutcome {
    Saved { name: String },
    Failed(SessionError),
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    /// Not the frame to keep (too early, or one was already taken).
    Discard,
    /// The caller now owns persisting this frame and must `complete` the job.
    Keep,
}

/// State of one in-flight capture. Lives under the session lock.
#[derive(Debug)]
pub struct SnapshotJob {
    was_live: bool,
    saved_controls: Option<Controls>,
    effect_deadline: Instant,
    claimed: bool,
    outcome: Option<CaptureOutcome>,
}

impl SnapshotJob {
    /// A live start only needs the settle delay; a cold start gives the
    /// operator the longer idle delay to step away.
    pub fn begin(
        was_live: bool,
        saved_controls: Option<Controls>,
        now: Instant,
        config: &SessionConfig,
    ) -> Self {
        let delay = if was_live {
            config.pre_snapshot_delay
        } else {
            config.idle_snapshot_delay
        };
        Self {
            was_live,
            saved_controls,
            effect_deadline: now + delay,
            claimed: false,
            outcome: None,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn was_live(&self) -> bool {
        self.was_live
    }

    pub fn effect_deadline(&self) -> Instant {
        self.effect_deadline
    }

    pub fn saved_controls(&self) -> Option<&Controls> {
        self.saved_controls.as_ref()
    }

    /// Decide the fate of a frame arriving at `now`.
    ///
    /// At most one call ever returns [`FrameDecision::Keep`].
    pub fn offer(&mut self, now: Instant) -> FrameDecision {
        if !self.in_progress() || self.claimed || now < self.effect_deadline {
            return FrameDecision::Discard;
        }
        self.claimed = true;
        FrameDecision::Keep
    }

    /// Record the result. Only the first outcome sticks.
    pub fn complete(&mut self, outcome: CaptureOutcome) -> bool {
        if !self.in_progress() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    /// Give up unless a frame is already being persisted.
    pub fn abort(&mut self, outcome: CaptureOutcome) -> bool {
        if self.claimed {
            return false;
        }
        self.complete(outcome)
    }

    fn take_outcome(&mut self) -> Option<CaptureOutcome> {
        self.outcome.take()
    }
}

/// Where the kept frame goes, decided under the session lock.
struct Reservation {
    path: PathBuf,
    name: String,
    opened: Option<BatchInfo>,
}

impl Shared {
    /// Pick the output file, opening a batch first if none is open. Only
    /// the store lock is held, never the session lock.
    fn reserve_output(&self) -> Result<Reservation, SessionError> {
        let mut store = self.lock_store();
        let opened = if store.has_open_batch() {
            None
        } else {
            Some(self.open_batch(&mut **store)?)
        };
        let path = store.next_output_path()?;
        let name = store.display_name(&path);
        Ok(Reservation { path, name, opened })
    }

    pub(crate) fn request_snapshot(self: &Arc<Self>) {
        let previous_mode = {
            let mut state = self.lock_state();
            if state.closed {
                return;
            }
            let previous = state.mode.current();
            if !state.transition(Mode::Capturing) {
                tracing::debug!("Snapshot already in progress, ignoring request");
                return;
            }
            previous
        };

        self.messages.upsert(CAPTURE_KEY, "Capturing...");

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("snapshot".into())
            .spawn(move || shared.run_snapshot(previous_mode));

        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to spawn snapshot worker");
            self.lock_state().transition(previous_mode);
            self.messages
                .replace(CAPTURE_KEY, format!("Capture failed: {}", e));
        }
    }

    fn run_snapshot(self: &Arc<Self>, previous_mode: Mode) {
        let _span = tracing::info_span!("snapshot").entered();

        {
            let _device = self.lock_device();
            if let Err(e) = self.begin_snapshot() {
                tracing::error!(error = %e, "Could not start still stream");
                if let Some(job) = self.lock_state().job.as_mut() {
                    job.complete(CaptureOutcome::Failed(e));
                }
            }
        }

        self.await_outcome();

        let _device = self.lock_device();
        self.camera.stop();
        let job = self.lock_state().job.take();
        self.finish_snapshot(job, previous_mode);
    }

    /// Remember the live state, stop it and start the still stream.
    fn begin_snapshot(self: &Arc<Self>) -> Result<(), SessionError> {
        let was_live = self.camera.is_streaming();
        let saved_controls = if was_live {
            let controls = self.camera.save_controls();
            self.camera.stop();
            Some(controls)
        } else {
            None
        };

        let job = SnapshotJob::begin(
            was_live,
            saved_controls.clone(),
            self.clock.now(),
            &self.config,
        );
        tracing::info!(
            was_live,
            delay_ms = (job.effect_deadline() - self.clock.now()).as_millis() as u64,
            "Snapshot armed"
        );
        self.lock_state().job = Some(job);

        self.camera
            .start_still_stream(self.config.still_image_resolution, self.sink())?;
        if let Some(controls) = &saved_controls {
            self.camera.load_controls(controls);
        }
        Ok(())
    }

    /// Block until the frame path or an abort settles the job.
    fn await_outcome(&self) {
        let limit = self
            .config
            .snapshot_timeout
            .map(|timeout| (timeout, Instant::now() + timeout));

        let mut state = self.lock_state();
        loop {
            match state.job.as_ref() {
                Some(job) if job.in_progress() => {}
                _ => return,
            }

            let Some((timeout, until)) = limit else {
                state = self.wait_snapshot(state, None);
                continue;
            };

            let now = Instant::now();
            if now < until {
                state = self.wait_snapshot(state, Some(until - now));
                continue;
            }

            let timed_out = state
                .job
                .as_mut()
                .is_some_and(|job| job.abort(CaptureOutcome::TimedOut(timeout)));
            if timed_out {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Snapshot timed out");
                return;
            }
            // A frame is being written; that finishes on its own.
            state = self.wait_snapshot(state, None);
        }
    }

    /// Restore the device and settle on a resting mode once the still
    /// stream is stopped.
    fn finish_snapshot(self: &Arc<Self>, job: Option<SnapshotJob>, previous_mode: Mode) {
        let (was_live, saved_controls, outcome) = match job {
            Some(mut job) => {
                let outcome = job.take_outcome();
                (job.was_live, job.saved_controls, outcome)
            }
            None => (false, None, None),
        };
        let outcome = outcome.unwrap_or_else(|| {
            CaptureOutcome::Failed(SessionError::Device("capture ended without a frame".into()))
        });

        let saved = match &outcome {
            CaptureOutcome::Saved { name } => {
                tracing::info!(file = %name, "Snapshot complete");
                true
            }
            CaptureOutcome::Failed(e) => {
                tracing::error!(error = %e, "Snapshot failed");
                self.messages
                    .replace(CAPTURE_KEY, format!("Capture failed: {}", e));
                false
            }
            CaptureOutcome::TimedOut(after) => {
                tracing::warn!(error = %SessionError::SnapshotTimeout(*after), "Snapshot aborted");
                self.messages.replace(
                    CAPTURE_KEY,
                    format!("Capture timed out after {:.1}s", after.as_secs_f64()),
                );
                false
            }
        };

        let closed = self.lock_state().closed;
        if was_live && !closed {
            match self
                .camera
                .start_live_stream(self.config.live_view_resolution, self.sink())
            {
                Ok(()) => {
                    if let Some(controls) = &saved_controls {
                        self.camera.load_controls(controls);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Could not restart live view");
                    self.messages.add_unique(format!("Camera error: {}", e));
                }
            }
        }

        let resting = match (was_live, saved) {
            (true, _) => Mode::LiveView,
            (false, true) => Mode::Playback,
            (false, false) => previous_mode,
        };
        {
            let mut state = self.lock_state();
            state.transition(resting);
            if resting == Mode::Playback {
                state.cache.show_newest();
            }
            if saved_controls.is_some() {
                state.saved_controls = saved_controls;
            }
        }

        self.display.request_redraw(!was_live);
        if self.config.enable_beep && !closed {
            self.display.capture_completed();
        }
    }

    /// The frame-delivery path.
    pub(crate) fn on_frame_delivered(&self, frame: Frame) {
        let now = self.clock.now();
        {
            let mut state = self.lock_state();
            let decision = state.job.as_mut().map(|job| job.offer(now));
            match decision {
                None => {
                    state.live_frame = Some(frame);
                    drop(state);
                    self.display.request_redraw(false);
                    return;
                }
                Some(FrameDecision::Discard) => return,
                Some(FrameDecision::Keep) => {}
            }
        }

        let reservation = match self.reserve_output() {
            Ok(reservation) => reservation,
            Err(e) => {
                self.settle_job(CaptureOutcome::Failed(e));
                return;
            }
        };

        if let Some(batch) = &reservation.opened {
            tracing::info!(batch = %batch.label, "Opened batch for first capture");
            self.messages.add_unique(format!("New batch: {}", batch.label));
        }

        let written = {
            let _span = tracing::info_span!("persist_frame", file = %reservation.name).entered();
            self.encoder.write(&reservation.path, &frame)
        };

        let kept = written.and_then(|()| self.commit_frame(&reservation.path, frame));
        match kept {
            Ok(()) => {
                let name = reservation.name;
                self.messages
                    .replace(CAPTURE_KEY, format!("Frame saved to: {}", name));
                self.settle_job(CaptureOutcome::Saved { name });
            }
            Err(e) => self.settle_job(CaptureOutcome::Failed(e)),
        }
    }

    /// Record a written file in the store and its frame in the cache, as
    /// one step relative to undo. A failed write never reaches this, so the
    /// store only lists files that exist.
    fn commit_frame(&self, path: &Path, frame: Frame) -> Result<(), SessionError> {
        let mut store = self.lock_store();
        store.commit_output(path)?;
        let mut state = self.lock_state();
        state.cache.push(frame);
        state.cache.show_newest();
        Ok(())
    }

    fn settle_job(&self, outcome: CaptureOutcome) {
        if let Some(job) = self.lock_state().job.as_mut() {
            job.complete(outcome);
        }
        self.snapshot_done.notify_all();
    }

    pub(crate) fn on_device_error(&self, error: SessionError) {
        tracing::error!(error = %error, "Camera fault");
        let text = format!("Camera error: {}", error);
        let aborted = {
            let mut state = self.lock_state();
            state
                .job
                .as_mut()
                .is_some_and(|job| job.abort(CaptureOutcome::Failed(error)))
        };
        if aborted {
            self.snapshot_done.notify_all();
        } else {
            self.messages.add_unique(text);
        }
    }
}
