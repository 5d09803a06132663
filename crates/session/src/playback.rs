//! Timed stepping through the cached frames.

use crate::controller::Shared;
use crate::mode::Mode;
use crate::timer::TimerHandle;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

/// A running playback. Dropping it stops the ticks.
#[derive(Debug)]
pub struct PlaybackRun {
    generation: u64,
    _timer: TimerHandle,
}

impl Shared {
    pub(crate) fn request_playback(self: &Arc<Self>) {
        let _device = self.lock_device();
        let leaving_live = {
            let state = self.lock_state();
            if state.closed {
                return;
            }
            match state.mode.current() {
                Mode::Capturing => {
                    tracing::debug!("Capture in progress, playback ignored");
                    return;
                }
                Mode::Playback if state.playback.is_some() => {
                    tracing::debug!("Playback already running");
                    return;
                }
                mode => {
                    if state.cache.is_empty() {
                        drop(state);
                        self.messages.add_unique("Nothing to play back.");
                        return;
                    }
                    mode == Mode::LiveView
                }
            }
        };

        if leaving_live {
            self.pause_live();
        }

        {
            let mut state = self.lock_state();
            state.transition(Mode::Playback);
            state.cache.set_active(0);

            state.playback_generation += 1;
            let generation = state.playback_generation;
            let shared = Arc::downgrade(self);
            let timer = TimerHandle::repeating(
                "playback",
                self.config.playback_period(),
                move || playback_tick(&shared, generation),
            );
            state.playback = Some(PlaybackRun {
                generation,
                _timer: timer,
            });
            tracing::info!(
                frames = state.cache.len(),
                fps = self.config.playback_fps,
                "Playback started"
            );
        }
        self.display.request_redraw(true);
    }
}

fn playback_tick(shared: &Weak<Shared>, generation: u64) -> ControlFlow<()> {
    let Some(shared) = shared.upgrade() else {
        return ControlFlow::Break(());
    };

    let finished = {
        let mut state = shared.lock_state();
        let current = state
            .playback
            .as_ref()
            .is_some_and(|run| run.generation == generation);
        if !current || state.mode.current() != Mode::Playback {
            return ControlFlow::Break(());
        }

        let last = state.cache.len().saturating_sub(1);
        let cursor = state.cache.active_index().unwrap_or(0);
        if cursor < last {
            state.cache.set_active(cursor + 1);
        }
        let finished = state.cache.active_index().is_none_or(|index| index >= last);
        if finished {
            state.playback = None;
        }
        finished
    };

    shared.display.request_redraw(false);
    if !finished {
        return ControlFlow::Continue(());
    }

    tracing::debug!("Playback finished");
    if shared.config.return_to_live_view_after_playback {
        shared.request_live_view();
    }
    ControlFlow::Break(())
}
