use session::{Display, Mode, SessionController, ViewState};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

const RENDER_POLL: Duration = Duration::from_millis(200);

/// Prints a one-line status whenever the view changes.
///
/// Redraw requests arrive from stream, timer and worker threads; a render
/// loop on its own thread coalesces them and reads the view.
#[derive(Default)]
pub struct TerminalDisplay {
    pending: Mutex<bool>,
    wake: Condvar,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a redraw request. False on timeout.
    fn wait_request(&self, timeout: Duration) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let (mut pending, _) = self
            .wake
            .wait_timeout_while(pending, timeout, |requested| !*requested)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *pending)
    }

    pub fn render_loop(&self, controller: &SessionController, shutdown: &AtomicBool) {
        let mut last = String::new();
        while !shutdown.load(Ordering::Relaxed) {
            if !self.wait_request(RENDER_POLL) {
                continue;
            }
            let line = status_line(&controller.view());
            if line != last {
                println!("{}", line);
                last = line;
            }
        }
    }
}

impl Display for TerminalDisplay {
    fn request_redraw(&self, _invalidate_layout: bool) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.wake.notify_one();
    }

    fn capture_completed(&self) {
        let mut out = io::stdout();
        let _ = out.write_all(b"\x07").and_then(|()| out.flush());
    }
}

pub fn status_line(view: &ViewState) -> String {
    let mut line = match view.mode {
        Mode::LiveView => match &view.live_frame {
            Some(frame) => format!("[LIVE {}x{}]", frame.width(), frame.height()),
            None => "[LIVE]".to_string(),
        },
        Mode::Capturing => "[CAPTURING]".to_string(),
        Mode::Playback => match view.active_index {
            Some(index) => format!("[PLAYBACK {}/{}]", index + 1, view.cached_frames),
            None => "[PLAYBACK]".to_string(),
        },
    };

    if view.mode == Mode::LiveView {
        line.push_str(&format!(
            " onion {} ({} cached)",
            view.onion_frames.len(),
            view.cached_frames
        ));
    }

    if let Some(messages) = &view.messages {
        for message in messages {
            line.push_str(" | ");
            line.push_str(message);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::Frame;
    use std::time::Instant;

    fn view(mode: Mode) -> ViewState {
        ViewState {
            mode,
            live_frame: None,
            onion_frames: Vec::new(),
            active_frame: None,
            active_index: None,
            cached_frames: 0,
            onion_depth: 1,
            messages: None,
        }
    }

    #[test]
    fn live_line_shows_frame_and_onion() {
        let frame = Frame::new(vec![0u8; 12], 2, 2, Instant::now());
        let state = ViewState {
            live_frame: Some(frame.clone()),
            onion_frames: vec![frame],
            cached_frames: 3,
            messages: Some(vec!["Welcome!".into()]),
            ..view(Mode::LiveView)
        };
        assert_eq!(status_line(&state), "[LIVE 2x2] onion 1 (3 cached) | Welcome!");
    }

    #[test]
    fn playback_line_counts_from_one() {
        let state = ViewState {
            active_index: Some(1),
            cached_frames: 4,
            ..view(Mode::Playback)
        };
        assert_eq!(status_line(&state), "[PLAYBACK 2/4]");
    }

    #[test]
    fn redraw_requests_coalesce() {
        let display = TerminalDisplay::new();
        display.request_redraw(false);
        display.request_redraw(true);
        assert!(display.wait_request(Duration::from_millis(10)));
        assert!(!display.wait_request(Duration::from_millis(10)));
    }
}
