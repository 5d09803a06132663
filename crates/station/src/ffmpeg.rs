//! Encodes a finished batch into an MP4 with the `ffmpeg` executable.

use session::{BatchInfo, MessageBus, Plugin, PluginContext, PluginSettings, SessionError};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct FfmpegPlugin {
    program: String,
    output_dir: PathBuf,
    pattern: String,
    fps: u32,
    messages: MessageBus,
    running: Mutex<HashMap<u32, Child>>,
    stopped: AtomicBool,
}

/// Registration-table entry for the `ffmpeg` kind.
pub fn factory(
    settings: &PluginSettings,
    context: &PluginContext,
) -> Result<Box<dyn Plugin>, SessionError> {
    let output_dir = PathBuf::from(settings.option("output").unwrap_or("."));
    if output_dir.exists() && !output_dir.is_dir() {
        return Err(SessionError::Configuration(format!(
            "ffmpeg output {} is not a directory",
            output_dir.display()
        )));
    }

    Ok(Box::new(FfmpegPlugin {
        program: settings.option("program").unwrap_or("ffmpeg").to_string(),
        output_dir,
        pattern: settings.option("pattern").unwrap_or("img-*.jpg").to_string(),
        fps: context.playback_fps,
        messages: context.messages.clone(),
        running: Mutex::new(HashMap::new()),
        stopped: AtomicBool::new(false),
    }))
}

/// `anim-<trailing digits of the batch label>.mp4`
pub fn output_name(label: &str) -> String {
    let digits = label.len()
        - label
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .count();
    let suffix = &label[digits..];
    if suffix.is_empty() {
        format!("anim-{}.mp4", label)
    } else {
        format!("anim-{}.mp4", suffix)
    }
}

impl FfmpegPlugin {
    fn lock_running(&self) -> MutexGuard<'_, HashMap<u32, Child>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn command(&self, batch_dir: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .current_dir(batch_dir)
            .arg("-y")
            .args(["-loglevel", "error"])
            .args(["-framerate", &self.fps.to_string()])
            .args(["-pattern_type", "glob", "-i", &self.pattern])
            .args(["-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        command
    }

    /// Spawn and wait without holding the lock, so `shutdown` can kill it.
    fn run(&self, mut command: Command) -> io::Result<ExitStatus> {
        let child = command.spawn()?;
        let pid = child.id();
        self.lock_running().insert(pid, child);

        loop {
            {
                let mut running = self.lock_running();
                let Some(child) = running.get_mut(&pid) else {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "encoder stopped"));
                };
                if let Some(status) = child.try_wait()? {
                    running.remove(&pid);
                    return Ok(status);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Plugin for FfmpegPlugin {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn batch_finished(&self, batch: &BatchInfo) {
        if self.stopped.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            tracing::error!(dir = %self.output_dir.display(), "Cannot create output directory: {}", e);
            return;
        }

        let name = output_name(&batch.label);
        let output = std::path::absolute(self.output_dir.join(&name))
            .unwrap_or_else(|_| self.output_dir.join(&name));

        tracing::info!(batch = %batch.label, output = %output.display(), frames = batch.frame_count, "Encoding animation");
        match self.run(self.command(&batch.path, &output)) {
            Ok(status) if status.success() => {
                let message = format!("Animation {} was composed.", name);
                tracing::info!("{}", message);
                self.messages.add_unique(message);
            }
            Ok(status) => {
                tracing::error!(batch = %batch.label, %status, "ffmpeg failed");
                self.messages.add_unique(format!("Failed to write {}", name));
            }
            Err(e) => {
                tracing::error!(batch = %batch.label, "Could not run ffmpeg: {}", e);
                self.messages.add_unique(format!("Failed to write {}", name));
            }
        }
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        for (pid, mut child) in self.lock_running().drain() {
            tracing::warn!(pid, "Stopping unfinished ffmpeg");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::{MessageListener, SystemClock};
    use std::sync::Arc;

    struct Quiet;

    impl MessageListener for Quiet {
        fn messages_changed(&self, _visible: &[String]) {}
        fn messages_cleared(&self) {}
    }

    fn context() -> PluginContext {
        PluginContext {
            messages: MessageBus::new(Arc::new(Quiet), Arc::new(SystemClock)),
            playback_fps: 12,
        }
    }

    #[test]
    fn output_name_uses_batch_number() {
        assert_eq!(output_name("batch-07"), "anim-07.mp4");
        assert_eq!(output_name("scene-123"), "anim-123.mp4");
        assert_eq!(output_name("takes"), "anim-takes.mp4");
    }

    #[test]
    fn failed_encoder_is_reported() {
        let settings = PluginSettings::new("ffmpeg")
            .with_option("program", "/nonexistent/ffmpeg")
            .with_option("output", std::env::temp_dir().to_string_lossy());
        let ctx = context();
        let plugin = factory(&settings, &ctx).unwrap();

        plugin.batch_finished(&BatchInfo {
            label: "batch-01".into(),
            path: std::env::temp_dir(),
            frame_count: 3,
        });

        let visible = ctx.messages.currently_visible().unwrap();
        assert_eq!(visible, vec!["Failed to write anim-01.mp4".to_string()]);
    }

    #[test]
    fn rejects_file_as_output_dir() {
        let file = std::env::current_exe().unwrap();
        let settings =
            PluginSettings::new("ffmpeg").with_option("output", file.to_string_lossy());
        assert!(matches!(
            factory(&settings, &context()),
            Err(SessionError::Configuration(_))
        ));
    }
}
