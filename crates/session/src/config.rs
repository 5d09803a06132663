use crate::controller::MAX_ONION_DEPTH;
use crate::frame::Resolution;
use common::{env_flag, env_list, env_or};
use std::time::Duration;

/// Idle snapshots wait this long so the operator can step out of frame.
pub const IDLE_SNAPSHOT_DELAY_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub live_view_resolution: Resolution,
    pub still_image_resolution: Resolution,
    /// Settle time after stopping the live view before a frame is kept.
    pub pre_snapshot_delay: Duration,
    pub idle_snapshot_delay: Duration,
    /// `None` waits forever for a post-deadline frame.
    pub snapshot_timeout: Option<Duration>,
    pub image_cache_size: usize,
    pub playback_fps: u32,
    pub enable_beep: bool,
    pub return_to_live_view_after_playback: bool,
    pub preserve_controls: Vec<String>,
    /// Onion skin layers shown at startup, at most [`MAX_ONION_DEPTH`].
    pub onion_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live_view_resolution: Resolution::new(960, 544),
            still_image_resolution: Resolution::new(1280, 720),
            pre_snapshot_delay: Duration::from_millis(1000),
            idle_snapshot_delay: Duration::from_millis(IDLE_SNAPSHOT_DELAY_MS),
            snapshot_timeout: Some(Duration::from_millis(15_000)),
            image_cache_size: 10,
            playback_fps: 20,
            enable_beep: true,
            return_to_live_view_after_playback: false,
            preserve_controls: Vec::new(),
            onion_depth: MAX_ONION_DEPTH,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let snapshot_timeout_ms = env_or(
            "SNAPSHOT_TIMEOUT_MS",
            defaults.snapshot_timeout.map_or(0, |d| d.as_millis() as u64),
        );

        Self {
            live_view_resolution: env_or("LIVE_VIEW_RESOLUTION", defaults.live_view_resolution),
            still_image_resolution: env_or(
                "STILL_IMAGE_RESOLUTION",
                defaults.still_image_resolution,
            ),
            pre_snapshot_delay: Duration::from_millis(env_or("STILL_IMAGE_DELAY_MS", 1000)),
            idle_snapshot_delay: Duration::from_millis(env_or(
                "IDLE_SNAPSHOT_DELAY_MS",
                IDLE_SNAPSHOT_DELAY_MS,
            )),
            snapshot_timeout: (snapshot_timeout_ms > 0)
                .then(|| Duration::from_millis(snapshot_timeout_ms)),
            image_cache_size: env_or("IMAGE_CACHE_SIZE", defaults.image_cache_size).max(1),
            playback_fps: env_or("PLAYBACK_FPS", defaults.playback_fps).clamp(1, 1000),
            enable_beep: env_flag("ENABLE_BEEP", defaults.enable_beep),
            return_to_live_view_after_playback: env_flag(
                "RETURN_TO_LIVE_VIEW_AFTER_PLAYBACK",
                defaults.return_to_live_view_after_playback,
            ),
            preserve_controls: env_list("PRESERVE_CONTROLS"),
            onion_depth: env_or("ONION_SKIN_LAYERS", defaults.onion_depth).min(MAX_ONION_DEPTH),
        }
    }

    pub fn playback_period(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.playback_fps.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_period_from_fps() {
        let config = SessionConfig {
            playback_fps: 10,
            ..SessionConfig::default()
        };
        assert_eq!(config.playback_period(), Duration::from_millis(100));

        let config = SessionConfig {
            playback_fps: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.playback_period(), Duration::from_millis(1000));
    }

    #[test]
    fn defaults_match_station_setup() {
        let config = SessionConfig::default();
        assert_eq!(config.idle_snapshot_delay, Duration::from_secs(3));
        assert_eq!(config.pre_snapshot_delay, Duration::from_secs(1));
        assert_eq!(config.image_cache_size, 10);
        assert_eq!(config.playback_fps, 20);
        assert!(config.enable_beep);
        assert!(!config.return_to_live_view_after_playback);
        assert_eq!(config.onion_depth, 2);
    }
}
