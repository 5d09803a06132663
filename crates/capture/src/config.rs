use anyhow::{Context, Result, anyhow};
use common::{env_list, env_string};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_path: PathBuf,
    /// Controls carried across stream restarts, by name.
    pub preserve_controls: Vec<String>,
    /// Applied once when the device is opened.
    pub manual_controls: Vec<(String, i64)>,
}

impl CameraConfig {
    pub fn from_env() -> Result<Self> {
        let manual_controls = parse_manual_controls(&env_string("MANUAL_CONTROLS", ""))
            .context("Invalid MANUAL_CONTROLS")?;

        Ok(Self {
            device_path: PathBuf::from(env_string("VIDEO_DEVICE", "/dev/video0")),
            preserve_controls: env_list("PRESERVE_CONTROLS"),
            manual_controls,
        })
    }
}

/// Parse `name=value;name=value`. Blank items are skipped.
pub fn parse_manual_controls(raw: &str) -> Result<Vec<(String, i64)>> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, value) = item
                .split_once('=')
                .ok_or_else(|| anyhow!("expected name=value, got '{}'", item))?;
            let value = value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("control '{}' has a non-integer value", name.trim()))?;
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn parses_controls_with_spaces_in_names() {
        let parsed = parse_manual_controls("Focus, Auto=0; Focus (absolute) = 40;").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("Focus, Auto".to_string(), 0),
                ("Focus (absolute)".to_string(), 40)
            ]
        );
    }

    #[test]
    fn rejects_malformed_controls() {
        assert!(parse_manual_controls("brightness").is_err());
        assert!(parse_manual_controls("brightness=bright").is_err());
        assert!(parse_manual_controls("").unwrap().is_empty());
    }

    // SAFETY (all tests): env mutation is serialized through `#[serial]`.

    #[test]
    #[serial]
    fn reads_device_and_controls_from_env() {
        unsafe {
            env::set_var("VIDEO_DEVICE", "/dev/video2");
            env::set_var("PRESERVE_CONTROLS", "Focus (absolute);Zoom, Absolute");
            env::set_var("MANUAL_CONTROLS", "exposure_auto=1");
        }

        let config = CameraConfig::from_env().unwrap();
        assert_eq!(config.device_path, PathBuf::from("/dev/video2"));
        assert_eq!(config.preserve_controls.len(), 2);
        assert_eq!(config.manual_controls, vec![("exposure_auto".to_string(), 1)]);

        unsafe {
            env::remove_var("VIDEO_DEVICE");
            env::remove_var("PRESERVE_CONTROLS");
            env::remove_var("MANUAL_CONTROLS");
        }
    }

    #[test]
    #[serial]
    fn bad_manual_controls_fail_startup() {
        unsafe { env::set_var("MANUAL_CONTROLS", "gain") };
        assert!(CameraConfig::from_env().is_err());
        unsafe { env::remove_var("MANUAL_CONTROLS") };
    }
}
