//! Device listings for the command line.

use crate::controls::{ControlInfo, ControlTable, control_key};
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use v4l::Device;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub index: usize,
    pub path: PathBuf,
    pub card: String,
    pub driver: String,
}

impl fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path.display(), self.card, self.driver)
    }
}

#[derive(Debug, Clone)]
pub struct FormatReport {
    pub fourcc: String,
    pub description: String,
    pub sizes: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub card: String,
    pub driver: String,
    pub formats: Vec<FormatReport>,
    pub controls: Vec<ControlInfo>,
}

/// Capture-capable nodes, ordered by index. Unreadable nodes are skipped.
pub fn list_devices() -> Vec<DeviceSummary> {
    let mut devices: Vec<DeviceSummary> = v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let caps = Device::with_path(node.path())
                .and_then(|dev| dev.query_caps())
                .inspect_err(|e| tracing::debug!("Skipping {}: {}", node.path().display(), e))
                .ok()?;
            caps.capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                .then(|| DeviceSummary {
                    index: node.index(),
                    path: node.path().to_path_buf(),
                    card: caps.card,
                    driver: caps.driver,
                })
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    devices
}

pub fn describe(path: &Path) -> Result<DeviceReport> {
    let dev = Device::with_path(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let caps = dev.query_caps()?;

    let mut formats = Vec::new();
    for fmt in dev.enum_formats().context("Failed to query formats")? {
        let mut sizes = Vec::new();
        for framesize in dev.enum_framesizes(fmt.fourcc)? {
            for discrete in framesize.size.to_discrete() {
                sizes.push((discrete.width, discrete.height));
            }
        }
        formats.push(FormatReport {
            fourcc: fmt.fourcc.to_string(),
            description: fmt.description,
            sizes,
        });
    }

    let controls = match dev.query_controls() {
        Ok(descriptions) => ControlTable::from(descriptions.as_slice())
            .iter()
            .cloned()
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to query controls: {}", e);
            Vec::new()
        }
    };

    Ok(DeviceReport {
        card: caps.card,
        driver: caps.driver,
        formats,
        controls,
    })
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.card, self.driver)?;
        writeln!(f, "Formats:")?;
        for format in &self.formats {
            let sizes: Vec<String> = format
                .sizes
                .iter()
                .map(|(w, h)| format!("{}x{}", w, h))
                .collect();
            writeln!(f, "  {} {}: {}", format.fourcc, format.description, sizes.join(" "))?;
        }
        writeln!(f, "Controls:")?;
        for control in &self.controls {
            writeln!(
                f,
                "  {:<32} {} [{}..{}] step {} default {}",
                control_key(&control.name),
                control.name,
                control.minimum,
                control.maximum,
                control.step,
                control.default
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_control_keys() {
        let report = DeviceReport {
            card: "Test Cam".into(),
            driver: "uvcvideo".into(),
            formats: vec![FormatReport {
                fourcc: "MJPG".into(),
                description: "Motion-JPEG".into(),
                sizes: vec![(1280, 720), (640, 480)],
            }],
            controls: vec![ControlInfo {
                id: 1,
                name: "Focus (absolute)".into(),
                minimum: 0,
                maximum: 255,
                step: 5,
                default: 0,
                boolean: false,
            }],
        };

        let text = report.to_string();
        assert!(text.starts_with("Test Cam (uvcvideo)"));
        assert!(text.contains("MJPG Motion-JPEG: 1280x720 640x480"));
        assert!(text.contains("focus_absolute"));
        assert!(text.contains("[0..255] step 5"));
    }
}
