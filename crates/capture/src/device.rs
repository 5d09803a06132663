use crate::controls::{ControlTable, write_control};
use crate::decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
use anyhow::{Context, Result, anyhow};
use session::Resolution;
use std::path::{Path, PathBuf};
use v4l::{Device, FourCC, video::Capture};

const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FOURCC_YUYV,
            PixelFormat::Mjpeg => FOURCC_MJPG,
        }
    }

    pub fn decoder(self) -> Result<Box<dyn FrameDecoder>> {
        Ok(match self {
            PixelFormat::Yuyv => Box::new(YuyvDecoder::new()),
            PixelFormat::Mjpeg => Box::new(MjpegDecoder::new()?),
        })
    }
}

/// What the driver actually agreed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

fn find_usable_camera() -> Option<(Device, PathBuf)> {
    v4l::context::enum_devices().into_iter().find_map(|node| {
        let device = Device::with_path(node.path()).ok()?;
        let caps = device.query_caps().ok()?;
        caps.capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            .then(|| (device, node.path().to_path_buf()))
    })
}

/// Open `path`, falling back to the first capture-capable node.
/// Returns the device with the path actually opened.
pub fn open_device(path: &Path) -> Result<(Device, PathBuf)> {
    if let Ok(dev) = Device::with_path(path)
        && dev.query_caps().is_ok()
    {
        return Ok((dev, path.to_path_buf()));
    }

    tracing::debug!(
        "Camera {} busy or missing, scanning alternatives...",
        path.display()
    );

    find_usable_camera().ok_or_else(|| anyhow!("No usable video devices found"))
}

/// Open exactly `path`, used for stream handles once the camera is known.
pub fn open_stream_device(path: &Path) -> Result<Device> {
    Device::with_path(path).with_context(|| format!("Failed to open {}", path.display()))
}

/// Prefer MJPEG at large sizes (USB bandwidth), YUYV otherwise.
fn select_format(device: &Device, resolution: Resolution) -> Result<PixelFormat> {
    let formats = device.enum_formats()?;

    tracing::debug!("Available formats:");
    for fmt in &formats {
        tracing::debug!("  {:?}: {}", fmt.fourcc, fmt.description);
    }

    let has = |fourcc: FourCC| formats.iter().any(|f| f.fourcc == fourcc);
    let large = resolution.width * resolution.height > 640 * 480;

    match (has(FOURCC_YUYV), has(FOURCC_MJPG)) {
        (_, true) if large => Ok(PixelFormat::Mjpeg),
        (true, _) => Ok(PixelFormat::Yuyv),
        (false, true) => Ok(PixelFormat::Mjpeg),
        (false, false) => Err(anyhow!(
            "Camera supports neither YUYV nor MJPEG - available: {:?}",
            formats.iter().map(|f| f.fourcc).collect::<Vec<_>>()
        )),
    }
}

/// Negotiate a capture format close to `resolution`.
pub fn configure_format(device: &Device, resolution: Resolution) -> Result<StreamFormat> {
    let pixel_format = select_format(device, resolution)?;

    let mut format = device.format()?;
    format.fourcc = pixel_format.fourcc();
    format.width = resolution.width;
    format.height = resolution.height;
    let format = device.set_format(&format)?;

    if format.width != resolution.width || format.height != resolution.height {
        tracing::warn!(
            requested = %resolution,
            "Driver chose {}x{} instead",
            format.width,
            format.height
        );
    }

    tracing::info!(
        "Capture format: {}x{} {:?} ({:?})",
        format.width,
        format.height,
        format.fourcc,
        pixel_format
    );

    Ok(StreamFormat {
        width: format.width,
        height: format.height,
        pixel_format,
    })
}

/// Apply configured fixed control values. Failures are logged and skipped.
pub fn apply_manual_controls(device: &Device, table: &ControlTable, controls: &[(String, i64)]) {
    for (name, value) in controls {
        let Some(info) = table.find(name) else {
            tracing::warn!(control = %name, "Manual control not provided by camera");
            continue;
        };
        match write_control(device, info, *value) {
            Ok(()) => tracing::info!(control = %info.name, value, "Manual control applied"),
            Err(e) => tracing::warn!(control = %info.name, "Failed to apply manual control: {}", e),
        }
    }
}
