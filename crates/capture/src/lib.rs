pub mod camera;
pub mod config;
pub mod controls;
pub mod decoder;
pub mod device;
pub mod diagnostics;
pub mod source;

pub use camera::V4lCamera;
pub use config::CameraConfig;
pub use controls::{ControlInfo, ControlTable, control_key};
pub use decoder::{Decoded, FrameDecoder, MjpegDecoder, YuyvDecoder};
pub use device::PixelFormat;
