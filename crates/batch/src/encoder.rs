use common::span;
use image::{ExtendedColorType, ImageEncoder, codecs::jpeg};
use session::{Frame, FrameEncoder, SessionError};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes RGB8 frames as baseline JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl FrameEncoder for JpegEncoder {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), SessionError> {
        let _s = span!("encode_jpeg");

        let expected = frame.width() as usize * frame.height() as usize * 3;
        if frame.pixels().len() != expected {
            return Err(SessionError::Persistence(format!(
                "frame holds {} bytes, expected {} for {}x{}",
                frame.pixels().len(),
                expected,
                frame.width(),
                frame.height()
            )));
        }

        let file = File::create(path)
            .map_err(|e| SessionError::Persistence(format!("{}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        jpeg::JpegEncoder::new_with_quality(&mut writer, self.quality)
            .write_image(
                frame.pixels(),
                frame.width(),
                frame.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| SessionError::Persistence(format!("{}: {}", path.display(), e)))?;

        writer
            .into_inner()
            .map_err(|e| SessionError::Persistence(format!("{}: {}", path.display(), e.error())))?
            .sync_all()?;

        tracing::debug!(file = %path.display(), quality = self.quality, "Frame written");
        Ok(())
    }
}
