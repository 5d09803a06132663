use anyhow::{Result, bail};
use common::{span, span_debug};

/// RGB8 pixels borrowed from a decoder's buffer, with their dimensions.
#[derive(Debug, Clone, Copy)]
pub struct Decoded<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// Trait for decoding raw camera frames to RGB.
pub trait FrameDecoder: Send {
    /// Decode raw frame data to RGB (3 bytes per pixel). `width` and
    /// `height` are the negotiated format; self-describing formats may
    /// report their own size instead.
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<Decoded<'_>>;
}

/// YUYV (YUV 4:2:2) decoder.
///
/// YUYV packs 2 pixels in 4 bytes: [Y0, U, Y1, V]
#[derive(Default)]
pub struct YuyvDecoder {
    rgb_buffer: Vec<u8>,
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for YuyvDecoder {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<Decoded<'_>> {
        let _s = span_debug!("decode_yuyv");

        let rgb_size = (width * height * 3) as usize;
        let bytes_per_row = (width * 2) as usize;
        if height == 0 || raw.len() < bytes_per_row * height as usize {
            bail!(
                "YUYV buffer of {} bytes is too small for {}x{}",
                raw.len(),
                width,
                height
            );
        }
        // Drivers may pad rows.
        let stride = raw.len() / height as usize;

        self.rgb_buffer.resize(rgb_size, 0);

        let mut out_idx = 0;
        for row in raw.chunks(stride).take(height as usize) {
            for chunk in row[..bytes_per_row].chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601 fixed-point coefficients (8-bit fraction)
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    self.rgb_buffer[out_idx] = (y + rv).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 1] = (y - gu).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 2] = (y + bu).clamp(0, 255) as u8;
                    out_idx += 3;
                }
            }
        }

        Ok(Decoded {
            pixels: &self.rgb_buffer[..rgb_size],
            width,
            height,
        })
    }
}

/// MJPEG decoder using turbojpeg (libjpeg-turbo)
pub struct MjpegDecoder {
    decompressor: turbojpeg::Decompressor,
    rgb_buffer: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new() -> Result<Self> {
        Ok(Self {
            decompressor: turbojpeg::Decompressor::new()?,
            rgb_buffer: Vec::new(),
        })
    }
}

impl FrameDecoder for MjpegDecoder {
    fn decode(&mut self, raw: &[u8], _width: u32, _height: u32) -> Result<Decoded<'_>> {
        let _s = span!("decode_mjpeg");

        let header = self.decompressor.read_header(raw)?;
        let width = header.width;
        let height = header.height;
        let rgb_size = width * height * 3;

        self.rgb_buffer.resize(rgb_size, 0);

        let output = turbojpeg::Image {
            pixels: &mut self.rgb_buffer[..rgb_size],
            width,
            pitch: width * 3,
            height,
            format: turbojpeg::PixelFormat::RGB,
        };

        self.decompressor.decompress(raw, output)?;

        Ok(Decoded {
            pixels: &self.rgb_buffer[..rgb_size],
            width: width as u32,
            height: height as u32,
        })
    }
}
