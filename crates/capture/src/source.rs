use crate::decoder::FrameDecoder;
use crate::device::StreamFormat;
use anyhow::{Context, Result};
use session::Frame;
use std::time::{Duration, Instant};
use v4l::{
    Device,
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
};

const BUFFER_COUNT: u32 = 4;

/// Number of frames to discard after a stream starts; some drivers hand
/// out frames exposed under the previous settings.
const FLUSH_FRAME_COUNT: usize = 4;

/// Bounds each dequeue so a stop request is noticed on a stalled camera.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct FrameSource<'a> {
    stream: Stream<'a>,
    decoder: Box<dyn FrameDecoder>,
    format: StreamFormat,
}

impl<'a> FrameSource<'a> {
    pub fn new(device: &'a Device, format: StreamFormat) -> Result<Self> {
        let mut stream = Stream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            .context("Failed to create capture stream")?;
        stream.set_timeout(DEQUEUE_TIMEOUT);
        Ok(Self {
            stream,
            decoder: format.pixel_format.decoder()?,
            format,
        })
    }

    pub fn flush(&mut self) -> usize {
        (0..FLUSH_FRAME_COUNT)
            .take_while(|_| self.stream.next().is_ok())
            .count()
    }

    /// Block for the next buffer and decode it.
    pub fn next_frame(&mut self) -> Result<Frame> {
        let (raw, _meta) = self.stream.next().context("Failed to dequeue frame")?;
        let captured_at = Instant::now();
        let decoded = self
            .decoder
            .decode(raw, self.format.width, self.format.height)?;
        Ok(Frame::new(
            decoded.pixels.to_vec(),
            decoded.width,
            decoded.height,
            captured_at,
        ))
    }
}
