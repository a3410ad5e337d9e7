use super::stream::{BoxError, DataStream, StreamError};
use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Raw, row-major interleaved frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self, StreamError> {
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(StreamError::InvalidImage {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Frame filled with a single byte value
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            pixels: vec![value; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

/// External video/image decoder
pub trait FrameSource {
    fn frame_count(&self) -> usize;

    fn decode(&mut self, index: usize) -> Result<Image, BoxError>;
}

pub type ImageDataStream = DataStream<Image>;

impl DataStream<Image> {
    /// Decode every frame of `source`, stamping frame `i` at `start + i / fps`
    pub fn from_frames<S>(
        name: impl Into<String>,
        source: &mut S,
        start: Timestamp,
        fps: f64,
    ) -> Result<Self, StreamError>
    where
        S: FrameSource + ?Sized,
    {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(StreamError::InvalidFrameRate(fps));
        }

        let mut stream = DataStream::new(name);
        let frame_period_us = 1_000_000.0 / fps;
        for index in 0..source.frame_count() {
            let frame = source
                .decode(index)
                .map_err(|err| StreamError::Decode { index, source: err })?;
            let offset = (index as f64 * frame_period_us).round() as i64;
            stream.append(Timestamp::from_micros(start.as_micros() + offset), frame);
        }

        tracing::debug!(
            stream = stream.name(),
            frames = stream.len(),
            fps,
            "decoded frame source"
        );
        Ok(stream)
    }

    /// `(width, height)` of the first frame
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.first().map(|sample| sample.data.size())
    }
}
