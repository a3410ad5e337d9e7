//! On-disk encoding for image frames
//!
//! Layout: 1 byte compression tag, width (u32 LE), height (u32 LE),
//! channels (u8), then the pixel payload. LZ4 payloads carry their
//! uncompressed size as a prefix.

use super::PersistenceError;
use crate::data::Image;
use serde::{Deserialize, Serialize};

const HEADER_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameCompression {
    None,
    #[default]
    Lz4,
}

impl FrameCompression {
    fn tag(self) -> u8 {
        match self {
            FrameCompression::None => 0,
            FrameCompression::Lz4 => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FrameCompression::None),
            1 => Some(FrameCompression::Lz4),
            _ => None,
        }
    }
}

pub fn encode_frame(image: &Image, compression: FrameCompression) -> Vec<u8> {
    let payload = match compression {
        FrameCompression::None => image.pixels().to_vec(),
        FrameCompression::Lz4 => lz4_flex::compress_prepend_size(image.pixels()),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(compression.tag());
    out.extend_from_slice(&image.width().to_le_bytes());
    out.extend_from_slice(&image.height().to_le_bytes());
    out.push(image.channels());
    out.extend_from_slice(&payload);
    out
}

pub fn decode_frame(data: &[u8]) -> Result<Image, PersistenceError> {
    if data.len() < HEADER_LEN {
        return Err(PersistenceError::Corrupted(format!(
            "frame header truncated ({} bytes)",
            data.len()
        )));
    }

    let compression = FrameCompression::from_tag(data[0])
        .ok_or_else(|| PersistenceError::Corrupted(format!("unknown frame compression tag {}", data[0])))?;
    let width = u32::from_le_bytes(read_array(&data[1..5])?);
    let height = u32::from_le_bytes(read_array(&data[5..9])?);
    let channels = data[9];
    let payload = &data[HEADER_LEN..];

    let pixels = match compression {
        FrameCompression::None => payload.to_vec(),
        FrameCompression::Lz4 => lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| PersistenceError::Compression(e.to_string()))?,
    };

    Image::new(width, height, channels, pixels).map_err(|e| PersistenceError::Corrupted(e.to_string()))
}

fn read_array(bytes: &[u8]) -> Result<[u8; 4], PersistenceError> {
    bytes
        .try_into()
        .map_err(|_| PersistenceError::Corrupted("frame header truncated".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped() -> Image {
        let pixels = (0..6 * 4 * 3).map(|i| (i % 7) as u8).collect();
        Image::new(6, 4, 3, pixels).unwrap()
    }

    #[test]
    fn test_lz4_frame() {
        let image = striped();
        let encoded = encode_frame(&image, FrameCompression::Lz4);
        assert_eq!(encoded[0], 1);
        assert_eq!(decode_frame(&encoded).unwrap(), image);
    }

    #[test]
    fn test_uncompressed_frame() {
        let image = Image::filled(3, 3, 1, 200);
        let encoded = encode_frame(&image, FrameCompression::None);
        assert_eq!(encoded.len(), HEADER_LEN + 9);
        assert_eq!(decode_frame(&encoded).unwrap(), image);
    }

    #[test]
    fn test_lz4_shrinks_flat_frames() {
        let image = Image::filled(64, 64, 3, 0);
        let encoded = encode_frame(&image, FrameCompression::Lz4);
        assert!(encoded.len() < image.pixels().len() / 4);
    }

    #[test]
    fn test_corrupted_frames() {
        assert!(matches!(
            decode_frame(&[1, 2, 3]),
            Err(PersistenceError::Corrupted(_))
        ));

        let mut encoded = encode_frame(&striped(), FrameCompression::None);
        encoded[0] = 9;
        assert!(matches!(decode_frame(&encoded), Err(PersistenceError::Corrupted(_))));

        let mut encoded = encode_frame(&striped(), FrameCompression::None);
        encoded.pop();
        assert!(matches!(decode_frame(&encoded), Err(PersistenceError::Corrupted(_))));
    }
}
