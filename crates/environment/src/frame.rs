use crate::error::EnvError;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::PngEncoder;
use ::image::{ColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rendered frame in row-major RGB8 layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Image {
    /// Creates a frame filled with one colour.
    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let count = (width as usize) * (height as usize);
        let mut pixels = Vec::with_capacity(count * 3);
        for _ in 0..count {
            pixels.extend_from_slice(&rgb);
        }
        Self { width, height, pixels }
    }

    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, EnvError> {
        let expected = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected {
            return Err(EnvError::Encoding(format!(
                "expected {expected} bytes for a {width}x{height} RGB frame, got {}",
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y as usize) * (self.width as usize) + x as usize) * 3;
        self.pixels[offset..offset + 3].copy_from_slice(&rgb);
    }

    /// Interprets an observation as an image if it is a `height x width x 3`
    /// nested array of integers in `[0, 255]`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let rows = value.as_array()?;
        let width = rows.first()?.as_array()?.len();
        if width == 0 {
            return None;
        }
        let mut pixels = Vec::with_capacity(rows.len() * width * 3);
        for row in rows {
            let row = row.as_array()?;
            if row.len() != width {
                return None;
            }
            for pixel in row {
                let channels = pixel.as_array()?;
                if channels.len() != 3 {
                    return None;
                }
                for channel in channels {
                    pixels.push(u8::try_from(channel.as_u64()?).ok()?);
                }
            }
        }
        Some(Self {
            width: u32::try_from(width).ok()?,
            height: u32::try_from(rows.len()).ok()?,
            pixels,
        })
    }
}

/// JPEG quality presets offered to the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    #[must_use]
    pub fn jpeg_quality(self) -> u8 {
        match self {
            Quality::Low => 35,
            Quality::Medium => 50,
            Quality::High => 80,
        }
    }
}

pub fn encode_jpeg(image: &Image, quality: Quality) -> Result<Vec<u8>, EnvError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.jpeg_quality())
        .encode(&image.pixels, image.width, image.height, ColorType::Rgb8)
        .map_err(|e| EnvError::Encoding(e.to_string()))?;
    Ok(out)
}

pub fn encode_png(image: &Image) -> Result<Vec<u8>, EnvError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&image.pixels, image.width, image.height, ColorType::Rgb8)
        .map_err(|e| EnvError::Encoding(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn image_like_observations_are_detected() {
        let obs = json!([[[255, 0, 0], [0, 255, 0]], [[0, 0, 255], [1, 2, 3]]]);
        let image = Image::from_value(&obs).unwrap();
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(&image.pixels[9..], &[1, 2, 3]);

        assert!(Image::from_value(&json!([0.5, 1.0])).is_none());
        assert!(Image::from_value(&json!([[[256, 0, 0]]])).is_none());
        assert!(Image::from_value(&json!([[[1, 2]]])).is_none());
    }

    #[test]
    fn encoders_emit_their_magic_bytes() {
        let image = Image::filled(8, 8, [10, 20, 30]);
        let jpeg = encode_jpeg(&image, Quality::High).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn raw_frames_are_size_checked() {
        assert!(Image::from_raw(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(Image::from_raw(2, 2, vec![0; 11]), Err(EnvError::Encoding(_))));
    }
}
