use image::{ImageFormat, ImageReader, Limits, RgbaImage};
use std::io::Cursor;

/// Turns an encoded frame into something a view can display.
pub trait FrameDecoder: Send + Sync + 'static {
    type Image: Send + Sync + 'static;

    fn decode(&self, data: &[u8]) -> Result<Self::Image, DecodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame payload")]
    Empty,
    #[error("failed to decode frame: {0}")]
    Image(#[from] image::ImageError),
}

/// A decoded RGBA8 frame. Dropping it frees the pixel buffer.
#[derive(Debug)]
pub struct DecodedFrame {
    image: RgbaImage,
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Decodes JPEG frames with the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct JpegDecoder {
    /// Frames wider or taller than this are rejected.
    max_dimension: Option<u32>,
}

impl JpegDecoder {
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: Some(max_dimension),
        }
    }
}

impl FrameDecoder for JpegDecoder {
    type Image = DecodedFrame;

    fn decode(&self, data: &[u8]) -> Result<DecodedFrame, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let mut reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
        if let Some(max) = self.max_dimension {
            let mut limits = Limits::default();
            limits.max_image_width = Some(max);
            limits.max_image_height = Some(max);
            reader.limits(limits);
        }
        let image = reader.decode()?.into_rgba8();
        Ok(DecodedFrame { image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_jpeg_to_rgba() {
        let frame = JpegDecoder::default().decode(&jpeg(64, 48)).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.pixels().len(), 64 * 48 * 4);
        // Fully opaque after the RGB -> RGBA conversion.
        assert_eq!(frame.pixels()[3], 255);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            JpegDecoder::default().decode(&[]),
            Err(DecodeError::Empty)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            JpegDecoder::default().decode(b"<html>502 Bad Gateway</html>"),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let decoder = JpegDecoder::with_max_dimension(32);
        assert!(decoder.decode(&jpeg(16, 16)).is_ok());
        assert!(decoder.decode(&jpeg(64, 16)).is_err());
    }
}
