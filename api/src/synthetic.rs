use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};

pub const SYNTHETIC_WIDTH: u32 = 320;
pub const SYNTHETIC_HEIGHT: u32 = 240;
const JPEG_QUALITY: u8 = 75;

/// Render a test-pattern JPEG. The gradient shifts with `seq`, so
/// consecutive frames of a camera visibly differ.
pub fn render_jpeg(seq: u64, width: u32, height: u32) -> Result<Vec<u8>, ImageError> {
    let shift = (seq % 256) as u8;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x % 256) as u8).wrapping_add(shift),
            (y % 256) as u8,
            shift,
        ])
    });
    let mut buf = Vec::with_capacity((width * height / 4) as usize);
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&img)?;
    Ok(buf)
}
