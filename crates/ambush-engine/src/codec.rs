use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

/// Every scan photo is squashed to this square footprint before upload.
pub const SCAN_DIMENSION: u32 = 512;

/// Exact resize; the aspect ratio is not preserved.
pub fn resize_for_scan(image: &DynamicImage) -> DynamicImage {
    image.resize_exact(SCAN_DIMENSION, SCAN_DIMENSION, FilterType::CatmullRom)
}

/// JPEG (encoder defaults) wrapped in standard base64.
pub fn encode_jpeg_base64(image: &DynamicImage) -> Result<String> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new(&mut bytes);
    encoder.encode_image(&rgb).context("jpeg encoding failed")?;
    Ok(BASE64.encode(bytes))
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("unrecognised image data")
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("png encoding failed")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

    use super::*;

    fn sample(width: u32, height: u32) -> DynamicImage {
        let mut image = RgbaImage::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgba([(x % 255) as u8, (y % 255) as u8, 90, 128]);
        }
        DynamicImage::ImageRgba8(image)
    }

    #[test]
    fn scan_resize_ignores_aspect_ratio() {
        let resized = resize_for_scan(&sample(1280, 720));
        assert_eq!(resized.dimensions(), (512, 512));
    }

    #[test]
    fn jpeg_base64_round_trips_to_a_jpeg() -> anyhow::Result<()> {
        let encoded = encode_jpeg_base64(&sample(64, 32))?;
        let bytes = BASE64.decode(encoded.as_bytes())?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&bytes)?;
        assert_eq!(decoded.dimensions(), (64, 32));
        Ok(())
    }

    #[test]
    fn jpeg_encoding_is_deterministic() -> anyhow::Result<()> {
        let image = sample(40, 40);
        assert_eq!(encode_jpeg_base64(&image)?, encode_jpeg_base64(&image)?);
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
    }

    #[test]
    fn png_output_has_png_signature() -> anyhow::Result<()> {
        let bytes = encode_png(&sample(8, 8))?;
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        Ok(())
    }
}
