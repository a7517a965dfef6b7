use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 encoding: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
    #[error("cannot identify image file: {0}")]
    InvalidImage(#[from] image::ImageError),
}

/// RGB pixels bounded by the configured maximum dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: RgbImage,
}

impl NormalizedImage {
    /// Constant-colour square used to initialise the model.
    pub fn blank(size: u32, fill: u8) -> Self {
        Self {
            pixels: RgbImage::from_pixel(size, size, image::Rgb([fill, fill, fill])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Returns the base64 payload of a data URL, or the input unchanged when it
/// has no comma-delimited prefix.
pub fn strip_data_url_prefix(input: &str) -> &str {
    match input.split_once(',') {
        Some((_, payload)) => payload,
        None => input,
    }
}

pub fn decode_base64(input: &str) -> Result<Vec<u8>, DecodeError> {
    let payload = strip_data_url_prefix(input).trim();
    Ok(STANDARD.decode(payload)?)
}

pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<NormalizedImage, DecodeError> {
    let img = image::load_from_memory(bytes)?;
    Ok(normalize(img, max_dimension))
}

/// Converts to RGB and shrinks (never enlarges) so neither side exceeds
/// `max_dimension`, keeping the aspect ratio.
pub fn normalize(img: DynamicImage, max_dimension: u32) -> NormalizedImage {
    let img = if img.width() > max_dimension || img.height() > max_dimension {
        log::debug!(
            "Resizing {}x{} image to fit within {}px",
            img.width(),
            img.height(),
            max_dimension
        );
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };
    NormalizedImage {
        pixels: img.to_rgb8(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }));
        STANDARD.encode(encode_png(&img))
    }

    #[test]
    fn strips_prefix_at_first_comma_only() {
        assert_eq!(strip_data_url_prefix("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url_prefix("QUJD"), "QUJD");
        assert_eq!(strip_data_url_prefix("a,b,c"), "b,c");
    }

    #[test]
    fn data_url_and_bare_payload_decode_identically() {
        let bare = png_base64(32, 16);
        let url = format!("data:image/png;base64,{bare}");
        let a = decode_image(&decode_base64(&bare).unwrap(), 1024).unwrap();
        let b = decode_image(&decode_base64(&url).unwrap(), 1024).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.width(), a.height()), (32, 16));
    }

    #[test]
    fn malformed_base64_is_invalid_encoding() {
        let err = decode_base64("not-valid-base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEncoding(_)));
    }

    #[test]
    fn non_image_bytes_are_invalid_image() {
        let err = decode_image(b"definitely not an image", 1024).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidImage(_)));
    }

    #[test]
    fn oversized_image_is_bounded_and_keeps_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(4000, 3000));
        let out = normalize(img, 1024);
        assert!(out.width() <= 1024 && out.height() <= 1024);
        assert_eq!(out.width(), 1024);
        let ratio = out.width() as f64 / out.height() as f64;
        assert!((ratio - 4.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn tall_image_is_bounded_on_height() {
        let out = normalize(DynamicImage::ImageRgb8(RgbImage::new(600, 2048)), 1024);
        assert_eq!(out.height(), 1024);
        assert_eq!(out.width(), 300);
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let out = normalize(DynamicImage::ImageRgb8(RgbImage::new(200, 100)), 1024);
        assert_eq!((out.width(), out.height()), (200, 100));
    }

    #[test]
    fn alpha_is_dropped() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0]));
        let bytes = encode_png(&DynamicImage::ImageRgba8(rgba));
        let out = decode_image(&bytes, 1024).unwrap();
        assert_eq!(out.pixels().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn blank_image_has_requested_size_and_colour() {
        let blank = NormalizedImage::blank(224, 0);
        assert_eq!((blank.width(), blank.height()), (224, 224));
        assert!(blank.pixels().pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
