//! In-memory image decoding and encoding

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Service for converting between request/response bytes and images
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image, sniffing the format from its content
    ///
    /// # Errors
    /// - Unrecognised or corrupt image data
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode image from bytes: {e}"))
        })
    }

    /// Encode an image as PNG, keeping its alpha channel
    ///
    /// # Errors
    /// - The encoder rejects the pixel layout
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageBuffer, Rgba};

    #[test]
    fn test_png_encoding_keeps_alpha() {
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(3, 2, Rgba([10, 20, 30, 0])));

        let bytes = ImageIOService::encode_png(&image).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

        let decoded = ImageIOService::load_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.get_pixel(0, 0).0, [10, 20, 30, 0]);
    }

    #[test]
    fn test_garbage_is_a_processing_error() {
        let err = ImageIOService::load_from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, BgRemovalError::Processing(_)));
        assert!(err.to_string().contains("Failed to decode image"));
    }
}
