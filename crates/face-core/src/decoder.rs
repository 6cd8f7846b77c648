use image::RgbImage;

use crate::error::DecodeError;

/// Decode an uploaded buffer into an 8-bit RGB pixel grid.
///
/// Every supported container (JPEG, PNG, BMP, ...) is normalised to RGB so the
/// detector and embedder always see the same channel order.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Canonical file extension for the container format of `bytes`.
pub fn sniff_extension(bytes: &[u8]) -> Result<&'static str, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = image::guess_format(bytes)?;
    format
        .extensions_str()
        .first()
        .copied()
        .ok_or(DecodeError::UnknownFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let image = decode_image(&png_bytes(7, 5)).unwrap();
        assert_eq!(image.dimensions(), (7, 5));
        assert_eq!(image.get_pixel(3, 2), &Rgb([10, 200, 30]));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Image(_)));
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        assert!(matches!(decode_image(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_sniff_extension() {
        assert_eq!(sniff_extension(&png_bytes(2, 2)).unwrap(), "png");
        assert!(sniff_extension(b"plain text").is_err());
    }
}
