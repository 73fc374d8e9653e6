/// Camera direction from JPEG EXIF
///
/// Only GPSImgDirection is read; a missing tag or malformed EXIF block
/// yields `None`.
use std::io::Cursor;

use ::exif::{In, Reader, Tag, Value};
use tracing::debug;

use crate::state::data::normalize_degrees;

/// Bearing the photo was taken at, in [0, 360)
pub fn image_direction(data: &[u8]) -> Option<f64> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("no readable EXIF: {e}");
            return None;
        }
    };

    let field = exif.get_field(Tag::GPSImgDirection, In::PRIMARY)?;
    match &field.value {
        Value::Rational(values) => {
            let direction = values.first()?;
            if direction.denom == 0 {
                return None;
            }
            Some(normalize_degrees(direction.to_f64()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXIF_HEADER: &[u8] = b"Exif\0\0";
    const TAG_GPS_IFD: u16 = 0x8825;
    const TAG_GPS_IMG_DIRECTION: u16 = 0x0011;
    const TYPE_LONG: u16 = 4;
    const TYPE_RATIONAL: u16 = 5;

    /// Minimal JPEG whose only metadata is a GPS IFD with one direction rational
    fn jpeg_with_direction(numerator: u32, denominator: u32, little_endian: bool) -> Vec<u8> {
        let u16b = |v: u16| {
            if little_endian { v.to_le_bytes() } else { v.to_be_bytes() }
        };
        let u32b = |v: u32| {
            if little_endian { v.to_le_bytes() } else { v.to_be_bytes() }
        };

        let mut tiff = Vec::new();
        tiff.extend_from_slice(if little_endian { b"II" } else { b"MM" });
        tiff.extend_from_slice(&u16b(42));
        tiff.extend_from_slice(&u32b(8));
        // IFD0 at 8: one entry pointing at the GPS IFD (26)
        tiff.extend_from_slice(&u16b(1));
        tiff.extend_from_slice(&u16b(TAG_GPS_IFD));
        tiff.extend_from_slice(&u16b(TYPE_LONG));
        tiff.extend_from_slice(&u32b(1));
        tiff.extend_from_slice(&u32b(26));
        tiff.extend_from_slice(&u32b(0));
        // GPS IFD at 26: direction rational stored at 44
        tiff.extend_from_slice(&u16b(1));
        tiff.extend_from_slice(&u16b(TAG_GPS_IMG_DIRECTION));
        tiff.extend_from_slice(&u16b(TYPE_RATIONAL));
        tiff.extend_from_slice(&u32b(1));
        tiff.extend_from_slice(&u32b(44));
        tiff.extend_from_slice(&u32b(0));
        tiff.extend_from_slice(&u32b(numerator));
        tiff.extend_from_slice(&u32b(denominator));
        assert_eq!(tiff.len(), 52);

        let mut jpeg = vec![0xFF, 0xD8];
        // An unrelated APP0 segment first
        jpeg.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        let length = (2 + EXIF_HEADER.len() + tiff.len()) as u16;
        jpeg.extend_from_slice(&[0xFF, 0xE1]);
        jpeg.extend_from_slice(&length.to_be_bytes());
        jpeg.extend_from_slice(EXIF_HEADER);
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);
        jpeg
    }

    #[test]
    fn test_reads_direction_little_endian() {
        let jpeg = jpeg_with_direction(4550, 100, true);
        assert_eq!(image_direction(&jpeg), Some(45.5));
    }

    #[test]
    fn test_reads_direction_big_endian() {
        let jpeg = jpeg_with_direction(270, 1, false);
        assert_eq!(image_direction(&jpeg), Some(270.0));
    }

    #[test]
    fn test_direction_is_wrapped() {
        let jpeg = jpeg_with_direction(360, 1, true);
        assert_eq!(image_direction(&jpeg), Some(0.0));
    }

    #[test]
    fn test_zero_denominator() {
        let jpeg = jpeg_with_direction(10, 0, true);
        assert_eq!(image_direction(&jpeg), None);
    }

    #[test]
    fn test_not_a_jpeg() {
        assert_eq!(image_direction(b"\x89PNG\r\n\x1a\n"), None);
        assert_eq!(image_direction(&[]), None);
    }

    #[test]
    fn test_truncated_input_never_panics() {
        let jpeg = jpeg_with_direction(90, 1, true);
        for cut in 0..jpeg.len() {
            let _ = image_direction(&jpeg[..cut]);
        }
    }
}
