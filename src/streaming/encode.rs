use crate::error::StreamError;

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

/// Multipart boundary separating frames on the wire
pub const BOUNDARY: &str = "frame";

/// Content type of the MJPEG response
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Encode an annotated frame as JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, StreamError> {
    let mut jpeg = Vec::with_capacity((image.width() * image.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| StreamError::Encode {
            details: e.to_string(),
        })?;
    Ok(jpeg)
}

/// Wrap one JPEG as a multipart part, trailing CRLF included
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_jpeg_round_trip_dimensions() {
        let frame = RgbImage::from_pixel(400, 300, Rgb([120, 30, 200]));
        let jpeg = encode_jpeg(&frame, 80).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let frame = RgbImage::from_fn(200, 150, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
        let high = encode_jpeg(&frame, 95).unwrap();
        let low = encode_jpeg(&frame, 10).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEGDATA");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 8\r\n\r\nJPEGDATA\r\n"
        );
    }
}
