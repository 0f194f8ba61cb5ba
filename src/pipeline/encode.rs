//! Image encoding: decoded pdfium bitmaps → PNG bytes.
//!
//! pdfium hands embedded images back as decoded bitmaps whatever their
//! original filter (DCT, Flate, JBIG2…). Re-encoding them as PNG gives every
//! stored asset one lossless, widely supported format.

use image::DynamicImage;
use std::io::Cursor;
use tracing::trace;

/// Encode a decoded image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    trace!(
        "Encoded {}x{} image → {} PNG bytes",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
