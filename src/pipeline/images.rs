//! Image extraction: validate raw embedded images, fingerprint and name them.
//!
//! Names are a pure function of document name, page, position and content,
//! so re-running a document overwrites the same objects instead of piling up
//! duplicates. Identical bytes on different pages still get distinct names;
//! storage is never deduplicated.

use crate::document::ImageAsset;
use crate::error::ImageDecodeError;
use crate::pipeline::read::{RawImage, RawPayload};
use image::ImageFormat;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Hex characters kept from the SHA-256 digest (128 bits).
pub const FINGERPRINT_LEN: usize = 32;

/// Content fingerprint of an image payload.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..FINGERPRINT_LEN].to_string()
}

/// `{document}_page{N}_img{K}_{fingerprint}.{ext}`
pub fn image_filename(document: &str, page: usize, index: usize, fingerprint: &str, ext: &str) -> String {
    format!("{document}_page{page}_img{index}_{fingerprint}.{ext}")
}

fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        other => other.extensions_str().first().copied().unwrap_or("bin"),
    }
}

/// Validate one raw image and turn it into a named asset.
pub fn to_asset(document: &str, raw: RawImage) -> Result<ImageAsset, ImageDecodeError> {
    let (page, index) = (raw.page_num, raw.index);
    let bytes = match raw.payload {
        RawPayload::Bytes(bytes) => bytes,
        RawPayload::Unreadable(detail) => {
            return Err(ImageDecodeError::Unreadable { page, index, detail })
        }
    };

    let format = image::guess_format(&bytes).map_err(|_| ImageDecodeError::UnknownFormat { page, index })?;
    image::load_from_memory_with_format(&bytes, format).map_err(|e| ImageDecodeError::Corrupt {
        page,
        index,
        detail: e.to_string(),
    })?;

    let ext = extension(format).to_string();
    let fp = fingerprint(&bytes);
    let filename = image_filename(document, page, index, &fp, &ext);
    debug!(document, page, index, %filename, "Extracted image");

    Ok(ImageAsset {
        page_num: page,
        index,
        fingerprint: fp,
        bytes,
        ext,
        filename,
        reference: None,
    })
}

/// Convert every raw image, collecting the usable assets and the skipped ones.
///
/// One bad image never affects the others.
pub fn extract_images(document: &str, raw: Vec<RawImage>) -> (Vec<ImageAsset>, Vec<ImageDecodeError>) {
    let mut assets = Vec::with_capacity(raw.len());
    let mut skipped = Vec::new();

    for image in raw {
        match to_asset(document, image) {
            Ok(asset) => assets.push(asset),
            Err(e) => {
                warn!(document, "Skipping image: {}", e);
                skipped.push(e);
            }
        }
    }

    (assets, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::encode_png;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(color: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([color, 0, 0, 255])));
        encode_png(&img).unwrap()
    }

    fn raw(page: usize, index: usize, payload: RawPayload) -> RawImage {
        RawImage {
            page_num: page,
            index,
            payload,
        }
    }

    #[test]
    fn fingerprint_is_truncated_sha256() {
        // sha256("abc") = ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad
        assert_eq!(fingerprint(b"abc"), "ba7816bf8f01cfea414140de5dae2223");
    }

    #[test]
    fn naming_is_deterministic() {
        let a = to_asset("spec", raw(3, 1, RawPayload::Bytes(png(7)))).unwrap();
        let b = to_asset("spec", raw(3, 1, RawPayload::Bytes(png(7)))).unwrap();
        assert_eq!(a.filename, b.filename);
        assert_eq!(a.filename, format!("spec_page3_img1_{}.png", a.fingerprint));
    }

    #[test]
    fn same_bytes_on_other_page_get_distinct_names() {
        let a = to_asset("spec", raw(1, 1, RawPayload::Bytes(png(9)))).unwrap();
        let b = to_asset("spec", raw(2, 1, RawPayload::Bytes(png(9)))).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.filename, b.filename);
    }

    #[test]
    fn bad_images_are_skipped_individually() {
        let mut truncated = png(1);
        truncated.truncate(20);
        let (assets, skipped) = extract_images(
            "spec",
            vec![
                raw(1, 1, RawPayload::Bytes(png(1))),
                raw(1, 2, RawPayload::Bytes(b"definitely not an image".to_vec())),
                raw(2, 1, RawPayload::Bytes(truncated)),
                raw(2, 2, RawPayload::Unreadable("JBIG2 unsupported".into())),
                raw(3, 1, RawPayload::Bytes(png(2))),
            ],
        );
        assert_eq!(assets.len(), 2);
        assert_eq!(skipped.len(), 3);
        assert!(matches!(skipped[0], ImageDecodeError::UnknownFormat { page: 1, index: 2 }));
        assert!(matches!(skipped[1], ImageDecodeError::Corrupt { page: 2, index: 1, .. }));
        assert!(matches!(skipped[2], ImageDecodeError::Unreadable { page: 2, index: 2, .. }));
    }

    #[test]
    fn jpeg_uses_jpg_extension() {
        assert_eq!(extension(ImageFormat::Jpeg), "jpg");
        assert_eq!(extension(ImageFormat::Png), "png");
    }
}
