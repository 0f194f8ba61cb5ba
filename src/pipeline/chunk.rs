//! Chunk planning: partition ordered pages into fixed-size work units.

use crate::document::{Chunk, ImageAsset, Page};

/// Marker written before each page's text inside a chunk.
pub fn page_marker(page: usize) -> String {
    format!("--- Page {page} ---")
}

/// Split `pages` into chunks of at most `chunk_size` pages.
///
/// Chunks are contiguous, in page order, and together cover every page
/// exactly once; only the last one may be shorter. Each chunk carries the
/// images whose source page lies inside its range. Zero pages yield zero
/// chunks. `chunk_size` must be ≥ 1 (enforced by the config builder); a
/// zero value is treated as 1.
pub fn plan_chunks(pages: &[Page], images: &[ImageAsset], chunk_size: usize) -> Vec<Chunk> {
    let size = chunk_size.max(1);

    pages
        .chunks(size)
        .enumerate()
        .map(|(index, group)| {
            let start_page = group[0].number;
            let end_page = group[group.len() - 1].number;

            let text = group
                .iter()
                .map(|p| format!("{}\n{}", page_marker(p.number), p.text.trim_end()))
                .collect::<Vec<_>>()
                .join("\n\n");
            let has_text = group.iter().any(|p| !p.text.trim().is_empty());

            let chunk_images = images
                .iter()
                .filter(|img| (start_page..=end_page).contains(&img.page_num))
                .map(ImageAsset::as_ref_info)
                .collect();

            Chunk {
                index,
                start_page,
                end_page,
                text,
                images: chunk_images,
                has_text,
            }
        })
        .collect()
}
