//! Post-processing: deterministic cleanup of LLM-generated Markdown.
//!
//! Models sometimes wrap their answer in a ```` ```markdown ```` fence,
//! emit CRLF line endings, pad lines with whitespace or invent image links
//! for figures they were never given. These rules fix such quirks without
//! touching content, so the prompt can stay focused on completeness.
//!
//! Rules run in a fixed order: fences are stripped before line endings are
//! normalised, and image links are resolved before the final-newline pass.

use crate::document::ImageRef;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to one chunk's output.
///
/// `images` are the images associated with the chunk; links to anything
/// else are replaced by their alt text.
///
/// 1. Strip an outer Markdown fence
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line (not inside code fences)
/// 4. Collapse runs of 3+ blank lines to 2
/// 5. Drop image links that reference no image of this chunk
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. End with exactly one newline
pub fn clean_markdown(input: &str, images: &[ImageRef]) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = drop_unknown_image_links(&s, images);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").expect("valid regex")
});

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn is_fence_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Trim trailing whitespace outside fenced code. A Markdown hard break
/// (two or more trailing spaces before another line of the same paragraph)
/// is kept as exactly two spaces.
fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut in_fence = false;
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if is_fence_line(line) {
            in_fence = !in_fence;
            out.push(line.trim_end().to_string());
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            continue;
        }
        let trimmed = line.trim_end();
        let continues = lines
            .get(i + 1)
            .is_some_and(|next| !next.trim().is_empty() && !is_fence_line(next));
        let hard_break = continues
            && !trimmed.is_empty()
            && !trimmed.trim_start().starts_with('#')
            && line[trimmed.len()..].starts_with("  ");
        if hard_break {
            out.push(format!("{trimmed}  "));
        } else {
            out.push(trimmed.to_string());
        }
    }
    out.join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

static RE_IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]*)(?:\s+[^)]*)?\)").expect("valid regex"));

/// A link target matches an image when it is the bare filename, ends with
/// `/filename`, or equals the stored reference.
fn is_known_image(target: &str, images: &[ImageRef]) -> bool {
    images.iter().any(|img| {
        target == img.filename
            || target.ends_with(&format!("/{}", img.filename))
            || img.reference.as_deref() == Some(target)
    })
}

fn drop_unknown_image_links(input: &str, images: &[ImageRef]) -> String {
    RE_IMAGE_LINK
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if is_known_image(caps[2].trim(), images) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}
