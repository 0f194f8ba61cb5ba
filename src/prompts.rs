//! Instruction templates for chunk-to-Markdown transformation.
//!
//! Every prompt the pipeline sends is composed here, so tests can inspect the
//! exact text without a live LLM. Callers can replace the instruction block
//! via [`crate::config::PipelineConfig::instructions`] and prepend a system
//! message via [`crate::config::PipelineConfig::system_prompt`].

use crate::document::Chunk;
use std::fmt::Write as _;

/// Default instruction block for converting a chunk of extracted PDF text to
/// Markdown. Used when `PipelineConfig::instructions` is `None`.
pub const DEFAULT_INSTRUCTIONS: &str = r#"Convert the following text, extracted from a technical interface specification, to clean and well-structured Markdown.

Follow these rules precisely:

1. COMPLETENESS
   - NEVER omit, summarise or shorten any content
   - Keep every detail: field names, types, lengths, codes, constraints, notes
   - Preserve the original order of the content

2. STRUCTURE
   - Use Markdown headings that mirror the document's section hierarchy
   - Keep the page markers (--- Page N ---) so page numbers stay traceable
   - Use - for unordered lists and 1. 2. 3. for ordered lists

3. TABLES
   - Convert every table to GFM pipe format, keeping all rows and columns
   - If a table is too complex for pipe format, use HTML table markup

4. CODE AND EXAMPLES
   - Wrap code, request and response samples in triple backticks with a language identifier
   - Reproduce API request/response JSON samples in full

5. IMAGES
   - Where an image listed below belongs, reference it as ![description](filename)
   - Reference only the images listed below

6. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap the output in ```markdown fences
   - Do NOT add commentary or explanations"#;

/// Compose the user message for one chunk.
///
/// The message names the document and page range, lists the chunk's images
/// (with storage references when known) and then carries the raw text.
pub fn build_chunk_prompt(document: &str, chunk: &Chunk, instructions: Option<&str>) -> String {
    let instructions = instructions.unwrap_or(DEFAULT_INSTRUCTIONS);
    let mut prompt = String::with_capacity(instructions.len() + chunk.text.len() + 256);

    prompt.push_str(instructions);
    let _ = write!(
        prompt,
        "\n\nDocument: {}\nPages: {}-{}\n",
        document, chunk.start_page, chunk.end_page
    );

    if chunk.images.is_empty() {
        prompt.push_str("\nImages in this section: none\n");
    } else {
        prompt.push_str("\nImages in this section:\n");
        for img in &chunk.images {
            let _ = write!(prompt, "- {} (page {}", img.filename, img.page_num);
            if let Some(reference) = &img.reference {
                let _ = write!(prompt, ", {}", reference);
            }
            prompt.push_str(")\n");
        }
    }

    prompt.push_str("\nExtracted text:\n\n");
    prompt.push_str(&chunk.text);
    prompt
}
