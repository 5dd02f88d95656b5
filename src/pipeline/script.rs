//! Script assembly and the script's structural tokens.
//!
//! The script is a plain UTF-8 text file and the only state that survives
//! between stages. Its layout, per page:
//!
//! ```text
//! [PAGE 14]
//!
//! {{IMAGE_PLACEHOLDER_003}}
//! [Figure 2.1, page 14]
//! [IMAGE DESCRIPTION PENDING - run the describe stage]
//!
//! <verbatim page text, or a summary marker plus a cross-reference sentence>
//! ```
//!
//! The describe stage rewrites each placeholder block (token through pending
//! notice) into an `[Image Description]` block; the synthesize stage strips
//! every bracketed token before narration. Both rely on the token builders in
//! this module, so the formats are defined exactly once.

use crate::config::{TableHandling, TextProcessingSettings};
use crate::pipeline::extract::{ImageAsset, PageText};
use crate::pipeline::labels::positional_label;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

// ── Tokens ───────────────────────────────────────────────────────────────

/// Sentinel that closes every unresolved placeholder block.
pub const PENDING_NOTICE: &str = "[IMAGE DESCRIPTION PENDING - run the describe stage]";

pub const DESCRIPTION_OPEN: &str = "[Image Description]";
pub const DESCRIPTION_CLOSE: &str = "[/Image Description]";

const BLOCK_SEPARATOR: &str = "\n\n";

static RE_TABLE_CAPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btable\s+(\d+(?:\.\d+)*)").unwrap());

/// `[PAGE 14]`
pub fn page_marker(page_number: usize) -> String {
    format!("[PAGE {page_number}]")
}

/// `{{IMAGE_PLACEHOLDER_003}}`
pub fn placeholder_token(image_number: usize) -> String {
    format!("{{{{IMAGE_PLACEHOLDER_{image_number:03}}}}}")
}

/// `[Figure 2.1, page 14]`
pub fn label_annotation(label: &str, page_number: usize) -> String {
    format!("[{label}, page {page_number}]")
}

/// Token, label annotation and pending notice for one image.
pub fn placeholder_block(image: &ImageAsset) -> String {
    let label = image
        .figure_label
        .clone()
        .unwrap_or_else(|| positional_label(image.image_number));
    format!(
        "{}\n{}\n{}",
        placeholder_token(image.image_number),
        label_annotation(&label, image.page_number),
        PENDING_NOTICE
    )
}

/// The block that replaces a resolved placeholder.
pub fn description_block(context: Option<&str>, description: &str) -> String {
    let mut block = String::from(DESCRIPTION_OPEN);
    block.push('\n');
    if let Some(ctx) = context.filter(|c| !c.is_empty()) {
        block.push_str(ctx);
        block.push('\n');
    }
    block.push_str(description.trim());
    block.push('\n');
    block.push_str(DESCRIPTION_CLOSE);
    block
}

/// `[SUMMARY: ...]` marker plus the cross-reference sentence that is narrated
/// in place of a condensed page.
pub fn summary_block(keyword: &str) -> String {
    format!(
        "[SUMMARY: {keyword} section condensed]\n\
This page contains {keyword} material, which is not read aloud. \
Refer to the printed document for the complete listing."
    )
}

/// Spoken notice placed before the prose of a page carrying a table caption.
pub fn table_notice(table_label: &str) -> String {
    format!(
        "This page includes {table_label}. Tables are not read cell by cell; \
refer to the printed document for its full contents."
    )
}

// ── Assembly ─────────────────────────────────────────────────────────────

/// An assembled script plus counts describing what went into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDocument {
    pub text: String,
    pub page_count: usize,
    pub placeholder_count: usize,
    /// 1-indexed pages replaced by a summary marker.
    pub summarized_pages: Vec<usize>,
    pub tables_announced: usize,
}

/// Build the script from extracted pages and labelled images.
///
/// `images` must be ordered by image number, as [`extract_pages`] returns
/// them.
///
/// [`extract_pages`]: crate::pipeline::extract::extract_pages
pub fn assemble_script(
    pages: &[PageText],
    images: &[ImageAsset],
    settings: &TextProcessingSettings,
) -> ScriptDocument {
    let mut blocks: Vec<String> = Vec::new();
    let mut doc = ScriptDocument {
        page_count: pages.len(),
        ..ScriptDocument::default()
    };

    for page in pages {
        blocks.push(page_marker(page.page_number));

        for image in images.iter().filter(|i| i.page_number == page.page_number) {
            blocks.push(placeholder_block(image));
            doc.placeholder_count += 1;
        }

        if let Some(keyword) = summary_keyword(&page.text, &settings.summarize_sections) {
            debug!("Page {}: summarized ({})", page.page_number, keyword);
            blocks.push(summary_block(keyword));
            doc.summarized_pages.push(page.page_number);
            continue;
        }

        if settings.table_handling == TableHandling::Announce {
            if let Some(caps) = RE_TABLE_CAPTION.captures(&page.text) {
                blocks.push(table_notice(&format!("Table {}", &caps[1])));
                doc.tables_announced += 1;
            }
        }

        let text = page.text.trim_end();
        if !text.is_empty() {
            blocks.push(text.to_string());
        }
    }

    doc.text = blocks.join(BLOCK_SEPARATOR);
    doc.text.push('\n');
    info!(
        "Assembled script: {} pages, {} placeholders, {} summarized",
        doc.page_count,
        doc.placeholder_count,
        doc.summarized_pages.len()
    );
    doc
}

/// The first configured keyword contained in `text`, case-insensitively.
fn summary_keyword<'k>(text: &str, keywords: &'k [String]) -> Option<&'k str> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .find(|k| lower.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn page(n: usize, text: &str) -> PageText {
        PageText {
            page_number: n,
            text: text.to_string(),
        }
    }

    fn asset(n: usize, page: usize, label: Option<&str>) -> ImageAsset {
        ImageAsset {
            image_number: n,
            page_number: page,
            file: PathBuf::from(format!("image_{n:03}.png")),
            figure_label: label.map(str::to_string),
        }
    }

    #[test]
    fn token_formats() {
        assert_eq!(page_marker(3), "[PAGE 3]");
        assert_eq!(placeholder_token(1), "{{IMAGE_PLACEHOLDER_001}}");
        assert_eq!(placeholder_token(42), "{{IMAGE_PLACEHOLDER_042}}");
        assert_eq!(label_annotation("Figure 2.1", 14), "[Figure 2.1, page 14]");
    }

    #[test]
    fn three_pages_one_image() {
        let pages = vec![
            page(1, "Cells are small."),
            page(2, "Membranes separate compartments."),
            page(3, "Transport is selective."),
        ];
        let images = vec![asset(1, 2, None)];
        let doc = assemble_script(&pages, &images, &TextProcessingSettings::default());
        let t = &doc.text;

        let p1 = t.find("[PAGE 1]").unwrap();
        let p2 = t.find("[PAGE 2]").unwrap();
        let p3 = t.find("[PAGE 3]").unwrap();
        let token = t.find("{{IMAGE_PLACEHOLDER_001}}").unwrap();
        let prose = t.find("Membranes").unwrap();
        assert!(p1 < p2 && p2 < token && token < prose && prose < p3);
        assert!(t.contains("[Image 1, page 2]"));
        assert!(t.contains(PENDING_NOTICE));
        assert!(!t.contains("[SUMMARY:"));
        assert_eq!(doc.placeholder_count, 1);
    }

    #[test]
    fn placeholders_strictly_increasing_and_before_prose() {
        let pages = vec![page(1, "Figure 1.1 text"), page(2, "Figure 1.2 text")];
        let images = vec![
            asset(1, 1, Some("Figure 1.1")),
            asset(2, 1, Some("Figure 1.1")),
            asset(3, 2, Some("Figure 1.2")),
        ];
        let doc = assemble_script(&pages, &images, &TextProcessingSettings::default());
        let positions: Vec<usize> = (1..=3)
            .map(|n| doc.text.find(&placeholder_token(n)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(positions[1] < doc.text.find("Figure 1.1 text").unwrap());
        assert!(positions[2] < doc.text.find("Figure 1.2 text").unwrap());
        for n in 1..=3 {
            assert_eq!(doc.text.matches(&placeholder_token(n)).count(), 1);
        }
    }

    #[test]
    fn keyword_page_is_summarized_only() {
        let pages = vec![
            page(1, "Ordinary prose."),
            page(2, "BIBLIOGRAPHY\nSmith, J. (2001) ..."),
            page(3, "More prose."),
        ];
        let doc = assemble_script(&pages, &[], &TextProcessingSettings::default());
        assert_eq!(doc.text.matches("[SUMMARY:").count(), 1);
        assert!(!doc.text.contains("Smith, J."));
        assert!(doc.text.contains("Ordinary prose."));
        assert!(doc.text.contains("More prose."));
        assert_eq!(doc.summarized_pages, vec![2]);
    }

    #[test]
    fn summarized_page_keeps_its_placeholders() {
        let pages = vec![page(5, "Appendix A: tables")];
        let images = vec![asset(1, 5, None)];
        let doc = assemble_script(&pages, &images, &TextProcessingSettings::default());
        let token = doc.text.find("{{IMAGE_PLACEHOLDER_001}}").unwrap();
        assert!(token < doc.text.find("[SUMMARY:").unwrap());
    }

    #[test]
    fn table_announcement() {
        let pages = vec![page(1, "Table 4.2 lists the values.")];
        let mut settings = TextProcessingSettings::default();
        let doc = assemble_script(&pages, &[], &settings);
        assert_eq!(doc.tables_announced, 0);

        settings.table_handling = TableHandling::Announce;
        let doc = assemble_script(&pages, &[], &settings);
        assert_eq!(doc.tables_announced, 1);
        let notice = doc.text.find("This page includes Table 4.2").unwrap();
        assert!(notice < doc.text.find("lists the values").unwrap());
    }

    #[test]
    fn description_block_layout() {
        let b = description_block(Some("The following describes Figure 1 on page 2."), " A cell. ");
        assert_eq!(
            b,
            "[Image Description]\nThe following describes Figure 1 on page 2.\nA cell.\n[/Image Description]"
        );
        assert_eq!(
            description_block(None, "A cell."),
            "[Image Description]\nA cell.\n[/Image Description]"
        );
    }
}
