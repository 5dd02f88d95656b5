//! Narration normalisation: reduce a script to the prose that is spoken.
//!
//! ## Rule Order
//!
//! Structural tokens are removed first, whitespace is tidied last. Removing a
//! page marker or a placeholder block leaves blank lines behind; if the
//! newline cap ran first those leftovers would break it. Whole unresolved
//! placeholder blocks go before stray tokens so a block's label annotation is
//! removed along with its token.

use crate::config::TextProcessingSettings;
use crate::pipeline::script::{DESCRIPTION_CLOSE, DESCRIPTION_OPEN, PENDING_NOTICE};
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every narration rule to a script.
///
/// Rules (applied in order):
/// 1. Remove page markers
/// 2. Remove unresolved placeholder blocks (token, label, pending notice)
/// 3. Remove stray placeholder tokens
/// 4. Remove stray pending notices
/// 5. Remove description tags, keeping the description prose
/// 6. Remove summary markers, keeping the cross-reference sentence
/// 7. Drop parenthetical citations longer than the configured threshold
/// 8. Normalise line endings (CRLF → LF)
/// 9. Collapse runs of spaces, trim every line
/// 10. Collapse 3+ newlines to 2, trim the whole text
pub fn normalize_for_narration(script: &str, settings: &TextProcessingSettings) -> String {
    let s = remove_page_markers(script);
    let s = remove_placeholder_blocks(&s);
    let s = remove_stray_tokens(&s);
    let s = s.replace(PENDING_NOTICE, "");
    let s = remove_description_tags(&s);
    let s = remove_summary_markers(&s);
    let s = remove_long_citations(&s, settings.citation_length_threshold);
    let s = normalise_line_endings(&s);
    let s = tidy_lines(&s);
    collapse_blank_lines(&s).trim().to_string()
}

// ── Rule 1: Page markers ─────────────────────────────────────────────────

static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[PAGE \d+\]").unwrap());

fn remove_page_markers(input: &str) -> String {
    RE_PAGE_MARKER.replace_all(input, "").into_owned()
}

// ── Rules 2–3: Placeholders ──────────────────────────────────────────────

static RE_PLACEHOLDER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\{{\{{IMAGE_PLACEHOLDER_\d{{3,}}\}}\}}\s*(?:\[[^\[\]\n]*, page \d+\]\s*)?{}",
        regex::escape(PENDING_NOTICE)
    ))
    .unwrap()
});

static RE_PLACEHOLDER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{IMAGE_PLACEHOLDER_\d{3,}\}\}").unwrap());

fn remove_placeholder_blocks(input: &str) -> String {
    RE_PLACEHOLDER_BLOCK.replace_all(input, "").into_owned()
}

fn remove_stray_tokens(input: &str) -> String {
    RE_PLACEHOLDER_TOKEN.replace_all(input, "").into_owned()
}

// ── Rules 5–6: Description tags and summary markers ──────────────────────

fn remove_description_tags(input: &str) -> String {
    input.replace(DESCRIPTION_OPEN, "").replace(DESCRIPTION_CLOSE, "")
}

static RE_SUMMARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[SUMMARY:[^\]]*\]").unwrap());

fn remove_summary_markers(input: &str) -> String {
    RE_SUMMARY.replace_all(input, "").into_owned()
}

// ── Rule 7: Long citations ───────────────────────────────────────────────
//
// A parenthetical counts as a citation when it contains a digit (a year, a
// page, a reference number). Short ones such as "(2019)" read naturally and
// are kept; long author lists are noise when spoken.

static RE_PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*\(([^()\n]*\d[^()\n]*)\)").unwrap());

fn remove_long_citations(input: &str, threshold: usize) -> String {
    if threshold == 0 {
        return input.to_string();
    }
    RE_PARENTHETICAL
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if caps[1].chars().count() > threshold {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

// ── Rules 8–10: Whitespace ───────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn tidy_lines(input: &str) -> String {
    input
        .lines()
        .map(|line| RE_SPACES.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(s: &str) -> String {
        normalize_for_narration(s, &TextProcessingSettings::default())
    }

    #[test]
    fn newline_cap_and_placeholder_removal() {
        let input = "First.\n\n\n\nSecond {{IMAGE_PLACEHOLDER_004}} here.";
        let out = normalize(input);
        assert!(!out.contains("\n\n\n"));
        assert!(!out.contains("IMAGE_PLACEHOLDER"));
        assert_eq!(out, "First.\n\nSecond here.");
    }

    #[test]
    fn unresolved_block_removed_whole() {
        let input = "[PAGE 2]\n\n{{IMAGE_PLACEHOLDER_001}}\n[Figure 2.1, page 2]\n\
[IMAGE DESCRIPTION PENDING - run the describe stage]\n\nCells divide.";
        assert_eq!(normalize(input), "Cells divide.");
    }

    #[test]
    fn description_prose_is_kept() {
        let input = "[PAGE 1]\n\n[Image Description]\nThe following describes Figure 1 on page 1.\n\
A round cell.\n[/Image Description]\n\nText.";
        assert_eq!(
            normalize(input),
            "The following describes Figure 1 on page 1.\nA round cell.\n\nText."
        );
    }

    #[test]
    fn summary_marker_removed_sentence_kept() {
        let input = "[SUMMARY: index section condensed]\nRefer to the book.";
        assert_eq!(normalize(input), "Refer to the book.");
    }

    #[test]
    fn stray_sentinel_removed() {
        let input = "Text [IMAGE DESCRIPTION PENDING - run the describe stage] more";
        assert_eq!(normalize(input), "Text more");
    }

    #[test]
    fn whitespace_rules() {
        assert_eq!(normalize("  a   b  \r\n\r\n\r\n\r\nc\t\td  "), "a b\n\nc d");
        assert_eq!(normalize("a\n   \n\n\nb"), "a\n\nb");
    }

    #[test]
    fn long_citations_dropped_short_kept() {
        let long = "Cells divide (Smith, Jones, Patel, Okafor, Novak, Lindqvist and colleagues, \
Journal of Cellular and Molecular Biology 2001, pp. 113-140).";
        assert_eq!(normalize(long), "Cells divide.");
        assert_eq!(normalize("Cells divide (2019)."), "Cells divide (2019).");

        let settings = TextProcessingSettings {
            citation_length_threshold: 0,
            ..TextProcessingSettings::default()
        };
        assert_eq!(normalize_for_narration(long, &settings), long);
    }

    #[test]
    fn only_markup_becomes_empty() {
        let input = "[PAGE 1]\n\n[PAGE 2]\n\n{{IMAGE_PLACEHOLDER_001}}";
        assert!(normalize(input).is_empty());
    }
}
