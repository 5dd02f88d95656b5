//! Unit segmentation: split narration text into independently synthesized
//! units.
//!
//! Both splitters are lazy iterators borrowing the text. They hold no state
//! besides the unconsumed remainder, so calling [`segment`] again on the same
//! text yields the same units from the start.

use crate::config::Segmentation;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());
static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());

/// One unit of narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationUnit {
    /// 0-based position; defines synthesis and concatenation order.
    pub sequence_index: usize,
    pub text: String,
}

/// Lazy splitter over borrowed text. Empty pieces are skipped.
#[derive(Debug, Clone)]
pub struct Pieces<'a> {
    rest: &'a str,
    boundary: &'static Regex,
    /// Bytes of the boundary match that stay with the preceding piece.
    keep: usize,
}

impl<'a> Iterator for Pieces<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            if self.rest.trim().is_empty() {
                self.rest = "";
                return None;
            }
            let (piece, rest) = match self.boundary.find(self.rest) {
                Some(m) => (&self.rest[..m.start() + self.keep], &self.rest[m.end()..]),
                None => (self.rest, ""),
            };
            self.rest = rest;
            let piece = piece.trim();
            if !piece.is_empty() {
                return Some(piece);
            }
        }
    }
}

/// Split after `.`, `!` or `?` followed by whitespace.
pub fn sentences(text: &str) -> Pieces<'_> {
    Pieces {
        rest: text,
        boundary: &RE_SENTENCE_END,
        keep: 1,
    }
}

/// Split on blank lines.
pub fn paragraphs(text: &str) -> Pieces<'_> {
    Pieces {
        rest: text,
        boundary: &RE_BLANK_LINE,
        keep: 0,
    }
}

/// Numbered units for `mode`.
pub fn segment(text: &str, mode: Segmentation) -> impl Iterator<Item = NarrationUnit> + '_ {
    let pieces = match mode {
        Segmentation::Sentence => sentences(text),
        Segmentation::Paragraph => paragraphs(text),
    };
    pieces
        .enumerate()
        .map(|(sequence_index, text)| NarrationUnit {
            sequence_index,
            text: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "Cells are small. Are they alive?  Yes!\n\nThe membrane (Fig. 2) is thin.\nIt is 7.5 nm wide.";

    #[test]
    fn sentence_split() {
        let units: Vec<_> = sentences(TEXT).collect();
        assert_eq!(
            units,
            vec![
                "Cells are small.",
                "Are they alive?",
                "Yes!",
                "The membrane (Fig.",
                "2) is thin.",
                "It is 7.5 nm wide.",
            ]
        );
    }

    #[test]
    fn paragraph_split() {
        let units: Vec<_> = paragraphs(TEXT).collect();
        assert_eq!(units.len(), 2);
        assert!(units[0].ends_with("Yes!"));
        assert!(units[1].starts_with("The membrane"));
    }

    #[test]
    fn empty_units_dropped() {
        assert_eq!(sentences("  ").count(), 0);
        assert_eq!(sentences("").count(), 0);
        assert_eq!(paragraphs("\n\n\n\nOnly one.\n\n \n").collect::<Vec<_>>(), vec!["Only one."]);
        assert_eq!(sentences("Done. . . Next").collect::<Vec<_>>(), vec!["Done.", ".", ".", "Next"]);
    }

    #[test]
    fn rejoining_reproduces_text_modulo_whitespace() {
        for mode in [Segmentation::Sentence, Segmentation::Paragraph] {
            let joined = segment(TEXT, mode)
                .map(|u| u.text)
                .collect::<Vec<_>>()
                .join(" ");
            let a: Vec<_> = joined.split_whitespace().collect();
            let b: Vec<_> = TEXT.split_whitespace().collect();
            assert_eq!(a, b, "mode {mode:?}");
        }
    }

    #[test]
    fn restartable_and_numbered() {
        let first: Vec<_> = segment(TEXT, Segmentation::Sentence).collect();
        let second: Vec<_> = segment(TEXT, Segmentation::Sentence).collect();
        assert_eq!(first, second);
        let indices: Vec<_> = first.iter().map(|u| u.sequence_index).collect();
        assert_eq!(indices, (0..first.len()).collect::<Vec<_>>());
    }
}
