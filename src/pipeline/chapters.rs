//! Chapter resolution: turn a [`ChapterSelector`] into a validated page range.
//!
//! Chapters come from the document outline when it has top-level entries.
//! Scanned or poorly authored PDFs often lack one, so the fallback searches
//! the first lines of every page for `chapter <n>` anywhere in a line, which
//! also catches running headers such as `PART ONE  CHAPTER 1`.

use crate::config::ChapterSelector;
use crate::error::Pdf2AudioError;
use crate::pipeline::source::{OutlineEntry, PageSource};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How many leading lines of a page the heading scan looks at.
const HEADING_SCAN_LINES: usize = 10;

static RE_CHAPTER_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)chapter\s+(\d+)").unwrap());

/// A chapter with 1-indexed, inclusive page bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: usize,
    pub title: String,
    pub start_page: usize,
    pub end_page: usize,
}

/// A zero-indexed, inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Zero-indexed page indices in order.
    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Resolve `selector` against `source`.
pub fn resolve_range(
    source: &dyn PageSource,
    selector: &ChapterSelector,
) -> Result<PageRange, Pdf2AudioError> {
    let total = source.page_count();
    if total == 0 {
        return Err(Pdf2AudioError::InvalidRange {
            input: selector.to_string(),
            reason: "document has no pages".into(),
        });
    }

    let range = match *selector {
        ChapterSelector::All => PageRange {
            start: 0,
            end: total - 1,
        },
        ChapterSelector::Chapter(number) => {
            let chapters = list_chapters(source)?;
            let chapter = number
                .checked_sub(1)
                .and_then(|i| chapters.get(i))
                .ok_or(Pdf2AudioError::ChapterNotFound {
                    requested: number,
                    available: chapters.len(),
                })?;
            info!(
                "Chapter {} \"{}\": pages {}-{}",
                chapter.number, chapter.title, chapter.start_page, chapter.end_page
            );
            PageRange {
                start: chapter.start_page - 1,
                end: chapter.end_page - 1,
            }
        }
        ChapterSelector::Range { start, end } => {
            let invalid = |reason: String| Pdf2AudioError::InvalidRange {
                input: format!("{start}-{end}"),
                reason,
            };
            if start == 0 {
                return Err(invalid("pages are 1-indexed".into()));
            }
            if start > end {
                return Err(invalid("start is after end".into()));
            }
            if end > total {
                return Err(invalid(format!("document has {total} pages")));
            }
            PageRange {
                start: start - 1,
                end: end - 1,
            }
        }
    };
    debug!("Resolved {} to pages {:?}", selector, range);
    Ok(range)
}

/// Chapters from the outline, or from a heading scan when the outline has no
/// top-level entries.
pub fn list_chapters(source: &dyn PageSource) -> Result<Vec<Chapter>, Pdf2AudioError> {
    let total = source.page_count();
    let from_outline = chapters_from_outline(&source.outline(), total);
    if !from_outline.is_empty() {
        debug!("{} chapters from outline", from_outline.len());
        return Ok(from_outline);
    }
    let scanned = chapters_from_headings(source)?;
    debug!("{} chapters from heading scan", scanned.len());
    Ok(scanned)
}

/// Derive chapters from the top-level outline entries.
///
/// Each chapter ends one page before the next begins; the last ends on the
/// final page. Entries pointing past the end of the document, or not after
/// the previous top-level entry, are ignored so chapters never overlap.
pub fn chapters_from_outline(outline: &[OutlineEntry], total_pages: usize) -> Vec<Chapter> {
    let mut top: Vec<&OutlineEntry> = Vec::new();
    for entry in outline
        .iter()
        .filter(|e| e.level == 1 && e.page_index < total_pages)
    {
        if top.last().is_none_or(|prev| entry.page_index > prev.page_index) {
            top.push(entry);
        }
    }

    top.iter()
        .enumerate()
        .map(|(i, entry)| {
            let start_page = entry.page_index + 1;
            let end_page = match top.get(i + 1) {
                Some(next) => next.page_index,
                None => total_pages,
            };
            let number = i + 1;
            let title = if entry.title.is_empty() {
                format!("Chapter {number}")
            } else {
                entry.title.clone()
            };
            Chapter {
                number,
                title,
                start_page,
                end_page,
            }
        })
        .collect()
}

/// Derive chapters by scanning each page's leading lines for `chapter <n>`.
///
/// Every page with a match opens a chapter, except a page repeating the
/// number of the chapter opened just before it: that is the running header
/// of the chapter already open.
pub fn chapters_from_headings(source: &dyn PageSource) -> Result<Vec<Chapter>, Pdf2AudioError> {
    let total = source.page_count();
    let mut starts: Vec<(usize, String, u64)> = Vec::new();

    for index in 0..total {
        let text = source.page_text(index)?;
        let Some((heading_number, title)) = find_chapter_heading(&text) else {
            continue;
        };
        if starts.last().is_some_and(|(_, _, n)| *n == heading_number) {
            continue;
        }
        starts.push((index + 1, title, heading_number));
    }

    Ok(starts
        .iter()
        .enumerate()
        .map(|(i, (start_page, title, _))| {
            let end_page = match starts.get(i + 1) {
                Some((next_start, _, _)) => (next_start - 1).max(*start_page),
                None => total,
            };
            Chapter {
                number: i + 1,
                title: title.clone(),
                start_page: *start_page,
                end_page,
            }
        })
        .collect())
}

/// Find a `chapter <n>` reference among the leading lines of a page. The
/// whole trimmed line is the title.
fn find_chapter_heading(text: &str) -> Option<(u64, String)> {
    text.lines().take(HEADING_SCAN_LINES).find_map(|line| {
        let caps = RE_CHAPTER_HEADING.captures(line)?;
        let number: u64 = caps[1].parse().ok()?;
        Some((number, line.trim().to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::InMemoryDocument;

    fn blank_doc(pages: usize) -> InMemoryDocument {
        (0..pages).fold(InMemoryDocument::new(), |d, i| {
            d.with_page(format!("page {}", i + 1))
        })
    }

    fn outlined_doc() -> InMemoryDocument {
        blank_doc(40).with_outline(vec![
            OutlineEntry::new(1, "Foundations", 0),
            OutlineEntry::new(2, "1.1 Scope", 2),
            OutlineEntry::new(1, "Cells", 12),
            OutlineEntry::new(2, "2.1 Membranes", 14),
            OutlineEntry::new(1, "Tissues", 25),
        ])
    }

    #[test]
    fn outline_chapters_are_contiguous_and_cover_document() {
        let doc = outlined_doc();
        let chapters = list_chapters(&doc).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].start_page, 1);
        assert_eq!(chapters.last().unwrap().end_page, 40);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_page + 1, pair[1].start_page);
        }
        for c in &chapters {
            assert!(c.start_page <= c.end_page);
        }
        assert_eq!(chapters[1].title, "Cells");
    }

    #[test]
    fn outline_entries_on_the_same_page_do_not_overlap() {
        let outline = vec![
            OutlineEntry::new(1, "Part One", 0),
            OutlineEntry::new(1, "Chapter 1", 0),
            OutlineEntry::new(1, "Chapter 2", 5),
            OutlineEntry::new(1, "Stray", 3),
            OutlineEntry::new(1, "Past the end", 50),
        ];
        let chapters = chapters_from_outline(&outline, 10);
        assert_eq!(chapters.len(), 2);
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (1, 5));
        assert_eq!((chapters[1].start_page, chapters[1].end_page), (6, 10));
    }

    #[test]
    fn chapter_mode_uses_outline() {
        let doc = outlined_doc();
        let r = resolve_range(&doc, &ChapterSelector::Chapter(2)).unwrap();
        assert_eq!(r, PageRange { start: 12, end: 24 });
        let r = resolve_range(&doc, &ChapterSelector::Chapter(3)).unwrap();
        assert_eq!(r, PageRange { start: 25, end: 39 });
    }

    #[test]
    fn chapter_beyond_count_is_not_found() {
        let doc = outlined_doc();
        for n in [0, 4] {
            assert!(matches!(
                resolve_range(&doc, &ChapterSelector::Chapter(n)),
                Err(Pdf2AudioError::ChapterNotFound { available: 3, .. })
            ));
        }
    }

    #[test]
    fn heading_scan_without_outline() {
        let doc = InMemoryDocument::new()
            .with_page("Preface\nWelcome")
            .with_page("CHAPTER 1\nAtoms\nText")
            .with_page("Chapter 1 Atoms\nrunning header page")
            .with_page("body")
            .with_page("  Chapter 2: Molecules\nMore")
            .with_page("body");
        let chapters = list_chapters(&doc).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "CHAPTER 1");
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (2, 4));
        assert_eq!(chapters[1].title, "Chapter 2: Molecules");
        assert_eq!((chapters[1].start_page, chapters[1].end_page), (5, 6));

        let r = resolve_range(&doc, &ChapterSelector::Chapter(1)).unwrap();
        assert_eq!(r, PageRange { start: 1, end: 3 });
        assert!(matches!(
            resolve_range(&doc, &ChapterSelector::Chapter(3)),
            Err(Pdf2AudioError::ChapterNotFound { .. })
        ));
    }

    #[test]
    fn heading_must_be_in_leading_lines() {
        let late = format!("{}Chapter 9 Late", "line\n".repeat(HEADING_SCAN_LINES));
        assert!(find_chapter_heading(&late).is_none());

        let blank_lead = format!("{}Chapter 9 Early", "\n".repeat(HEADING_SCAN_LINES - 1));
        assert_eq!(find_chapter_heading(&blank_lead).map(|(n, _)| n), Some(9));
    }

    #[test]
    fn heading_found_mid_line() {
        assert_eq!(
            find_chapter_heading("24 | Chapter 2\nbody"),
            Some((2, "24 | Chapter 2".to_string()))
        );

        let doc = InMemoryDocument::new()
            .with_page("Preface")
            .with_page("PART ONE  CHAPTER 1\nAtoms")
            .with_page("body")
            .with_page("PART ONE  CHAPTER 2\nMolecules")
            .with_page("body");
        let chapters = list_chapters(&doc).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "PART ONE  CHAPTER 1");
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (2, 3));
        assert_eq!((chapters[1].start_page, chapters[1].end_page), (4, 5));
        assert_eq!(
            resolve_range(&doc, &ChapterSelector::Chapter(1)).unwrap(),
            PageRange { start: 1, end: 2 }
        );
    }

    #[test]
    fn running_header_on_every_page_opens_one_chapter() {
        let doc = InMemoryDocument::new()
            .with_page("Chapter 3 Energy\nintro")
            .with_page("48 | Chapter 3\nmore")
            .with_page("49 | Chapter 3\nmore")
            .with_page("Chapter 4 Heat\nintro")
            .with_page("Chapter 3 again after 4 opens a new one");
        let chapters = list_chapters(&doc).unwrap();
        let spans: Vec<_> = chapters.iter().map(|c| (c.start_page, c.end_page)).collect();
        assert_eq!(spans, vec![(1, 3), (4, 4), (5, 5)]);
    }

    #[test]
    fn outline_starting_after_front_matter() {
        let doc = blank_doc(20).with_outline(vec![
            OutlineEntry::new(1, "Introduction", 4),
            OutlineEntry::new(1, "Methods", 11),
        ]);
        let chapters = list_chapters(&doc).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (5, 11));
        assert_eq!((chapters[1].start_page, chapters[1].end_page), (12, 20));
        // Front matter belongs to no chapter but stays reachable.
        assert_eq!(
            resolve_range(&doc, &ChapterSelector::All).unwrap(),
            PageRange { start: 0, end: 19 }
        );
        assert_eq!(
            resolve_range(&doc, &ChapterSelector::Range { start: 1, end: 4 }).unwrap(),
            PageRange { start: 0, end: 3 }
        );
    }

    #[test]
    fn page_range_mode() {
        let doc = blank_doc(30);
        let r = resolve_range(&doc, &ChapterSelector::Range { start: 10, end: 25 }).unwrap();
        assert_eq!(r, PageRange { start: 9, end: 24 });
        assert_eq!(r.len(), 16);

        for (start, end) in [(25, 10), (0, 3), (20, 31)] {
            assert!(matches!(
                resolve_range(&doc, &ChapterSelector::Range { start, end }),
                Err(Pdf2AudioError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn whole_document_mode() {
        let doc = blank_doc(7);
        let r = resolve_range(&doc, &ChapterSelector::All).unwrap();
        assert_eq!(r, PageRange { start: 0, end: 6 });
        assert!(matches!(
            resolve_range(&InMemoryDocument::new(), &ChapterSelector::All),
            Err(Pdf2AudioError::InvalidRange { .. })
        ));
    }
}
