//! Figure labels for extracted images.
//!
//! The first `Figure <n>` reference on a page is given to every unlabelled
//! image on that page. Pages with several distinct figures therefore label
//! all of them with the first one; a page-local heuristic cannot tell which
//! caption belongs to which image without layout analysis.

use crate::pipeline::extract::{ImageAsset, PageText};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static RE_FIGURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfigure\s+(\d+(?:\.\d+)*)").unwrap());

/// The first figure label in `text`, normalised to `Figure <n>`.
pub fn find_figure_label(text: &str) -> Option<String> {
    RE_FIGURE
        .captures(text)
        .map(|caps| format!("Figure {}", &caps[1]))
}

/// Label every unlabelled image from its host page's text.
///
/// Returns the number of images that received a label.
pub fn assign_figure_labels(images: &mut [ImageAsset], pages: &[PageText]) -> usize {
    let page_labels: HashMap<usize, Option<String>> = pages
        .iter()
        .map(|p| (p.page_number, find_figure_label(&p.text)))
        .collect();

    let mut assigned = 0;
    for image in images.iter_mut().filter(|i| i.figure_label.is_none()) {
        if let Some(Some(label)) = page_labels.get(&image.page_number) {
            image.figure_label = Some(label.clone());
            assigned += 1;
        }
    }
    debug!("Labelled {}/{} images", assigned, images.len());
    assigned
}

/// Positional fallback for an image without a figure label.
pub fn positional_label(image_number: usize) -> String {
    format!("Image {image_number}")
}
