//! Prompts for the vision description service.
//!
//! The descriptions end up spoken aloud inside a chapter narration, so the
//! prompt asks for plain flowing prose: no Markdown, no lists, no preamble.
//! Style and technical depth come from [`crate::config::ImageAnalysisSettings`].

use crate::config::{DescriptionStyle, ImageAnalysisSettings};

/// System prompt shared by every description request.
pub const SYSTEM_PROMPT: &str = r#"You describe figures from textbooks for listeners of an audiobook who cannot see the page.

Rules:
1. Write plain spoken prose. No Markdown, bullet points, headings or emoji.
2. Start directly with the content. Never say "This image shows" or "Sure".
3. Describe what the figure communicates, not how it is drawn, unless the drawing is the point.
4. Spell out symbols as they would be read aloud ("x squared", "greater than").
5. Do not invent labels or values you cannot read."#;

/// Build the user-turn instruction for one image.
///
/// `context` is the optional line recovered from the script (figure label and
/// page) and is passed through so the model can refer to the figure by name.
pub fn description_prompt(settings: &ImageAnalysisSettings, context: Option<&str>) -> String {
    let length = match settings.description_style {
        DescriptionStyle::Concise => "Describe this figure in one or two sentences.",
        DescriptionStyle::Detailed => {
            "Describe this figure in a short paragraph of three to five sentences."
        }
        DescriptionStyle::VeryDetailed => {
            "Describe this figure thoroughly, covering its layout, every labelled part, \
and the relationship it illustrates, in one or two paragraphs."
        }
    };

    let mut prompt = String::from(length);
    if settings.include_technical_details {
        prompt.push_str(
            " Read out axis titles, units, key values, and any equations or chemical formulas.",
        );
    } else {
        prompt.push_str(" Keep technical notation to a minimum.");
    }
    if let Some(ctx) = context.filter(|c| !c.is_empty()) {
        prompt.push_str("\n\nContext from the book: ");
        prompt.push_str(ctx);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_controls_length_instruction() {
        let mut s = ImageAnalysisSettings::default();
        s.description_style = DescriptionStyle::Concise;
        assert!(description_prompt(&s, None).contains("one or two sentences"));
        s.description_style = DescriptionStyle::VeryDetailed;
        assert!(description_prompt(&s, None).contains("thoroughly"));
    }

    #[test]
    fn technical_details_toggle() {
        let mut s = ImageAnalysisSettings::default();
        assert!(description_prompt(&s, None).contains("axis titles"));
        s.include_technical_details = false;
        assert!(!description_prompt(&s, None).contains("axis titles"));
    }

    #[test]
    fn context_is_appended() {
        let s = ImageAnalysisSettings::default();
        let p = description_prompt(&s, Some("The following describes Figure 2.1 on page 14."));
        assert!(p.contains("Figure 2.1"));
        assert!(!description_prompt(&s, Some("")).contains("Context"));
    }
}
