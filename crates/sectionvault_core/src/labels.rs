//! Display labels and human-readable summaries.
//!
//! # Responsibility
//! - Map section kinds to UI titles.
//! - Derive short content previews for change summaries.
//!
//! # Invariants
//! - Nothing in the store or archive branches on these strings.

use crate::model::section::SectionKind;
use once_cell::sync::Lazy;
use regex::Regex;

const SUMMARY_PREVIEW_CHARS: usize = 80;

static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!?\[([^\]]*)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\*_`#>~]+").expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Returns the display title for `kind`.
pub fn section_title(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Context => "Context",
        SectionKind::Scope => "Scope",
        SectionKind::Requirements => "Requirements",
        SectionKind::Architecture => "Architecture",
        SectionKind::Risks => "Risks",
        SectionKind::Milestones => "Milestones",
    }
}

/// Derives a single-line preview of markdown `content`.
///
/// Link targets and emphasis markers are dropped, whitespace is collapsed and
/// the result is cut to 80 chars. Returns `None` for blank content.
pub fn summarize_content(content: &str) -> Option<String> {
    let without_links = MARKDOWN_LINK_RE.replace_all(content, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut preview: String = trimmed.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > SUMMARY_PREVIEW_CHARS {
        preview.push_str("...");
    }
    Some(preview)
}

#[cfg(test)]
mod tests {
    use super::{section_title, summarize_content};
    use crate::model::section::SectionKind;

    #[test]
    fn every_kind_has_a_title() {
        for kind in SectionKind::ALL {
            assert!(!section_title(kind).is_empty());
        }
    }

    #[test]
    fn summary_strips_markdown_and_collapses_whitespace() {
        let summary = summarize_content("# Goals\n\n**Ship** the [beta](https://x.test)  soon").unwrap();
        assert_eq!(summary, "Goals Ship the beta soon");
    }

    #[test]
    fn summary_is_truncated() {
        let summary = summarize_content(&"word ".repeat(40)).unwrap();
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 83);
    }

    #[test]
    fn blank_content_has_no_summary() {
        assert_eq!(summarize_content("  \n ## \n"), None);
    }
}
