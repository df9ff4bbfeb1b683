//! Summary-as-list heuristic.
//!
//! Answers to "summarize"/"summary" questions and analysis summaries are shown
//! as one bullet per sentence. Text that already carries list markup is left
//! alone, so formatting is idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Bullet prefix used for generated list items.
pub const BULLET: &str = "- ";

/// `true` when the question asks for a summary.
pub fn is_summary_request(question: &str) -> bool {
    let lower = question.to_lowercase();
    lower.contains("summarize") || lower.contains("summary")
}

/// `true` when any line of `text` starts with a bullet or numbered list marker.
pub fn has_list_marker(text: &str) -> bool {
    static LIST_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+•]|\d+[.)])\s+\S").expect("valid regex"));

    LIST_RE.is_match(text)
}

/// Split `text` into sentences, keeping terminal punctuation.
fn sentences(text: &str) -> Vec<&str> {
    static BOUNDARY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[.!?](?:\s+)").expect("valid regex"));

    let mut out = Vec::new();
    let mut start = 0;
    for m in BOUNDARY_RE.find_iter(text) {
        // Keep the punctuation, drop the whitespace.
        let end = m.start() + 1;
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Format `text` as a bullet list, one item per sentence.
///
/// Returned unchanged when it already contains a list marker or is a single
/// sentence.
pub fn format_summary(text: &str) -> String {
    if has_list_marker(text) {
        return text.to_string();
    }

    let parts = sentences(text);
    if parts.len() < 2 {
        return text.to_string();
    }

    parts
        .iter()
        .map(|s| format!("{BULLET}{s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_summary_questions() {
        assert!(is_summary_request("Summarize this page"));
        assert!(is_summary_request("give me a SUMMARY"));
        assert!(!is_summary_request("What is the main idea?"));
    }

    #[test]
    fn detects_list_markers() {
        assert!(has_list_marker("- a\n- b"));
        assert!(has_list_marker("Intro:\n1. first\n2. second"));
        assert!(has_list_marker("  * nested"));
        assert!(!has_list_marker("A sentence - with a dash."));
        assert!(!has_list_marker("Version 2.0 shipped."));
    }

    #[test]
    fn splits_sentences_into_bullets() {
        assert_eq!(format_summary("A. B."), "- A.\n- B.");
        assert_eq!(
            format_summary("It works! Does it scale? Yes."),
            "- It works!\n- Does it scale?\n- Yes."
        );
    }

    #[test]
    fn list_marked_input_is_unchanged() {
        let listed = "- A.\n- B.";
        assert_eq!(format_summary(listed), listed);
        assert_eq!(format_summary(&format_summary("X. Y. Z.")), "- X.\n- Y.\n- Z.");
    }

    #[test]
    fn single_sentence_is_unchanged() {
        assert_eq!(format_summary("Just one thought."), "Just one thought.");
        assert_eq!(format_summary(""), "");
    }

    #[test]
    fn decimals_do_not_split() {
        assert_eq!(
            format_summary("Costs rose 2.5 percent. Margins fell."),
            "- Costs rose 2.5 percent.\n- Margins fell."
        );
    }
}
