//! Answer text presentation: the summary list heuristic and terminal markdown.
//!
//! Rendering markdown is optional. Callers hold an `Option<Arc<dyn MarkdownRender>>`
//! and show text verbatim when it is `None`.

mod summary;

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

pub use summary::{BULLET, format_summary, has_list_marker, is_summary_request};

// ---------------------------------------------------------------------------
// Rendering capability
// ---------------------------------------------------------------------------

/// Turns markdown source into display text.
pub trait MarkdownRender: Send + Sync {
    fn render(&self, source: &str) -> String;
}

/// Lightweight markdown rendering for terminals.
///
/// Handles headings, emphasis, inline code and bullets. With `ansi` enabled
/// emphasis and headings use SGR escapes; without it markup is just stripped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalMarkdown {
    ansi: bool,
}

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

impl TerminalMarkdown {
    /// Plain output: markup is removed, no escape codes.
    pub fn plain() -> Self {
        Self { ansi: false }
    }

    /// Output styled with ANSI escape codes.
    pub fn ansi() -> Self {
        Self { ansi: true }
    }

    fn style(&self, code: &str, text: &str) -> String {
        if self.ansi {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn render_inline(&self, line: &str) -> String {
        static BOLD_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("valid regex"));
        static ITALIC_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*)\*").expect("valid regex"));
        static CODE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("valid regex"));
        static LINK_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"));

        let out = LINK_RE.replace_all(line, "$1 ($2)");
        let out = CODE_RE.replace_all(&out, |c: &regex::Captures| self.style(DIM, &c[1]));
        let out = BOLD_RE.replace_all(&out, |c: &regex::Captures| {
            let inner = c.get(1).or_else(|| c.get(2)).map_or("", |m| m.as_str());
            self.style(BOLD, inner)
        });
        let out = ITALIC_RE.replace_all(&out, |c: &regex::Captures| self.style(ITALIC, &c[1]));
        out.into_owned()
    }
}

impl MarkdownRender for TerminalMarkdown {
    fn render(&self, source: &str) -> String {
        static HEADING_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("valid regex"));
        static BULLET_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").expect("valid regex"));

        let mut lines = Vec::new();
        let mut in_code_block = false;

        for line in source.lines() {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
                continue;
            }
            if in_code_block {
                lines.push(format!("    {line}"));
                continue;
            }

            if let Some(caps) = HEADING_RE.captures(line) {
                lines.push(self.style(BOLD, &self.render_inline(&caps[1])));
            } else if let Some(caps) = BULLET_RE.captures(line) {
                lines.push(format!("{}• {}", &caps[1], self.render_inline(&caps[2])));
            } else {
                lines.push(self.render_inline(line));
            }
        }

        trace!(lines = lines.len(), "rendered markdown");
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strips_markup() {
        let md = TerminalMarkdown::plain();
        assert_eq!(md.render("# Title"), "Title");
        assert_eq!(md.render("a **bold** and *soft* `code`"), "a bold and soft code");
        assert_eq!(md.render("- one\n- two"), "• one\n• two");
        assert_eq!(
            md.render("see [docs](https://a.com)"),
            "see docs (https://a.com)"
        );
    }

    #[test]
    fn ansi_wraps_emphasis() {
        let md = TerminalMarkdown::ansi();
        assert_eq!(md.render("**x**"), format!("{BOLD}x{RESET}"));
    }

    #[test]
    fn code_blocks_are_indented_verbatim() {
        let md = TerminalMarkdown::plain();
        assert_eq!(md.render("```rust\nlet **a** = 1;\n```"), "    let **a** = 1;");
    }

    #[test]
    fn plain_text_is_unchanged() {
        let md = TerminalMarkdown::plain();
        assert_eq!(md.render("Just words. 2 * 3 = 6"), "Just words. 2 * 3 = 6");
    }

    #[test]
    fn renders_formatted_summary() {
        let md = TerminalMarkdown::plain();
        assert_eq!(md.render(&format_summary("A. B.")), "• A.\n• B.");
    }
}
