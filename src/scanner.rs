//! Lexical scanner for template transclusions.
//!
//! A single left-to-right pass finds the outermost `{{ ... }}` pairs in a
//! page. Comments, `<nowiki>` blocks and `{{{parameter}}}` references are
//! opaque: braces inside them never open or close a template. Nothing is
//! rewritten in the input; later stages ask the same [`Cursor`] to skip
//! those regions instead of relying on sentinel characters.

use std::ops::Range;

/// Interior of a top-level template: `start` is just after the opening
/// `{{`, `end` is just before the closing `}}`. Offsets are byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    /// Byte range including the braces
    pub fn outer(&self) -> Range<usize> {
        self.start - 2..self.end + 2
    }

    pub fn outer_text<'a>(&self, text: &'a str) -> &'a str {
        &text[self.outer()]
    }
}

const NOWIKI_OPEN: [&str; 2] = ["<nowiki>", "<nowiki >"];
const NOWIKI_CLOSE: [&str; 2] = ["</nowiki>", "</nowiki >"];

/// Byte cursor over wikitext. All markup it recognizes is ASCII, so every
/// position it stops at is a char boundary.
pub(crate) struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Cursor { text, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub(crate) fn at(&self, token: &str) -> bool {
        self.text[self.pos..].starts_with(token)
    }

    fn at_any(&self, tokens: &[&str]) -> Option<usize> {
        tokens.iter().find(|t| self.at(t)).map(|t| t.len())
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        self.pos = (self.pos + bytes).min(self.text.len());
    }

    pub(crate) fn advance_char(&mut self) {
        let len = self.text[self.pos..]
            .chars()
            .next()
            .map(|c| c.len_utf8())
            .unwrap_or(1);
        self.advance(len);
    }

    fn skip_until(&mut self, terminators: &[&str]) {
        while !self.at_end() {
            if let Some(len) = self.at_any(terminators) {
                self.advance(len);
                return;
            }
            self.advance_char();
        }
    }

    /// `{{{` not followed by a fourth brace
    pub(crate) fn at_parameter_reference(&self) -> bool {
        self.at("{{{") && !self.at("{{{{")
    }

    /// Consume a comment, nowiki block or parameter reference starting at the
    /// cursor. Unterminated regions run to the end of the text.
    pub(crate) fn skip_opaque(&mut self) -> bool {
        if self.at_parameter_reference() {
            self.advance(3);
            self.skip_until(&["}}}"]);
        } else if self.at("<!--") {
            self.advance(4);
            self.skip_until(&["-->"]);
        } else if let Some(len) = self.at_any(&NOWIKI_OPEN) {
            self.advance(len);
            self.skip_until(&NOWIKI_CLOSE);
        } else {
            return false;
        }
        true
    }
}

/// Find every top-level template in `text`, in source order.
///
/// Nested templates are not reported separately. A `{{` that is never
/// closed produces no span; a stray `}}` at depth zero is ignored.
pub fn scan(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut cursor = Cursor::new(text);
    // Counts braces, so one open template is depth 2
    let mut depth: usize = 0;
    let mut start = 0;

    while !cursor.at_end() {
        if cursor.skip_opaque() {
            continue;
        }
        if cursor.at("{{") {
            if depth == 0 {
                start = cursor.pos() + 2;
            }
            depth += 2;
            cursor.advance(2);
        } else if cursor.at("}}") {
            if depth == 2 {
                spans.push(Span {
                    start,
                    end: cursor.pos(),
                });
            }
            depth = depth.saturating_sub(2);
            cursor.advance(2);
        } else {
            cursor.advance_char();
        }
    }

    if depth > 0 {
        tracing::debug!(depth, "unterminated template dropped at end of text");
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outer_texts(text: &str) -> Vec<&str> {
        scan(text).iter().map(|s| s.outer_text(text)).collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Basic spans
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn finds_flat_templates_in_order() {
        let text = "a {{One}} b {{Two|x=1}}\n{{Three}}";
        assert_eq!(outer_texts(text), vec!["{{One}}", "{{Two|x=1}}", "{{Three}}"]);
    }

    #[test]
    fn span_offsets_exclude_braces() {
        let text = "xx{{Foo|bar}}";
        let spans = scan(text);
        assert_eq!(spans, vec![Span { start: 4, end: 11 }]);
        assert_eq!(spans[0].inner(text), "Foo|bar");
    }

    #[test]
    fn no_templates() {
        assert!(scan("plain text with { single } braces").is_empty());
        assert!(scan("").is_empty());
    }

    // ─────────────────────────────────────────────────────────────
    // Nesting
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn nested_templates_report_only_outermost() {
        let text = "{{Shell|\n{{A}}\n{{B|x={{C}}}}\n}} tail {{D}}";
        assert_eq!(
            outer_texts(text),
            vec!["{{Shell|\n{{A}}\n{{B|x={{C}}}}\n}}", "{{D}}"]
        );
    }

    #[test]
    fn unterminated_template_is_dropped() {
        assert_eq!(outer_texts("{{A}} {{B|x=1"), vec!["{{A}}"]);
        assert!(scan("{{Outer|{{Inner}}").is_empty());
    }

    #[test]
    fn stray_closing_braces_are_ignored() {
        assert_eq!(outer_texts("}} text {{A}}"), vec!["{{A}}"]);
    }

    // ─────────────────────────────────────────────────────────────
    // Opaque regions
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn comments_hide_braces() {
        let text = "<!-- {{NotMe}} -->{{A|b<!-- }} -->}}";
        assert_eq!(outer_texts(text), vec!["{{A|b<!-- }} -->}}"]);
    }

    #[test]
    fn unterminated_comment_runs_to_end() {
        assert!(scan("<!-- {{A}}").is_empty());
        assert!(scan("{{A|<!-- }}").is_empty());
    }

    #[test]
    fn nowiki_hides_braces() {
        let text = "<nowiki>{{NotMe}}</nowiki> {{A|<nowiki >}}</nowiki >}}";
        assert_eq!(outer_texts(text), vec!["{{A|<nowiki >}}</nowiki >}}"]);
    }

    #[test]
    fn parameter_references_are_not_templates() {
        let text = "{{{1}}} {{A|{{{title|}}}}}";
        assert_eq!(outer_texts(text), vec!["{{A|{{{title|}}}}}"]);
    }

    #[test]
    fn four_braces_open_two_templates() {
        let text = "{{{{B}}}}";
        assert_eq!(outer_texts(text), vec!["{{{{B}}}}"]);
    }

    #[test]
    fn multibyte_text_keeps_char_boundaries() {
        let text = "Обсуждение {{Статья проекта Биология|уровень=I}} — ok";
        assert_eq!(
            outer_texts(text),
            vec!["{{Статья проекта Биология|уровень=I}}"]
        );
    }
}
