//! Template decomposition.
//!
//! [`decompose`] turns one scanned span into a [`ParsedTemplate`];
//! [`parse_all`] runs the scanner and decomposer over a page, optionally
//! descending into template interiors so that banners wrapped in a shell
//! come out in the same flat list as the shell itself.

use crate::scanner::{scan, Cursor};
use crate::template::{ParamName, ParsedTemplate};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// Parse every template in `text`.
///
/// With `recursive`, each top-level template's interior is parsed again and
/// its templates appended after all top-level results, parent by parent.
pub fn parse_all(text: &str, recursive: bool) -> Vec<ParsedTemplate> {
    let spans = scan(text);
    let mut templates: Vec<ParsedTemplate> = spans
        .iter()
        .map(|span| decompose(span.outer_text(text)))
        .collect();

    if recursive {
        for span in &spans {
            let interior = span.inner(text);
            if interior.contains("{{") {
                templates.extend(parse_all(interior, true));
            }
        }
    }
    templates
}

/// Split one `{{...}}` span into name and parameters.
pub fn decompose(span_text: &str) -> ParsedTemplate {
    let inner = span_text
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(span_text);

    let mut template = ParsedTemplate::new(span_text);
    let chunks = split_top_level(inner);

    let (first, rest) = match chunks.split_first() {
        Some(split) => split,
        None => return template,
    };
    template.set_name(&inner[first.clone()]);

    // Explicit numeric keys claim their positions before numbering starts
    let claimed: HashSet<usize> = rest
        .iter()
        .map(|range| &inner[range.clone()])
        .filter_map(|chunk| top_level_equals(chunk).map(|eq| chunk[..eq].trim()))
        .filter_map(|key| key.parse::<usize>().ok())
        .collect();

    let mut next_position = 1;
    let mut equals_styles = Vec::new();
    for range in rest {
        let chunk = &inner[range.clone()];
        if chunk.trim().is_empty() {
            continue;
        }
        match top_level_equals(chunk) {
            Some(eq) => {
                let (key, value) = (&chunk[..eq], &chunk[eq + 1..]);
                equals_styles.push(format!("{}={}", trailing_ws(key), leading_ws(value)));
                template.add_param(ParamName::Named(key.trim().to_string()), value.trim(), chunk);
            }
            None => {
                while claimed.contains(&next_position) {
                    next_position += 1;
                }
                template.add_param(ParamName::Positional(next_position), chunk.trim(), chunk);
                next_position += 1;
            }
        }
    }

    let pipe_styles = rest.iter().map(|range| {
        // The separator sits one byte before each parameter chunk
        let before = &inner[..range.start - 1];
        format!("{}|{}", trailing_ws(before), leading_ws(&inner[range.clone()]))
    });
    if let Some(style) = most_frequent(pipe_styles) {
        template.pipe_style = style;
    }
    if let Some(style) = most_frequent(equals_styles) {
        template.equals_style = style;
    }
    template.end_braces_style = format!("{}}}}}", trailing_ws(inner));

    template
}

/// Byte ranges of the chunks between top-level pipes.
///
/// Pipes inside nested templates, wikilinks, comments, nowiki blocks and
/// parameter references do not separate chunks.
fn split_top_level(inner: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut cursor = Cursor::new(inner);
    let mut braces: usize = 0;
    let mut links: usize = 0;
    let mut start = 0;

    while !cursor.at_end() {
        if cursor.skip_opaque() {
            continue;
        }
        if cursor.at("{{") {
            braces += 1;
            cursor.advance(2);
        } else if cursor.at("}}") {
            braces = braces.saturating_sub(1);
            cursor.advance(2);
        } else if cursor.at("[[") {
            links += 1;
            cursor.advance(2);
        } else if cursor.at("]]") {
            links = links.saturating_sub(1);
            cursor.advance(2);
        } else if cursor.at("|") && braces == 0 && links == 0 {
            ranges.push(start..cursor.pos());
            cursor.advance(1);
            start = cursor.pos();
        } else {
            cursor.advance_char();
        }
    }
    ranges.push(start..inner.len());
    ranges
}

/// Offset of the `=` that makes `chunk` a named parameter.
///
/// Only an `=` outside nested templates, links and opaque regions counts,
/// and a chunk with `{{` ahead of that `=` stays positional.
pub(crate) fn top_level_equals(chunk: &str) -> Option<usize> {
    let mut cursor = Cursor::new(chunk);
    let mut braces: usize = 0;
    let mut links: usize = 0;
    let mut seen_template = false;

    while !cursor.at_end() {
        if cursor.skip_opaque() {
            continue;
        }
        if cursor.at("{{") {
            braces += 1;
            seen_template = true;
            cursor.advance(2);
        } else if cursor.at("}}") {
            braces = braces.saturating_sub(1);
            cursor.advance(2);
        } else if cursor.at("[[") {
            links += 1;
            cursor.advance(2);
        } else if cursor.at("]]") {
            links = links.saturating_sub(1);
            cursor.advance(2);
        } else if cursor.at("=") && braces == 0 && links == 0 {
            return if seen_template { None } else { Some(cursor.pos()) };
        } else {
            cursor.advance_char();
        }
    }
    None
}

fn leading_ws(s: &str) -> &str {
    &s[..s.len() - s.trim_start().len()]
}

fn trailing_ws(s: &str) -> &str {
    &s[s.trim_end().len()..]
}

/// The value seen most often. On a tie the one that got there first wins.
pub(crate) fn most_frequent<I>(items: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut best: Option<(String, usize)> = None;

    for item in items {
        let count = counts.entry(item.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        if best.as_ref().map_or(true, |(_, n)| count > *n) {
            best = Some((item, count));
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(templates: &[ParsedTemplate]) -> Vec<&str> {
        templates.iter().map(|t| t.name.as_str()).collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn named_and_positional_parameters() {
        let t = decompose("{{WikiProject Biology| class = B |importance=Low|yes}}");
        assert_eq!(t.name, "WikiProject Biology");
        assert_eq!(t.parameters.len(), 3);
        assert_eq!(t.parameters[0].name, ParamName::Named("class".into()));
        assert_eq!(t.parameters[0].value, "B");
        assert_eq!(t.parameters[0].wikitext.as_deref(), Some("| class = B "));
        assert_eq!(t.parameters[2].name, ParamName::Positional(1));
        assert_eq!(t.parameters[2].value, "yes");
    }

    #[test]
    fn positional_numbering_skips_claimed_indexes() {
        let t = decompose("{{T|a|1=b|c}}");
        assert_eq!(t.parameters[0].name, ParamName::Positional(2));
        assert_eq!(t.parameters[0].value, "a");
        assert_eq!(t.parameters[1].name, ParamName::Named("1".into()));
        assert_eq!(t.parameters[1].value, "b");
        assert_eq!(t.parameters[2].name, ParamName::Positional(3));
        assert_eq!(t.get_param("1").unwrap().value, "b");
    }

    #[test]
    fn link_pipes_do_not_split() {
        let t = decompose("{{T|[[File:x.png|thumb|caption with, comma]]|class=B}}");
        assert_eq!(t.parameters.len(), 2);
        assert_eq!(t.parameters[0].value, "[[File:x.png|thumb|caption with, comma]]");
        assert_eq!(t.get_param("class").unwrap().value, "B");
    }

    #[test]
    fn nested_template_pipes_do_not_split() {
        let t = decompose("{{T|note={{Tooltip|a|b=c}}|d}}");
        assert_eq!(t.parameters.len(), 2);
        assert_eq!(t.get_param("note").unwrap().value, "{{Tooltip|a|b=c}}");
        assert_eq!(t.get_param("1").unwrap().value, "d");
    }

    #[test]
    fn template_before_equals_is_positional() {
        let t = decompose("{{T|{{B|x=1}} and more}}");
        assert_eq!(t.parameters[0].name, ParamName::Positional(1));
        assert_eq!(t.parameters[0].value, "{{B|x=1}} and more");
    }

    #[test]
    fn equals_inside_link_or_comment_is_positional() {
        let t = decompose("{{T|[[a|b=c]]|x<!-- y=z -->}}");
        assert_eq!(t.parameters[0].name, ParamName::Positional(1));
        assert_eq!(t.parameters[1].name, ParamName::Positional(2));
    }

    #[test]
    fn value_keeps_later_equals_signs() {
        let t = decompose("{{T|formula=a=b}}");
        assert_eq!(t.get_param("formula").unwrap().value, "a=b");
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let t = decompose("{{T||class=B| }}");
        assert_eq!(t.parameters.len(), 1);
    }

    #[test]
    fn comment_pipes_and_parameter_references() {
        let t = decompose("{{T|a<!-- | -->|b={{{1|}}}}}");
        assert_eq!(t.parameters.len(), 2);
        assert_eq!(t.parameters[0].value, "a<!-- | -->");
        assert_eq!(t.get_param("b").unwrap().value, "{{{1|}}}");
    }

    #[test]
    fn template_without_parameters() {
        let t = decompose("{{Talk header}}");
        assert_eq!(t.name, "Talk header");
        assert!(t.parameters.is_empty());
        assert_eq!(t.end_braces_style, "}}");
    }

    // ─────────────────────────────────────────────────────────────
    // Style inference
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn inline_spacing_styles() {
        let t = decompose("{{A | x = 1 | y = 2 }}");
        assert_eq!(t.pipe_style, " | ");
        assert_eq!(t.equals_style, " = ");
        assert_eq!(t.end_braces_style, " }}");
    }

    #[test]
    fn multiline_styles() {
        let t = decompose("{{A\n|x=1\n|y=2\n|z = 3\n}}");
        assert_eq!(t.pipe_style, "\n|");
        assert_eq!(t.equals_style, "=");
        assert_eq!(t.end_braces_style, "\n}}");
    }

    #[test]
    fn defaults_without_parameters() {
        let t = decompose("{{A}}");
        assert_eq!(t.pipe_style, " |");
        assert_eq!(t.equals_style, "=");
    }

    #[test]
    fn most_frequent_prefers_first_on_tie() {
        let items = vec!["|".to_string(), " |".to_string(), " |".to_string(), "|".to_string()];
        assert_eq!(most_frequent(items).as_deref(), Some(" |"));
        let tie = vec!["a".to_string(), "b".to_string()];
        assert_eq!(most_frequent(tie).as_deref(), Some("a"));
        assert_eq!(most_frequent(Vec::new()), None);
    }

    // ─────────────────────────────────────────────────────────────
    // Whole pages
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn recursive_parse_flattens_shell() {
        let text = "{{Shell|\n{{A}}\n{{B|x=1}}\n}}";
        let templates = parse_all(text, true);
        assert_eq!(names(&templates), vec!["Shell", "A", "B"]);

        let shell = &templates[0];
        assert_eq!(shell.parameters.len(), 1);
        assert_eq!(shell.parameters[0].name, ParamName::Positional(1));
        assert_eq!(shell.parameters[0].value, "{{A}}\n{{B|x=1}}");
        assert_eq!(templates[2].get_param("x").unwrap().value, "1");
    }

    #[test]
    fn non_recursive_parse_keeps_top_level_only() {
        let text = "{{Shell|{{A}}}}\n{{C}}";
        assert_eq!(names(&parse_all(text, false)), vec!["Shell", "C"]);
    }

    #[test]
    fn recursive_order_is_parents_first() {
        let text = "{{P1|{{C1}}}} {{P2|{{C2|{{G}}}}}}";
        assert_eq!(
            names(&parse_all(text, true)),
            vec!["P1", "P2", "C1", "C2", "G"]
        );
    }

    #[test]
    fn parsed_span_is_original_text() {
        let text = "before {{A |b = c}} after";
        let templates = parse_all(text, false);
        assert_eq!(templates[0].wikitext, "{{A |b = c}}");
        assert_eq!(templates[0].to_wikitext(), "{{A |b = c}}");
    }
}
