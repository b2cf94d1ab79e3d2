//! Merging a rendered banner block back into a talk page.
//!
//! [`apply`] touches as little of the page as it can. Everything outside the
//! banner or shell region is copied through byte for byte, and when the page
//! already says what the block says, the page comes back unchanged.

use crate::config::RaterConfig;
use crate::names::{name_alternation, namespace_pattern, ShellMatcher};
use crate::parser::decompose;
use crate::scanner::{scan, Span};
use crate::template::{ParamName, Parameter, ParsedTemplate};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use std::ops::Range;

lazy_static! {
    static ref EXCESS_BLANK_LINES: Regex = Regex::new(r"\n{4,}").unwrap();
    static ref HEADING: Regex = Regex::new(r"^={2,}.*={2,}\s*$").unwrap();
    static ref REDIRECT: Regex = Regex::new(r"(?i)^\s*#REDIRECT").unwrap();
}

/// A shell as it appears in text: first line, body lines, closing line.
struct ShellLayout<'a> {
    open: &'a str,
    inner: Vec<&'a str>,
}

impl<'a> ShellLayout<'a> {
    /// Body lines only exist when the closing `}}` sits on its own line.
    fn of(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split('\n').collect();
        match lines.split_last() {
            Some((last, rest)) if !rest.is_empty() && last.trim() == "}}" => ShellLayout {
                open: rest[0],
                inner: rest[1..].to_vec(),
            },
            _ => ShellLayout {
                open: text,
                inner: Vec::new(),
            },
        }
    }

    fn normalized_inner(&self) -> String {
        let joined = self
            .inner
            .iter()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        EXCESS_BLANK_LINES
            .replace_all(&joined, "\n\n\n")
            .trim()
            .to_string()
    }
}

fn top_level_templates(text: &str) -> Vec<(Span, ParsedTemplate)> {
    scan(text)
        .into_iter()
        .map(|span| (span, decompose(span.outer_text(text))))
        .collect()
}

/// Merge `block` into `page`.
///
/// 1. If the page has a shell and the block is a shell, only the shell is
///    rewritten, and not at all when its body is unchanged or when the block
///    would empty a non-empty shell.
/// 2. If the page has a shell and the block isn't one, the block replaces
///    the shell.
/// 3. Otherwise the first of `existing_banner_names` found on the page is
///    replaced by the block and the rest are removed; with none found the
///    block goes to the top of the page, after any leading templates.
pub fn apply(page: &str, block: &str, existing_banner_names: &[String], config: &RaterConfig) -> String {
    let block = block.trim();
    if page.trim().is_empty() {
        return block.to_string();
    }

    let matcher = ShellMatcher::new(config);
    let templates = top_level_templates(page);

    if let Some((shell_span, _)) = templates.iter().find(|(_, t)| matcher.is_shell(t)) {
        let range = shell_span.outer();
        let block_is_shell = top_level_templates(block)
            .first()
            .map_or(false, |(span, t)| span.outer().start == 0 && matcher.is_shell(t));

        if !block_is_shell {
            tracing::debug!("flattening shell");
            return splice(page, range, block);
        }
        return merge_shell(page, range, block);
    }

    replace_banners(page, &templates, block, existing_banner_names, &matcher)
}

fn splice(page: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(page.len() + replacement.len());
    out.push_str(&page[..range.start]);
    out.push_str(replacement);
    out.push_str(&page[range.end..]);
    out
}

fn merge_shell(page: &str, range: Range<usize>, block: &str) -> String {
    let current = ShellLayout::of(&page[range.clone()]);
    let desired = ShellLayout::of(block);
    let current_inner = current.normalized_inner();
    let desired_inner = desired.normalized_inner();

    if desired_inner.is_empty() && !current_inner.is_empty() {
        tracing::warn!("refusing to empty the banner shell");
        return page.to_string();
    }
    if desired_inner == current_inner {
        if desired.open.trim() == current.open.trim() {
            return page.to_string();
        }
        if !current.inner.is_empty() && !desired.inner.is_empty() {
            // Same body; only the shell's own parameters changed
            let open_end = range.start + current.open.len();
            return splice(page, range.start..open_end, desired.open);
        }
    }
    splice(page, range, block)
}

/// Byte range to delete for a template: its whole line(s) when nothing else
/// shares them, otherwise just the template.
fn removal_range(page: &str, outer: Range<usize>) -> Range<usize> {
    let line_start = page[..outer.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = page[outer.end..]
        .find('\n')
        .map_or(page.len(), |i| outer.end + i);
    let alone = page[line_start..outer.start].trim().is_empty()
        && page[outer.end..line_end].trim().is_empty();

    if !alone {
        outer
    } else if line_end < page.len() {
        line_start..line_end + 1
    } else if line_start > 0 {
        line_start - 1..line_end
    } else {
        line_start..line_end
    }
}

fn banner_name_regex(names: &[String], namespaces: &[String]) -> Option<Regex> {
    let alternation = name_alternation(names)?;
    let pattern = format!(r"^\s*{}(?:{})\s*$", namespace_pattern(namespaces), alternation);
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

fn replace_banners(
    page: &str,
    templates: &[(Span, ParsedTemplate)],
    block: &str,
    existing_banner_names: &[String],
    matcher: &ShellMatcher,
) -> String {
    let matched: Vec<Range<usize>> = match banner_name_regex(existing_banner_names, matcher.namespaces()) {
        Some(re) => templates
            .iter()
            .filter(|(_, t)| re.is_match(&t.name))
            .map(|(span, _)| span.outer())
            .collect(),
        None => Vec::new(),
    };

    let Some(first) = matched.first() else {
        return insert_at_top(page, templates, block);
    };
    tracing::debug!(found = matched.len(), "replacing existing banners");

    let mut out = String::with_capacity(page.len() + block.len());
    let mut cursor = 0;
    for (i, outer) in matched.iter().enumerate() {
        let range = if i == 0 && !block.is_empty() {
            first.clone()
        } else {
            removal_range(page, outer.clone())
        };
        if range.start < cursor {
            continue;
        }
        out.push_str(&page[cursor..range.start]);
        if i == 0 {
            out.push_str(block);
        }
        cursor = range.end;
    }
    out.push_str(&page[cursor..]);
    out
}

/// Insert after the last template of the lead section that has a line to
/// itself, or at the first non-blank line when there is none. A leading
/// redirect line always stays first.
fn insert_at_top(page: &str, templates: &[(Span, ParsedTemplate)], block: &str) -> String {
    if block.is_empty() {
        return page.to_string();
    }
    let mut lines: Vec<&str> = page.split('\n').collect();

    let floor = usize::from(lines.first().map_or(false, |line| REDIRECT.is_match(line)));
    let mut first_content = floor;
    while first_content < lines.len() && lines[first_content].trim().is_empty() {
        first_content += 1;
    }
    let lead_end = lines
        .iter()
        .position(|line| HEADING.is_match(line.trim()))
        .unwrap_or(lines.len());
    let lead_end_offset: usize = lines[..lead_end].iter().map(|l| l.len() + 1).sum();

    let line_of = |offset: usize| page[..offset].matches('\n').count();
    let after_templates = templates
        .iter()
        .map(|(span, _)| span.outer())
        .filter(|outer| outer.end <= lead_end_offset)
        .filter(|outer| {
            let line_start = page[..outer.start].rfind('\n').map_or(0, |i| i + 1);
            let line_end = page[outer.end..].find('\n').map_or(page.len(), |i| outer.end + i);
            page[line_start..outer.start].trim().is_empty() && page[outer.end..line_end].trim().is_empty()
        })
        .map(|outer| line_of(outer.end) + 1)
        .last();

    let index = after_templates
        .unwrap_or(first_content)
        .max(floor)
        .min(lines.len());
    lines.insert(index, block);
    lines.join("\n")
}

/// Render the banners as one block, wrapped in a shell when there is one
/// already or when there are at least `min_for_shell` banners.
///
/// With `bypass_redirects` set, banners transcluded through a redirect are
/// written under their target name.
pub fn render_banner_block(
    shell: Option<&ParsedTemplate>,
    banners: &[ParsedTemplate],
    config: &RaterConfig,
) -> String {
    let matcher = ShellMatcher::new(config);
    let bypass = config.preferences.bypass_redirects;
    let rendered: Vec<String> = banners
        .iter()
        .filter(|banner| !matcher.is_shell(banner))
        .map(|banner| {
            if bypass && banner.redirect_target.is_some() {
                let mut banner = banner.clone();
                banner.bypass_redirect();
                banner.to_wikitext()
            } else {
                banner.to_wikitext()
            }
        })
        .collect();
    let content = rendered.join("\n");

    let min_for_shell = config.preferences.min_for_shell;
    let wants_shell =
        shell.is_some() || (min_for_shell > 0 && !rendered.is_empty() && rendered.len() >= min_for_shell);
    if !wants_shell {
        return content;
    }

    let mut shell = shell
        .cloned()
        .unwrap_or_else(|| ParsedTemplate::named(&config.shell_template));
    set_shell_content(&mut shell, &content);
    shell.to_wikitext()
}

/// Put `content` in the shell's first positional parameter, one banner per
/// line between the open and closing lines.
pub fn set_shell_content(shell: &mut ParsedTemplate, content: &str) {
    let content = content.trim();
    let existing = shell.parameters.iter().position(|p| p.name.matches("1"));
    if existing.map_or(false, |i| shell.parameters[i].value == content) {
        return;
    }

    if content.is_empty() {
        if let Some(i) = existing {
            shell.parameters.remove(i);
            shell.mark_modified();
        }
        return;
    }

    let param = Parameter {
        name: ParamName::Positional(1),
        value: content.to_string(),
        wikitext: Some(format!("|\n{}\n", content)),
        autofilled: false,
    };
    match existing {
        Some(i) => shell.parameters[i] = param,
        None => shell.parameters.push(param),
    }
    if !shell.end_braces_style.contains('\n') {
        shell.end_braces_style = "\n}}".to_string();
    }
    shell.mark_modified();
}

/// Lists of changed banners for the edit summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSummary {
    pub removed: Vec<String>,
    pub edited: Vec<String>,
    pub added: Vec<String>,
    pub overall_class: Option<String>,
    pub overall_importance: Option<String>,
}

/// `"Subst:WikiProject Biology"` → `"Biology"`
pub fn short_banner_name(name: &str) -> String {
    name.replacen("WikiProject ", "", 1).replacen("Subst:", "", 1)
}

/// Summary entry for one banner, e.g. `"Biology (B/Low)"`.
pub fn describe_banner(name: &str, class: Option<&str>, importance: Option<&str>) -> String {
    let rating = match (class, importance) {
        (Some(c), Some(i)) => format!(" ({}/{})", c, i),
        (Some(r), None) | (None, Some(r)) => format!(" ({})", r),
        (None, None) => String::new(),
    };
    format!("{}{}", short_banner_name(name), rating)
}

/// `Assessment (C/Low): edited, added, removed` followed by the advert.
pub fn build_edit_summary(summary: &EditSummary, advert: &str) -> String {
    let overall = match (&summary.overall_class, &summary.overall_importance) {
        (Some(c), Some(i)) => format!(" ({}/{})", c, i),
        (Some(r), None) | (None, Some(r)) => format!(" ({})", r),
        (None, None) => String::new(),
    };
    let body: Vec<&str> = summary
        .edited
        .iter()
        .chain(&summary.added)
        .chain(&summary.removed)
        .map(String::as_str)
        .collect();
    format!("Assessment{}: {}{}", overall, body.join(", "), advert)
}
