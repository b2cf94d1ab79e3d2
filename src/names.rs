//! Template name normalization and shell detection.

use crate::config::RaterConfig;
use crate::template::ParsedTemplate;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NAME_SPACING: Regex = Regex::new(r"[ _\u{00A0}]+").unwrap();
    static ref NAME_COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    // Whitespace and underscores inside a name pattern, including the typographic spaces
    static ref PATTERN_SPACING: Regex =
        Regex::new(r"(?:\\ |_|\s|\u{00A0}|[\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}])+").unwrap();
}

const PATTERN_SPACE_CLASS: &str = r"[\s_\u{00A0}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}]+";

/// Remove one leading `Namespace:` prefix, matching aliases case-insensitively.
pub fn strip_namespace<'a>(name: &'a str, namespace_aliases: &[String]) -> &'a str {
    for alias in namespace_aliases {
        let Some(head) = name.get(..alias.len()) else {
            continue;
        };
        if !head.to_lowercase().eq(&alias.to_lowercase()) {
            continue;
        }
        if let Some(rest) = name[alias.len()..].trim_start().strip_prefix(':') {
            return rest;
        }
    }
    name
}

/// Name as written → comparable name: comments dropped, one namespace prefix
/// stripped, spaces/underscores collapsed, trimmed, NFC.
pub fn normalize(name: &str, namespace_aliases: &[String]) -> String {
    let without_comments = NAME_COMMENT.replace_all(name, "");
    let collapsed = NAME_SPACING.replace_all(&without_comments, " ");
    strip_namespace(collapsed.trim(), namespace_aliases)
        .trim()
        .nfc()
        .collect()
}

/// Uppercase the first letter, as MediaWiki does for page titles.
pub fn ucfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Normalized name with the first letter uppercased. Two names refer to the
/// same template exactly when their canonical titles are equal.
pub fn canonical_title(name: &str, namespace_aliases: &[String]) -> String {
    ucfirst(&normalize(name, namespace_aliases))
}

/// Regex alternation matching any of `names`, longest first, with flexible
/// whitespace between words.
pub fn name_alternation<S: AsRef<str>>(names: &[S]) -> Option<String> {
    let mut list: Vec<&str> = names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .collect();
    if list.is_empty() {
        return None;
    }
    list.sort_by(|a, b| b.len().cmp(&a.len()));
    list.dedup();

    let alternatives: Vec<String> = list
        .iter()
        .map(|name| {
            PATTERN_SPACING
                .replace_all(&regex::escape(name), PATTERN_SPACE_CLASS)
                .into_owned()
        })
        .collect();
    Some(alternatives.join("|"))
}

/// Optional `(?:NS1|NS2):` prefix for name regexes.
pub fn namespace_pattern(namespace_aliases: &[String]) -> String {
    if namespace_aliases.is_empty() {
        return String::new();
    }
    let escaped: Vec<String> = namespace_aliases.iter().map(|n| regex::escape(n)).collect();
    format!(r"(?:(?:{})\s*:\s*)?", escaped.join("|"))
}

/// Recognizes the shell template under its canonical name and known aliases.
#[derive(Debug, Clone)]
pub struct ShellMatcher {
    titles: HashSet<String>,
    names: Vec<String>,
    namespaces: Vec<String>,
}

impl ShellMatcher {
    pub fn new(config: &RaterConfig) -> Self {
        let namespaces = config.template_namespaces();
        let mut names = vec![normalize(&config.shell_template, &namespaces)];
        for alias in &config.shell_aliases {
            let name = normalize(alias, &namespaces);
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        let titles = names.iter().map(|n| ucfirst(n)).collect();
        ShellMatcher {
            titles,
            names,
            namespaces,
        }
    }

    pub fn is_shell_name(&self, name: &str) -> bool {
        self.titles.contains(&canonical_title(name, &self.namespaces))
    }

    /// Checks the redirect target when one is known, else the written name.
    pub fn is_shell(&self, template: &ParsedTemplate) -> bool {
        self.is_shell_name(template.effective_name())
    }

    /// Shell name followed by its aliases, namespace stripped
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }
}

pub fn is_shell_template(template: &ParsedTemplate, config: &RaterConfig) -> bool {
    ShellMatcher::new(config).is_shell(template)
}
