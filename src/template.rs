//! In-memory model of one template transclusion.

use crate::template_data::{ParamSchema, ParamSuggestion};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

lazy_static! {
    // Blank lines right before the closing braces of a re-rendered template
    static ref TRAILING_BLANK_LINES: Regex = Regex::new(r"\n+\}\}$").unwrap();
}

// Helper function for serde skip_serializing_if
fn is_false(b: &bool) -> bool {
    !*b
}

/// Parameter key: an implicit position or the name written before `=`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ParamName {
    Positional(usize),
    Named(String),
}

impl ParamName {
    /// `|1=x` and the first positional parameter both answer to "1"
    pub fn matches(&self, key: &str) -> bool {
        match self {
            ParamName::Positional(n) => key.trim().parse::<usize>().map_or(false, |k| k == *n),
            ParamName::Named(name) => name == key,
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, ParamName::Positional(_))
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamName::Positional(n) => write!(f, "{}", n),
            ParamName::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: ParamName,
    /// Trimmed value
    pub value: String,
    /// Original text including the leading pipe; dropped once the value changes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wikitext: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub autofilled: bool,
}

impl Parameter {
    fn render(&self, pipe: &str, equals: &str) -> String {
        match &self.name {
            ParamName::Positional(n) => {
                if crate::parser::top_level_equals(&self.value).is_some() {
                    format!("{}{}{}{}", pipe, n, equals, self.value)
                } else {
                    format!("{}{}", pipe, self.value)
                }
            }
            ParamName::Named(name) => format!("{}{}{}{}", pipe, name, equals, self.value),
        }
    }
}

/// A page title with the namespace already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Title {
    main_text: String,
}

impl Title {
    pub fn new(main_text: impl Into<String>) -> Self {
        Title {
            main_text: main_text.into(),
        }
    }

    pub fn main_text(&self) -> &str {
        &self.main_text
    }

    pub fn prefixed_text(&self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.main_text.clone()
        } else {
            format!("{}:{}", namespace, self.main_text)
        }
    }
}

/// One transclusion as found on the page.
///
/// `wikitext` always holds the original source span. Edits go through the
/// parameter methods, which mark the template modified so that
/// [`ParsedTemplate::to_wikitext`] re-renders it instead of echoing the
/// original.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedTemplate {
    pub name: String,
    pub wikitext: String,
    pub parameters: Vec<Parameter>,
    pub pipe_style: String,
    pub equals_style: String,
    pub end_braces_style: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<Title>,
    /// Name as written before a redirect was bypassed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypassed_name: Option<String>,

    #[serde(skip)]
    pub param_data: Option<IndexMap<String, ParamSchema>>,
    /// alias → canonical parameter name, from TemplateData
    #[serde(skip)]
    pub param_aliases: HashMap<String, String>,
    #[serde(skip)]
    pub parameter_suggestions: Vec<ParamSuggestion>,
    #[serde(skip)]
    pub notemplatedata: bool,
    pub class_param_name: String,
    pub importance_param_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importances: Option<Vec<String>>,
    #[serde(skip_serializing_if = "is_false")]
    pub without_ratings: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub inactive_project: bool,

    #[serde(skip)]
    modified: bool,
}

impl ParsedTemplate {
    pub fn new(wikitext: impl Into<String>) -> Self {
        ParsedTemplate {
            name: String::new(),
            wikitext: wikitext.into(),
            parameters: Vec::new(),
            pipe_style: " |".to_string(),
            equals_style: "=".to_string(),
            end_braces_style: "}}".to_string(),
            redirect_target: None,
            bypassed_name: None,
            param_data: None,
            param_aliases: HashMap::new(),
            parameter_suggestions: Vec::new(),
            notemplatedata: false,
            class_param_name: "class".to_string(),
            importance_param_name: "importance".to_string(),
            classes: None,
            importances: None,
            without_ratings: false,
            inactive_project: false,
            modified: false,
        }
    }

    /// A template that exists only in memory, e.g. a banner the user adds.
    pub fn named(name: &str) -> Self {
        let mut template = ParsedTemplate::new(format!("{{{{{}}}}}", name.trim()));
        template.set_name(name);
        template.pipe_style = "|".to_string();
        template.modified = true;
        template
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.trim().to_string();
    }

    /// Record a parameter exactly as parsed. `chunk` is the text after the pipe.
    pub fn add_param(&mut self, name: ParamName, value: &str, chunk: &str) {
        self.parameters.push(Parameter {
            name,
            value: value.to_string(),
            wikitext: Some(format!("|{}", chunk)),
            autofilled: false,
        });
    }

    pub fn get_param(&self, key: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name.matches(key))
    }

    pub fn get_param_mut(&mut self, key: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name.matches(key))
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.get_param(key).is_some()
    }

    /// Set a value, adding a named parameter at the end when it's new.
    pub fn set_param(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match self.get_param_mut(key) {
            Some(param) => {
                if param.value == value {
                    return;
                }
                param.value = value.to_string();
                param.wikitext = None;
                param.autofilled = false;
            }
            None => self.parameters.push(Parameter {
                name: ParamName::Named(key.trim().to_string()),
                value: value.to_string(),
                wikitext: None,
                autofilled: false,
            }),
        }
        self.modified = true;
    }

    pub(crate) fn push_autofilled(&mut self, key: &str, value: &str) {
        self.parameters.push(Parameter {
            name: ParamName::Named(key.to_string()),
            value: value.to_string(),
            wikitext: None,
            autofilled: true,
        });
        self.modified = true;
    }

    pub fn remove_param(&mut self, key: &str) -> Option<Parameter> {
        let index = self.parameters.iter().position(|p| p.name.matches(key))?;
        self.modified = true;
        Some(self.parameters.remove(index))
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Name used for identity: the redirect target when known.
    pub fn effective_name(&self) -> &str {
        self.redirect_target
            .as_ref()
            .map(|t| t.main_text())
            .unwrap_or(&self.name)
    }

    /// Replace a redirect name with its target. Returns false when there is
    /// no redirect to bypass.
    pub fn bypass_redirect(&mut self) -> bool {
        let Some(target) = self.redirect_target.take() else {
            return false;
        };
        self.bypassed_name = Some(std::mem::replace(&mut self.name, target.main_text().to_string()));
        self.modified = true;
        true
    }

    /// Render back to wikitext.
    ///
    /// An untouched template returns its original span byte for byte.
    /// Otherwise the template is rebuilt with the inferred styles, and
    /// parameters that kept their original text reuse it.
    pub fn to_wikitext(&self) -> String {
        if !self.modified {
            return self.wikitext.clone();
        }

        let lead = self
            .pipe_style
            .split('|')
            .next()
            .unwrap_or_default();

        let mut out = format!("{{{{{}", self.name);
        for param in &self.parameters {
            match &param.wikitext {
                Some(raw) => {
                    out.push_str(lead);
                    out.push_str(raw.trim_end());
                }
                None => out.push_str(&param.render(&self.pipe_style, &self.equals_style)),
            }
        }
        out.push_str(&self.end_braces_style);

        TRAILING_BLANK_LINES.replace(&out, "\n}}").into_owned()
    }
}
