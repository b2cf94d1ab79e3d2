//! TemplateData metadata for banner parameters.
//!
//! The payload is whatever the wiki's `action=templatedata` returns for a
//! banner; fetching it is the caller's business. [`attach`] folds it into a
//! [`ParsedTemplate`] and works out which parameters carry the class and
//! importance ratings.

use crate::config::RaterConfig;
use crate::template::ParsedTemplate;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // A bracketed list of quoted values somewhere in a description
    static ref ALLOWED_VALUES_HINT: Regex = Regex::new(r"\[.*'.+?'.*?\]").unwrap();
    static ref BEFORE_LIST: Regex = Regex::new(r"^.*\[").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*\]").unwrap();
    static ref AFTER_LIST: Regex = Regex::new(r"\].*$").unwrap();

    static ref CLASS_KEY: Regex = Regex::new(r"(?i)class|класс|уров").unwrap();
    static ref IMPORTANCE_KEY: Regex = Regex::new(r"(?i)importance|важност").unwrap();

    static ref DISAMBIGUATOR: Regex = Regex::new(r"\s\(.*\)").unwrap();
    static ref GENERATIONAL_SUFFIX: Regex = Regex::new(r" (?:[JS]r.?|[IVX]+)$").unwrap();
}

const BIOGRAPHY_BANNER: &str = "WikiProject Biography";

/// Text that TemplateData gives either as a plain string or per language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    ByLanguage(IndexMap<String, String>),
}

impl LocalizedText {
    pub fn en(text: &str) -> Self {
        let mut map = IndexMap::new();
        map.insert("en".to_string(), text.to_string());
        LocalizedText::ByLanguage(map)
    }

    /// English text, else the first language given
    pub fn text(&self) -> Option<&str> {
        match self {
            LocalizedText::Plain(s) => Some(s),
            LocalizedText::ByLanguage(map) => map
                .get("en")
                .or_else(|| map.values().next())
                .map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamSchema {
    pub label: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
    pub aliases: Vec<String>,
    pub required: bool,
    pub suggested: bool,
    #[serde(rename = "suggestedvalues")]
    pub suggested_values: Vec<String>,
    #[serde(rename = "allowedValues")]
    pub allowed_values: Vec<String>,
    pub autovalue: Option<String>,
}

/// One `pages[id]` entry of a TemplateData response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateData {
    pub params: IndexMap<String, ParamSchema>,
    #[serde(rename = "paramOrder")]
    pub param_order: Option<Vec<String>>,
    pub notemplatedata: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSuggestion {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ParsedTemplate {
    /// Schema for a parameter, following aliases to the preferred name.
    pub fn param_schema(&self, name: &str) -> Option<&ParamSchema> {
        let data = self.param_data.as_ref()?;
        let preferred = self.param_aliases.get(name).map_or(name, String::as_str);
        data.get(preferred)
    }
}

/// Attach TemplateData to a template, falling back to the configured
/// default parameter data when the banner has none.
pub fn attach(template: &mut ParsedTemplate, data: Option<TemplateData>, config: &RaterConfig) {
    let (mut params, order) = match data {
        Some(data) if !data.notemplatedata && !data.params.is_empty() => {
            (data.params, data.param_order)
        }
        _ => {
            tracing::debug!(template = %template.name, "no TemplateData, using defaults");
            template.notemplatedata = true;
            (config.default_parameter_data.clone(), None)
        }
    };

    template.param_aliases.clear();
    for (name, schema) in params.iter_mut() {
        for alias in &schema.aliases {
            template.param_aliases.insert(alias.clone(), name.clone());
        }
        let description = schema.description.as_ref().and_then(LocalizedText::text);
        if let Some(description) = description {
            if ALLOWED_VALUES_HINT.is_match(description) {
                match allowed_values_from_description(description) {
                    Some(values) => schema.allowed_values = values,
                    None => tracing::warn!(
                        template = %template.name,
                        param = %name,
                        "could not parse allowed values in description: {}",
                        description
                    ),
                }
            }
        }
    }

    let order = order.unwrap_or_else(|| params.keys().cloned().collect());
    template.param_data = Some(params);
    template.class_param_name = rating_param_name(template, "class", &CLASS_KEY);
    template.importance_param_name = rating_param_name(template, "importance", &IMPORTANCE_KEY);
    template.parameter_suggestions = parameter_suggestions(template, &order);
}

/// `"Quality. Allowed values: ['yes', 'no']."` → `["yes", "no"]`
pub fn allowed_values_from_description(description: &str) -> Option<Vec<String>> {
    let list = BEFORE_LIST.replace(description, "[");
    let list = list.replace('"', "\\\"").replace('\'', "\"");
    let list = TRAILING_COMMA.replace(&list, "]");
    let list = AFTER_LIST.replace(&list, "]");
    serde_json::from_str(&list).ok()
}

/// Parameter holding a rating: the exact name or an alias (ignoring case),
/// else the first key that looks like one, else `fallback`.
fn rating_param_name(template: &ParsedTemplate, fallback: &str, heuristic: &Regex) -> String {
    let Some(data) = template.param_data.as_ref() else {
        return fallback.to_string();
    };
    let target = fallback.to_lowercase();

    if let Some(key) = data.keys().find(|k| k.to_lowercase() == target) {
        return key.clone();
    }
    if let Some((_, canonical)) = template
        .param_aliases
        .iter()
        .find(|(alias, _)| alias.to_lowercase() == target)
    {
        return canonical.clone();
    }
    data.keys()
        .find(|k| heuristic.is_match(k))
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

/// Names offered when adding a parameter, rating parameters excluded.
pub fn parameter_suggestions(template: &ParsedTemplate, order: &[String]) -> Vec<ParamSuggestion> {
    order
        .iter()
        .filter(|name| !name.is_empty() && *name != "class" && *name != "importance")
        .map(|name| {
            let label = template
                .param_schema(name)
                .and_then(|schema| schema.label.as_ref())
                .and_then(LocalizedText::text)
                .map(|label| format!("{} (|{}=)", label, name));
            ParamSuggestion {
                name: name.clone(),
                label,
            }
        })
        .collect()
}

/// Sort key for a biography subject: `"John Smith"` → `"Smith, John"`.
pub fn make_list_as(subject: &str) -> String {
    let mut name = DISAMBIGUATOR.replace(subject, "").into_owned();
    if !name.contains(' ') {
        return name;
    }

    let mut suffix = String::new();
    if GENERATIONAL_SUFFIX.is_match(&name) {
        if let Some(space) = name.rfind(' ') {
            suffix = name[space..].to_string();
            name.truncate(space);
        }
        if !name.contains(' ') {
            return name + &suffix;
        }
    }

    match name.rfind(' ') {
        Some(space) => {
            let last = name[space + 1..].trim_end_matches(',');
            format!("{}, {}{}", last, &name[..space], suffix)
        }
        None => name + &suffix,
    }
}

/// Autofill required and suggested parameters the banner doesn't have yet.
///
/// A parameter counts as present when it's written under its own name or
/// under a non-empty alias. Biography banners also get `listas` derived
/// from `subject`, the article title.
pub fn add_missing_params(template: &mut ParsedTemplate, subject: Option<&str>) {
    let is_biography =
        template.name == BIOGRAPHY_BANNER || template.effective_name() == BIOGRAPHY_BANNER;
    if is_biography && !template.has_param("listas") {
        if let Some(subject) = subject {
            template.push_autofilled("listas", &make_list_as(subject));
        }
    }

    let Some(data) = template.param_data.as_ref() else {
        return;
    };
    let missing: Vec<(String, String)> = data
        .iter()
        .filter(|(_, schema)| schema.required || schema.suggested)
        .filter(|(name, _)| !template.has_param(name))
        .filter(|(_, schema)| {
            !template
                .parameters
                .iter()
                .any(|p| !p.value.is_empty() && schema.aliases.iter().any(|a| p.name.matches(a)))
        })
        .map(|(name, schema)| (name.clone(), schema.autovalue.clone().unwrap_or_default()))
        .collect();

    for (name, value) in missing {
        template.push_autofilled(&name, &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decompose;
    use crate::template::Title;

    fn biology_data() -> TemplateData {
        serde_json::from_str(
            r#"{
                "params": {
                    "class": {
                        "label": {"en": "Class"},
                        "aliases": ["Class", "quality"],
                        "suggestedvalues": ["FA", "GA", "B", "C", "Start", "Stub"]
                    },
                    "importance": {
                        "label": "Importance",
                        "description": {"en": "Priority. Allowed values: ['Top', 'High', 'Mid', 'Low',]"}
                    },
                    "needs-image": {
                        "label": {"en": "Needs image?"},
                        "aliases": ["needs-photo"],
                        "suggested": true,
                        "autovalue": "yes"
                    },
                    "small": {"required": true}
                },
                "paramOrder": ["class", "importance", "small", "needs-image"]
            }"#,
        )
        .unwrap()
    }

    // ─────────────────────────────────────────────────────────────
    // Payload decoding
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn localized_text_accepts_both_shapes() {
        let plain: LocalizedText = serde_json::from_str(r#""Class""#).unwrap();
        let by_lang: LocalizedText = serde_json::from_str(r#"{"ru": "Уровень", "en": "Class"}"#).unwrap();
        let other: LocalizedText = serde_json::from_str(r#"{"ru": "Уровень"}"#).unwrap();
        assert_eq!(plain.text(), Some("Class"));
        assert_eq!(by_lang.text(), Some("Class"));
        assert_eq!(other.text(), Some("Уровень"));
    }

    #[test]
    fn allowed_values_from_descriptions() {
        assert_eq!(
            allowed_values_from_description("Allowed values: ['yes', 'no']."),
            Some(vec!["yes".to_string(), "no".to_string()])
        );
        assert_eq!(
            allowed_values_from_description("Values ['Top','High',] only"),
            Some(vec!["Top".to_string(), "High".to_string()])
        );
        assert_eq!(allowed_values_from_description("['unterminated"), None);
    }

    // ─────────────────────────────────────────────────────────────
    // Attaching
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn attach_builds_aliases_and_allowed_values() {
        let mut template = decompose("{{WikiProject Biology|quality=B}}");
        attach(&mut template, Some(biology_data()), &RaterConfig::default());

        assert!(!template.notemplatedata);
        assert_eq!(template.param_aliases.get("quality").map(String::as_str), Some("class"));
        assert_eq!(template.param_schema("quality").unwrap().suggested_values.len(), 6);
        assert_eq!(
            template.param_schema("importance").unwrap().allowed_values,
            vec!["Top", "High", "Mid", "Low"]
        );
        assert_eq!(template.class_param_name, "class");
        assert_eq!(template.importance_param_name, "importance");
    }

    #[test]
    fn missing_templatedata_uses_defaults() {
        let mut template = decompose("{{WikiProject Biology}}");
        attach(&mut template, None, &RaterConfig::default());
        assert!(template.notemplatedata);
        assert!(template.param_schema("listas").is_some());
        assert_eq!(template.param_aliases.get("needs-photo").map(String::as_str), Some("needs-image"));
        assert_eq!(template.class_param_name, "class");
    }

    #[test]
    fn localized_rating_parameter_names() {
        let data: TemplateData = serde_json::from_str(
            r#"{"params": {"уровень": {}, "важность": {}, "тема": {}}}"#,
        )
        .unwrap();
        let mut template = decompose("{{Статья проекта Биология}}");
        attach(&mut template, Some(data), &RaterConfig::default());
        assert_eq!(template.class_param_name, "уровень");
        assert_eq!(template.importance_param_name, "важность");
    }

    #[test]
    fn rating_name_found_through_alias() {
        let data: TemplateData = serde_json::from_str(
            r#"{"params": {"qual": {"aliases": ["CLASS"]}, "prio": {"aliases": ["Importance"]}}}"#,
        )
        .unwrap();
        let mut template = decompose("{{X}}");
        attach(&mut template, Some(data), &RaterConfig::default());
        assert_eq!(template.class_param_name, "qual");
        assert_eq!(template.importance_param_name, "prio");
    }

    #[test]
    fn suggestions_follow_param_order_without_ratings() {
        let mut template = decompose("{{WikiProject Biology}}");
        attach(&mut template, Some(biology_data()), &RaterConfig::default());
        let names: Vec<&str> = template
            .parameter_suggestions
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["small", "needs-image"]);
        assert_eq!(template.parameter_suggestions[0].label, None);
        assert_eq!(
            template.parameter_suggestions[1].label.as_deref(),
            Some("Needs image? (|needs-image=)")
        );
    }

    // ─────────────────────────────────────────────────────────────
    // Autofill
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn list_as_sort_keys() {
        assert_eq!(make_list_as("John Smith"), "Smith, John");
        assert_eq!(make_list_as("Mary Ann Evans"), "Evans, Mary Ann");
        assert_eq!(make_list_as("Madonna (entertainer)"), "Madonna");
        assert_eq!(make_list_as("Martin Luther King Jr."), "King, Martin Luther Jr.");
        assert_eq!(make_list_as("Henry VIII"), "Henry VIII");
        assert_eq!(make_list_as("John Smith (footballer, born 1990)"), "Smith, John");
    }

    #[test]
    fn required_and_suggested_params_are_autofilled() {
        let mut template = decompose("{{WikiProject Biology|class=B}}");
        attach(&mut template, Some(biology_data()), &RaterConfig::default());
        add_missing_params(&mut template, None);

        let small = template.get_param("small").unwrap();
        assert!(small.autofilled);
        assert_eq!(small.value, "");
        assert_eq!(template.get_param("needs-image").unwrap().value, "yes");
        assert!(template.is_modified());
    }

    #[test]
    fn non_empty_alias_counts_as_present() {
        let mut template = decompose("{{WikiProject Biology|needs-photo=yes|small=}}");
        attach(&mut template, Some(biology_data()), &RaterConfig::default());
        add_missing_params(&mut template, None);
        assert!(!template.has_param("needs-image"));
        assert_eq!(template.parameters.len(), 2);
        assert!(!template.is_modified());
    }

    #[test]
    fn biography_gets_listas() {
        let mut template = decompose("{{WPBIO|living=yes}}");
        template.redirect_target = Some(Title::new("WikiProject Biography"));
        attach(&mut template, Some(TemplateData::default()), &RaterConfig::default());
        add_missing_params(&mut template, Some("Ada Lovelace"));
        assert_eq!(template.get_param("listas").unwrap().value, "Lovelace, Ada");

        let mut existing = decompose("{{WikiProject Biography|listas=Byron, Ada}}");
        add_missing_params(&mut existing, Some("Ada Lovelace"));
        assert_eq!(existing.get_param("listas").unwrap().value, "Byron, Ada");
    }
}
