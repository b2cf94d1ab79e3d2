//! Class and importance scales for banners.
//!
//! [`resolve_ratings`] works through the cheap sources in order: shell
//! defaults, TemplateData, per-project overrides, then the cache. When none
//! of them settle the question it returns the wikitext to send to the wiki's
//! parser; feed the categories HTML that comes back to
//! [`apply_sample_result`].

use crate::cache::TtlCache;
use crate::config::{BannerDefaults, RaterConfig, RatingScale};
use crate::names::{canonical_title, ShellMatcher};
use crate::template::ParsedTemplate;

const RATINGS_TTL_DAYS: u32 = 1;

const YES_WORDS: [&str; 11] = [
    "add", "added", "affirm", "affirmed", "include", "included", "on", "true", "yes", "y", "1",
];
const NO_WORDS: [&str; 15] = [
    "decline", "declined", "exclude", "excluded", "false", "none", "not", "no", "n", "off", "omit",
    "omitted", "remove", "removed", "0",
];

/// Where a template's rating scales came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingSource {
    Shell,
    /// Nothing to do: already known or the banner has no ratings
    Unchanged,
    TemplateData,
    CustomBanner,
    Cache,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RatingsOutcome {
    Resolved(RatingSource),
    /// Parse this wikitext on the wiki and pass the categories HTML to
    /// [`apply_sample_result`]. Any stale cached scales are already applied.
    NeedsSample { wikitext: String },
}

fn cache_key(template: &ParsedTemplate, config: &RaterConfig) -> String {
    format!("{}-ratings", main_text(template, config))
}

fn main_text(template: &ParsedTemplate, config: &RaterConfig) -> String {
    canonical_title(&template.name, &config.template_namespaces())
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

/// Values TemplateData offers for a parameter: suggested first, else allowed.
fn template_data_values(template: &ParsedTemplate, param: &str) -> Option<Vec<String>> {
    let schema = template.param_schema(param)?;
    non_empty(&schema.suggested_values).or_else(|| non_empty(&schema.allowed_values))
}

fn has_scales(template: &ParsedTemplate) -> bool {
    let filled = |v: &Option<Vec<String>>| v.as_ref().map_or(false, |v| !v.is_empty());
    filled(&template.classes) && filled(&template.importances)
}

pub fn resolve_ratings(
    template: &mut ParsedTemplate,
    shell: &ShellMatcher,
    config: &RaterConfig,
    cache: &mut TtlCache<RatingScale>,
) -> RatingsOutcome {
    if shell.is_shell(template) {
        template.classes = Some(config.banner_defaults.classes.clone());
        return RatingsOutcome::Resolved(RatingSource::Shell);
    }
    if (template.classes.is_some() && template.importances.is_some()) || template.without_ratings {
        return RatingsOutcome::Resolved(RatingSource::Unchanged);
    }

    let key = cache_key(template, config);

    if let Some(classes) = template_data_values(template, &template.class_param_name) {
        template.classes = Some(classes);
    }
    if let Some(importances) = template_data_values(template, &template.importance_param_name) {
        template.importances = Some(importances);
    }
    let importance_declared = template.param_schema(&template.importance_param_name).is_some();
    if importance_declared && template.importances.as_ref().map_or(true, Vec::is_empty) {
        template.importances = Some(config.banner_defaults.importances.clone());
    }
    if has_scales(template) {
        cache.write(&key, current_scale(template), RATINGS_TTL_DAYS);
        return RatingsOutcome::Resolved(RatingSource::TemplateData);
    }

    let project = canonical_title(template.effective_name(), &config.template_namespaces());
    if let Some(custom) = config.custom_banners.get(&project) {
        template.classes = Some(custom.classes.clone());
        template.importances = Some(custom.importances.clone());
        return RatingsOutcome::Resolved(RatingSource::CustomBanner);
    }

    if let Some(cached) = cache.read(&key) {
        template.classes = Some(cached.value.classes.clone());
        template.importances = Some(cached.value.importances.clone());
        if !cached.value.importances.is_empty() && !cached.is_stale {
            return RatingsOutcome::Resolved(RatingSource::Cache);
        }
        tracing::debug!(key = %key, stale = cached.is_stale, "cached ratings need refreshing");
    }

    RatingsOutcome::NeedsSample {
        wikitext: sample_wikitext(template, config),
    }
}

fn current_scale(template: &ParsedTemplate) -> RatingScale {
    RatingScale {
        classes: template.classes.clone().unwrap_or_default(),
        importances: template.importances.clone().unwrap_or_default(),
    }
}

/// One transclusion per extended class, paired with the extended importance
/// at the same position.
pub fn sample_wikitext(template: &ParsedTemplate, config: &RaterConfig) -> String {
    let name = main_text(template, config);
    let defaults = &config.banner_defaults;
    defaults
        .extended_classes
        .iter()
        .enumerate()
        .map(|(i, class)| {
            let importance = defaults
                .extended_importances
                .get(i)
                .map(String::as_str)
                .unwrap_or("");
            format!(
                "{{{{{}|{}={}|{}={}}}}}\n",
                name, template.class_param_name, class, template.importance_param_name, importance
            )
        })
        .collect()
}

/// Scales implied by the categories the sample transclusions produced.
pub fn ratings_from_categories(categories_html: &str, defaults: &BannerDefaults) -> RatingScale {
    let mut classes = defaults.classes.clone();
    classes.extend(
        defaults
            .extended_classes
            .iter()
            .filter(|class| categories_html.contains(&format!("{}-Class", class)))
            .cloned(),
    );
    let importances = defaults
        .extended_importances
        .iter()
        .filter(|importance| categories_html.contains(&format!("{}-importance", importance)))
        .cloned()
        .collect();
    RatingScale {
        classes,
        importances,
    }
}

pub fn apply_sample_result(
    template: &mut ParsedTemplate,
    categories_html: &str,
    config: &RaterConfig,
    cache: &mut TtlCache<RatingScale>,
) {
    let scale = ratings_from_categories(categories_html, &config.banner_defaults);
    template.classes = Some(scale.classes.clone());
    template.importances = Some(scale.importances.clone());
    cache.write(&cache_key(template, config), scale, RATINGS_TTL_DAYS);
}

/// Canonical spelling of a class rating: `"ga"` → `"GA"`, `"dab"` → `"Disambig"`.
pub fn class_mask(value: &str) -> String {
    let lower = value.to_lowercase();
    match lower.as_str() {
        "" => String::new(),
        "fa" | "fl" | "a" | "ga" | "b" | "c" | "na" | "fm" | "al" | "bl" | "cl" => value.to_uppercase(),
        "start" | "stub" | "list" | "portal" | "project" | "draft" | "book" | "future"
        | "current" | "complete" | "substantial" | "basic" | "incomplete" | "meta" => {
            capitalize(&lower)
        }
        "image" | "img" | "file" => "File".to_string(),
        "category" | "cat" | "categ" => "Category".to_string(),
        "disambiguation" | "disambig" | "disamb" | "dab" => "Disambig".to_string(),
        "redirect" | "redir" | "red" => "Redirect".to_string(),
        "template" | "temp" | "tpl" => "Template".to_string(),
        "bplus" | "b+" => "Bplus".to_string(),
        "fpo" => "FPo".to_string(),
        _ => value.to_string(),
    }
}

pub fn importance_mask(value: &str) -> String {
    if value.eq_ignore_ascii_case("na") {
        return "NA".to_string();
    }
    capitalize(&value.to_lowercase())
}

fn capitalize(lower: &str) -> String {
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Map the many spellings of yes/no onto `"yes"` / `"no"`; anything else
/// comes back trimmed and lowercased.
pub fn normalise_yes_no(value: &str) -> String {
    let value = value.trim().to_lowercase();
    if YES_WORDS.contains(&value.as_str()) {
        "yes".to_string()
    } else if NO_WORDS.contains(&value.as_str()) {
        "no".to_string()
    } else {
        value
    }
}
