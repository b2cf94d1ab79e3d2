//! Banner classification and redirect resolution.

use crate::config::{load_structured, RaterConfig};
use crate::error::Result;
use crate::names::{canonical_title, ShellMatcher};
use crate::parser::parse_all;
use crate::template::{ParsedTemplate, Title};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Known banner names, grouped the way the wiki's banner categories are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerCatalog {
    #[serde(alias = "withRatings")]
    pub with_ratings: Vec<String>,
    #[serde(alias = "withoutRatings")]
    pub without_ratings: Vec<String>,
    pub wrappers: Vec<String>,
    #[serde(alias = "notWPBM")]
    pub not_wpbm: Vec<String>,
    pub inactive: Vec<String>,
    /// Women in Red wrappers
    pub wir: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BannerGroup {
    WithRatings,
    WithoutRatings,
    Wrapper,
    NotWpbm,
    Inactive,
    WomenInRed,
}

impl BannerCatalog {
    pub fn from_path(path: &Path) -> Result<Self> {
        load_structured(path)
    }

    pub fn groups(&self) -> [(BannerGroup, &[String]); 6] {
        [
            (BannerGroup::WithRatings, self.with_ratings.as_slice()),
            (BannerGroup::WithoutRatings, self.without_ratings.as_slice()),
            (BannerGroup::Wrapper, self.wrappers.as_slice()),
            (BannerGroup::NotWpbm, self.not_wpbm.as_slice()),
            (BannerGroup::Inactive, self.inactive.as_slice()),
            (BannerGroup::WomenInRed, self.wir.as_slice()),
        ]
    }

    pub fn len(&self) -> usize {
        self.groups().iter().map(|(_, names)| names.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batch redirect lookup, e.g. `action=query&redirects=1` against the wiki.
pub trait RedirectResolver {
    /// Targets for the given template titles (namespace stripped). Titles
    /// that aren't redirects are simply absent from the result.
    fn resolve(&self, titles: &[String]) -> Result<HashMap<String, String>>;
}

/// Redirects known ahead of time, loaded from a YAML or JSON map.
#[derive(Debug, Clone, Default)]
pub struct StaticRedirects {
    targets: HashMap<String, String>,
}

impl StaticRedirects {
    pub fn new(map: HashMap<String, String>, config: &RaterConfig) -> Self {
        let namespaces = config.template_namespaces();
        let targets = map
            .into_iter()
            .map(|(from, to)| {
                (
                    canonical_title(&from, &namespaces),
                    canonical_title(&to, &namespaces),
                )
            })
            .collect();
        StaticRedirects { targets }
    }

    pub fn from_path(path: &Path, config: &RaterConfig) -> Result<Self> {
        let map: HashMap<String, String> = load_structured(path)?;
        Ok(StaticRedirects::new(map, config))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl RedirectResolver for StaticRedirects {
    fn resolve(&self, titles: &[String]) -> Result<HashMap<String, String>> {
        Ok(titles
            .iter()
            .filter_map(|title| {
                self.targets
                    .get(title)
                    .map(|target| (title.clone(), target.clone()))
            })
            .collect())
    }
}

/// Set `redirect_target` on every template whose title is a redirect.
pub fn resolve_redirects(
    templates: &mut [ParsedTemplate],
    resolver: &dyn RedirectResolver,
    config: &RaterConfig,
) -> Result<usize> {
    let namespaces = config.template_namespaces();
    let mut titles: Vec<String> = templates
        .iter()
        .filter(|t| t.redirect_target.is_none())
        .map(|t| canonical_title(&t.name, &namespaces))
        .filter(|title| !title.is_empty())
        .collect();
    titles.sort();
    titles.dedup();
    if titles.is_empty() {
        return Ok(0);
    }

    let targets = resolver.resolve(&titles)?;
    let mut resolved = 0;
    for template in templates.iter_mut().filter(|t| t.redirect_target.is_none()) {
        if let Some(target) = targets.get(&canonical_title(&template.name, &namespaces)) {
            template.redirect_target = Some(Title::new(target.clone()));
            resolved += 1;
        }
    }
    tracing::debug!(requested = titles.len(), resolved, "redirects resolved");
    Ok(resolved)
}

/// A banner together with what the catalog said about it.
#[derive(Debug, Clone)]
pub struct ClassifiedBanner {
    pub template: ParsedTemplate,
    pub canonical: String,
    pub groups: Vec<BannerGroup>,
}

/// Decides which parsed templates are banners.
pub struct Classifier<'a> {
    config: &'a RaterConfig,
    shell: ShellMatcher,
    namespaces: Vec<String>,
    groups: HashMap<String, Vec<BannerGroup>>,
}

impl<'a> Classifier<'a> {
    pub fn new(config: &'a RaterConfig, catalog: &BannerCatalog) -> Self {
        let namespaces = config.template_namespaces();
        let mut groups: HashMap<String, Vec<BannerGroup>> = HashMap::new();
        for (group, names) in catalog.groups() {
            for name in names {
                let entry = groups.entry(canonical_title(name, &namespaces)).or_default();
                if !entry.contains(&group) {
                    entry.push(group);
                }
            }
        }
        Classifier {
            config,
            shell: ShellMatcher::new(config),
            namespaces,
            groups,
        }
    }

    pub fn shell(&self) -> &ShellMatcher {
        &self.shell
    }

    /// Canonical title used for classification: redirect target when known.
    pub fn canonical_name(&self, template: &ParsedTemplate) -> String {
        canonical_title(template.effective_name(), &self.namespaces)
    }

    pub fn groups_of(&self, template: &ParsedTemplate) -> &[BannerGroup] {
        self.groups
            .get(&self.canonical_name(template))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_banner(&self, template: &ParsedTemplate) -> bool {
        if self.shell.is_shell(template) {
            return true;
        }
        if !self.groups_of(template).is_empty() {
            return true;
        }
        let name = self.canonical_name(template);
        self.config
            .banner_name_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
    }

    /// Keep the banners, in order, with their group flags applied.
    pub fn classify(&self, templates: Vec<ParsedTemplate>) -> Vec<ParsedTemplate> {
        self.classify_with_groups(templates)
            .into_iter()
            .map(|banner| banner.template)
            .collect()
    }

    /// Like [`Classifier::classify`], keeping the canonical name and groups
    /// each banner was looked up under. A wrapper's `redirect_target` points
    /// at its substitution afterwards, so these can't be recomputed from the
    /// returned template.
    pub fn classify_with_groups(&self, templates: Vec<ParsedTemplate>) -> Vec<ClassifiedBanner> {
        let mut banners = Vec::new();
        for mut template in templates {
            if !self.is_banner(&template) {
                tracing::debug!(name = %template.name, "not a banner");
                continue;
            }
            let canonical = self.canonical_name(&template);
            let groups = self.groups_of(&template).to_vec();
            for group in &groups {
                match group {
                    BannerGroup::Wrapper => {
                        template.redirect_target = Some(Title::new(format!("Subst:{}", canonical)));
                    }
                    BannerGroup::WithoutRatings | BannerGroup::WomenInRed => {
                        template.without_ratings = true;
                    }
                    BannerGroup::Inactive => template.inactive_project = true,
                    BannerGroup::WithRatings | BannerGroup::NotWpbm => {}
                }
            }
            banners.push(ClassifiedBanner {
                template,
                canonical,
                groups,
            });
        }
        banners
    }
}

/// Result of [`ensure_banner_prefix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedName {
    pub name: String,
    pub has_valid_prefix: bool,
    /// The prefix that was prepended, if any
    pub added_prefix: Option<String>,
}

fn leading_prefix<'p>(name: &str, prefixes: &'p [String]) -> Option<&'p str> {
    prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .find(|prefix| {
            name.get(..prefix.len())
                .map_or(false, |head| head.to_lowercase() == prefix.to_lowercase())
        })
        .map(String::as_str)
}

/// Make sure a typed banner name starts with one of the configured
/// prefixes, prepending the first one when none matches.
pub fn ensure_banner_prefix(name: &str, prefixes: &[String]) -> PrefixedName {
    let name = name.trim();
    let first = prefixes.first().filter(|p| !p.is_empty());
    if name.is_empty() || first.is_none() {
        return PrefixedName {
            name: name.to_string(),
            has_valid_prefix: false,
            added_prefix: None,
        };
    }
    if leading_prefix(name, prefixes).is_some() {
        return PrefixedName {
            name: name.to_string(),
            has_valid_prefix: true,
            added_prefix: None,
        };
    }
    let first = first.map(String::as_str).unwrap_or_default();
    PrefixedName {
        name: format!("{}{}", first, name),
        has_valid_prefix: true,
        added_prefix: Some(first.to_string()),
    }
}

/// One entry of the banner picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannerSuggestion {
    pub label: String,
    pub name: String,
    pub group: BannerGroup,
    pub without_ratings: bool,
}

/// Every catalog name as a picker entry, group by group. Labels drop the
/// banner prefix and mark wrappers, inactive projects and Women in Red.
pub fn banner_suggestions(catalog: &BannerCatalog, config: &RaterConfig) -> Vec<BannerSuggestion> {
    let short = |name: &str| match leading_prefix(name, &config.banner_name_prefixes) {
        Some(prefix) => name[prefix.len()..].to_string(),
        None => name.to_string(),
    };
    catalog
        .groups()
        .into_iter()
        .flat_map(|(group, names)| names.iter().map(move |name| (group, name)))
        .map(|(group, name)| {
            let label = match group {
                BannerGroup::Wrapper => format!("{} [template wrapper]", short(name)),
                BannerGroup::Inactive => format!("{} [inactive]", short(name)),
                BannerGroup::WomenInRed => format!("{} [Women In Red meetup/initiative]", name),
                BannerGroup::WithRatings | BannerGroup::WithoutRatings | BannerGroup::NotWpbm => short(name),
            };
            BannerSuggestion {
                label,
                name: name.clone(),
                group,
                without_ratings: matches!(
                    group,
                    BannerGroup::WithoutRatings | BannerGroup::Inactive | BannerGroup::WomenInRed
                ),
            }
        })
        .collect()
}

/// Parse a talk page and return its banners, shell included.
///
/// A failing resolver is logged and classification goes ahead on the names
/// as written.
pub fn find_banners(
    wikitext: &str,
    catalog: &BannerCatalog,
    resolver: Option<&dyn RedirectResolver>,
    config: &RaterConfig,
) -> Vec<ParsedTemplate> {
    let mut templates = parse_all(wikitext, true);
    if let Some(resolver) = resolver {
        if let Err(err) = resolve_redirects(&mut templates, resolver, config) {
            tracing::warn!("{}", err);
        }
    }
    Classifier::new(config, catalog).classify(templates)
}
