//! Per-wiki configuration.
//!
//! Everything the core needs to know about a wiki (namespace names, the
//! shell template, rating scales, fallback parameter metadata) lives in one
//! immutable [`RaterConfig`] value that callers pass in explicitly. The
//! defaults describe English Wikipedia; other wikis override them from a
//! YAML or JSON file.

use crate::error::{Result, ScannerError};
use crate::template_data::{LocalizedText, ParamSchema};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaterConfig {
    /// Canonical name of the wrapper template that holds banners
    pub shell_template: String,
    /// Known redirects/aliases of the shell template, as fetched from the wiki
    pub shell_aliases: Vec<String>,
    /// Localized names of the Template namespace, e.g. `["Template", "Шаблон"]`
    pub namespace_aliases: Vec<String>,
    /// Fallback recognizer for banners missing from the catalog
    pub banner_name_prefixes: Vec<String>,
    pub banner_defaults: BannerDefaults,
    /// Hardcoded rating scales for projects whose banners can't be sampled
    pub custom_banners: HashMap<String, RatingScale>,
    /// Parameter metadata used for banners without TemplateData
    pub default_parameter_data: IndexMap<String, ParamSchema>,
    pub preferences: Preferences,
    /// Suffix appended to edit summaries
    pub advert: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerDefaults {
    pub classes: Vec<String>,
    pub importances: Vec<String>,
    pub extended_classes: Vec<String>,
    pub extended_importances: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub importances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Wrap banners in a shell once at least this many are present
    pub min_for_shell: usize,
    /// Render banners used through a redirect under their target name
    pub bypass_redirects: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for BannerDefaults {
    fn default() -> Self {
        BannerDefaults {
            classes: strings(&["FA", "FL", "A", "GA", "B", "C", "Start", "Stub", "List"]),
            importances: strings(&["Top", "High", "Mid", "Low"]),
            extended_classes: strings(&[
                "Category", "Draft", "File", "FM", "Portal", "Project", "Template", "Bplus",
                "Future", "Current", "Disambig", "NA", "Redirect", "Book",
            ]),
            extended_importances: strings(&["Top", "High", "Mid", "Low", "Bottom", "NA"]),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            min_for_shell: 1,
            bypass_redirects: true,
        }
    }
}

fn yes_flag(label: &str, description: &str) -> ParamSchema {
    ParamSchema {
        label: Some(LocalizedText::en(label)),
        description: Some(LocalizedText::en(&format!(
            "{} Allowed values: ['yes'].",
            description
        ))),
        autovalue: Some("yes".to_string()),
        ..ParamSchema::default()
    }
}

fn default_parameter_data() -> IndexMap<String, ParamSchema> {
    let mut data = IndexMap::new();
    data.insert("auto".to_string(), yes_flag("Auto-rated", "Automatically rated by a bot."));
    data.insert(
        "listas".to_string(),
        ParamSchema {
            label: Some(LocalizedText::en("List as")),
            description: Some(LocalizedText::en("Sortkey for talk page")),
            ..ParamSchema::default()
        },
    );
    data.insert("small".to_string(), yes_flag("Small?", "Display a small version."));
    data.insert(
        "attention".to_string(),
        yes_flag("Attention required?", "Immediate attention required."),
    );
    data.insert(
        "needs-image".to_string(),
        ParamSchema {
            aliases: vec!["needs-photo".to_string()],
            suggested: true,
            ..yes_flag(
                "Needs image?",
                "Request that an image or photograph of the subject be added to the article.",
            )
        },
    );
    data.insert(
        "needs-infobox".to_string(),
        ParamSchema {
            suggested: true,
            ..yes_flag("Needs infobox?", "Request that an infobox be added to the article.")
        },
    );
    data
}

fn default_custom_banners() -> HashMap<String, RatingScale> {
    let mut custom = HashMap::new();
    custom.insert(
        "WikiProject Military history".to_string(),
        RatingScale {
            classes: strings(&[
                "FA", "FL", "A", "GA", "B", "C", "Start", "Stub", "List", "AL", "BL", "CL",
                "Category", "Draft", "File", "Portal", "Project", "Template", "Disambig",
                "Redirect", "Book",
            ]),
            importances: Vec::new(),
        },
    );
    custom.insert(
        "WikiProject Portals".to_string(),
        RatingScale {
            classes: strings(&[
                "FPo", "Complete", "Substantial", "Basic", "Incomplete", "Meta", "List",
                "Category", "Draft", "File", "Project", "Template", "Disambig", "NA", "Redirect",
            ]),
            importances: strings(&["Top", "High", "Mid", "Low", "Bottom", "NA"]),
        },
    );
    custom.insert(
        "WikiProject Video games".to_string(),
        RatingScale {
            classes: strings(&[
                "FA", "FL", "FM", "GA", "B", "C", "Start", "Stub", "List", "Category", "Draft",
                "File", "Portal", "Project", "Template", "Disambig", "Redirect",
            ]),
            importances: strings(&["Top", "High", "Mid", "Low", "NA"]),
        },
    );
    custom
}

impl Default for RaterConfig {
    fn default() -> Self {
        RaterConfig {
            shell_template: "WikiProject banner shell".to_string(),
            shell_aliases: Vec::new(),
            namespace_aliases: strings(&["Template"]),
            banner_name_prefixes: strings(&["WP ", "WikiProject "]),
            banner_defaults: BannerDefaults::default(),
            custom_banners: default_custom_banners(),
            default_parameter_data: default_parameter_data(),
            preferences: Preferences::default(),
            advert: " ([[WP:RATER|Rater]])".to_string(),
        }
    }
}

impl RaterConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        load_structured(path)
    }

    /// Localized namespace aliases followed by the canonical `Template`.
    pub fn template_namespaces(&self) -> Vec<String> {
        let mut namespaces = self.namespace_aliases.clone();
        if !namespaces.iter().any(|ns| ns.eq_ignore_ascii_case("Template")) {
            namespaces.push("Template".to_string());
        }
        namespaces
    }
}

/// Read a YAML or JSON document, picking the format from the file extension.
pub(crate) fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
        other => Err(ScannerError::Config {
            path: path.to_path_buf(),
            message: format!("unsupported extension {:?} (expected .yaml, .yml or .json)", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_describe_english_wikipedia() {
        let config = RaterConfig::default();
        assert_eq!(config.shell_template, "WikiProject banner shell");
        assert_eq!(config.banner_defaults.classes.len(), 9);
        assert!(config.custom_banners.contains_key("WikiProject Portals"));
        let keys: Vec<&String> = config.default_parameter_data.keys().collect();
        assert_eq!(keys[0], "auto");
        assert_eq!(keys[1], "listas");
    }

    #[test]
    fn yaml_overrides_keep_unspecified_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "shell_template: Блок проектов статьи\nnamespace_aliases: [Шаблон, Template]\npreferences:\n  min_for_shell: 3"
        )
        .unwrap();

        let config = RaterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.shell_template, "Блок проектов статьи");
        assert_eq!(config.namespace_aliases, vec!["Шаблон", "Template"]);
        assert_eq!(config.preferences.min_for_shell, 3);
        assert!(config.preferences.bypass_redirects);
        assert_eq!(config.banner_defaults.importances, vec!["Top", "High", "Mid", "Low"]);
    }

    #[test]
    fn json_config_is_accepted() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"banner_name_prefixes": ["Проект:"]}}"#).unwrap();
        let config = RaterConfig::from_path(file.path()).unwrap();
        assert_eq!(config.banner_name_prefixes, vec!["Проект:"]);
    }

    #[test]
    fn unknown_extension_is_a_config_error() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = RaterConfig::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ScannerError::Config { .. }));
    }

    #[test]
    fn empty_namespace_list_falls_back_to_template() {
        let config = RaterConfig {
            namespace_aliases: Vec::new(),
            ..RaterConfig::default()
        };
        assert_eq!(config.template_namespaces(), vec!["Template"]);
    }

    #[test]
    fn localized_namespace_keeps_canonical_prefix() {
        let config = RaterConfig {
            namespace_aliases: vec!["Шаблон".to_string()],
            ..RaterConfig::default()
        };
        let namespaces = config.template_namespaces();
        assert_eq!(namespaces, vec!["Шаблон", "Template"]);
        assert_eq!(crate::names::strip_namespace("Template:Проект", &namespaces), "Проект");
        assert_eq!(crate::names::strip_namespace("шаблон:Проект", &namespaces), "Проект");

        let both = RaterConfig {
            namespace_aliases: vec!["Шаблон".to_string(), "template".to_string()],
            ..RaterConfig::default()
        };
        assert_eq!(both.template_namespaces().len(), 2);
    }
}
