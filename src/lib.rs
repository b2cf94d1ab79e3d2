//! Wikitext template parsing and WikiProject banner reconciliation.
//!
//! The pipeline runs scan → decompose → normalize names → classify banners,
//! then renders the edited banners and patches them back into the page with
//! [`patch::apply`]. Everything outside the banner region is preserved.

pub mod cache;
pub mod classify;
pub mod config;
pub mod dump;
pub mod error;
pub mod names;
pub mod parallel;
pub mod parser;
pub mod patch;
pub mod ratings;
pub mod scanner;
pub mod template;
pub mod template_data;

pub use classify::{
    banner_suggestions, ensure_banner_prefix, find_banners, BannerCatalog, ClassifiedBanner, Classifier, RedirectResolver,
    StaticRedirects,
};
pub use config::RaterConfig;
pub use error::{Result, ScannerError};
pub use parser::{decompose, parse_all};
pub use patch::{apply, build_edit_summary, render_banner_block, EditSummary};
pub use scanner::{scan, Span};
pub use template::{ParamName, Parameter, ParsedTemplate, Title};
