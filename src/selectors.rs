//! Selector catalog: logical UI-element identifiers mapped to CSS/XPath
//! strings, grouped by page. Loaded once and never mutated.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AutomationError, ConfigError, Result};

/// How a selector string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
}

impl Default for SelectorKind {
    fn default() -> Self {
        SelectorKind::Css
    }
}

/// One named locator. CSS entries may carry a comma-separated candidate
/// list; `querySelector` picks the first match in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorEntry {
    pub selector: String,
    #[serde(default)]
    pub kind: SelectorKind,
}

impl SelectorEntry {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorKind::Css,
        }
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            kind: SelectorKind::Xpath,
        }
    }
}

/// Immutable page → element key → selector mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorCatalog {
    pages: HashMap<String, HashMap<String, SelectorEntry>>,
}

impl SelectorCatalog {
    /// Load a catalog from a JSON document:
    /// `{ "page": { "key": { "selector": "...", "kind": "css" } } }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        let pages = serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        Ok(Self { pages })
    }

    /// Look up a selector, failing with `SelectorNotFound` when the pair is
    /// not registered.
    pub fn get(&self, page: &str, key: &str) -> Result<&SelectorEntry> {
        self.pages
            .get(page)
            .and_then(|entries| entries.get(key))
            .ok_or_else(|| {
                AutomationError::SelectorNotFound {
                    page: page.to_string(),
                    key: key.to_string(),
                }
                .into()
            })
    }

    pub fn contains(&self, page: &str, key: &str) -> bool {
        self.pages
            .get(page)
            .map_or(false, |entries| entries.contains_key(key))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Default for SelectorCatalog {
    /// Built-in catalog matching the target web UI.
    fn default() -> Self {
        let mut pages = HashMap::new();

        let mut login = HashMap::new();
        login.insert("username_input".to_string(), SelectorEntry::css("#userName"));
        login.insert("password_input".to_string(), SelectorEntry::css("#password"));
        login.insert(
            "submit_button".to_string(),
            SelectorEntry::css("button[type='submit'], button.custom-button"),
        );
        // Any of these appearing means the session is authenticated.
        login.insert(
            "logged_in_probe".to_string(),
            SelectorEntry::css(".navbar, header, .dashboard, [data-test='dashboard']"),
        );
        pages.insert("login".to_string(), login);

        let mut analysis = HashMap::new();
        analysis.insert(
            "nav_link".to_string(),
            SelectorEntry::css("a[href*='analysis'], .nav-link[href*='analysis']"),
        );
        analysis.insert(
            "parameter_select".to_string(),
            SelectorEntry::css("#parameterSelect"),
        );
        analysis.insert(
            "service_select".to_string(),
            SelectorEntry::css("#serviceSelect"),
        );
        analysis.insert(
            "upload_input".to_string(),
            SelectorEntry::css(
                "label.upload-btn input[type='file'], input[type='file'][accept*='.xls']",
            ),
        );
        analysis.insert("file_name_display".to_string(), SelectorEntry::css("#file-name"));
        analysis.insert(
            "start_button".to_string(),
            SelectorEntry::css("button.custom-button:has(i.bi-power):not([disabled])"),
        );
        analysis.insert(
            "confirmation".to_string(),
            SelectorEntry::css(".alert-success, .analysis-result, [data-test='analysis-started']"),
        );
        pages.insert("analysis".to_string(), analysis);

        Self { pages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_the_upload_flow() {
        let catalog = SelectorCatalog::default();
        assert!(catalog.contains("analysis", "upload_input"));
        assert!(catalog.contains("analysis", "start_button"));
        assert!(catalog.contains("analysis", "confirmation"));
        assert!(catalog.contains("login", "username_input"));
    }

    #[test]
    fn missing_entry_reports_page_and_key() {
        let catalog = SelectorCatalog::default();
        let err = catalog.get("analysis", "no_such_key").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("analysis"));
        assert!(msg.contains("no_such_key"));
    }

    #[test]
    fn kind_defaults_to_css_when_absent() {
        let raw = r##"{ "login": { "username_input": { "selector": "#user" } } }"##;
        let pages: HashMap<String, HashMap<String, SelectorEntry>> =
            serde_json::from_str(raw).unwrap();
        let catalog = SelectorCatalog { pages };
        let entry = catalog.get("login", "username_input").unwrap();
        assert_eq!(entry.kind, SelectorKind::Css);
    }
}
