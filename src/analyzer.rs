//! Page analysis.
//!
//! Snapshots the current document into a [`PageContext`]: deduplicated
//! interactive elements with inferred roles, structural flags, navigation
//! elements, suggested next actions, and login-form presence. Analysis is
//! best-effort; an internal failure degrades to a minimal context and never
//! reaches the caller as an error.

use crate::browser::{PageDriver, RawElement};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Layered queries for candidate interactive elements, from generic tags to
/// sidebar-scoped buttons.
const ELEMENT_QUERIES: &[&str] = &[
    "button",
    "[role='button']",
    "[data-testid]",
    "[aria-label]",
    ".notion-sidebar [role='button']",
    "[class*='notion'] button",
];

const NAVIGATION_QUERIES: &[&str] = &[
    "[class*='sidebar'] [role='button']",
    "[data-testid*='menu']",
    "[aria-label*='menu']",
];

const MAX_SUGGESTED_ACTIONS: usize = 3;

/// Inferred semantic category of an interactive element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Settings,
    Theme,
    CreateAction,
    Database,
    Page,
    Search,
    Login,
    InteractiveElement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    pub text: String,
    pub aria_label: String,
    pub test_id: String,
    pub classes: String,
    pub role: ElementRole,
    pub is_clickable: bool,
}

/// Structural presence flags computed from fixed selectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageStructure {
    pub has_sidebar: bool,
    pub has_header: bool,
    pub has_page_content: bool,
    pub has_create_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavElement {
    pub text: String,
    pub aria_label: String,
}

/// A point-in-time snapshot of the document; never incrementally updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub interactive_elements: Vec<ElementInfo>,
    pub page_structure: PageStructure,
    pub navigation_elements: Vec<NavElement>,
    pub suggested_actions: Vec<String>,
    pub has_login_form: bool,
}

impl PageContext {
    /// Minimal context used when analysis fails entirely.
    pub fn unknown() -> Self {
        Self {
            url: "unknown".to_string(),
            title: "unknown".to_string(),
            interactive_elements: Vec::new(),
            page_structure: PageStructure::default(),
            navigation_elements: Vec::new(),
            suggested_actions: Vec::new(),
            has_login_form: false,
        }
    }
}

/// Infer an element's semantic role from its combined text, aria-label, and
/// test id. First matching lexicon entry wins.
pub fn infer_role(text: &str, aria_label: &str, test_id: &str) -> ElementRole {
    let combined = format!("{text} {aria_label} {test_id}").to_lowercase();
    let any = |words: &[&str]| words.iter().any(|w| combined.contains(w));

    if any(&["settings", "setting", "members"]) {
        ElementRole::Settings
    } else if any(&["theme", "mode", "appearance", "dark", "light"]) {
        ElementRole::Theme
    } else if any(&["new", "create", "add"]) {
        ElementRole::CreateAction
    } else if any(&["database", "table"]) {
        ElementRole::Database
    } else if any(&["page", "document"]) {
        ElementRole::Page
    } else if any(&["search", "find"]) {
        ElementRole::Search
    } else if any(&["login", "sign in"]) {
        ElementRole::Login
    } else {
        ElementRole::InteractiveElement
    }
}

/// Deduplicate element snapshots by `(text, role)` and convert them into
/// [`ElementInfo`]s. Elements with no text and no inferred role signal are
/// dropped.
pub fn dedup_elements(raw: &[RawElement]) -> Vec<ElementInfo> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for el in raw.iter().filter(|el| el.visible) {
        let text = el.text.trim().to_string();
        let role = infer_role(&text, &el.aria_label, &el.test_id);
        if text.is_empty() && role == ElementRole::InteractiveElement {
            continue;
        }
        if seen.insert((text.clone(), role)) {
            unique.push(ElementInfo {
                text,
                aria_label: el.aria_label.clone(),
                test_id: el.test_id.clone(),
                classes: el.classes.clone(),
                role,
                is_clickable: el.visible && !el.disabled,
            });
        }
    }

    unique
}

/// Derive up to three suggested actions: creation controls first, then
/// settings and theme controls.
pub fn suggest_actions(elements: &[ElementInfo]) -> Vec<String> {
    let mut actions = Vec::new();

    for el in elements.iter().filter(|e| e.role == ElementRole::CreateAction) {
        let label = if !el.text.is_empty() { &el.text } else { &el.aria_label };
        if !label.is_empty() {
            actions.push(format!("Create: {label}"));
        }
    }

    for el in elements
        .iter()
        .filter(|e| matches!(e.role, ElementRole::Settings | ElementRole::Theme))
    {
        let label = if !el.text.is_empty() { &el.text } else { &el.aria_label };
        if !label.is_empty() {
            actions.push(format!("Settings: {label}"));
        }
    }

    actions.truncate(MAX_SUGGESTED_ACTIONS);
    actions
}

/// Analyzer over the driver seam; stateless, constructed once and injected.
#[derive(Debug, Clone, Default)]
pub struct PageAnalyzer;

impl PageAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot the current document. Degrades instead of failing: a broken
    /// sub-query is skipped, a total failure yields the unknown context.
    pub async fn analyze(&self, driver: &dyn PageDriver) -> PageContext {
        match self.try_analyze(driver).await {
            Ok(context) => context,
            Err(e) => {
                warn!("Page analysis failed: {e}");
                PageContext::unknown()
            }
        }
    }

    async fn try_analyze(&self, driver: &dyn PageDriver) -> crate::error::Result<PageContext> {
        let url = driver.current_url().await?;
        let title = driver.title().await?;

        let mut candidates = Vec::new();
        for query in ELEMENT_QUERIES {
            match driver.collect_elements(query).await {
                Ok(mut found) => candidates.append(&mut found),
                Err(e) => debug!("Element query '{query}' failed: {e}"),
            }
        }
        let interactive_elements = dedup_elements(&candidates);

        let page_structure = PageStructure {
            has_sidebar: self.flag(driver, ".notion-sidebar").await,
            has_header: self.flag(driver, ".notion-header").await,
            has_page_content: self.flag(driver, ".notion-page-content").await,
            has_create_control: self.flag(driver, "[data-testid*='create']").await,
        };

        let mut navigation_elements = Vec::new();
        for query in NAVIGATION_QUERIES {
            if let Ok(found) = driver.collect_elements(query).await {
                for el in found.iter().filter(|el| el.visible) {
                    let text = el.text.trim();
                    if !text.is_empty() || !el.aria_label.is_empty() {
                        navigation_elements.push(NavElement {
                            text: text.to_string(),
                            aria_label: el.aria_label.clone(),
                        });
                    }
                }
            }
        }

        let suggested_actions = suggest_actions(&interactive_elements);
        let has_login_form = self.flag(driver, "input[type='password']").await;

        Ok(PageContext {
            url,
            title,
            interactive_elements,
            page_structure,
            navigation_elements,
            suggested_actions,
            has_login_form,
        })
    }

    async fn flag(&self, driver: &dyn PageDriver, selector: &str) -> bool {
        driver.element_exists(selector).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, aria: &str, test_id: &str) -> RawElement {
        RawElement {
            selector: "div".to_string(),
            text: text.to_string(),
            aria_label: aria.to_string(),
            test_id: test_id.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_role_lexicon() {
        assert_eq!(infer_role("Settings & members", "", ""), ElementRole::Settings);
        assert_eq!(infer_role("", "Dark mode", ""), ElementRole::Theme);
        assert_eq!(infer_role("New page", "", ""), ElementRole::CreateAction);
        assert_eq!(infer_role("My Database", "", ""), ElementRole::Database);
        assert_eq!(infer_role("", "", "page-tab"), ElementRole::Page);
        assert_eq!(infer_role("Quick find", "", ""), ElementRole::Search);
        assert_eq!(infer_role("Sign in", "", ""), ElementRole::Login);
        assert_eq!(infer_role("Share", "", ""), ElementRole::InteractiveElement);
    }

    #[test]
    fn test_role_lexicon_order_settings_before_create() {
        // "Settings" contains no create word, but an element mentioning both
        // settings and new resolves to the earlier lexicon entry.
        assert_eq!(
            infer_role("New settings", "", ""),
            ElementRole::Settings
        );
    }

    #[test]
    fn test_dedup_by_text_and_role() {
        let elements = vec![
            raw("New page", "", ""),
            raw("New page", "", ""),
            raw("New page", "different aria", ""),
        ];
        let unique = dedup_elements(&elements);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].text, "New page");
        assert_eq!(unique[0].role, ElementRole::CreateAction);
    }

    #[test]
    fn test_dedup_drops_signalless_elements() {
        let elements = vec![raw("", "", ""), raw("", "", "")];
        assert!(dedup_elements(&elements).is_empty());
    }

    #[test]
    fn test_dedup_keeps_roled_elements_without_text() {
        // No text, but the aria-label carries a role signal.
        let elements = vec![raw("", "Create new page", "")];
        let unique = dedup_elements(&elements);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].role, ElementRole::CreateAction);
    }

    #[test]
    fn test_hidden_elements_excluded() {
        let mut hidden = raw("New page", "", "");
        hidden.visible = false;
        assert!(dedup_elements(&[hidden]).is_empty());
    }

    #[test]
    fn test_suggested_actions_capped_and_ordered() {
        let elements = dedup_elements(&[
            raw("Settings", "", ""),
            raw("New page", "", ""),
            raw("New database", "", ""),
            raw("Add member", "", ""),
            raw("Dark mode", "", ""),
        ]);
        let actions = suggest_actions(&elements);
        assert_eq!(actions.len(), 3);
        // Creation controls come before settings/theme.
        assert!(actions[0].starts_with("Create: "));
        assert!(actions.iter().all(|a| !a.is_empty()));
    }

    #[test]
    fn test_unknown_context_shape() {
        let context = PageContext::unknown();
        assert_eq!(context.url, "unknown");
        assert_eq!(context.title, "unknown");
        assert!(context.interactive_elements.is_empty());
        assert!(!context.has_login_form);
    }
}
