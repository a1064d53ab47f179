//! Selector strategy resolution.
//!
//! Turns a free-text selector hint into an ordered list of concrete matching
//! strategies, tuned to Notion's UI conventions. Resolution is pure and
//! deterministic: the heuristic data lives in static keyword tables, checked
//! in a fixed order, and every matching table entry contributes its block of
//! strategies. Generic hint-derived fallbacks are always appended last.
//!
//! A blank or whitespace-only hint resolves to an empty list; callers must
//! treat that as an immediate failure, not an empty success.

use serde::{Deserialize, Serialize};

/// One concrete way to locate or act on an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub kind: StrategyKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Literal visible-text match.
    Text,
    /// CSS selector; supports the `:has-text('..')` and `:visible` extensions.
    Css,
    /// XPath expression.
    XPath,
    /// Placeholder-substring match on inputs and textareas.
    Placeholder,
    /// Title-like editable region; clicked, cleared, then typed into.
    ContentEditable,
}

impl SelectorStrategy {
    pub fn text(value: &str) -> Self {
        Self {
            kind: StrategyKind::Text,
            value: value.to_string(),
        }
    }

    pub fn css(value: &str) -> Self {
        Self {
            kind: StrategyKind::Css,
            value: value.to_string(),
        }
    }

    pub fn xpath(value: &str) -> Self {
        Self {
            kind: StrategyKind::XPath,
            value: value.to_string(),
        }
    }

    pub fn placeholder(value: &str) -> Self {
        Self {
            kind: StrategyKind::Placeholder,
            value: value.to_string(),
        }
    }

    pub fn contenteditable(value: &str) -> Self {
        Self {
            kind: StrategyKind::ContentEditable,
            value: value.to_string(),
        }
    }
}

/// One keyword-triggered block of click strategies.
///
/// `lower_terms` are matched against the lower-cased hint; `raw_terms`
/// against the hint as written (Notion's chevron buttons are hinted with a
/// literal "v", which must not be case-folded into every word containing it
/// differently than the source heuristic did).
struct KeywordRule {
    lower_terms: &'static [&'static str],
    raw_terms: &'static [&'static str],
    strategies: &'static [(StrategyKind, &'static str)],
}

impl KeywordRule {
    fn matches(&self, hint: &str, hint_lower: &str) -> bool {
        self.lower_terms.iter().any(|t| hint_lower.contains(t))
            || self.raw_terms.iter().any(|t| hint.contains(t))
    }
}

use StrategyKind::{ContentEditable, Css, Text, XPath};

/// Click rules, checked in this order. Multiple matching rules all
/// contribute, in table order, not in hint order.
static CLICK_RULES: &[KeywordRule] = &[
    KeywordRule {
        lower_terms: &["search"],
        raw_terms: &[],
        strategies: &[
            (Css, "input[placeholder*='Search']"),
            (Css, "input[placeholder*='Quick find']"),
            (Css, "[data-testid*='search']"),
            (Text, "Search"),
            (Text, "Quick Find"),
        ],
    },
    KeywordRule {
        lower_terms: &["more options", "v shaped"],
        raw_terms: &["v"],
        strategies: &[
            (Css, "[aria-label*='More options']"),
            (Css, "[aria-label*='Create']"),
            (Css, "[data-testid*='create']"),
            (Css, "[aria-label*='New']"),
            (Css, ".notion-sidebar [role='button']:last-child"),
        ],
    },
    KeywordRule {
        lower_terms: &["database"],
        raw_terms: &[],
        strategies: &[
            (Text, "Database"),
            (Css, "[role='menuitem']:has-text('Database')"),
            (
                Css,
                ".notion-overlay-container [role='button']:has-text('Database')",
            ),
            (XPath, "//*[contains(text(), 'Database')]"),
        ],
    },
    KeywordRule {
        lower_terms: &["page"],
        raw_terms: &[],
        strategies: &[
            (Text, "Page"),
            (Css, "[role='menuitem']:has-text('Page')"),
            (
                Css,
                ".notion-overlay-container [role='button']:has-text('Page')",
            ),
        ],
    },
    KeywordRule {
        lower_terms: &["new database"],
        raw_terms: &[],
        strategies: &[
            (Text, "New database"),
            (Css, "[role='menuitem']:has-text('New database')"),
        ],
    },
    KeywordRule {
        lower_terms: &["settings"],
        raw_terms: &[],
        strategies: &[
            (Css, "[aria-label*='Settings']"),
            (Css, "[data-testid*='settings']"),
            (Text, "Settings & members"),
            (Text, "Settings"),
        ],
    },
    KeywordRule {
        lower_terms: &["appearance", "theme"],
        raw_terms: &[],
        strategies: &[
            (Text, "Appearance"),
            (Text, "Theme"),
            (Text, "Dark mode"),
            (Text, "Light mode"),
        ],
    },
    KeywordRule {
        lower_terms: &["new"],
        raw_terms: &[],
        strategies: &[
            (Css, "[aria-label*='New']"),
            (Css, "[data-testid*='create']"),
            (Text, "New page"),
            (Text, "New"),
        ],
    },
];

/// Fill rules: only the title/untitled concept has a dedicated block, the
/// layout-specific editable title candidates.
static FILL_RULES: &[KeywordRule] = &[KeywordRule {
    lower_terms: &["title", "untitled"],
    raw_terms: &[],
    strategies: &[
        (Css, "[data-placeholder*='Untitled']"),
        (Css, "[data-placeholder*='Title']"),
        (
            ContentEditable,
            ".notion-page-block .notranslate[contenteditable='true']",
        ),
        (ContentEditable, ".page-title [contenteditable='true']"),
        (
            ContentEditable,
            ".notion-page-content [contenteditable='true']:first-child",
        ),
        // Database title lives in the frame, not the page content
        (
            ContentEditable,
            ".notion-frame [contenteditable='true']:first-child",
        ),
    ],
}];

fn expand_rules(
    rules: &[KeywordRule],
    hint: &str,
    hint_lower: &str,
    out: &mut Vec<SelectorStrategy>,
) {
    for rule in rules {
        if rule.matches(hint, hint_lower) {
            out.extend(rule.strategies.iter().map(|(kind, value)| SelectorStrategy {
                kind: *kind,
                value: (*value).to_string(),
            }));
        }
    }
}

/// Resolve an ordered click-strategy list for a hint.
pub fn click_strategies(hint: &str) -> Vec<SelectorStrategy> {
    if hint.trim().is_empty() {
        return Vec::new();
    }

    let hint_lower = hint.to_lowercase();
    let mut strategies = Vec::new();
    expand_rules(CLICK_RULES, hint, &hint_lower, &mut strategies);

    // Generic fallbacks derived from the hint itself, always last.
    strategies.push(SelectorStrategy::text(hint));
    strategies.push(SelectorStrategy::css(&format!(
        "button:has-text('{hint}')"
    )));
    strategies.push(SelectorStrategy::css(&format!("[aria-label*='{hint}']")));
    strategies.push(SelectorStrategy::xpath(&format!(
        "//*[contains(text(), '{hint}')]"
    )));

    strategies
}

/// Resolve an ordered fill-strategy list for a hint.
pub fn fill_strategies(hint: &str) -> Vec<SelectorStrategy> {
    if hint.trim().is_empty() {
        return Vec::new();
    }

    let hint_lower = hint.to_lowercase();
    let mut strategies = Vec::new();
    expand_rules(FILL_RULES, hint, &hint_lower, &mut strategies);

    strategies.push(SelectorStrategy::placeholder(hint));
    strategies.push(SelectorStrategy::css(&format!(
        "input[placeholder*='{hint}']"
    )));
    strategies.push(SelectorStrategy::css("input[type='text']:visible"));

    strategies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_hint_resolves_to_nothing() {
        assert!(click_strategies("").is_empty());
        assert!(click_strategies("   ").is_empty());
        assert!(fill_strategies("").is_empty());
        assert!(fill_strategies(" \t ").is_empty());
    }

    #[test]
    fn test_search_hint_has_placeholder_css() {
        let strategies = click_strategies("Search");
        assert!(strategies.iter().any(|s| s.kind == StrategyKind::Css
            && s.value.contains("placeholder") && s.value.contains("Search")));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let a = click_strategies("new database");
        let b = click_strategies("new database");
        assert_eq!(a, b);

        let a = fill_strategies("Untitled");
        let b = fill_strategies("Untitled");
        assert_eq!(a, b);
    }

    #[test]
    fn test_generic_fallbacks_always_appended() {
        let strategies = click_strategies("Publish");
        let n = strategies.len();
        assert!(n >= 4);
        assert_eq!(strategies[n - 4], SelectorStrategy::text("Publish"));
        assert_eq!(
            strategies[n - 3],
            SelectorStrategy::css("button:has-text('Publish')")
        );
        assert_eq!(
            strategies[n - 2],
            SelectorStrategy::css("[aria-label*='Publish']")
        );
        assert_eq!(
            strategies[n - 1],
            SelectorStrategy::xpath("//*[contains(text(), 'Publish')]")
        );
    }

    #[test]
    fn test_multi_keyword_hints_accumulate_in_table_order() {
        // "new database" matches the database, page ("page" is not present
        // here), new-database and new rules; blocks appear in table order.
        let strategies = click_strategies("new database");
        let first_database = strategies
            .iter()
            .position(|s| s.value == "Database")
            .expect("database block present");
        let new_database = strategies
            .iter()
            .position(|s| s.value == "New database")
            .expect("new-database block present");
        let new_block = strategies
            .iter()
            .position(|s| s.value == "New page")
            .expect("new block present");
        assert!(first_database < new_database);
        assert!(new_database < new_block);
    }

    #[test]
    fn test_chevron_hint_triggers_menu_opener_block() {
        let strategies = click_strategies("v shaped button");
        assert!(strategies
            .iter()
            .any(|s| s.value == "[aria-label*='More options']"));
    }

    #[test]
    fn test_title_hint_yields_editable_candidates() {
        let strategies = fill_strategies("Untitled");
        assert!(strategies
            .iter()
            .any(|s| s.kind == StrategyKind::Css && s.value.contains("Untitled")));
        assert!(strategies
            .iter()
            .any(|s| s.kind == StrategyKind::ContentEditable));
        // Generic tail is still present.
        assert_eq!(
            strategies.last().unwrap(),
            &SelectorStrategy::css("input[type='text']:visible")
        );
    }

    #[test]
    fn test_fill_hint_gets_placeholder_strategy() {
        let strategies = fill_strategies("Email");
        assert!(strategies
            .iter()
            .any(|s| s.kind == StrategyKind::Placeholder && s.value == "Email"));
    }
}
