//! Contextual element matching.
//!
//! A fast pre-pass tried before the strategy fallback chain for click steps:
//! scan the currently rendered interactive elements and match them against
//! the hint using their combined textual context.

use crate::browser::RawElement;

/// The interactive-element scan used by the fast path.
pub const INTERACTIVE_SCAN_SELECTOR: &str =
    "button, [role='button'], a, [onclick], input, textarea";

/// Find the first element whose context matches the hint, in scan order.
///
/// Elements that are no longer visible are treated as non-matches and
/// skipped; an element can disappear between enumeration and inspection.
pub fn find_by_context<'a>(hint: &str, elements: &'a [RawElement]) -> Option<&'a RawElement> {
    elements
        .iter()
        .filter(|el| el.visible)
        .find(|el| context_matches(hint, el))
}

/// Match rule: any whitespace-delimited token of the lower-cased hint appears
/// in the element's combined context, or the whole hint appears in its text,
/// aria-label, or placeholder individually.
pub fn context_matches(hint: &str, element: &RawElement) -> bool {
    let hint_lower = hint.to_lowercase();
    let combined = format!(
        "{} {} {} {} {}",
        element.text, element.aria_label, element.placeholder, element.classes, element.test_id
    )
    .to_lowercase();

    if hint_lower
        .split_whitespace()
        .any(|word| combined.contains(word))
    {
        return true;
    }

    element.text.to_lowercase().contains(&hint_lower)
        || element.aria_label.to_lowercase().contains(&hint_lower)
        || element.placeholder.to_lowercase().contains(&hint_lower)
}
