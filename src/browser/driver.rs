//! The document-driver seam.
//!
//! Everything the capture pipeline needs from a live document goes through
//! [`PageDriver`], so the orchestrator can be exercised against a scripted
//! fake in tests while production uses the CDP-backed [`super::ChromeDriver`].

use crate::error::Result;
use crate::strategy::SelectorStrategy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A point-in-time snapshot of one rendered element, collected in a single
/// in-page JavaScript pass. `selector` is a concrete CSS path usable to act
/// on the element afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawElement {
    pub selector: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub aria_label: String,

    #[serde(default)]
    pub placeholder: String,

    #[serde(default)]
    pub classes: String,

    #[serde(default)]
    pub test_id: String,

    #[serde(default)]
    pub visible: bool,

    #[serde(default)]
    pub disabled: bool,
}

/// Driver primitives for one live document.
///
/// CSS selectors accepted here support two engine extensions used by the
/// strategy tables: a trailing `:visible` filter and `:has-text('..')`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Full rendered markup of the document.
    async fn page_source(&self) -> Result<String>;

    /// Visible text of the document body.
    async fn page_text(&self) -> Result<String>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Whether any visible element matches the selector.
    async fn element_exists(&self, selector: &str) -> Result<bool>;

    /// Snapshot all elements matching the selector, in document order.
    async fn collect_elements(&self, selector: &str) -> Result<Vec<RawElement>>;

    /// Execute one click strategy, retrying until an element appears or the
    /// timeout elapses.
    async fn click(&self, strategy: &SelectorStrategy, timeout: Duration) -> Result<()>;

    /// Fill the first input, textarea, or editable region matching the
    /// selector with the given value.
    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()>;

    /// Click an editable region, clear its contents, then type the value.
    async fn clear_and_type(&self, selector: &str, value: &str) -> Result<()>;

    /// Dispatch a key press (upper-cased key names, e.g. "ENTER").
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Release the underlying browser. Consumes the driver; a session calls
    /// this exactly once, on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}
