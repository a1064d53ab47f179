//! Page readiness classification.
//!
//! Classifies the document into a small set of automation-readiness states
//! using content heuristics, and provides the bounded polling wait used when
//! the workspace requires a manual login. Classification itself is a pure
//! function over a [`PageProbe`] snapshot so the heuristics are testable
//! without a browser.

use crate::browser::PageDriver;
use crate::error::{AgentError, Result};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One-time-passcode / 2FA phrases; any of these wins immediately.
const OTP_PHRASES: &[&str] = &[
    "enter authentication code",
    "two-factor",
    "2fa",
    "verification code",
    "enter the code",
    "check your email",
    "enter code",
];

const LOGIN_PHRASES: &[&str] = &[
    "sign in to notion",
    "log in to notion",
    "continue with email",
    "continue with google",
    "enter your email",
    "welcome to notion",
    "already authenticated",
    "continue as",
    "choose an account",
];

const LOGIN_CONTROL_PHRASES: &[&str] = &["sign in", "log in", "continue with"];

const WORKSPACE_PHRASES: &[&str] = &[
    "new page",
    "search",
    "quick find",
    "workspace",
    "settings & members",
];

/// Selector whose presence marks a signed-in workspace: the sidebar, a
/// tagged content block, a creation control, or a "New"-labeled control.
pub const WORKSPACE_INDICATOR_SELECTOR: &str =
    ".notion-sidebar, [data-block-id], .notion-page-content, [data-testid*='create'], [aria-label*='New']";

/// Email/password inputs mark a login form regardless of page text.
const CREDENTIAL_INPUT_SELECTOR: &str = "input[type='password'], input[type='email']";

const LOGIN_CONTROL_SELECTOR: &str = "button, [role='button'], a";

/// Markup-size fallback thresholds for the authenticated heuristic.
const LARGE_MARKUP_BYTES: usize = 5000;
const LARGE_MARKUP_DIVS: usize = 20;

/// Minimum markup size at which an `Unknown` state is still worth
/// proceeding on.
pub const PROCEED_MARKUP_BYTES: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    LoginRequired,
    Authenticating,
    Authenticated,
    Unknown,
}

/// Raw signals gathered from the document for classification.
#[derive(Debug, Clone, Default)]
pub struct PageProbe {
    /// Full rendered markup.
    pub markup: String,
    /// A password or email input is present.
    pub has_credential_input: bool,
    /// Visible text of buttons, role=button elements, and links.
    pub control_texts: Vec<String>,
    /// A workspace indicator selector matched.
    pub workspace_indicator_present: bool,
}

impl PageProbe {
    fn looks_like_login_page(&self) -> bool {
        if self.has_credential_input {
            return true;
        }

        let markup_lower = self.markup.to_lowercase();
        if LOGIN_PHRASES.iter().any(|p| markup_lower.contains(p)) {
            return true;
        }

        self.control_texts.iter().any(|text| {
            let text = text.to_lowercase();
            LOGIN_CONTROL_PHRASES.iter().any(|p| text.contains(p))
        })
    }

    fn looks_like_workspace(&self) -> bool {
        if self.looks_like_login_page() {
            return false;
        }

        if self.workspace_indicator_present {
            return true;
        }

        let markup_lower = self.markup.to_lowercase();
        let found = WORKSPACE_PHRASES
            .iter()
            .filter(|p| markup_lower.contains(*p))
            .count();
        found >= 2
    }
}

/// Classify a probe snapshot. Checks run in a fixed order; the first match
/// wins.
pub fn classify(probe: &PageProbe) -> PageState {
    let markup_lower = probe.markup.to_lowercase();

    if OTP_PHRASES.iter().any(|p| markup_lower.contains(p)) {
        return PageState::Authenticating;
    }

    if probe.looks_like_login_page() {
        return PageState::LoginRequired;
    }

    if probe.looks_like_workspace() {
        return PageState::Authenticated;
    }

    if probe.markup.len() > LARGE_MARKUP_BYTES
        && probe.markup.matches("<div").count() > LARGE_MARKUP_DIVS
    {
        return PageState::Authenticated;
    }

    PageState::Unknown
}

/// Gather a probe from the live document.
pub async fn probe_page(driver: &dyn PageDriver) -> Result<PageProbe> {
    let markup = driver.page_source().await?;
    let has_credential_input = driver.element_exists(CREDENTIAL_INPUT_SELECTOR).await?;
    let workspace_indicator_present = driver
        .element_exists(WORKSPACE_INDICATOR_SELECTOR)
        .await
        .unwrap_or(false);

    let control_texts = driver
        .collect_elements(LOGIN_CONTROL_SELECTOR)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|el| el.text)
        .filter(|t| !t.is_empty())
        .collect();

    Ok(PageProbe {
        markup,
        has_credential_input,
        control_texts,
        workspace_indicator_present,
    })
}

/// Detect the current readiness state of the document.
pub async fn detect_page_state(driver: &dyn PageDriver) -> Result<PageState> {
    let probe = probe_page(driver).await?;
    let state = classify(&probe);
    debug!(
        "Page state {:?} (markup {} bytes, {} controls)",
        state,
        probe.markup.len(),
        probe.control_texts.len()
    );
    Ok(state)
}

/// Cooperative cancellation flag checked on each wait iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll until the workspace becomes visible, with an explicit deadline.
///
/// The readiness predicate is any authenticated indicator: a workspace
/// selector match, or workspace phrases in the rendered text. Returns
/// [`AgentError::AuthenticationTimeout`] when the deadline passes, and
/// treats cancellation the same way.
pub async fn wait_for_workspace(
    driver: &dyn PageDriver,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancelFlag,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(AgentError::AuthenticationTimeout(
                "cancelled while waiting for login".to_string(),
            ));
        }

        if let Ok(true) = driver.element_exists(WORKSPACE_INDICATOR_SELECTOR).await {
            info!("Workspace detected, login successful");
            return Ok(());
        }
        if let Ok(text) = driver.page_text().await {
            if ["New page", "Search", "Workspace"]
                .iter()
                .any(|p| text.contains(p))
            {
                info!("Workspace text detected, login successful");
                return Ok(());
            }
        }

        if Instant::now() + poll_interval > deadline {
            return Err(AgentError::AuthenticationTimeout(format!(
                "no workspace indicator within {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(poll_interval).await;
    }
}
