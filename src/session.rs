//! Capture session orchestration.
//!
//! Drives one end-to-end execution of an instruction against one document:
//! workspace setup, readiness detection, planning, per-step execution with
//! screenshots and verification, and the append-only capture trail. The
//! driver is owned exclusively by the session and released exactly once on
//! every exit path.

use crate::analyzer::PageAnalyzer;
use crate::browser::PageDriver;
use crate::error::{AgentError, Result};
use crate::locator;
use crate::planner::{fallback_plan, StepPlanner};
use crate::state::{self, CancelFlag, PageState};
use crate::step::{AbstractStep, CapturedStep, StepAction};
use crate::strategy::{self, SelectorStrategy};
use crate::verify::verify_step;
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timeouts and pauses for one session. All cooperative suspensions; no
/// cancellation is exposed to the caller mid-session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Root under which per-session artifact directories are created.
    pub output_root: PathBuf,

    /// Workspace entry point navigated to before planning.
    pub workspace_url: String,

    /// Initial navigation timeout; a timeout here is tolerated.
    pub setup_nav_timeout: Duration,

    /// Timeout for navigate steps; a timeout here fails the step.
    pub step_nav_timeout: Duration,

    /// Per-strategy element interaction timeout.
    pub action_timeout: Duration,

    /// Timeout for the dropdown-option click pre-pass.
    pub dropdown_timeout: Duration,

    /// Ceiling for the manual-login wait.
    pub auth_wait: Duration,

    /// Poll interval during the manual-login wait.
    pub auth_poll: Duration,

    /// Pause between steps and after menu-opening clicks.
    pub settle: Duration,

    /// Pause after navigation for client-side rendering.
    pub render_settle: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("dataset"),
            workspace_url: "https://www.notion.so/".to_string(),
            setup_nav_timeout: Duration::from_secs(45),
            step_nav_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
            dropdown_timeout: Duration::from_secs(5),
            auth_wait: Duration::from_secs(180),
            auth_poll: Duration::from_secs(2),
            settle: Duration::from_secs(1),
            render_settle: Duration::from_secs(2),
        }
    }
}

/// Hints that open a dropdown menu; these pick from the overlay container
/// before falling back to the generic locator.
const DROPDOWN_OPTION_HINTS: &[&str] = &["database", "page", "new database"];

/// The capture orchestrator. Components are injected once at construction.
pub struct CaptureSession {
    analyzer: PageAnalyzer,
    config: CaptureConfig,
    cancel: CancelFlag,
}

impl CaptureSession {
    pub fn new(analyzer: PageAnalyzer, config: CaptureConfig) -> Self {
        Self {
            analyzer,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Cancellation flag checked during the authentication wait.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run one instruction to completion and return the capture trail.
    ///
    /// Never returns an error: every failure is absorbed into a terminal
    /// [`CapturedStep`]. The driver is closed before returning, regardless
    /// of how the session ended.
    pub async fn run(
        &self,
        driver: Box<dyn PageDriver>,
        planner: &dyn StepPlanner,
        app: &str,
        instruction: &str,
    ) -> Vec<CapturedStep> {
        let base_dir = self.config.output_root.join(format!(
            "{}_{}",
            app.to_lowercase(),
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));

        let steps = self
            .execute(&*driver, planner, app, instruction, &base_dir)
            .await;

        if let Err(e) = driver.close().await {
            warn!("Error closing browser: {e}");
        } else {
            info!("{app} browser closed");
        }

        steps
    }

    async fn execute(
        &self,
        driver: &dyn PageDriver,
        planner: &dyn StepPlanner,
        app: &str,
        instruction: &str,
        base_dir: &Path,
    ) -> Vec<CapturedStep> {
        let mut captured: Vec<CapturedStep> = Vec::new();

        if let Err(e) = tokio::fs::create_dir_all(base_dir).await {
            error!("Failed to create session directory: {e}");
            captured.push(CapturedStep::terminal(
                "session_setup",
                &format!("{app} session setup failed"),
                e.to_string(),
            ));
            return captured;
        }

        // Initial navigation; a timeout is tolerated, the workspace may
        // already be loaded in the profile.
        info!("🌐 Navigating to {}", self.config.workspace_url);
        match driver
            .navigate(&self.config.workspace_url, self.config.setup_nav_timeout)
            .await
        {
            Ok(()) => tokio::time::sleep(self.config.render_settle).await,
            Err(e) => warn!("Initial navigation issue, continuing: {e}"),
        }

        let mut page_context = self.analyzer.analyze(driver).await;
        info!(
            "{app} page analysis: found {} interactive elements",
            page_context.interactive_elements.len()
        );

        match self.ensure_ready(driver, app, base_dir).await {
            Ok(()) => {}
            Err(step) => {
                captured.push(step);
                return captured;
            }
        }

        let plan = match planner.plan(app, instruction, Some(&page_context)).await {
            Ok(steps) => {
                info!("Generated {} steps for {app}", steps.len());
                steps
            }
            Err(e) => {
                warn!("{app} step generation failed, using fallback plan: {e}");
                fallback_plan()
            }
        };

        for (index, step) in plan.iter().enumerate() {
            let step_num = index + 1;
            info!(
                "▶️  Executing {app} step {step_num}/{}: {} '{}'",
                plan.len(),
                step.action_name(),
                step.selector_hint()
            );

            // Pre-step screenshot, held in memory for verification only.
            let _before = driver.screenshot().await.ok();

            match self.execute_step(driver, step).await {
                Ok(()) => {
                    let verified = verify_step(driver, step).await;
                    if !verified {
                        warn!("Action verification uncertain for step {step_num}");
                    }

                    let mut record = CapturedStep::from_step(step);
                    let screenshot = base_dir.join(format!("step_{step_num}.png"));
                    if let Some((path, hash)) = self.persist_screenshot(driver, &screenshot).await {
                        record.screenshot_path = Some(path);
                        record.screenshot_sha256 = Some(hash);
                    }

                    page_context = self.analyzer.analyze(driver).await;
                    record.resulting_url = self.current_url_or_unknown(driver).await;
                    record.page_context = Some(page_context.clone());
                    record.verified = verified;
                    captured.push(record);

                    tokio::time::sleep(self.config.settle).await;
                }
                Err(e) => {
                    error!("Step {step_num} failed, stopping execution: {e}");
                    let mut record = CapturedStep::from_step(step);
                    let screenshot = base_dir.join(format!("error_step_{step_num}.png"));
                    if let Some((path, hash)) = self.persist_screenshot(driver, &screenshot).await {
                        record.screenshot_path = Some(path);
                        record.screenshot_sha256 = Some(hash);
                    }
                    record.resulting_url = self.current_url_or_unknown(driver).await;
                    record.error = Some(e.to_string());
                    captured.push(record);
                    break;
                }
            }
        }

        captured
    }

    /// Block until the workspace is usable, or produce the terminal step
    /// that ends the session.
    async fn ensure_ready(
        &self,
        driver: &dyn PageDriver,
        app: &str,
        base_dir: &Path,
    ) -> std::result::Result<(), CapturedStep> {
        let page_state = match state::detect_page_state(driver).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Page state detection failed: {e}");
                PageState::Unknown
            }
        };
        info!("{app} page state: {page_state:?}");

        match page_state {
            PageState::Authenticated => {
                info!("{app} authenticated, proceeding with task");
                Ok(())
            }
            PageState::LoginRequired | PageState::Authenticating => {
                info!("{app} login required, please log in manually");
                info!(
                    "⏳ Waiting for workspace detection ({}s max)...",
                    self.config.auth_wait.as_secs()
                );

                match state::wait_for_workspace(
                    driver,
                    self.config.auth_wait,
                    self.config.auth_poll,
                    &self.cancel,
                )
                .await
                {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        error!("{app} authentication timeout: {e}");
                        let screenshot = base_dir.join("login_timeout.png");
                        let shot = self.persist_screenshot(driver, &screenshot).await;
                        let preview = self.text_preview(driver, 200).await;
                        info!("Current page content: {preview}...");

                        let mut step = CapturedStep::terminal(
                            "authentication",
                            &format!("{app} login timeout"),
                            format!("Could not detect {app} workspace. Content: {preview}..."),
                        );
                        if let Some((path, hash)) = shot {
                            step.screenshot_path = Some(path);
                            step.screenshot_sha256 = Some(hash);
                        }
                        step.resulting_url = self.current_url_or_unknown(driver).await;
                        Err(step)
                    }
                }
            }
            PageState::Unknown => {
                warn!("Unknown {app} page state, proceeding cautiously");
                let markup_len = driver
                    .page_source()
                    .await
                    .map(|s| s.len())
                    .unwrap_or_default();
                if markup_len > state::PROCEED_MARKUP_BYTES {
                    debug!("Page has content ({markup_len} bytes), proceeding");
                    Ok(())
                } else {
                    error!("Page seems empty, cannot proceed");
                    let mut step = CapturedStep::terminal(
                        "page_analysis",
                        &format!("{app} page state unclear"),
                        AgentError::PageStateUnclear(format!(
                            "could not determine {app} page state"
                        ))
                        .to_string(),
                    );
                    step.resulting_url = self.current_url_or_unknown(driver).await;
                    Err(step)
                }
            }
        }
    }

    /// Dispatch one step by action kind.
    async fn execute_step(&self, driver: &dyn PageDriver, step: &AbstractStep) -> Result<()> {
        match &step.action {
            StepAction::Navigate { url } => {
                info!("Navigating to {url}...");
                driver.navigate(url, self.config.step_nav_timeout).await?;
                tokio::time::sleep(self.config.render_settle).await;
                Ok(())
            }
            StepAction::Wait { seconds } => {
                info!("Waiting for {seconds} seconds...");
                tokio::time::sleep(Duration::from_secs(*seconds)).await;
                Ok(())
            }
            StepAction::Click { hint } => self.smart_click(driver, hint).await,
            StepAction::Fill { hint, value } => self.smart_fill(driver, hint, value).await,
            StepAction::Press { key } => {
                info!("Pressing key: {key}");
                driver.press_key(key).await
            }
            StepAction::Other { action } => {
                debug!("Unrecognized action '{action}', treating as no-op");
                tokio::time::sleep(self.config.settle).await;
                Ok(())
            }
        }
    }

    /// Click resolution: dropdown pre-pass, then the contextual fast path,
    /// then the ordered strategy chain.
    async fn smart_click(&self, driver: &dyn PageDriver, hint: &str) -> Result<()> {
        if hint.trim().is_empty() {
            return Err(AgentError::ElementNotFound(
                "no selector hint for click".to_string(),
            ));
        }

        let hint_lower = hint.to_lowercase();

        if DROPDOWN_OPTION_HINTS.contains(&hint_lower.as_str()) {
            let option = SelectorStrategy::css(&format!(
                ".notion-overlay-container [role='button']:has-text('{hint}')"
            ));
            match driver.click(&option, self.config.dropdown_timeout).await {
                Ok(()) => {
                    info!("Clicked dropdown option: '{hint}'");
                    return Ok(());
                }
                Err(e) => debug!("Dropdown click failed: {e}"),
            }
        }

        // Fast path: contextual scan of rendered interactive elements.
        if let Ok(elements) = driver
            .collect_elements(locator::INTERACTIVE_SCAN_SELECTOR)
            .await
        {
            if let Some(element) = locator::find_by_context(hint, &elements) {
                let target = SelectorStrategy::css(&element.selector);
                match driver.click(&target, self.config.action_timeout).await {
                    Ok(()) => {
                        info!("Clicked using contextual search: '{hint}'");
                        self.settle_after_menu_click(hint, &hint_lower).await;
                        return Ok(());
                    }
                    Err(e) => debug!("Contextual click failed: {e}"),
                }
            }
        }

        let strategies = strategy::click_strategies(hint);
        let mut last_error: Option<AgentError> = None;
        for candidate in &strategies {
            debug!("Trying click: {:?} -> '{}'", candidate.kind, candidate.value);
            match driver.click(candidate, self.config.action_timeout).await {
                Ok(()) => {
                    info!("Clicked: '{}'", candidate.value);
                    self.settle_after_menu_click(hint, &hint_lower).await;
                    return Ok(());
                }
                Err(e) => {
                    debug!("Click failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(AgentError::ElementNotFound(format!(
            "element not found for '{hint}': {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategies produced".to_string())
        )))
    }

    /// Menu-opening clicks get an extra pause for the overlay to render.
    async fn settle_after_menu_click(&self, hint: &str, hint_lower: &str) {
        if hint_lower.contains("more options") || hint.contains('v') {
            tokio::time::sleep(self.config.settle).await;
        }
    }

    /// Fill resolution: ordered fill-strategy chain, including the
    /// click-clear-type flow for editable title regions.
    async fn smart_fill(&self, driver: &dyn PageDriver, hint: &str, value: &str) -> Result<()> {
        let strategies = strategy::fill_strategies(hint);
        if strategies.is_empty() {
            return Err(AgentError::ElementNotFound(
                "no selector hint for fill".to_string(),
            ));
        }

        let mut last_error: Option<AgentError> = None;
        for candidate in &strategies {
            debug!("Trying fill: {:?} -> '{}'", candidate.kind, candidate.value);
            let attempt = match candidate.kind {
                crate::strategy::StrategyKind::Css => {
                    driver
                        .fill(&candidate.value, value, self.config.action_timeout)
                        .await
                }
                crate::strategy::StrategyKind::Placeholder => {
                    let selector = format!(
                        "input[placeholder*='{0}'], textarea[placeholder*='{0}']",
                        candidate.value
                    );
                    driver
                        .fill(&selector, value, self.config.action_timeout)
                        .await
                }
                crate::strategy::StrategyKind::ContentEditable => {
                    self.fill_editable_title(driver, &candidate.value, value)
                        .await
                }
                _ => Err(AgentError::StepExecution(format!(
                    "strategy {:?} is not a fill strategy",
                    candidate.kind
                ))),
            };

            match attempt {
                Ok(()) => {
                    info!("Filled via {:?}: '{}'", candidate.kind, candidate.value);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Fill failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(AgentError::ElementNotFound(format!(
            "input not found for '{hint}': {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no strategies produced".to_string())
        )))
    }

    /// The contenteditable title flow: click the region, clear it, type.
    async fn fill_editable_title(
        &self,
        driver: &dyn PageDriver,
        selector: &str,
        value: &str,
    ) -> Result<()> {
        if !driver.element_exists(selector).await? {
            return Err(AgentError::ElementNotFound(selector.to_string()));
        }
        driver
            .click(&SelectorStrategy::css(selector), self.config.action_timeout)
            .await?;
        driver.clear_and_type(selector, value).await?;
        info!("Filled title field: {value}");
        Ok(())
    }

    /// Persist the current viewport to disk; best-effort.
    async fn persist_screenshot(
        &self,
        driver: &dyn PageDriver,
        path: &Path,
    ) -> Option<(String, String)> {
        let bytes = match driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Screenshot failed: {e}");
                return None;
            }
        };

        if let Err(e) = tokio::fs::write(path, &bytes).await {
            warn!("Failed to write screenshot {}: {e}", path.display());
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = format!("{:x}", hasher.finalize());

        Some((path.to_string_lossy().to_string(), hash))
    }

    async fn current_url_or_unknown(&self, driver: &dyn PageDriver) -> String {
        driver
            .current_url()
            .await
            .unwrap_or_else(|_| "unknown".to_string())
    }

    async fn text_preview(&self, driver: &dyn PageDriver, limit: usize) -> String {
        let text = driver.page_text().await.unwrap_or_default();
        text.chars().take(limit).collect()
    }
}
