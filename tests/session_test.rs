//! Session orchestration tests against a scripted in-memory driver.
//!
//! These cover the capture trail invariants: stop-on-failure ordering,
//! navigate verification, terminal authentication/page-state steps, the
//! planner fallback, and the exactly-once driver release guarantee.

use async_trait::async_trait;
use softlight_agent::error::{AgentError, Result};
use softlight_agent::planner::StepPlanner;
use softlight_agent::state::WORKSPACE_INDICATOR_SELECTOR;
use softlight_agent::{
    AbstractStep, CaptureConfig, CaptureSession, PageAnalyzer, PageContext, PageDriver,
    RawElement, SelectorStrategy, StepAction,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===== FAKES =====

#[derive(Default)]
struct FakeDriver {
    url: Mutex<String>,
    markup: String,
    text: String,
    elements: Vec<RawElement>,
    exists: Vec<String>,
    click_ok: Vec<String>,
    fill_ok: Vec<String>,
    redirect_to: Option<String>,
    closed: Arc<AtomicUsize>,
}

impl FakeDriver {
    /// A driver already sitting on an authenticated workspace.
    fn workspace() -> Self {
        Self {
            url: Mutex::new("https://www.notion.so/workspace".to_string()),
            markup: "<div>New page</div><div>Quick find</div>".to_string(),
            text: "New page".to_string(),
            exists: vec![WORKSPACE_INDICATOR_SELECTOR.to_string()],
            ..Default::default()
        }
    }

    fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closed.clone()
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        let landed = self.redirect_to.clone().unwrap_or_else(|| url.to_string());
        *self.url.lock().unwrap() = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok("Fake Workspace".to_string())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(self.markup.clone())
    }

    async fn page_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn element_exists(&self, selector: &str) -> Result<bool> {
        Ok(self.exists.iter().any(|s| s == selector))
    }

    async fn collect_elements(&self, _selector: &str) -> Result<Vec<RawElement>> {
        Ok(self.elements.clone())
    }

    async fn click(&self, strategy: &SelectorStrategy, _timeout: Duration) -> Result<()> {
        if self.click_ok.iter().any(|p| strategy.value.contains(p)) {
            Ok(())
        } else {
            Err(AgentError::ElementNotFound(strategy.value.clone()))
        }
    }

    async fn fill(&self, selector: &str, _value: &str, _timeout: Duration) -> Result<()> {
        if self.fill_ok.iter().any(|p| selector.contains(p)) {
            Ok(())
        } else {
            Err(AgentError::ElementNotFound(selector.to_string()))
        }
    }

    async fn clear_and_type(&self, selector: &str, _value: &str) -> Result<()> {
        if self.fill_ok.iter().any(|p| selector.contains(p)) {
            Ok(())
        } else {
            Err(AgentError::ElementNotFound(selector.to_string()))
        }
    }

    async fn press_key(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePlanner {
    plan: Option<Vec<AbstractStep>>,
}

impl FakePlanner {
    fn with_plan(plan: Vec<AbstractStep>) -> Self {
        Self { plan: Some(plan) }
    }

    fn failing() -> Self {
        Self { plan: None }
    }
}

#[async_trait]
impl StepPlanner for FakePlanner {
    async fn plan(
        &self,
        _app: &str,
        _instruction: &str,
        _page_context: Option<&PageContext>,
    ) -> anyhow::Result<Vec<AbstractStep>> {
        self.plan
            .clone()
            .ok_or_else(|| anyhow::anyhow!("planner unavailable"))
    }
}

// ===== HELPERS =====

fn fast_config() -> CaptureConfig {
    CaptureConfig {
        output_root: std::env::temp_dir().join(format!(
            "softlight-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )),
        setup_nav_timeout: Duration::from_millis(100),
        step_nav_timeout: Duration::from_millis(100),
        action_timeout: Duration::from_millis(100),
        dropdown_timeout: Duration::from_millis(50),
        auth_wait: Duration::from_millis(200),
        auth_poll: Duration::from_millis(50),
        settle: Duration::from_millis(10),
        render_settle: Duration::from_millis(10),
        ..CaptureConfig::default()
    }
}

fn session() -> CaptureSession {
    CaptureSession::new(PageAnalyzer::new(), fast_config())
}

fn click_step(hint: &str) -> AbstractStep {
    AbstractStep {
        action: StepAction::Click {
            hint: hint.to_string(),
        },
        description: format!("Click {hint}"),
    }
}

fn wait_step(seconds: u64) -> AbstractStep {
    AbstractStep {
        action: StepAction::Wait { seconds },
        description: "Pause".to_string(),
    }
}

// ===== TESTS =====

#[tokio::test]
async fn test_step_failure_stops_the_session() {
    let mut driver = FakeDriver::workspace();
    driver.click_ok = vec!["New".to_string()];
    let closed = driver.close_counter();

    // Step 2 matches no strategy; step 3 must never run.
    let planner = FakePlanner::with_plan(vec![
        click_step("New"),
        click_step("Nonexistent Control"),
        wait_step(0),
    ]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "test run")
        .await;

    assert_eq!(steps.len(), 2, "no steps recorded after the failing one");
    assert_eq!(steps[0].selector_hint, "New");
    assert!(steps[0].error.is_none());
    assert_eq!(steps[1].selector_hint, "Nonexistent Control");
    let error = steps[1].error.as_deref().expect("second step carries error");
    assert!(!error.is_empty());
    assert!(!steps[1].verified);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_navigate_step_verified_iff_url_substring() {
    // Landed URL contains the target: verified.
    let driver = FakeDriver::workspace();
    let planner = FakePlanner::with_plan(vec![AbstractStep {
        action: StepAction::Navigate {
            url: "https://example.com/x".to_string(),
        },
        description: "Go".to_string(),
    }]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "navigate")
        .await;
    assert_eq!(steps.len(), 1);
    assert!(steps[0].verified);
    assert!(steps[0].resulting_url.contains("https://example.com/x"));

    // Redirected elsewhere: the step succeeds but is not verified.
    let mut driver = FakeDriver::workspace();
    driver.redirect_to = Some("https://other.site/landing".to_string());
    let planner = FakePlanner::with_plan(vec![AbstractStep {
        action: StepAction::Navigate {
            url: "https://example.com/x".to_string(),
        },
        description: "Go".to_string(),
    }]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "navigate")
        .await;
    assert_eq!(steps.len(), 1);
    assert!(steps[0].error.is_none());
    assert!(!steps[0].verified);
}

#[tokio::test]
async fn test_successful_session_captures_every_step() {
    let mut driver = FakeDriver::workspace();
    driver.click_ok = vec!["New".to_string()];
    let closed = driver.close_counter();

    let planner = FakePlanner::with_plan(vec![click_step("New"), wait_step(0)]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "create something")
        .await;

    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.error.is_none()));
    assert!(steps.iter().all(|s| s.verified));
    assert!(steps.iter().all(|s| s.page_context.is_some()));
    assert!(steps[0].screenshot_path.is_some());
    assert!(steps[0].screenshot_sha256.is_some());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_authentication_timeout_produces_single_terminal_step() {
    let driver = FakeDriver {
        url: Mutex::new("https://www.notion.so/login".to_string()),
        markup: "<div>Sign in to Notion to continue</div>".to_string(),
        text: "Please sign in first".to_string(),
        ..Default::default()
    };
    let closed = driver.close_counter();

    // The plan must never be reached.
    let planner = FakePlanner::with_plan(vec![click_step("New")]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "create a page")
        .await;

    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].action, "error");
    assert_eq!(steps[0].selector_hint, "authentication");
    let error = steps[0].error.as_deref().unwrap();
    assert!(error.contains("Please sign in first"));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unclear_page_state_terminates_session() {
    // Nearly empty document: unknown state, too small to proceed on.
    let driver = FakeDriver {
        url: Mutex::new("about:blank".to_string()),
        markup: "<html></html>".to_string(),
        ..Default::default()
    };
    let closed = driver.close_counter();

    let planner = FakePlanner::with_plan(vec![click_step("New")]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "anything")
        .await;

    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].action, "error");
    assert_eq!(steps[0].selector_hint, "page_analysis");
    assert!(steps[0].error.is_some());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_large_unknown_page_proceeds() {
    // Unknown state but plenty of markup: proceed cautiously.
    let padding = "<span>x</span>".repeat(400);
    let driver = FakeDriver {
        url: Mutex::new("https://www.notion.so/".to_string()),
        markup: padding,
        ..Default::default()
    };

    let planner = FakePlanner::with_plan(vec![wait_step(0)]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "anything")
        .await;

    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].action, "wait");
    assert!(steps[0].error.is_none());
}

#[tokio::test]
async fn test_planner_failure_uses_fallback_plan() {
    let mut driver = FakeDriver::workspace();
    driver.click_ok = vec!["New".to_string()];
    let planner = FakePlanner::failing();

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "create a page")
        .await;

    // Fallback plan: click "New", then fill "Untitled" (which fails against
    // this driver and terminates the trail).
    assert!(!steps.is_empty());
    assert_eq!(steps[0].action, "click");
    assert_eq!(steps[0].selector_hint, "New");
}

#[tokio::test]
async fn test_empty_click_hint_fails_immediately() {
    let driver = FakeDriver::workspace();
    let planner = FakePlanner::with_plan(vec![click_step(""), wait_step(0)]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "blank hint")
        .await;

    assert_eq!(steps.len(), 1);
    assert!(steps[0].error.is_some());
}

#[tokio::test]
async fn test_locator_fast_path_clicks_matching_element() {
    let mut driver = FakeDriver::workspace();
    driver.elements = vec![RawElement {
        selector: "body > div:nth-child(1) > button:nth-child(2)".to_string(),
        tag: "button".to_string(),
        aria_label: "Create New Database".to_string(),
        visible: true,
        ..Default::default()
    }];
    // Only the contextual element's own selector is clickable; every
    // strategy-table selector would miss.
    driver.click_ok = vec!["button:nth-child(2)".to_string()];

    let planner = FakePlanner::with_plan(vec![click_step("new database")]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "create database")
        .await;

    assert_eq!(steps.len(), 1);
    assert!(steps[0].error.is_none());
}

#[tokio::test]
async fn test_fill_step_uses_fill_strategies() {
    let mut driver = FakeDriver::workspace();
    driver.fill_ok = vec!["data-placeholder*='Untitled'".to_string()];

    let planner = FakePlanner::with_plan(vec![AbstractStep {
        action: StepAction::Fill {
            hint: "Untitled".to_string(),
            value: "Project Tracker".to_string(),
        },
        description: "Name it".to_string(),
    }]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "name the page")
        .await;

    assert_eq!(steps.len(), 1);
    assert!(steps[0].error.is_none());
    assert_eq!(steps[0].value.as_deref(), Some("Project Tracker"));
}

#[tokio::test]
async fn test_unrecognized_action_is_noop_success() {
    let driver = FakeDriver::workspace();
    let planner = FakePlanner::with_plan(vec![
        AbstractStep {
            action: StepAction::Other {
                action: "hover".to_string(),
            },
            description: "Hover".to_string(),
        },
        wait_step(0),
    ]);

    let steps = session()
        .run(Box::new(driver), &planner, "Notion", "lenient")
        .await;

    assert_eq!(steps.len(), 2);
    assert!(steps[0].error.is_none());
}
