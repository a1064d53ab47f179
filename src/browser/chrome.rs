// spider_chrome re-exports chromiumoxide API
use crate::browser::driver::{PageDriver, RawElement};
use crate::error::{AgentError, Result};
use crate::strategy::{SelectorStrategy, StrategyKind};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry interval for element interactions waiting on the DOM.
const ACTION_POLL: Duration = Duration::from_millis(250);

/// Viewport matching the capture profile.
const WINDOW_SIZE_ARG: &str = "--window-size=1280,720";

pub struct ChromeDriver {
    browser: Browser,
    #[allow(dead_code)]
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port. Useful
    /// when a manual login should persist across sessions.
    DebugPort(u16),
}

impl ChromeDriver {
    /// Helper method to get the current active page, excluding Chrome's new-tab-page
    async fn get_active_page(&self) -> Result<chromiumoxide::page::Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        // No non-chrome page found, try to use any existing page
        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        // No pages at all, create one
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| AgentError::SetupFailure(format!("Failed to create page: {}", e)))
    }

    /// Launch Chrome with visible UI (the default for manual-login flows).
    pub async fn launch_headful() -> Result<Self> {
        Self::new(ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: false,
            headless: false,
        })
        .await
    }

    /// Launch Chrome with auto-detection for CI environments
    pub async fn launch_auto() -> Result<Self> {
        let is_ci = std::env::var("CI").is_ok()
            || std::env::var("GITHUB_ACTIONS").is_ok()
            || std::env::var("GITLAB_CI").is_ok()
            || std::env::var("JENKINS_HOME").is_ok()
            || std::env::var("CIRCLECI").is_ok();

        Self::new(ConnectionMode::Sandboxed {
            chrome_path: None,
            no_sandbox: is_ci, // CI environments typically need --no-sandbox
            headless: is_ci,   // CI environments should run headless
        })
        .await
    }

    /// Connect to existing Chrome on debug port (advanced mode)
    pub async fn connect_debug_port(port: u16) -> Result<Self> {
        Self::new(ConnectionMode::DebugPort(port)).await
    }

    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile directory per launch so parallel runs do
                // not share state.
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map_err(|e| AgentError::SetupFailure(e.to_string()))?
                    .as_nanos();
                let temp_dir = std::env::temp_dir().join(format!("softlight-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    AgentError::SetupFailure(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir).arg(WINDOW_SIZE_ARG);

                // Linux AppArmor workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    // Try to auto-download Chrome if not found
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            log::warn!("Auto-download failed ({}), trying system Chrome...", e);
                        }
                    }
                }

                let built = config.build().map_err(|e| {
                    AgentError::SetupFailure(format!(
                        "{}. Chrome not found; install Chrome or pass --chrome-path",
                        e
                    ))
                })?;

                let (browser, mut handler) = Browser::launch(built).await.map_err(|e| {
                    AgentError::SetupFailure(format!(
                        "{}. Chrome not found; install Chrome or pass --chrome-path. \
                         Linux sandbox issue? Try --no-sandbox",
                        e
                    ))
                })?;

                // Spawn handler task
                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    AgentError::SetupFailure(format!(
                        "Failed to connect to Chrome on port {}. \
                         Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// Check if the browser is still alive and responsive
    pub async fn is_alive(&self) -> bool {
        match self.browser.pages().await {
            Ok(pages) => {
                if let Some(page) = pages.first() {
                    matches!(
                        tokio::time::timeout(Duration::from_secs(2), page.url()).await,
                        Ok(Ok(_))
                    )
                } else {
                    // No pages but browser responded - still alive
                    true
                }
            }
            Err(_) => false,
        }
    }

    /// Execute arbitrary JavaScript in the page context
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| AgentError::StepExecution(format!("Script execution failed: {}", e)))?;

        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        Ok(self.evaluate(script).await?.as_bool().unwrap_or(false))
    }

    /// Run a click/fill attempt script until it reports success or the
    /// timeout elapses; the DOM may still be rendering the target.
    async fn poll_script(&self, script: &str, timeout: Duration, what: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval_bool(script).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() + ACTION_POLL > deadline {
                return Err(AgentError::ElementNotFound(format!(
                    "{} did not match within {}ms",
                    what,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(ACTION_POLL).await;
        }
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| {
                AgentError::SetupFailure("Cannot determine cache directory".to_string())
            })?
            .join("softlight")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| AgentError::SetupFailure(format!("Failed to create cache dir: {}", e)))?;

        // Check if Chrome already downloaded
        let revision_info_path = cache_dir.join(".downloaded");
        if revision_info_path.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir).await {
                return Ok(executable);
            }
        }

        log::info!("📥 Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| AgentError::SetupFailure(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| AgentError::SetupFailure(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&revision_info_path, "downloaded")
            .await
            .map_err(|e| AgentError::SetupFailure(format!("Failed to write marker: {}", e)))?;

        log::info!("✅ Chrome downloaded successfully");

        Ok(info.executable_path)
    }

    /// Find Chrome executable in cache directory
    async fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        let possible_paths = vec![
            cache_dir.join("chrome"),
            cache_dir.join("chrome.exe"),
            cache_dir.join("Google Chrome.app/Contents/MacOS/Google Chrome"),
            cache_dir.join("chrome-linux/chrome"),
            cache_dir.join("chrome-mac/Chromium.app/Contents/MacOS/Chromium"),
            cache_dir.join("chrome-win/chrome.exe"),
        ];

        possible_paths.into_iter().find(|path| path.exists())
    }
}

/// Shared helpers injected into every in-page script. The query function
/// understands the strategy tables' `:visible` and `:has-text('..')`
/// selector extensions.
const JS_HELPERS: &str = r#"
    const visible = (el) => {
        const r = el.getBoundingClientRect();
        if (!(r.width > 0 && r.height > 0)) return false;
        const s = window.getComputedStyle(el);
        return s.visibility !== 'hidden' && s.display !== 'none';
    };
    const query = (selector) => {
        let sel = selector;
        let requireVisible = false;
        let textFilter = null;
        if (sel.endsWith(':visible')) {
            requireVisible = true;
            sel = sel.slice(0, -8);
        }
        const m = sel.match(/:has-text\('([^']*)'\)/);
        if (m) {
            textFilter = m[1];
            sel = sel.replace(m[0], '');
        }
        let nodes;
        try { nodes = Array.from(document.querySelectorAll(sel)); } catch (e) { return []; }
        if (textFilter !== null) {
            nodes = nodes.filter((el) => (el.innerText || '').includes(textFilter));
        }
        if (requireVisible) nodes = nodes.filter(visible);
        return nodes;
    };
    const firstVisible = (nodes) => nodes.find(visible) || nodes[0] || null;
    const byText = (text) => {
        const all = Array.from(document.querySelectorAll('*')).filter(visible);
        const exact = all.filter((el) => (el.innerText || '').trim() === text);
        const pool = exact.length ? exact : all.filter((el) => (el.innerText || '').includes(text));
        if (!pool.length) return null;
        pool.sort((a, b) => (a.innerText || '').length - (b.innerText || '').length);
        return pool[0];
    };
    const byXPath = (expr) => {
        try {
            return document.evaluate(expr, document, null,
                XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        } catch (e) { return null; }
    };
    const cssPath = (el) => {
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1 && node.tagName !== 'BODY' && node.tagName !== 'HTML') {
            const parent = node.parentElement;
            let part = node.tagName.toLowerCase();
            if (parent) {
                part += ':nth-child(' + (Array.from(parent.children).indexOf(node) + 1) + ')';
            }
            parts.unshift(part);
            node = parent;
        }
        return parts.length ? 'body > ' + parts.join(' > ') : 'body';
    };
    const setValue = (el, value) => {
        if (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA') {
            el.focus();
            el.value = value;
            el.dispatchEvent(new Event('input', { bubbles: true }));
            el.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }
        if (el.isContentEditable) {
            el.focus();
            el.innerText = value;
            el.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
        }
        return false;
    };
"#;

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn script(body: &str) -> String {
    format!("(() => {{ {JS_HELPERS} {body} }})()")
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;

        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::debug!("🌐 Navigating to: {}", normalized_url);
        let page = self.get_active_page().await?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                AgentError::StepExecution(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        let response = page.execute(params).await.map_err(|e| {
            let error_str = e.to_string();
            // "oneshot canceled" means the browser connection is gone
            if error_str.contains("oneshot canceled") {
                AgentError::SetupFailure(
                    "Browser connection lost; the browser may have been closed or crashed"
                        .to_string(),
                )
            } else {
                AgentError::StepExecution(format!(
                    "Failed to navigate to {}: {}",
                    normalized_url, e
                ))
            }
        })?;

        if let Some(error_text) = response.result.error_text.clone() {
            return Err(AgentError::StepExecution(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        match page.event_listener::<EventLoadEventFired>().await {
            Ok(mut events) => match tokio::time::timeout(timeout, events.next()).await {
                Ok(_) => {}
                Err(_) => {
                    return Err(AgentError::NavigationTimeout(format!(
                        "no load event for {} within {}s",
                        normalized_url,
                        timeout.as_secs()
                    )));
                }
            },
            Err(e) => {
                log::warn!("Could not wait for load event: {}", e);
            }
        }

        // Small delay for page state to stabilize
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.url()
            .await
            .map_err(|e| AgentError::StepExecution(e.to_string()))?
            .ok_or(AgentError::NoPage)
    }

    async fn title(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        Ok(page
            .get_title()
            .await
            .map_err(|e| AgentError::StepExecution(e.to_string()))?
            .unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.content()
            .await
            .map_err(|e| AgentError::StepExecution(e.to_string()))
    }

    async fn page_text(&self) -> Result<String> {
        let value = self
            .evaluate("(() => document.body ? document.body.innerText : '')()")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.get_active_page().await?;

        page.screenshot(chromiumoxide::page::ScreenshotParams::default())
            .await
            .map_err(|e| AgentError::StepExecution(format!("Failed to take screenshot: {}", e)))
    }

    async fn element_exists(&self, selector: &str) -> Result<bool> {
        let body = format!(
            "return query({}).filter(visible).length > 0;",
            js_string(selector)
        );
        self.eval_bool(&script(&body)).await
    }

    async fn collect_elements(&self, selector: &str) -> Result<Vec<RawElement>> {
        let body = format!(
            r#"
            return query({}).slice(0, 150).map((el) => ({{
                selector: cssPath(el),
                tag: el.tagName.toLowerCase(),
                text: (el.innerText || '').trim().substring(0, 200),
                aria_label: el.getAttribute('aria-label') || '',
                placeholder: el.getAttribute('placeholder') || '',
                classes: el.getAttribute('class') || '',
                test_id: el.getAttribute('data-testid') || '',
                visible: visible(el),
                disabled: el.disabled === true || el.getAttribute('disabled') !== null
            }}));
            "#,
            js_string(selector)
        );

        let value = self.evaluate(&script(&body)).await?;
        let elements: Vec<RawElement> = serde_json::from_value(value).unwrap_or_default();
        Ok(elements)
    }

    async fn click(&self, strategy: &SelectorStrategy, timeout: Duration) -> Result<()> {
        let body = match strategy.kind {
            StrategyKind::Css | StrategyKind::ContentEditable => format!(
                "const el = firstVisible(query({})); if (!el) return false; el.click(); return true;",
                js_string(&strategy.value)
            ),
            StrategyKind::Text => format!(
                "const el = byText({}); if (!el) return false; el.click(); return true;",
                js_string(&strategy.value)
            ),
            StrategyKind::XPath => format!(
                "const el = byXPath({}); if (!el) return false; el.click(); return true;",
                js_string(&strategy.value)
            ),
            StrategyKind::Placeholder => format!(
                "const el = firstVisible(query({})); if (!el) return false; el.click(); return true;",
                js_string(&format!(
                    "input[placeholder*='{0}'], textarea[placeholder*='{0}']",
                    strategy.value
                ))
            ),
        };

        self.poll_script(
            &script(&body),
            timeout,
            &format!("click '{}'", strategy.value),
        )
        .await
    }

    async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> Result<()> {
        let body = format!(
            "const el = firstVisible(query({})); if (!el) return false; return setValue(el, {});",
            js_string(selector),
            js_string(value)
        );

        self.poll_script(&script(&body), timeout, &format!("fill '{}'", selector))
            .await
    }

    async fn clear_and_type(&self, selector: &str, value: &str) -> Result<()> {
        let body = format!(
            r#"
            const el = firstVisible(query({}));
            if (!el) return false;
            el.click();
            if (el.isContentEditable) el.innerText = '';
            else if ('value' in el) el.value = '';
            return setValue(el, {});
            "#,
            js_string(selector),
            js_string(value)
        );

        if self.eval_bool(&script(&body)).await? {
            Ok(())
        } else {
            Err(AgentError::ElementNotFound(selector.to_string()))
        }
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let page = self.get_active_page().await?;

        let (key_name, code, vk, text): (&str, &str, i64, Option<&str>) = match key {
            "ENTER" => ("Enter", "Enter", 13, Some("\r")),
            "TAB" => ("Tab", "Tab", 9, None),
            "ESCAPE" => ("Escape", "Escape", 27, None),
            "BACKSPACE" => ("Backspace", "Backspace", 8, None),
            "DELETE" => ("Delete", "Delete", 46, None),
            "SPACE" => (" ", "Space", 32, Some(" ")),
            "ARROWDOWN" => ("ArrowDown", "ArrowDown", 40, None),
            "ARROWUP" => ("ArrowUp", "ArrowUp", 38, None),
            "ARROWLEFT" => ("ArrowLeft", "ArrowLeft", 37, None),
            "ARROWRIGHT" => ("ArrowRight", "ArrowRight", 39, None),
            other => {
                return Err(AgentError::StepExecution(format!(
                    "unsupported key: {}",
                    other
                )))
            }
        };

        for event_type in ["keyDown", "keyUp"] {
            let mut params = serde_json::json!({
                "type": event_type,
                "key": key_name,
                "code": code,
                "windowsVirtualKeyCode": vk,
                "nativeVirtualKeyCode": vk,
            });
            if event_type == "keyDown" {
                if let Some(text) = text {
                    params["text"] = serde_json::Value::String(text.to_string());
                }
            }

            let params: input::DispatchKeyEventParams = serde_json::from_value(params)
                .map_err(|e| AgentError::StepExecution(format!("Bad key event: {}", e)))?;

            page.execute(params)
                .await
                .map_err(|e| AgentError::StepExecution(format!("Key dispatch failed: {}", e)))?;
        }

        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| AgentError::StepExecution(e.to_string()))?;
        Ok(())
    }
}
