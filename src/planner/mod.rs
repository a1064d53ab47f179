//! Step planning via the Claude CLI.
//!
//! Turns a natural-language instruction into an ordered list of abstract
//! steps. The planner is treated as slow and fallible; the orchestrator
//! substitutes a fixed default plan when it fails.

pub mod prompt;

use crate::analyzer::PageContext;
use crate::step::{AbstractStep, PlannedStep};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// The planner seam. Implementations must tolerate an absent page context.
#[async_trait]
pub trait StepPlanner: Send + Sync {
    async fn plan(
        &self,
        app: &str,
        instruction: &str,
        page_context: Option<&PageContext>,
    ) -> Result<Vec<AbstractStep>>;
}

/// Planner backed by the Claude CLI.
pub struct CliPlanner {
    claude_path: String,
    model: Option<String>,
}

impl CliPlanner {
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
        }
    }

    /// Set custom Claude CLI path
    pub fn with_claude_path(mut self, path: String) -> Self {
        self.claude_path = path;
        self
    }

    /// Set Claude model to use (e.g., "sonnet", "opus")
    pub fn with_model(mut self, model: String) -> Self {
        self.model = Some(model);
        self
    }

    /// Plan with retry on failure, waiting a second between attempts.
    pub async fn plan_with_retry(
        &self,
        app: &str,
        instruction: &str,
        page_context: Option<&PageContext>,
        max_retries: u32,
    ) -> Result<Vec<AbstractStep>> {
        let mut last_error = None;

        for attempt in 1..=max_retries {
            match self.plan(app, instruction, page_context).await {
                Ok(steps) => return Ok(steps),
                Err(e) => {
                    warn!("Planning attempt {attempt}/{max_retries} failed: {e}");
                    last_error = Some(e);

                    if attempt < max_retries {
                        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Planning failed")))
    }

    /// Call the Claude CLI with a prompt piped to stdin.
    async fn call_claude(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print") // Non-interactive mode
            .arg("--output-format")
            .arg("json");

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .context("Failed to spawn Claude CLI. Is 'claude' installed?")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to Claude")?;
            stdin.shutdown().await.context("Failed to close stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for Claude CLI")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Claude CLI failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response: serde_json::Value =
            serde_json::from_str(&stdout).context("Failed to parse Claude CLI output as JSON")?;

        let text = response
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Claude response missing 'text' field"))?;

        Ok(text.to_string())
    }
}

impl Default for CliPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepPlanner for CliPlanner {
    async fn plan(
        &self,
        app: &str,
        instruction: &str,
        page_context: Option<&PageContext>,
    ) -> Result<Vec<AbstractStep>> {
        info!("Planning steps for {app}: {instruction}");
        if let Some(context) = page_context {
            debug!("Page context available: {}", context.url);
        }

        let prompt = prompt::step_plan_prompt(app, instruction);
        let response = self.call_claude(&prompt).await?;
        let json = clean_response(&response);
        parse_plan(&json)
    }
}

/// Strip markdown code fences if the model wrapped its output in them.
pub fn clean_response(response: &str) -> String {
    let trimmed = response.trim();

    if trimmed.starts_with("```json") {
        trimmed
            .strip_prefix("```json")
            .and_then(|s| s.strip_suffix("```"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| trimmed.to_string())
    } else if trimmed.starts_with("```") {
        trimmed
            .strip_prefix("```")
            .and_then(|s| s.strip_suffix("```"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| trimmed.to_string())
    } else {
        trimmed.to_string()
    }
}

/// Parse and validate the planner's JSON into typed steps.
///
/// The JSON array is extracted from surrounding prose if present; each record
/// is then validated at this boundary, so a malformed step fails the whole
/// plan rather than executing half-formed.
pub fn parse_plan(text: &str) -> Result<Vec<AbstractStep>> {
    let json = extract_json_array(text).unwrap_or(text);

    let raw: Vec<PlannedStep> =
        serde_json::from_str(json).context("Planner did not return a JSON step array")?;

    raw.iter()
        .map(|planned| AbstractStep::from_planned(planned).map_err(anyhow::Error::from))
        .collect()
}

/// Find the outermost `[...]` span in possibly chatty model output.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// The fixed plan used when the planner fails: find the creation control and
/// give the new item a title.
pub fn fallback_plan() -> Vec<AbstractStep> {
    let raw = [
        PlannedStep {
            action: "click".to_string(),
            selector_hint: "New".to_string(),
            description: "Find new/create button".to_string(),
            value: None,
            url: None,
        },
        PlannedStep {
            action: "fill".to_string(),
            selector_hint: "Untitled".to_string(),
            description: "Enter title".to_string(),
            value: Some("Notion Page".to_string()),
            url: None,
        },
    ];

    raw.iter()
        .map(|planned| AbstractStep::from_planned(planned).expect("fallback plan is well-formed"))
        .collect()
}
