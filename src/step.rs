//! Step types for the capture pipeline.
//!
//! The planner emits loosely-structured JSON records; those are validated at
//! the boundary into [`AbstractStep`]s with a closed action type. Execution
//! results are recorded as [`CapturedStep`]s, which form the audit trail for
//! a session.

use crate::analyzer::PageContext;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Default wait duration when a `wait` step carries no parseable value.
pub const DEFAULT_WAIT_SECS: u64 = 2;

/// A raw step record as produced by the planner, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub action: String,

    #[serde(default)]
    pub selector_hint: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

/// A validated step action. Each variant carries only the fields that
/// matter for that action kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Click { hint: String },
    Fill { hint: String, value: String },
    Press { key: String },
    Navigate { url: String },
    Wait { seconds: u64 },
    /// Unrecognized action kinds are executed as a no-op (lenient default).
    Other { action: String },
}

/// One planned operation, immutable once issued by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractStep {
    pub action: StepAction,
    pub description: String,
}

impl AbstractStep {
    /// Validate a raw planner record into a typed step.
    ///
    /// A step missing a field its action requires (a `navigate` without a
    /// URL, a `fill` without a value) is rejected as [`AgentError::MalformedStep`]
    /// here rather than silently defaulted downstream.
    pub fn from_planned(raw: &PlannedStep) -> Result<Self> {
        let action = match raw.action.as_str() {
            "click" => StepAction::Click {
                hint: raw.selector_hint.clone(),
            },
            "fill" => {
                let value = raw.value.clone().ok_or_else(|| {
                    AgentError::MalformedStep(format!(
                        "fill step '{}' has no value",
                        raw.selector_hint
                    ))
                })?;
                StepAction::Fill {
                    hint: raw.selector_hint.clone(),
                    value,
                }
            }
            "press" => StepAction::Press {
                key: raw
                    .value
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| v.trim().to_uppercase())
                    .unwrap_or_else(|| "ENTER".to_string()),
            },
            "navigate" => {
                let url = raw
                    .url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        AgentError::MalformedStep("navigate step has no url".to_string())
                    })?;
                StepAction::Navigate { url }
            }
            "wait" => StepAction::Wait {
                seconds: raw
                    .value
                    .as_deref()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_WAIT_SECS),
            },
            other => StepAction::Other {
                action: other.to_string(),
            },
        };

        Ok(Self {
            action,
            description: raw.description.clone(),
        })
    }

    /// Action kind as the externally visible string.
    pub fn action_name(&self) -> &str {
        match &self.action {
            StepAction::Click { .. } => "click",
            StepAction::Fill { .. } => "fill",
            StepAction::Press { .. } => "press",
            StepAction::Navigate { .. } => "navigate",
            StepAction::Wait { .. } => "wait",
            StepAction::Other { action } => action,
        }
    }

    /// The free-text selector hint, where the action carries one.
    pub fn selector_hint(&self) -> &str {
        match &self.action {
            StepAction::Click { hint } | StepAction::Fill { hint, .. } => hint,
            _ => "",
        }
    }

    /// The value field as it appears in the capture trail.
    pub fn value(&self) -> Option<String> {
        match &self.action {
            StepAction::Fill { value, .. } => Some(value.clone()),
            StepAction::Press { key } => Some(key.clone()),
            StepAction::Wait { seconds } => Some(seconds.to_string()),
            _ => None,
        }
    }

    /// Target URL for navigate steps.
    pub fn url(&self) -> Option<&str> {
        match &self.action {
            StepAction::Navigate { url } => Some(url),
            _ => None,
        }
    }
}

/// One executed (or terminally failed) step with its captured artifacts.
///
/// The per-session list is append-only and ordered by execution; once a step
/// fails terminally nothing further is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedStep {
    pub action: String,
    pub selector_hint: String,
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,

    /// SHA-256 of the persisted screenshot, for dataset deduplication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_sha256: Option<String>,

    pub resulting_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_context: Option<PageContext>,

    pub verified: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapturedStep {
    /// Start a capture record echoing the planned fields of a step.
    pub fn from_step(step: &AbstractStep) -> Self {
        Self {
            action: step.action_name().to_string(),
            selector_hint: step.selector_hint().to_string(),
            description: step.description.clone(),
            value: step.value(),
            url: step.url().map(|u| u.to_string()),
            screenshot_path: None,
            screenshot_sha256: None,
            resulting_url: String::new(),
            page_context: None,
            verified: false,
            error: None,
        }
    }

    /// A terminal error record not tied to a planned step (setup failures,
    /// authentication timeouts, unclear page states).
    pub fn terminal(hint: &str, description: &str, error: String) -> Self {
        Self {
            action: "error".to_string(),
            selector_hint: hint.to_string(),
            description: description.to_string(),
            value: None,
            url: None,
            screenshot_path: None,
            screenshot_sha256: None,
            resulting_url: String::new(),
            page_context: None,
            verified: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(action: &str) -> PlannedStep {
        PlannedStep {
            action: action.to_string(),
            selector_hint: String::new(),
            description: String::new(),
            value: None,
            url: None,
        }
    }

    #[test]
    fn test_click_step_keeps_hint() {
        let mut r = raw("click");
        r.selector_hint = "New".to_string();
        let step = AbstractStep::from_planned(&r).unwrap();
        assert_eq!(
            step.action,
            StepAction::Click {
                hint: "New".to_string()
            }
        );
        assert_eq!(step.action_name(), "click");
        assert_eq!(step.selector_hint(), "New");
    }

    #[test]
    fn test_fill_without_value_is_malformed() {
        let mut r = raw("fill");
        r.selector_hint = "Untitled".to_string();
        let err = AbstractStep::from_planned(&r).unwrap_err();
        assert!(matches!(err, AgentError::MalformedStep(_)));
    }

    #[test]
    fn test_navigate_without_url_is_malformed() {
        let err = AbstractStep::from_planned(&raw("navigate")).unwrap_err();
        assert!(matches!(err, AgentError::MalformedStep(_)));

        let mut r = raw("navigate");
        r.url = Some("   ".to_string());
        assert!(AbstractStep::from_planned(&r).is_err());
    }

    #[test]
    fn test_wait_defaults_to_two_seconds() {
        let step = AbstractStep::from_planned(&raw("wait")).unwrap();
        assert_eq!(step.action, StepAction::Wait { seconds: 2 });

        let mut r = raw("wait");
        r.value = Some("not-a-number".to_string());
        let step = AbstractStep::from_planned(&r).unwrap();
        assert_eq!(step.action, StepAction::Wait { seconds: 2 });

        let mut r = raw("wait");
        r.value = Some("5".to_string());
        let step = AbstractStep::from_planned(&r).unwrap();
        assert_eq!(step.action, StepAction::Wait { seconds: 5 });
    }

    #[test]
    fn test_press_key_uppercased_with_enter_default() {
        let step = AbstractStep::from_planned(&raw("press")).unwrap();
        assert_eq!(
            step.action,
            StepAction::Press {
                key: "ENTER".to_string()
            }
        );

        let mut r = raw("press");
        r.value = Some("escape".to_string());
        let step = AbstractStep::from_planned(&r).unwrap();
        assert_eq!(
            step.action,
            StepAction::Press {
                key: "ESCAPE".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_action_is_lenient() {
        let step = AbstractStep::from_planned(&raw("hover")).unwrap();
        assert_eq!(
            step.action,
            StepAction::Other {
                action: "hover".to_string()
            }
        );
    }

    #[test]
    fn test_captured_step_serialization_skips_empty_fields() {
        let mut r = raw("click");
        r.selector_hint = "Search".to_string();
        let step = AbstractStep::from_planned(&r).unwrap();
        let captured = CapturedStep::from_step(&step);

        let json = serde_json::to_string(&captured).unwrap();
        assert!(json.contains("\"action\":\"click\""));
        assert!(!json.contains("screenshot_path"));
        assert!(!json.contains("\"error\""));

        let back: CapturedStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.selector_hint, "Search");
        assert!(!back.verified);
    }
}
