use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Browser setup failed: {0}")]
    SetupFailure(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Authentication timed out: {0}")]
    AuthenticationTimeout(String),

    #[error("Page state unclear: {0}")]
    PageStateUnclear(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Step execution error: {0}")]
    StepExecution(String),

    #[error("Malformed step from planner: {0}")]
    MalformedStep(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
