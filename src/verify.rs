//! Best-effort action verification.
//!
//! A post-condition check for an executed step. Never raises: driver errors
//! degrade to an unverified result, and the orchestrator decides what that
//! means for the session.

use crate::browser::PageDriver;
use crate::step::{AbstractStep, StepAction};
use std::time::Duration;

/// Blank-page sentinel reported by the driver before any navigation.
const BLANK_PAGE: &str = "about:blank";

const SETTLE: Duration = Duration::from_secs(1);

/// Verify the observable effect of a step.
///
/// Navigate steps succeed iff the target URL is a substring of the resulting
/// URL; everything else succeeds iff the document has a non-blank URL at all.
pub async fn verify_step(driver: &dyn PageDriver, step: &AbstractStep) -> bool {
    tokio::time::sleep(SETTLE).await;

    let current_url = match driver.current_url().await {
        Ok(url) => url,
        Err(_) => return false,
    };

    match &step.action {
        StepAction::Navigate { url } => current_url.contains(url),
        _ => !current_url.is_empty() && current_url != BLANK_PAGE,
    }
}
