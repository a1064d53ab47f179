pub mod analyzer;
pub mod browser;
pub mod error;
pub mod locator;
pub mod planner;
pub mod session;
pub mod state;
pub mod step;
pub mod strategy;
pub mod verify;

//  Re-export commonly used items
pub use analyzer::{ElementInfo, ElementRole, PageAnalyzer, PageContext, PageStructure};
pub use browser::{ChromeDriver, ConnectionMode, PageDriver, RawElement};
pub use error::{AgentError, Result};
pub use planner::{fallback_plan, CliPlanner, StepPlanner};
pub use session::{CaptureConfig, CaptureSession};
pub use state::{classify, CancelFlag, PageProbe, PageState};
pub use step::{AbstractStep, CapturedStep, PlannedStep, StepAction};
pub use strategy::{click_strategies, fill_strategies, SelectorStrategy, StrategyKind};
