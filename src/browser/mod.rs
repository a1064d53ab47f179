pub mod chrome;
pub mod driver;

pub use chrome::{ChromeDriver, ConnectionMode};
pub use driver::{PageDriver, RawElement};
