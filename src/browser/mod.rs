//! Headless browser work driven through Node.js helper processes.
//!
//! # Module Structure
//!
//! - `manager` - Page capturer (Playwright, full-page screenshots)
//! - [`lighthouse`] - Performance auditor (Lighthouse + chrome-launcher)
//! - `playwright` - Capture script, error mapping and availability checks
//! - `process` - Bounded helper execution shared by both
//!
//! The capturer and the auditor never share a browser: each call spawns its
//! own helper, and the helper is killed if it outlives its process timeout.
//!
//! # Example
//!
//! ```no_run
//! use vaudit_lib::{CaptureOptions, PageCapturer};
//!
//! # async fn example() -> vaudit_lib::Result<()> {
//! let capturer = PageCapturer::new(CaptureOptions::default());
//! let url = url::Url::parse("https://example.com")?;
//! let artifact = capturer.capture_url(&url).await?;
//! println!("captured {:?}", artifact.dimensions());
//! # Ok(())
//! # }
//! ```

pub mod lighthouse;
mod manager;
mod playwright;
mod process;

pub use lighthouse::{AuditorOptions, PerformanceAuditor};
pub use manager::{
    CaptureOptions, PageCapturer, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_PROCESS_TIMEOUT,
    SETTLE_DELAY,
};
