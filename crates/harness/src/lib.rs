//! Sitelens Harness
//!
//! The browser-facing half of sitelens. Drives Playwright through
//! generated scripts run in a `node` subprocess:
//! - builds the site map once (guarded by the persisted artifact),
//! - stabilizes each page into a comparison-safe end state,
//! - captures full-page screenshots and diffs them against baselines,
//! - schedules one independent browser case per (URL x viewport).
//!
//! # Architecture
//!
//! ```text
//! SuiteRunner
//!   ├── SiteMapBuilder::ensure()     (setup, before any case runs)
//!   ├── cases = site map x viewports
//!   └── per case, on a bounded worker pool:
//!         SnapshotDriver::run_case()
//!           ├── PageDriver (node + Playwright subprocess)
//!           ├── Stabilizer (ordered phase pipeline)
//!           └── VisualTester (baseline comparison)
//! ```

pub mod error;
pub mod playwright;
pub mod runner;
pub mod sitemap;
pub mod snapshot;
pub mod stabilize;
pub mod visual;

pub use error::{HarnessError, HarnessResult};
pub use runner::{SuiteResult, SuiteRunner};
pub use sitemap::{PlaywrightAcquirer, SiteMapBuilder, UrlAcquirer};
pub use snapshot::{CaseResult, SnapshotCase, SnapshotDriver};
pub use stabilize::{FrameworkFix, Stabilizer};
pub use visual::{VisualConfig, VisualDiff, VisualTester};
