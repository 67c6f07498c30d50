//! Sitelens Core Library
//!
//! Browser-free building blocks for visual regression suites: URL
//! canonicalization, template sampling, the persisted site map, and
//! suite configuration. Everything that needs a browser lives in
//! `sitelens-harness`.

pub mod config;
pub mod error;
pub mod normalize;
pub mod sampler;
pub mod sitemap;

// Re-export commonly used types
pub use config::{
    AcquisitionStrategy, CaptureStrategy, HostRewrite, StabilizerSettings, SuiteConfig,
    ViewportSpec,
};
pub use error::{Error, Result};
pub use normalize::{normalize, Origin};
pub use sampler::{compile_rules, sample, CompiledRule, SampleOutcome, TemplateRule};
pub use sitemap::{process_candidates, SiteMap, SiteMapStore, DEFAULT_MAX_URLS};

/// Sitelens version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
