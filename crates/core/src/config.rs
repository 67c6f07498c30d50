//! Suite configuration
//!
//! Loaded from a YAML file, with `BASE_URL` and `CI` environment
//! overrides applied on top (CI runs get one worker; retry counts and
//! the base origin come from the environment the same way the
//! harness's CI pipeline sets them).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize::Origin;
use crate::sampler::TemplateRule;
use crate::sitemap::DEFAULT_MAX_URLS;

/// How page URLs are acquired when building the site map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStrategy {
    /// Fetch `{origin}/sitemap.xml` and read every `<loc>` node.
    #[default]
    SitemapXml,
    /// Crawl same-origin links reachable from the entry path.
    Crawl,
}

/// How the full-page screenshot is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStrategy {
    /// Measure the document height, resize the viewport to it, then
    /// take a fixed-viewport shot.
    #[default]
    MeasuredHeight,
    /// Let the capture mechanism handle scroll height (`fullPage: true`).
    NativeFullPage,
}

/// Pure string substitution applied to discovered URLs before
/// normalization, for sitemaps that list the production host while the
/// suite runs against staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRewrite {
    pub from: String,
    pub to: String,
}

/// A named viewport. When `height` is omitted the page's measured
/// content height is used (see `CaptureStrategy::MeasuredHeight`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSpec {
    pub name: String,
    pub width: u32,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Knobs for the page stabilizer pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerSettings {
    /// Timeout for the DOM-content-ready wait, in milliseconds.
    #[serde(default = "default_dom_timeout")]
    pub dom_content_timeout_ms: u64,

    /// Timeout for the load-event wait.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,

    /// Timeout for the no-new-network-activity window.
    #[serde(default = "default_idle_timeout")]
    pub network_idle_timeout_ms: u64,

    /// Scroll sweep increment in pixels.
    #[serde(default = "default_scroll_step")]
    pub scroll_step_px: u32,

    /// Delay between scroll steps.
    #[serde(default = "default_scroll_delay")]
    pub scroll_delay_ms: u64,

    /// Final settle delay before capture, sized generously to absorb
    /// late asynchronous completions.
    #[serde(default = "default_settle")]
    pub settle_ms: u64,
}

fn default_dom_timeout() -> u64 {
    10_000
}
fn default_load_timeout() -> u64 {
    15_000
}
fn default_idle_timeout() -> u64 {
    15_000
}
fn default_scroll_step() -> u32 {
    200
}
fn default_scroll_delay() -> u64 {
    100
}
fn default_settle() -> u64 {
    3_000
}

impl Default for StabilizerSettings {
    fn default() -> Self {
        Self {
            dom_content_timeout_ms: default_dom_timeout(),
            load_timeout_ms: default_load_timeout(),
            network_idle_timeout_ms: default_idle_timeout(),
            scroll_step_px: default_scroll_step(),
            scroll_delay_ms: default_scroll_delay(),
            settle_ms: default_settle(),
        }
    }
}

/// Top-level suite configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Target origin under test.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Rewrite applied to discovered URLs before normalization.
    #[serde(default)]
    pub host_rewrite: Option<HostRewrite>,

    /// Cap on the number of pages under test.
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// Template sampling rules, tested in declaration order.
    #[serde(default)]
    pub templates: Vec<TemplateRule>,

    /// Path substrings dropped before sampling (sitemap strategy only).
    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default)]
    pub acquisition: AcquisitionStrategy,

    /// Entry path for the crawl strategy.
    #[serde(default = "default_entry_path")]
    pub entry_path: String,

    #[serde(default)]
    pub capture: CaptureStrategy,

    /// Viewport matrix; every site map URL is tested at every viewport.
    #[serde(default = "default_viewports")]
    pub viewports: Vec<ViewportSpec>,

    /// External script URLs that must be present before stabilization
    /// can force animations to their end state.
    #[serde(default)]
    pub required_scripts: Vec<String>,

    /// Global the animation library defines once ready.
    #[serde(default = "default_animation_global")]
    pub animation_global: String,

    /// Attribute carrying the declarative animation type.
    #[serde(default = "default_animation_attribute")]
    pub animation_attribute: String,

    #[serde(default)]
    pub stabilizer: StabilizerSettings,

    /// Maximum ratio of differing pixels tolerated by the comparison.
    #[serde(default = "default_max_diff_ratio")]
    pub max_diff_ratio: f64,

    /// Whole-case retry budget (ignored in baseline mode).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Concurrent worker cap outside CI.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Overall per-case timeout.
    #[serde(default = "default_case_timeout")]
    pub case_timeout_ms: u64,

    /// Navigation timeout.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Where the persisted site map lives.
    #[serde(default = "default_sitemap_path")]
    pub sitemap_path: PathBuf,

    /// Root for baselines, captures, diffs, and the results report.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    /// Optional stylesheet injected before capture to neutralize
    /// cosmetic non-determinism.
    #[serde(default)]
    pub style_path: Option<PathBuf>,

    /// Set from the CI environment variable, never from the file.
    #[serde(skip)]
    pub ci: bool,
}

fn default_base_url() -> String {
    "https://www.example.dev".to_string()
}
fn default_max_urls() -> usize {
    DEFAULT_MAX_URLS
}
fn default_entry_path() -> String {
    "/".to_string()
}
fn default_viewports() -> Vec<ViewportSpec> {
    vec![ViewportSpec {
        name: "desktop".to_string(),
        width: 1280,
        height: Some(800),
    }]
}
fn default_animation_global() -> String {
    "gsap".to_string()
}
fn default_animation_attribute() -> String {
    "data-animation".to_string()
}
fn default_max_diff_ratio() -> f64 {
    0.1
}
fn default_retries() -> u32 {
    2
}
fn default_workers() -> usize {
    8
}
fn default_case_timeout() -> u64 {
    180_000
}
fn default_navigation_timeout() -> u64 {
    60_000
}
fn default_sitemap_path() -> PathBuf {
    PathBuf::from("sitemap.json")
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("test-results")
}

impl Default for SuiteConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("default config must deserialize")
    }
}

impl SuiteConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load from a file when it exists, otherwise use defaults, then
    /// apply `BASE_URL` and `CI` environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        if let Ok(base_url) = std::env::var("BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url;
            }
        }
        config.ci = std::env::var("CI").map(|v| !v.is_empty()).unwrap_or(false);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_urls == 0 {
            return Err(Error::InvalidConfig(
                "max_urls must be at least 1".to_string(),
            ));
        }
        if self.viewports.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one viewport is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_diff_ratio) {
            return Err(Error::InvalidConfig(
                "max_diff_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed origin carrying the host rewrite.
    pub fn origin(&self) -> Result<Origin> {
        Origin::new(&self.base_url, self.host_rewrite.clone())
    }

    /// Effective worker count: CI runs are serialized.
    pub fn effective_workers(&self) -> usize {
        if self.ci {
            1
        } else {
            self.workers.max(1)
        }
    }
}
