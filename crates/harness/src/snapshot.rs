//! Per-case snapshot capture and comparison
//!
//! One case is one (URL x viewport) pair, run start to finish in its
//! own browser subprocess: navigate, stabilize, capture, compare.
//! Whole-case retries belong to the suite runner; nothing here retries.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sitelens_core::config::{CaptureStrategy, ViewportSpec};
use sitelens_core::{Origin, SuiteConfig};

use crate::error::{HarnessError, HarnessResult};
use crate::playwright::{js_str, PageDriver, PhaseReport};
use crate::stabilize::Stabilizer;
use crate::visual::{VisualConfig, VisualTester};

/// Viewport height used before the real content height is measured.
const PLACEHOLDER_HEIGHT: u32 = 800;

/// A single unit of work: one URL at one viewport.
#[derive(Debug, Clone)]
pub struct SnapshotCase {
    pub url: String,
    pub viewport: ViewportSpec,
}

impl SnapshotCase {
    pub fn name(&self) -> String {
        format!("{} [{}]", self.url, self.viewport.name)
    }

    /// Filesystem-safe identifier used for capture and baseline names.
    pub fn slug(&self) -> String {
        let trimmed = self.url.trim_matches('/');
        let page = if trimmed.is_empty() {
            "home".to_string()
        } else {
            trimmed
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                .collect()
        };
        format!("{}--{}", page, self.viewport.name)
    }
}

/// Identifying metadata attached to every case for diagnosis. Not part
/// of the pass/fail signal; the pixel diff is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub url: String,
    pub viewport: String,
    pub timestamp: DateTime<Utc>,
    pub loaded_script_urls: Vec<String>,
}

/// Outcome of one case, possibly after retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub success: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    pub phases: Vec<PhaseReport>,
    pub diff_ratio: Option<f64>,
    pub diff_image_path: Option<String>,
    pub screenshot_path: Option<String>,
    pub metadata: Option<CaseMetadata>,
    pub error: Option<String>,
}

impl CaseResult {
    fn failure(case: &SnapshotCase, duration_ms: u64, error: String) -> Self {
        Self {
            name: case.name(),
            success: false,
            attempts: 1,
            duration_ms,
            phases: Vec::new(),
            diff_ratio: None,
            diff_image_path: None,
            screenshot_path: None,
            metadata: None,
            error: Some(error),
        }
    }
}

/// Runs cases: navigation, stabilization, capture, comparison.
pub struct SnapshotDriver {
    driver: PageDriver,
    stabilizer: Stabilizer,
    visual: VisualTester,
    origin: Origin,
    capture: CaptureStrategy,
    max_diff_ratio: f64,
    style_path: Option<PathBuf>,
    update_baselines: bool,
    case_timeout: Duration,
    navigation_timeout_ms: u64,
}

impl SnapshotDriver {
    pub fn from_config(
        config: &SuiteConfig,
        driver: PageDriver,
        update_baselines: bool,
    ) -> HarnessResult<Self> {
        Ok(Self {
            driver,
            stabilizer: Stabilizer::from_config(config),
            visual: VisualTester::new(VisualConfig::under(
                &config.results_dir,
                config.max_diff_ratio,
            ))?,
            origin: config.origin()?,
            capture: config.capture,
            max_diff_ratio: config.max_diff_ratio,
            // Scripts run from a temp cwd, so the stylesheet path must
            // be absolute by the time it reaches addStyleTag.
            style_path: config
                .style_path
                .clone()
                .map(|p| std::fs::canonicalize(&p).unwrap_or(p)),
            update_baselines,
            case_timeout: Duration::from_millis(config.case_timeout_ms),
            navigation_timeout_ms: config.navigation_timeout_ms,
        })
    }

    /// Build the whole page script for a case: navigate, stabilize,
    /// apply style overrides, record loaded scripts, capture.
    pub fn build_case_script(&self, case: &SnapshotCase, out_path: &Path) -> String {
        let mut body = String::new();

        // Navigation failures throw out of the script and fail the case.
        body.push_str(&format!(
            "    await page.goto({url}, {{ timeout: {nav}, waitUntil: 'domcontentloaded' }});\n",
            url = js_str(&self.origin.url_for(&case.url)),
            nav = self.navigation_timeout_ms,
        ));

        body.push_str(&self.stabilizer.script_body());
        body.push('\n');

        if let Some(style_path) = &self.style_path {
            body.push_str(&format!(
                r#"    await phase('style_overrides', async () => {{
      await page.addStyleTag({{ path: {path} }});
    }});
"#,
                path = js_str(&style_path.to_string_lossy()),
            ));
        }

        body.push_str(
            "    report.loaded_scripts = await page.evaluate(() => Array.from(document.scripts).map((s) => s.src).filter(Boolean));\n",
        );

        let out = js_str(&out_path.to_string_lossy());
        match self.capture {
            CaptureStrategy::MeasuredHeight => {
                body.push_str(&format!(
                    r#"    report.content_height = await page.evaluate(() => Math.ceil(document.documentElement.getBoundingClientRect().height));
    await page.setViewportSize({{ width: {width}, height: Math.max(1, report.content_height) }});
    await page.waitForTimeout(250);
    await page.screenshot({{ path: {out}, fullPage: false, animations: 'disabled', caret: 'hide', scale: 'css' }});
"#,
                    width = case.viewport.width,
                    out = out,
                ));
            }
            CaptureStrategy::NativeFullPage => {
                body.push_str(&format!(
                    "    await page.screenshot({{ path: {out}, fullPage: true, animations: 'disabled', caret: 'hide', scale: 'css' }});\n",
                ));
            }
        }

        let height = case.viewport.height.unwrap_or(PLACEHOLDER_HEIGHT);
        self.driver.build_script(case.viewport.width, height, &body)
    }

    /// Run one case attempt end to end. Infrastructure errors become a
    /// failed result rather than propagating; the runner decides about
    /// retries.
    pub async fn run_case(&self, case: &SnapshotCase) -> CaseResult {
        let start = Instant::now();
        let slug = case.slug();
        let actual_path = self.visual.actual_path(&slug);
        let script = self.build_case_script(case, &actual_path);

        debug!("running case {}", case.name());

        let report = match self.driver.run(&script, self.case_timeout).await {
            Ok(report) => report,
            Err(e) => {
                warn!("case {} failed before capture: {}", case.name(), e);
                return CaseResult::failure(case, start.elapsed().as_millis() as u64, e.to_string());
            }
        };

        let metadata = CaseMetadata {
            url: case.url.clone(),
            viewport: case.viewport.name.clone(),
            timestamp: Utc::now(),
            loaded_script_urls: report.loaded_scripts.clone(),
        };

        let (success, diff_ratio, diff_image_path, error) = if self.update_baselines {
            match self.visual.update_baseline(&slug) {
                Ok(()) => (true, None, None, None),
                Err(e) => (false, None, None, Some(e.to_string())),
            }
        } else {
            match self.visual.compare(&slug) {
                Ok(diff) if diff.matches => (true, Some(diff.diff_ratio), None, None),
                Ok(diff) => {
                    let err = HarnessError::Mismatch {
                        name: slug.clone(),
                        diff_ratio: diff.diff_ratio,
                        max_ratio: self.max_diff_ratio,
                    };
                    (
                        false,
                        Some(diff.diff_ratio),
                        diff.diff_image_path
                            .map(|p| p.to_string_lossy().to_string()),
                        Some(err.to_string()),
                    )
                }
                Err(e) => (false, None, None, Some(e.to_string())),
            }
        };

        CaseResult {
            name: case.name(),
            success,
            attempts: 1,
            duration_ms: start.elapsed().as_millis() as u64,
            phases: report.phases,
            diff_ratio,
            diff_image_path,
            screenshot_path: Some(actual_path.to_string_lossy().to_string()),
            metadata: Some(metadata),
            error,
        }
    }
}
