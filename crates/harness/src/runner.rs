//! Suite orchestration: setup, case scheduling, retries, reporting
//!
//! The site map is built (or reused) in a setup phase that fully
//! precedes the parallel test phase, so every concurrent case reads an
//! immutable map. Each case owns its own browser subprocess; failures
//! are retried as whole-case restarts.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use sitelens_core::{SiteMapStore, SuiteConfig};

use crate::error::HarnessResult;
use crate::playwright::{Browser, PageDriver};
use crate::sitemap::SiteMapBuilder;
use crate::snapshot::{CaseResult, SnapshotCase, SnapshotDriver};

/// Result of running the whole suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

/// Main suite runner.
pub struct SuiteRunner {
    config: SuiteConfig,
    browser: Browser,
    headless: bool,
    update_baselines: bool,
}

impl SuiteRunner {
    pub fn new(
        config: SuiteConfig,
        browser: Browser,
        headless: bool,
        update_baselines: bool,
    ) -> Self {
        Self {
            config,
            browser,
            headless,
            update_baselines,
        }
    }

    fn store(&self) -> SiteMapStore {
        SiteMapStore::new(&self.config.sitemap_path)
    }

    /// Setup phase: make sure the site map exists, crawling only when
    /// it does not. Must complete before any case is scheduled.
    pub async fn setup(&self) -> HarnessResult<()> {
        let driver = PageDriver::new(self.browser, self.headless)?;
        let builder = SiteMapBuilder::from_config(&self.config, driver)?;
        builder.ensure(&self.store()).await?;
        Ok(())
    }

    /// Expand the persisted map into the (URL x viewport) case list.
    pub fn collect_cases(&self) -> HarnessResult<Vec<SnapshotCase>> {
        let map = self.store().read()?;
        Ok(map
            .entries()
            .iter()
            .flat_map(|url| {
                self.config.viewports.iter().map(move |viewport| SnapshotCase {
                    url: url.clone(),
                    viewport: viewport.clone(),
                })
            })
            .collect())
    }

    /// Run every case on a bounded worker pool.
    ///
    /// A missing site map is surfaced as exactly one failing synthetic
    /// case so the operator gets an actionable message instead of an
    /// empty suite. An empty map yields zero cases plus a warning.
    pub async fn run(&self) -> HarnessResult<SuiteResult> {
        let start = Instant::now();

        let cases = match self.collect_cases() {
            Ok(cases) => cases,
            Err(crate::error::HarnessError::Core(sitelens_core::Error::MissingSiteMap(path))) => {
                let message = format!(
                    "Missing site map at {path}. Run the setup phase to generate it first."
                );
                error!("{}", message);
                return Ok(SuiteResult {
                    total: 1,
                    passed: 0,
                    failed: 1,
                    duration_ms: start.elapsed().as_millis() as u64,
                    results: vec![synthetic_failure("site map", message)],
                });
            }
            Err(e) => return Err(e),
        };

        if cases.is_empty() {
            warn!("site map is empty; no test cases generated");
            return Ok(SuiteResult {
                total: 0,
                passed: 0,
                failed: 0,
                duration_ms: start.elapsed().as_millis() as u64,
                results: Vec::new(),
            });
        }

        let driver = Arc::new(SnapshotDriver::from_config(
            &self.config,
            PageDriver::new(self.browser, self.headless)?,
            self.update_baselines,
        )?);

        // Baseline generation never retries; a flaky capture must not
        // silently become the reference image twice over.
        let retries = if self.update_baselines {
            0
        } else {
            self.config.retries
        };
        let semaphore = Arc::new(Semaphore::new(self.config.effective_workers()));

        info!(
            "running {} case(s) with {} worker(s)",
            cases.len(),
            self.config.effective_workers()
        );

        let mut handles = Vec::with_capacity(cases.len());
        for case in cases {
            let driver = Arc::clone(&driver);
            let semaphore = Arc::clone(&semaphore);
            handles.push((
                case.name(),
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("case semaphore closed");
                    run_with_retries(driver, case, retries).await
                }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut passed = 0;
        let mut failed = 0;

        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => synthetic_failure(&name, format!("case task panicked: {e}")),
            };
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Suite results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        Ok(SuiteResult {
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Write the suite report as pretty JSON under the results root.
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.results_dir)?;
        let path = self.config.results_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;
        info!("results written to {}", path.display());
        Ok(path)
    }
}

fn synthetic_failure(name: &str, message: String) -> CaseResult {
    CaseResult {
        name: name.to_string(),
        success: false,
        attempts: 1,
        duration_ms: 0,
        phases: Vec::new(),
        diff_ratio: None,
        diff_image_path: None,
        screenshot_path: None,
        metadata: None,
        error: Some(message),
    }
}

async fn run_with_retries(
    driver: Arc<SnapshotDriver>,
    case: SnapshotCase,
    retries: u32,
) -> CaseResult {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut result = driver.run_case(&case).await;
        result.attempts = attempt;
        if result.success || attempt > retries {
            return result;
        }
        warn!(
            "retrying {} after attempt {} failed: {}",
            result.name,
            attempt,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitelens_core::config::ViewportSpec;
    use sitelens_core::SiteMap;

    fn runner_with(config: SuiteConfig) -> SuiteRunner {
        SuiteRunner::new(config, Browser::Chromium, true, false)
    }

    fn temp_config() -> (tempfile::TempDir, SuiteConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SuiteConfig::default();
        config.sitemap_path = dir.path().join("sitemap.json");
        config.results_dir = dir.path().join("test-results");
        (dir, config)
    }

    #[tokio::test]
    async fn missing_map_yields_one_failing_synthetic_case() {
        let (_dir, config) = temp_config();
        let runner = runner_with(config);

        let suite = runner.run().await.unwrap();
        assert_eq!(suite.total, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.results[0].name, "site map");
        let message = suite.results[0].error.as_deref().unwrap();
        assert!(message.contains("Run the setup phase"));
    }

    #[tokio::test]
    async fn empty_map_yields_zero_cases_not_an_error() {
        let (_dir, config) = temp_config();
        SiteMapStore::new(&config.sitemap_path)
            .write(&SiteMap::new(Vec::new()))
            .unwrap();
        let runner = runner_with(config);

        let suite = runner.run().await.unwrap();
        assert_eq!(suite.total, 0);
        assert_eq!(suite.failed, 0);
    }

    #[test]
    fn cases_are_url_times_viewport() {
        let (_dir, mut config) = temp_config();
        config.viewports = vec![
            ViewportSpec {
                name: "desktop".to_string(),
                width: 1280,
                height: Some(800),
            },
            ViewportSpec {
                name: "mobile".to_string(),
                width: 375,
                height: None,
            },
        ];
        SiteMapStore::new(&config.sitemap_path)
            .write(&SiteMap::new(vec!["/".to_string(), "/pricing".to_string()]))
            .unwrap();
        let runner = runner_with(config);

        let cases = runner.collect_cases().unwrap();
        let names: Vec<String> = cases.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            [
                "/ [desktop]",
                "/ [mobile]",
                "/pricing [desktop]",
                "/pricing [mobile]"
            ]
        );
    }

    #[test]
    fn write_results_produces_json_report() {
        let (_dir, config) = temp_config();
        let runner = runner_with(config);
        let suite = SuiteResult {
            total: 1,
            passed: 1,
            failed: 0,
            duration_ms: 42,
            results: vec![synthetic_failure("x", "y".to_string())],
        };

        let path = runner.write_results(&suite).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let parsed: SuiteResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.total, 1);
    }
}
