//! Site map building against a live site
//!
//! The builder runs at most once per persisted artifact: setup calls
//! `ensure`, which returns the stored map when present and only crawls
//! when it is missing. Acquisition failures are fatal; there is no
//! partial site map.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use sitelens_core::config::AcquisitionStrategy;
use sitelens_core::{
    compile_rules, process_candidates, CompiledRule, Origin, SiteMap, SiteMapStore, SuiteConfig,
};

use crate::error::{HarnessError, HarnessResult};
use crate::playwright::{js_str, PageDriver};

/// Source of candidate URLs. The production implementation drives a
/// browser; tests substitute a canned source.
#[async_trait]
pub trait UrlAcquirer: Send + Sync {
    async fn acquire(&self) -> HarnessResult<Vec<String>>;
}

/// Browser-backed acquisition using either the XML sitemap or a
/// same-origin link crawl from the entry path.
pub struct PlaywrightAcquirer {
    driver: PageDriver,
    origin: Origin,
    strategy: AcquisitionStrategy,
    entry_path: String,
    navigation_timeout_ms: u64,
    idle_timeout_ms: u64,
}

impl PlaywrightAcquirer {
    pub fn new(driver: PageDriver, origin: Origin, config: &SuiteConfig) -> Self {
        Self {
            driver,
            origin,
            strategy: config.acquisition,
            entry_path: config.entry_path.clone(),
            navigation_timeout_ms: config.navigation_timeout_ms,
            idle_timeout_ms: config.stabilizer.network_idle_timeout_ms,
        }
    }

    fn sitemap_script(&self) -> String {
        format!(
            r#"    await page.goto({url}, {{ timeout: {nav} }});
    await page.waitForLoadState('networkidle', {{ timeout: {idle} }});
    report.urls = await page.evaluate(() => {{
      return Array.from(document.querySelectorAll('loc')).map((el) => (el.textContent || '').trim());
    }});
"#,
            url = js_str(&self.origin.url_for("/sitemap.xml")),
            nav = self.navigation_timeout_ms,
            idle = self.idle_timeout_ms,
        )
    }

    fn crawl_script(&self) -> String {
        format!(
            r#"    await page.goto({url}, {{ timeout: {nav} }});
    await page.waitForLoadState('networkidle', {{ timeout: {idle} }});
    report.urls = await page.evaluate(([base, entry]) => {{
      const urls = new Set([entry]);
      for (const {{ href }} of document.links) {{
        if (href.startsWith(base)) {{
          urls.add(href);
        }}
      }}
      return Array.from(urls);
    }}, [{base}, {entry}]);
"#,
            url = js_str(&self.origin.url_for(&self.entry_path)),
            nav = self.navigation_timeout_ms,
            idle = self.idle_timeout_ms,
            base = js_str(&self.origin.base_str()),
            entry = js_str(&self.entry_path),
        )
    }

    /// The script body for the configured strategy.
    pub fn script_body(&self) -> String {
        match self.strategy {
            AcquisitionStrategy::SitemapXml => self.sitemap_script(),
            AcquisitionStrategy::Crawl => self.crawl_script(),
        }
    }
}

#[async_trait]
impl UrlAcquirer for PlaywrightAcquirer {
    async fn acquire(&self) -> HarnessResult<Vec<String>> {
        let script = self.driver.build_script(1280, 800, &self.script_body());
        // Acquisition gets its own generous budget: one navigation plus
        // the idle window.
        let timeout = Duration::from_millis(self.navigation_timeout_ms + self.idle_timeout_ms * 2);
        let report = self
            .driver
            .run(&script, timeout)
            .await
            .map_err(|e| HarnessError::Acquisition(e.to_string()))?;
        Ok(report.urls)
    }
}

/// Builds and persists the bounded site map.
pub struct SiteMapBuilder<A: UrlAcquirer> {
    acquirer: A,
    origin: Origin,
    rules: Vec<CompiledRule>,
    excludes: Vec<String>,
    max_urls: usize,
}

impl SiteMapBuilder<PlaywrightAcquirer> {
    pub fn from_config(config: &SuiteConfig, driver: PageDriver) -> HarnessResult<Self> {
        let origin = config.origin()?;
        let acquirer = PlaywrightAcquirer::new(driver, origin.clone(), config);
        // The exclusion filter applies to the sitemap strategy only;
        // a crawl never reaches the excluded sections by construction.
        let excludes = match config.acquisition {
            AcquisitionStrategy::SitemapXml => config.excludes.clone(),
            AcquisitionStrategy::Crawl => Vec::new(),
        };
        Ok(Self::new(
            acquirer,
            origin,
            compile_rules(&config.templates)?,
            excludes,
            config.max_urls,
        ))
    }
}

impl<A: UrlAcquirer> SiteMapBuilder<A> {
    pub fn new(
        acquirer: A,
        origin: Origin,
        rules: Vec<CompiledRule>,
        excludes: Vec<String>,
        max_urls: usize,
    ) -> Self {
        Self {
            acquirer,
            origin,
            rules,
            excludes,
            max_urls,
        }
    }

    /// Return the persisted map, building it only when absent.
    pub async fn ensure(&self, store: &SiteMapStore) -> HarnessResult<SiteMap> {
        match store.read() {
            Ok(map) => {
                info!(
                    "site map present with {} URLs, skipping acquisition",
                    map.len()
                );
                return Ok(map);
            }
            Err(sitelens_core::Error::MissingSiteMap(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.build(store).await
    }

    /// Acquire, process, and persist unconditionally.
    pub async fn build(&self, store: &SiteMapStore) -> HarnessResult<SiteMap> {
        info!(
            "building site map against {} ({})",
            self.origin.base_str(),
            if self.origin.is_staging() {
                "staging"
            } else {
                "production"
            }
        );

        let candidates = self.acquirer.acquire().await?;
        let map = process_candidates(
            &candidates,
            &self.origin,
            &self.rules,
            &self.excludes,
            self.max_urls,
        );

        if map.is_empty() {
            warn!(
                "site map is empty after processing {} candidates; zero tests will be generated",
                candidates.len()
            );
        }

        store.write(&map)?;
        Ok(map)
    }
}
