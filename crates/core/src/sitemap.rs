//! The persisted site map: a bounded, deduplicated, ordered URL set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::normalize::{normalize, Origin};
use crate::sampler::{sample, CompiledRule};

/// Default cap on the number of pages under test.
pub const DEFAULT_MAX_URLS: usize = 20;

/// An ordered sequence of canonical paths, at most `max_urls` long.
/// Built once, persisted, and read-only afterwards; a rebuild replaces
/// the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteMap(Vec<String>);

impl SiteMap {
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for SiteMap {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

/// Storage for the persisted site map: a pretty-printed UTF-8 JSON
/// array of strings at a fixed path, written atomically.
#[derive(Debug, Clone)]
pub struct SiteMapStore {
    path: PathBuf,
}

impl SiteMapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted map. A missing file is `Error::MissingSiteMap`
    /// so callers can distinguish "build it" from real IO failures.
    pub fn read(&self) -> Result<SiteMap> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::MissingSiteMap(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the map atomically: temp file in the same directory, then rename.
    pub fn write(&self, map: &SiteMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        info!("saved {} URLs to {}", map.len(), self.path.display());
        Ok(())
    }
}

/// Turn raw acquisition candidates into the final bounded site map:
/// normalize, drop excluded sections, sample per template, truncate.
///
/// Candidates must arrive in a stable order (as produced by the sitemap
/// document or the crawled DOM); the sampler's first-seen-wins rule
/// depends on it. Truncation is order-preserving, never random. An
/// empty candidate list yields a valid empty map.
pub fn process_candidates(
    candidates: &[String],
    origin: &Origin,
    rules: &[CompiledRule],
    excludes: &[String],
    max_urls: usize,
) -> SiteMap {
    let paths: Vec<String> = candidates
        .iter()
        .filter_map(|raw| normalize(raw, origin))
        .filter(|path| !excludes.iter().any(|needle| path.contains(needle.as_str())))
        .collect();

    let outcome = sample(&paths, rules);
    for (key, count) in &outcome.rule_counts {
        debug!("template '{}' kept {} sample(s)", key, count);
    }

    let mut entries = outcome.ordered;
    if entries.len() > max_urls {
        debug!(
            "truncating {} candidate URLs to the {} URL budget",
            entries.len(),
            max_urls
        );
        entries.truncate(max_urls);
    }

    SiteMap(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{compile_rules, TemplateRule};

    fn origin() -> Origin {
        Origin::new("https://www.example.dev", None).unwrap()
    }

    fn no_rules() -> Vec<CompiledRule> {
        Vec::new()
    }

    #[test]
    fn bounded_by_max_urls() {
        let candidates: Vec<String> = (0..500).map(|i| format!("/page-{i}")).collect();
        let map = process_candidates(&candidates, &origin(), &no_rules(), &[], 20);
        assert_eq!(map.len(), 20);
        assert_eq!(map.entries()[0], "/page-0");
    }

    #[test]
    fn excluded_sections_dropped() {
        let candidates = vec![
            "/".to_string(),
            "/dev/playground".to_string(),
            "/archives/2019".to_string(),
            "/pricing".to_string(),
        ];
        let excludes = vec!["/dev/".to_string(), "/archives/".to_string()];
        let map = process_candidates(&candidates, &origin(), &no_rules(), &excludes, 20);
        assert_eq!(map.entries(), ["/", "/pricing"]);
    }

    #[test]
    fn deduplicates_after_normalization() {
        let candidates = vec![
            "/pricing".to_string(),
            "/pricing/".to_string(),
            "https://www.example.dev/pricing?utm=x".to_string(),
        ];
        let map = process_candidates(&candidates, &origin(), &no_rules(), &[], 20);
        assert_eq!(map.entries(), ["/pricing"]);
    }

    #[test]
    fn sampling_applies_before_truncation() {
        let rules = compile_rules(&[TemplateRule {
            key: "blog".to_string(),
            pattern: "^/blog/".to_string(),
            sample_size: 1,
        }])
        .unwrap();
        let candidates = vec![
            "/blog/a".to_string(),
            "/blog/b".to_string(),
            "/blog/c".to_string(),
            "/pricing".to_string(),
        ];
        let map = process_candidates(&candidates, &origin(), &rules, &[], 20);
        assert_eq!(map.entries(), ["/pricing", "/blog/a"]);
    }

    #[test]
    fn empty_candidates_yield_valid_empty_map() {
        let map = process_candidates(&[], &origin(), &no_rules(), &[], 20);
        assert!(map.is_empty());
    }

    #[test]
    fn store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteMapStore::new(dir.path().join("sitemap.json"));
        let map = SiteMap::new(vec!["/".to_string(), "/pricing".to_string()]);
        store.write(&map).unwrap();
        assert_eq!(store.read().unwrap(), map);
    }

    #[test]
    fn read_missing_is_missing_site_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteMapStore::new(dir.path().join("sitemap.json"));
        match store.read() {
            Err(Error::MissingSiteMap(_)) => {}
            other => panic!("expected MissingSiteMap, got {other:?}"),
        }
    }

    #[test]
    fn write_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteMapStore::new(dir.path().join("sitemap.json"));
        store
            .write(&SiteMap::new(vec!["/a".to_string(), "/b".to_string()]))
            .unwrap();
        store.write(&SiteMap::new(vec!["/c".to_string()])).unwrap();
        assert_eq!(store.read().unwrap().entries(), ["/c"]);
    }

    #[test]
    fn persisted_form_is_a_json_string_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitemap.json");
        let store = SiteMapStore::new(&path);
        store.write(&SiteMap::new(vec!["/".to_string()])).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, ["/"]);
    }
}
