//! URL canonicalization for site map entries

use url::Url;

use crate::config::HostRewrite;
use crate::error::{Error, Result};

/// The origin a suite runs against.
///
/// Carries the parsed base URL plus an optional host rewrite used when
/// a sitemap discovered on staging still lists production URLs. The
/// rewrite is a pure string substitution applied before parsing; no
/// network calls happen here.
#[derive(Debug, Clone)]
pub struct Origin {
    base: Url,
    rewrite: Option<HostRewrite>,
}

impl Origin {
    pub fn new(base_url: &str, rewrite: Option<HostRewrite>) -> Result<Self> {
        let base = Url::parse(base_url.trim()).map_err(|e| Error::InvalidOrigin {
            origin: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.host_str().is_none() {
            return Err(Error::InvalidOrigin {
                origin: base_url.to_string(),
                reason: "no host component".to_string(),
            });
        }
        Ok(Self { base, rewrite })
    }

    /// Base URL with any trailing slash removed, suitable for prefixing paths.
    pub fn base_str(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    /// Absolute URL for a canonical path on this origin.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_str(), path)
    }

    /// Whether this origin looks like a staging environment.
    pub fn is_staging(&self) -> bool {
        self.base
            .host_str()
            .map(|h| h.ends_with(".dev") || h.contains("staging"))
            .unwrap_or(false)
    }

    fn apply_rewrite(&self, raw: &str) -> String {
        match &self.rewrite {
            Some(rw) => raw.replace(&rw.from, &rw.to),
            None => raw.to_string(),
        }
    }
}

/// Canonicalize a raw URL or path into a site map path.
///
/// Returns `None` for inputs that cannot name a page: empty or
/// whitespace-only strings, fragment-only links, and absolute URLs on
/// a foreign host (checked after the rewrite, so production URLs in a
/// staging run survive). Query strings and fragments are stripped,
/// trailing slashes are removed (the root stays `/`), and the
/// configured host rewrite is applied first. The result is always a
/// path, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str, origin: &Origin) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    let rewritten = origin.apply_rewrite(raw);
    let parsed = Url::options()
        .base_url(Some(&origin.base))
        .parse(&rewritten)
        .ok()?;
    if parsed.host_str() != origin.base.host_str() {
        return None;
    }

    let path = parsed.path().trim_end_matches('/');
    if path.is_empty() {
        Some("/".to_string())
    } else {
        Some(path.to_string())
    }
}
