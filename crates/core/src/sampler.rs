//! Template sampling: bound structurally-identical pages to a few
//! representatives per page type.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A named page-template pattern with a sample quota, as written in the
/// suite configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRule {
    /// Unique key naming the template (e.g. "blog").
    pub key: String,

    /// Regex tested against the canonical path only, never query or fragment.
    pub pattern: String,

    /// How many representatives of this template to keep.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_sample_size() -> usize {
    1
}

/// A validated rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub key: String,
    pub pattern: Regex,
    pub sample_size: usize,
}

/// Compile and validate template rules: keys must be unique, sample
/// sizes at least 1, patterns valid regexes.
pub fn compile_rules(rules: &[TemplateRule]) -> Result<Vec<CompiledRule>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut compiled = Vec::with_capacity(rules.len());

    for rule in rules {
        if !seen.insert(rule.key.as_str()) {
            return Err(Error::InvalidRule {
                key: rule.key.clone(),
                reason: "duplicate key".to_string(),
            });
        }
        if rule.sample_size == 0 {
            return Err(Error::InvalidRule {
                key: rule.key.clone(),
                reason: "sample_size must be at least 1".to_string(),
            });
        }
        let pattern = Regex::new(&rule.pattern).map_err(|e| Error::InvalidRule {
            key: rule.key.clone(),
            reason: e.to_string(),
        })?;
        compiled.push(CompiledRule {
            key: rule.key.clone(),
            pattern,
            sample_size: rule.sample_size,
        });
    }

    Ok(compiled)
}

/// Outcome of a sampling pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Free-bucket paths in source order, followed by rule samples in
    /// rule declaration order.
    pub ordered: Vec<String>,

    /// Representatives kept per rule key, in declaration order.
    pub rule_counts: Vec<(String, usize)>,
}

/// Partition paths into template samples and free paths.
///
/// The input is an ordered slice on purpose: which representative a
/// template keeps is decided by first-seen-wins, so callers must supply
/// paths in a stable order (e.g. as returned by the sitemap document,
/// top to bottom). Rules are tested in declaration order and the first
/// match wins. A path matching a rule whose quota is already full is
/// dropped from both buckets: pages sharing a template are visually
/// redundant. Duplicate paths are ignored after their first occurrence.
pub fn sample(paths: &[String], rules: &[CompiledRule]) -> SampleOutcome {
    let mut free: Vec<String> = Vec::new();
    let mut buckets: Vec<Vec<String>> = vec![Vec::new(); rules.len()];
    let mut seen: HashSet<&str> = HashSet::new();

    for path in paths {
        if !seen.insert(path.as_str()) {
            continue;
        }
        match rules.iter().position(|r| r.pattern.is_match(path)) {
            Some(idx) => {
                if buckets[idx].len() < rules[idx].sample_size {
                    buckets[idx].push(path.clone());
                }
            }
            None => free.push(path.clone()),
        }
    }

    let rule_counts = rules
        .iter()
        .zip(&buckets)
        .map(|(rule, bucket)| (rule.key.clone(), bucket.len()))
        .collect();

    let mut ordered = free;
    for bucket in buckets {
        ordered.extend(bucket);
    }

    SampleOutcome {
        ordered,
        rule_counts,
    }
}
