//! Baseline screenshot comparison

use std::path::{Path, PathBuf};

use image::{GenericImageView, Pixel, RgbaImage};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Result of comparing a capture against its baseline.
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// Whether the images match within the tolerance.
    pub matches: bool,

    /// Ratio of differing pixels (0.0 - 1.0).
    pub diff_ratio: f64,

    pub diff_pixels: u64,
    pub total_pixels: u64,

    /// Path to the diff image, when differences were found.
    pub diff_image_path: Option<PathBuf>,
}

/// Configuration for visual comparison.
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,

    /// Maximum differing-pixel ratio tolerated (0.0 - 1.0).
    pub max_diff_ratio: f64,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/actual"),
            diff_dir: PathBuf::from("test-results/diffs"),
            max_diff_ratio: 0.1,
        }
    }
}

impl VisualConfig {
    /// Standard layout under a single results root.
    pub fn under(results_dir: &Path, max_diff_ratio: f64) -> Self {
        Self {
            baseline_dir: results_dir.join("baselines"),
            actual_dir: results_dir.join("actual"),
            diff_dir: results_dir.join("diffs"),
            max_diff_ratio,
        }
    }
}

/// Per-channel tolerance absorbing anti-aliasing and encoder noise.
const CHANNEL_TOLERANCE: i32 = 5;

/// Visual regression comparison against stored baselines.
pub struct VisualTester {
    config: VisualConfig,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> HarnessResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;
        Ok(Self { config })
    }

    pub fn actual_path(&self, name: &str) -> PathBuf {
        self.config.actual_dir.join(format!("{name}.png"))
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.config.baseline_dir.join(format!("{name}.png"))
    }

    /// Compare a named capture against its baseline.
    pub fn compare(&self, name: &str) -> HarnessResult<VisualDiff> {
        let actual_path = self.actual_path(name);
        let baseline_path = self.baseline_path(name);

        if !actual_path.exists() {
            return Err(HarnessError::Playwright(format!(
                "capture not found: {}",
                actual_path.display()
            )));
        }
        if !baseline_path.exists() {
            return Err(HarnessError::BaselineNotFound(
                baseline_path.display().to_string(),
            ));
        }

        // Hash short-circuit for byte-identical captures.
        if hash_file(&actual_path)? == hash_file(&baseline_path)? {
            debug!("'{}' matches baseline exactly", name);
            let img = image::open(&actual_path)?;
            let total = (img.width() as u64) * (img.height() as u64);
            return Ok(VisualDiff {
                matches: true,
                diff_ratio: 0.0,
                diff_pixels: 0,
                total_pixels: total,
                diff_image_path: None,
            });
        }

        let actual_img = image::open(&actual_path)?;
        let baseline_img = image::open(&baseline_path)?;

        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "'{}' dimensions differ: actual {:?} vs baseline {:?}",
                name,
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        // Compare over the union of both extents so a capture that lost
        // content is just as wrong as one that gained it.
        let (actual_w, actual_h) = actual_img.dimensions();
        let (baseline_w, baseline_h) = baseline_img.dimensions();
        let width = actual_w.max(baseline_w);
        let height = actual_h.max(baseline_h);
        let actual_rgba = actual_img.to_rgba8();
        let baseline_rgba = baseline_img.to_rgba8();

        let mut diff_img = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;
        let total_pixels = (width as u64) * (height as u64);

        for y in 0..height {
            for x in 0..width {
                let in_actual = x < actual_w && y < actual_h;
                let in_baseline = x < baseline_w && y < baseline_h;
                let differs = if in_actual && in_baseline {
                    pixels_differ(actual_rgba.get_pixel(x, y), baseline_rgba.get_pixel(x, y))
                } else {
                    // Regions covered by only one image count as different.
                    true
                };

                if differs {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                } else {
                    let channels = actual_rgba.get_pixel(x, y).channels();
                    diff_img.put_pixel(
                        x,
                        y,
                        image::Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]),
                    );
                }
            }
        }

        let diff_ratio = if total_pixels == 0 {
            0.0
        } else {
            diff_pixels as f64 / total_pixels as f64
        };
        let matches = diff_ratio <= self.config.max_diff_ratio;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.config.diff_dir.join(format!("{name}-diff.png"));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "visual regression in '{}': {:.4} of pixels differ (max {:.4})",
                name, diff_ratio, self.config.max_diff_ratio
            );
        }

        Ok(VisualDiff {
            matches,
            diff_ratio,
            diff_pixels,
            total_pixels,
            diff_image_path,
        })
    }

    /// Store the current capture as the new baseline.
    pub fn update_baseline(&self, name: &str) -> HarnessResult<()> {
        let actual_path = self.actual_path(name);
        if !actual_path.exists() {
            return Err(HarnessError::Playwright(format!(
                "cannot update baseline, capture not found: {}",
                actual_path.display()
            )));
        }
        std::fs::copy(&actual_path, self.baseline_path(name))?;
        info!("updated baseline for '{}'", name);
        Ok(())
    }

    /// Names of all stored baselines.
    pub fn list_baselines(&self) -> HarnessResult<Vec<String>> {
        let mut baselines = Vec::new();
        for entry in std::fs::read_dir(&self.config.baseline_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(name) = path.file_stem() {
                    baselines.push(name.to_string_lossy().to_string());
                }
            }
        }
        baselines.sort();
        Ok(baselines)
    }
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    let a_channels = a.channels();
    let b_channels = b.channels();
    for i in 0..4 {
        if (a_channels[i] as i32 - b_channels[i] as i32).abs() > CHANNEL_TOLERANCE {
            return true;
        }
    }
    false
}

fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn tester(dir: &Path, max_diff_ratio: f64) -> VisualTester {
        VisualTester::new(VisualConfig::under(dir, max_diff_ratio)).unwrap()
    }

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn identical_images_match() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.0);
        let img = solid(10, 10, [10, 20, 30, 255]);
        img.save(tester.actual_path("home")).unwrap();
        img.save(tester.baseline_path("home")).unwrap();

        let diff = tester.compare("home").unwrap();
        assert!(diff.matches);
        assert_eq!(diff.diff_pixels, 0);
        assert!(diff.diff_image_path.is_none());
    }

    #[test]
    fn small_change_within_tolerance_passes() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.1);
        let baseline = solid(10, 10, [0, 0, 0, 255]);
        let mut actual = baseline.clone();
        // 5 of 100 pixels changed: ratio 0.05
        for x in 0..5 {
            actual.put_pixel(x, 0, Rgba([255, 255, 255, 255]));
        }
        actual.save(tester.actual_path("page")).unwrap();
        baseline.save(tester.baseline_path("page")).unwrap();

        let diff = tester.compare("page").unwrap();
        assert!(diff.matches);
        assert_eq!(diff.diff_pixels, 5);
        assert!((diff.diff_ratio - 0.05).abs() < 1e-9);
        assert!(diff.diff_image_path.is_some());
    }

    #[test]
    fn large_change_fails_and_writes_diff_image() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.1);
        solid(10, 10, [255, 255, 255, 255])
            .save(tester.actual_path("page"))
            .unwrap();
        solid(10, 10, [0, 0, 0, 255])
            .save(tester.baseline_path("page"))
            .unwrap();

        let diff = tester.compare("page").unwrap();
        assert!(!diff.matches);
        assert_eq!(diff.diff_pixels, 100);
        let diff_path = diff.diff_image_path.unwrap();
        assert!(diff_path.exists());
    }

    #[test]
    fn channel_tolerance_absorbs_antialiasing() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.0);
        solid(4, 4, [100, 100, 100, 255])
            .save(tester.actual_path("aa"))
            .unwrap();
        solid(4, 4, [103, 98, 102, 255])
            .save(tester.baseline_path("aa"))
            .unwrap();

        let diff = tester.compare("aa").unwrap();
        assert!(diff.matches);
        assert_eq!(diff.diff_pixels, 0);
    }

    #[test]
    fn missing_baseline_is_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.1);
        solid(4, 4, [0, 0, 0, 255])
            .save(tester.actual_path("new-page"))
            .unwrap();

        match tester.compare("new-page") {
            Err(HarnessError::BaselineNotFound(_)) => {}
            other => panic!("expected BaselineNotFound, got {other:?}"),
        }
    }

    #[test]
    fn update_baseline_copies_capture() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.1);
        solid(4, 4, [1, 2, 3, 255])
            .save(tester.actual_path("home"))
            .unwrap();

        tester.update_baseline("home").unwrap();
        assert_eq!(tester.list_baselines().unwrap(), ["home"]);
        assert!(tester.compare("home").unwrap().matches);
    }

    #[test]
    fn dimension_mismatch_counts_extra_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.0);
        solid(10, 20, [0, 0, 0, 255])
            .save(tester.actual_path("tall"))
            .unwrap();
        solid(10, 10, [0, 0, 0, 255])
            .save(tester.baseline_path("tall"))
            .unwrap();

        let diff = tester.compare("tall").unwrap();
        assert!(!diff.matches);
        assert_eq!(diff.diff_pixels, 100);
        assert_eq!(diff.total_pixels, 200);
    }

    #[test]
    fn shrunken_capture_counts_missing_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let tester = tester(dir.path(), 0.0);
        solid(10, 10, [0, 0, 0, 255])
            .save(tester.actual_path("short"))
            .unwrap();
        solid(10, 20, [0, 0, 0, 255])
            .save(tester.baseline_path("short"))
            .unwrap();

        let diff = tester.compare("short").unwrap();
        assert!(!diff.matches);
        assert_eq!(diff.diff_pixels, 100);
        assert_eq!(diff.total_pixels, 200);
    }
}
