//! Error types for the harness

use thiserror::Error;

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Case timed out after {0} ms")]
    CaseTimeout(u64),

    #[error("Site map acquisition failed: {0}")]
    Acquisition(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Screenshot mismatch: {name} differs by {diff_ratio:.4} (max allowed {max_ratio:.4})")]
    Mismatch {
        name: String,
        diff_ratio: f64,
        max_ratio: f64,
    },

    #[error(transparent)]
    Core(#[from] sitelens_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
