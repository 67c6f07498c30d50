//! Playwright browser automation
//!
//! Pages are driven through generated JavaScript executed by a `node`
//! subprocess, one process per case. The generated script appends
//! per-phase outcomes to a report object and prints it as a single
//! marked JSON line on stdout, which the Rust side parses back.

use std::process::{Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Prefix of the report line printed by generated scripts.
const REPORT_MARKER: &str = "SITELENS_REPORT ";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }
}

/// Outcome of one stabilizer phase inside the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Ok,
    Degraded,
}

/// Everything a generated script reports back to the Rust side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptReport {
    #[serde(default)]
    pub phases: Vec<PhaseReport>,

    /// Candidate URLs (acquisition scripts only).
    #[serde(default)]
    pub urls: Vec<String>,

    /// `src` of every script element loaded by the page.
    #[serde(default)]
    pub loaded_scripts: Vec<String>,

    /// Measured document height (measured-height capture only).
    #[serde(default)]
    pub content_height: Option<f64>,
}

/// Encode a Rust string as a JavaScript string literal.
pub fn js_str(s: &str) -> String {
    serde_json::to_string(s).expect("string literal encoding cannot fail")
}

/// Playwright page driver: builds scripts and runs them under node.
#[derive(Debug, Clone)]
pub struct PageDriver {
    browser: Browser,
    headless: bool,
}

impl PageDriver {
    pub fn new(browser: Browser, headless: bool) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;
        Ok(Self { browser, headless })
    }

    /// Construct without the installation preflight, for script-only use.
    pub fn unchecked(browser: Browser, headless: bool) -> Self {
        Self { browser, headless }
    }

    fn check_playwright_installed() -> HarnessResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightNotFound),
        }
    }

    /// Wrap a script body in the launch/report boilerplate. The body
    /// runs with `page`, `report`, and the `phase(name, fn)` helper in
    /// scope; a `phase` block that throws records a degraded entry and
    /// the script keeps going.
    pub fn build_script(&self, width: u32, height: u32, body: &str) -> String {
        let mut script = String::new();

        script.push_str(&format!(
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const report = {{ phases: [], urls: [], loaded_scripts: [], content_height: null }};
  async function phase(name, fn) {{
    try {{
      await fn();
      report.phases.push({{ name, status: 'ok' }});
    }} catch (err) {{
      report.phases.push({{ name, status: 'degraded', reason: String((err && err.message) || err) }});
    }}
  }}

  try {{
"#,
            browser = self.browser.as_str(),
            headless = self.headless,
            width = width,
            height = height,
        ));

        script.push_str(body);

        script.push_str(&format!(
            r#"
    console.log('{marker}' + JSON.stringify(report));
  }} catch (error) {{
    console.error(JSON.stringify({{ error: error.message, stack: error.stack }}));
    process.exit(1);
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            marker = REPORT_MARKER,
        ));

        script
    }

    /// Run a generated script under node and parse its report. A
    /// non-zero exit (navigation failure, top-level throw) surfaces as
    /// a Playwright error; exceeding the timeout kills the subprocess.
    pub async fn run(&self, script: &str, timeout: Duration) -> HarnessResult<ScriptReport> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("case.js");
        std::fs::write(&script_path, script)?;

        debug!("running Playwright script: {}", script_path.display());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .current_dir(temp_dir.path())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| HarnessError::CaseTimeout(timeout.as_millis() as u64))??;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HarnessError::Playwright(format!(
                "script failed:\nstdout: {}\nstderr: {}",
                stdout, stderr
            )));
        }

        parse_report(&stdout)
    }
}

/// Extract the marked report line from script stdout.
pub fn parse_report(stdout: &str) -> HarnessResult<ScriptReport> {
    for line in stdout.lines() {
        if let Some(json) = line.strip_prefix(REPORT_MARKER) {
            return Ok(serde_json::from_str(json)?);
        }
    }
    Err(HarnessError::Playwright(
        "script produced no report line".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_wraps_body_with_viewport_and_marker() {
        let driver = PageDriver::unchecked(Browser::Chromium, true);
        let script = driver.build_script(1280, 800, "    await page.goto('x');\n");
        assert!(script.contains("chromium.launch({ headless: true })"));
        assert!(script.contains("width: 1280, height: 800"));
        assert!(script.contains("await page.goto('x');"));
        assert!(script.contains(REPORT_MARKER));
    }

    #[test]
    fn browser_selection_appears_in_script() {
        let driver = PageDriver::unchecked(Browser::Webkit, false);
        let script = driver.build_script(375, 812, "");
        assert!(script.contains("webkit.launch({ headless: false })"));
    }

    #[test]
    fn js_str_escapes() {
        assert_eq!(js_str("plain"), "\"plain\"");
        assert_eq!(js_str("a'b\"c"), r#""a'b\"c""#);
        assert_eq!(js_str("line\nbreak"), r#""line\nbreak""#);
    }

    #[test]
    fn parse_report_finds_marked_line() {
        let stdout = format!(
            "noise\n{}{}\n",
            "SITELENS_REPORT ",
            r#"{"phases":[{"name":"scroll_sweep","status":"degraded","reason":"boom"}],"loaded_scripts":["https://x/app.js"],"content_height":2400.5}"#
        );
        let report = parse_report(&stdout).unwrap();
        assert_eq!(report.phases.len(), 1);
        assert_eq!(report.phases[0].status, PhaseStatus::Degraded);
        assert_eq!(report.phases[0].reason.as_deref(), Some("boom"));
        assert_eq!(report.loaded_scripts, ["https://x/app.js"]);
        assert_eq!(report.content_height, Some(2400.5));
    }

    #[test]
    fn parse_report_without_marker_is_error() {
        assert!(parse_report("just logs\n").is_err());
    }

    #[test]
    fn browser_parse_defaults_to_chromium() {
        assert_eq!(Browser::parse("firefox"), Browser::Firefox);
        assert_eq!(Browser::parse("nonsense"), Browser::Chromium);
    }
}
