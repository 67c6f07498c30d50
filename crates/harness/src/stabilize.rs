//! Page stabilization
//!
//! Converges a freshly navigated page to a steady, comparison-safe
//! visual state. The stabilizer is an ordered pipeline of phases, each
//! emitting a guarded JavaScript block; a phase that throws records a
//! degraded entry in the run report and the pipeline keeps going. Only
//! navigation itself (which happens before the pipeline) can fail a
//! case outright.

use sitelens_core::config::StabilizerSettings;
use sitelens_core::SuiteConfig;

use crate::playwright::js_str;

/// A named, individually-emitted pipeline step.
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub js: String,
}

/// One entry in the framework forced-state catalog: a CSS selector
/// finding affected elements and statements (with `el` in scope) that
/// jump them to their animation end state. The catalog is a registry so
/// new site patterns are added without touching the pipeline.
#[derive(Debug, Clone)]
pub struct FrameworkFix {
    pub name: String,
    pub detector: String,
    pub forcer: String,
}

fn builtin_fixes() -> Vec<FrameworkFix> {
    vec![
        // Background videos never settle; substitute the poster frame.
        FrameworkFix {
            name: "background_video_poster".to_string(),
            detector: ".w-background-video video, video[autoplay]".to_string(),
            forcer: r#"el.pause();
el.removeAttribute('autoplay');
if (el.poster) {
  el.style.display = 'none';
  el.parentElement.style.backgroundImage = 'url(' + el.poster + ')';
  el.parentElement.style.backgroundSize = 'cover';
}"#
            .to_string(),
        },
        // Elements carrying interaction-state attributes start hidden or
        // offset until their intro animation runs.
        FrameworkFix {
            name: "interaction_state_reset".to_string(),
            detector: "[data-w-id]".to_string(),
            forcer: "el.style.opacity = '1'; el.style.transform = 'none'; el.style.transition = 'none';"
                .to_string(),
        },
        // Dropdowns left half-open by hover interactions.
        FrameworkFix {
            name: "dropdown_closed_state".to_string(),
            detector: ".w-dropdown-toggle, .w-dropdown-list".to_string(),
            forcer: "el.classList.remove('w--open');".to_string(),
        },
    ]
}

/// The stabilization pipeline.
pub struct Stabilizer {
    settings: StabilizerSettings,
    required_scripts: Vec<String>,
    animation_global: String,
    animation_attribute: String,
    fixes: Vec<FrameworkFix>,
}

impl Stabilizer {
    pub fn from_config(config: &SuiteConfig) -> Self {
        Self {
            settings: config.stabilizer.clone(),
            required_scripts: config.required_scripts.clone(),
            animation_global: config.animation_global.clone(),
            animation_attribute: config.animation_attribute.clone(),
            fixes: builtin_fixes(),
        }
    }

    /// Add a site-specific forced-state fix to the catalog.
    pub fn register_fix(&mut self, fix: FrameworkFix) {
        self.fixes.push(fix);
    }

    /// The ordered phase list. Later phases assume earlier ones ran;
    /// there is no rollback and no phase-level retry.
    pub fn phases(&self) -> Vec<Phase> {
        let mut phases = Vec::new();

        phases.push(self.load_quiescence());
        if !self.required_scripts.is_empty() {
            phases.push(self.script_readiness());
        }
        for fix in &self.fixes {
            phases.push(self.framework_fix(fix));
        }
        phases.push(self.slider_settling());
        phases.push(self.scroll_sweep());
        phases.push(self.animation_forcing());
        phases.push(self.settle());

        phases
    }

    /// Concatenated script body for all phases.
    pub fn script_body(&self) -> String {
        self.phases()
            .into_iter()
            .map(|p| p.js)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Phase 2: DOM-content-ready, load, then network idle, each under
    /// its own timeout. A timeout degrades the phase instead of failing
    /// the case; most pages are usable even when a late resource never
    /// quiesces.
    fn load_quiescence(&self) -> Phase {
        let js = format!(
            r#"    await phase('load_quiescence', async () => {{
      const waits = [
        ['domcontentloaded', {dom}],
        ['load', {load}],
        ['networkidle', {idle}],
      ];
      for (const [state, timeout] of waits) {{
        try {{
          await page.waitForLoadState(state, {{ timeout }});
        }} catch (err) {{
          report.phases.push({{ name: 'load_quiescence:' + state, status: 'degraded', reason: 'timeout after ' + timeout + 'ms' }});
        }}
      }}
    }});"#,
            dom = self.settings.dom_content_timeout_ms,
            load = self.settings.load_timeout_ms,
            idle = self.settings.network_idle_timeout_ms,
        );
        Phase {
            name: "load_quiescence".to_string(),
            js,
        }
    }

    /// Phase 3: inject any missing required scripts, await each one's
    /// load or error, then block until the animation-library global is
    /// defined. The global wait is deliberately unbounded: without the
    /// library the comparison would be invalid anyway, so only the
    /// case-level timeout limits it.
    fn script_readiness(&self) -> Phase {
        let urls = self
            .required_scripts
            .iter()
            .map(|u| js_str(u))
            .collect::<Vec<_>>()
            .join(", ");
        let global_check = format!(
            "typeof window[{}] !== 'undefined'",
            js_str(&self.animation_global)
        );
        let js = format!(
            r#"    await phase('script_readiness', async () => {{
      await page.evaluate(async (urls) => {{
        const present = new Set(Array.from(document.scripts).map((s) => s.src));
        await Promise.all(urls.filter((u) => !present.has(u)).map((u) => new Promise((resolve) => {{
          const el = document.createElement('script');
          el.src = u;
          el.onload = resolve;
          el.onerror = resolve;
          document.head.appendChild(el);
        }})));
      }}, [{urls}]);
      await page.waitForFunction({check}, null, {{ timeout: 0 }});
    }});"#,
            urls = urls,
            check = js_str(&global_check),
        );
        Phase {
            name: "script_readiness".to_string(),
            js,
        }
    }

    /// Phase 4: one catalog entry. Per-element errors are swallowed so
    /// a single broken widget cannot abort stabilization.
    fn framework_fix(&self, fix: &FrameworkFix) -> Phase {
        let name = format!("framework_fix:{}", fix.name);
        let js = format!(
            r#"    await phase({phase_name}, async () => {{
      await page.evaluate((selector) => {{
        for (const el of document.querySelectorAll(selector)) {{
          try {{
            {forcer}
          }} catch (err) {{ /* one broken element must not stop the rest */ }}
        }}
      }}, {detector});
    }});"#,
            phase_name = js_str(&name),
            detector = js_str(&fix.detector),
            forcer = fix.forcer,
        );
        Phase { name, js }
    }

    /// Phase 5: force slider/carousel widgets visible on their first
    /// slide and best-effort re-execute inline scripts that drive them.
    /// Some re-executions fail under execution-context restrictions;
    /// that is accepted.
    fn slider_settling(&self) -> Phase {
        let js = r#"    await phase('slider_settling', async () => {
      await page.evaluate(() => {
        const sliders = document.querySelectorAll('.w-slider, .swiper, [class*="slider"], [class*="carousel"]');
        for (const el of sliders) {
          try {
            el.style.visibility = 'visible';
            el.style.opacity = '1';
            const first = el.querySelector('.w-slide, .swiper-slide, [class*="slide"]');
            if (first) {
              first.classList.add('w--current', 'swiper-slide-active');
              first.style.opacity = '1';
              first.style.transform = 'none';
            }
          } catch (err) { /* skip broken widget */ }
        }
        for (const script of document.querySelectorAll('script:not([src])')) {
          const text = script.textContent || '';
          if (/slider|swiper|carousel/i.test(text)) {
            try { new Function(text)(); } catch (err) { /* context restrictions */ }
          }
        }
      });
    });"#
        .to_string();
        Phase {
            name: "slider_settling".to_string(),
            js,
        }
    }

    /// Phase 6: scroll top to bottom in fixed increments so
    /// intersection-triggered animations fire, recompute scroll-linked
    /// layout if the library exposes a hook, then return to the top.
    fn scroll_sweep(&self) -> Phase {
        let js = format!(
            r#"    await phase('scroll_sweep', async () => {{
      const total = await page.evaluate(() => document.body.scrollHeight);
      for (let y = 0; y <= total; y += {step}) {{
        await page.evaluate((top) => window.scrollTo(0, top), y);
        await page.waitForTimeout({delay});
      }}
      await page.evaluate(() => {{
        if (window.ScrollTrigger && typeof window.ScrollTrigger.refresh === 'function') {{
          window.ScrollTrigger.refresh();
        }}
        window.scrollTo(0, 0);
      }});
    }});"#,
            step = self.settings.scroll_step_px,
            delay = self.settings.scroll_delay_ms,
        );
        Phase {
            name: "scroll_sweep".to_string(),
            js,
        }
    }

    /// Phase 7: drive every attribute-declared animation to its end
    /// state at zero duration, branching on the declared keyword, with
    /// a transform/opacity reset for unknown keywords and a pure-CSS
    /// fallback when the library global is absent.
    fn animation_forcing(&self) -> Phase {
        let js = format!(
            r#"    await phase('animation_forcing', async () => {{
      await page.evaluate(([attr, globalName]) => {{
        const lib = window[globalName];
        for (const el of document.querySelectorAll('[' + attr + ']')) {{
          try {{
            const kind = el.getAttribute(attr);
            if (lib && typeof lib.set === 'function') {{
              switch (kind) {{
                case 'fade':
                  lib.set(el, {{ opacity: 1, duration: 0, delay: 0 }});
                  break;
                case 'slide-up':
                case 'slide-down':
                  lib.set(el, {{ opacity: 1, y: 0, duration: 0, delay: 0 }});
                  break;
                case 'slide-left':
                case 'slide-right':
                  lib.set(el, {{ opacity: 1, x: 0, duration: 0, delay: 0 }});
                  break;
                case 'scale':
                  lib.set(el, {{ opacity: 1, scale: 1, duration: 0, delay: 0 }});
                  break;
                case 'flip':
                  lib.set(el, {{ opacity: 1, rotationX: 0, rotationY: 0, duration: 0, delay: 0 }});
                  break;
                default:
                  lib.set(el, {{ clearProps: 'transform,opacity' }});
                  break;
              }}
            }} else {{
              el.style.opacity = '1';
              el.style.transform = 'none';
              el.style.visibility = 'visible';
              el.style.transition = 'none';
            }}
          }} catch (err) {{ /* per-element failures must not stop the sweep */ }}
        }}
      }}, [{attr}, {global}]);
    }});"#,
            attr = js_str(&self.animation_attribute),
            global = js_str(&self.animation_global),
        );
        Phase {
            name: "animation_forcing".to_string(),
            js,
        }
    }

    /// Phase 8: generous fixed wait to absorb remaining async work.
    fn settle(&self) -> Phase {
        let js = format!(
            r#"    await phase('settle', async () => {{
      await page.waitForTimeout({ms});
    }});"#,
            ms = self.settings.settle_ms,
        );
        Phase {
            name: "settle".to_string(),
            js,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_scripts() -> SuiteConfig {
        let mut config = SuiteConfig::default();
        config.required_scripts = vec!["https://cdn.example.com/gsap.min.js".to_string()];
        config
    }

    #[test]
    fn phases_run_in_declared_order() {
        let stabilizer = Stabilizer::from_config(&config_with_scripts());
        let names: Vec<String> = stabilizer.phases().into_iter().map(|p| p.name).collect();
        assert_eq!(names[0], "load_quiescence");
        assert_eq!(names[1], "script_readiness");
        assert!(names[2].starts_with("framework_fix:"));
        let tail: Vec<&str> = names.iter().rev().take(4).map(|s| s.as_str()).collect();
        assert_eq!(
            tail,
            ["settle", "animation_forcing", "scroll_sweep", "slider_settling"]
        );
    }

    #[test]
    fn script_readiness_skipped_without_required_scripts() {
        let stabilizer = Stabilizer::from_config(&SuiteConfig::default());
        assert!(!stabilizer
            .phases()
            .iter()
            .any(|p| p.name == "script_readiness"));
    }

    #[test]
    fn script_readiness_injects_and_waits_unbounded() {
        let stabilizer = Stabilizer::from_config(&config_with_scripts());
        let body = stabilizer.script_body();
        assert!(body.contains("https://cdn.example.com/gsap.min.js"));
        assert!(body.contains("el.onerror = resolve"));
        // The options object must be the third argument; passed second,
        // the default wait timeout would silently apply instead.
        assert!(body.contains(", null, { timeout: 0 })"));
        assert!(body.contains("typeof window[\\\"gsap\\\"] !== 'undefined'"));
    }

    #[test]
    fn registered_fix_becomes_a_phase() {
        let mut stabilizer = Stabilizer::from_config(&SuiteConfig::default());
        stabilizer.register_fix(FrameworkFix {
            name: "marquee_pause".to_string(),
            detector: ".marquee".to_string(),
            forcer: "el.style.animationPlayState = 'paused';".to_string(),
        });
        let body = stabilizer.script_body();
        assert!(body.contains("framework_fix:marquee_pause"));
        assert!(body.contains("animationPlayState"));
    }

    #[test]
    fn animation_forcing_branches_on_keyword() {
        let body = Stabilizer::from_config(&SuiteConfig::default()).script_body();
        for keyword in ["'fade'", "'slide-up'", "'slide-left'", "'scale'", "'flip'"] {
            assert!(body.contains(&format!("case {keyword}:")), "{keyword}");
        }
        assert!(body.contains("clearProps"));
        assert!(body.contains("el.style.transition = 'none';"));
    }

    #[test]
    fn scroll_sweep_uses_configured_increments() {
        let mut config = SuiteConfig::default();
        config.stabilizer.scroll_step_px = 250;
        config.stabilizer.scroll_delay_ms = 50;
        let body = Stabilizer::from_config(&config).script_body();
        assert!(body.contains("y += 250"));
        assert!(body.contains("waitForTimeout(50)"));
        assert!(body.contains("ScrollTrigger.refresh()"));
        assert!(body.contains("window.scrollTo(0, 0)"));
    }

    #[test]
    fn quiescence_timeouts_degrade_instead_of_throwing() {
        let body = Stabilizer::from_config(&SuiteConfig::default()).script_body();
        assert!(body.contains("'load_quiescence:' + state"));
        assert!(body.contains("status: 'degraded'"));
    }

    #[test]
    fn settle_uses_configured_delay() {
        let mut config = SuiteConfig::default();
        config.stabilizer.settle_ms = 4500;
        let body = Stabilizer::from_config(&config).script_body();
        assert!(body.contains("waitForTimeout(4500)"));
    }
}
