//! Viewer loader: waits for the document viewer and forces every page to render.
//!
//! Viewers virtualize their content and only materialize page images near the
//! current position, so the loader walks the whole document before extraction,
//! either by scrolling the viewer or by pressing its "next page" control.

use crate::session::{js_string, Session};
use crate::{CaptureConfig, Error, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::time::Duration;

/// How the loader forces lazy pages to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStrategy {
    /// Probe the page: paginate when a "next page" control exists, scroll otherwise
    #[default]
    Auto,
    /// Scroll the viewer incrementally until its full extent has been reached
    Scroll,
    /// Activate the "next page" control until it disappears, then rewind
    Paginate,
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// How a [`RetryLoop`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The step reported completion after this many continued steps
    Completed(u32),
    /// The step budget ran out
    Exhausted(u32),
}

impl LoopOutcome {
    pub fn steps(&self) -> u32 {
        match self {
            LoopOutcome::Completed(n) | LoopOutcome::Exhausted(n) => *n,
        }
    }
}

/// Bounded polling loop with a fixed delay between iterations.
#[derive(Debug, Clone, Copy)]
pub struct RetryLoop {
    pub max_steps: u32,
    pub delay: Duration,
}

impl RetryLoop {
    pub fn new(max_steps: u32, delay: Duration) -> Self {
        Self { max_steps, delay }
    }

    /// Run `step` until it returns [`Step::Done`] or the budget is spent.
    /// The session sleeps for `delay` after every continued step.
    pub fn run<S, F>(&self, session: &mut S, mut step: F) -> Result<LoopOutcome>
    where
        S: Session,
        F: FnMut(&mut S) -> Result<Step>,
    {
        for n in 0..self.max_steps {
            match step(session)? {
                Step::Done => return Ok(LoopOutcome::Completed(n)),
                Step::Continue => session.sleep(self.delay),
            }
        }
        Ok(LoopOutcome::Exhausted(self.max_steps))
    }
}

/// Summary of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub strategy: LoadStrategy,
    pub outcome: LoopOutcome,
}

#[derive(Deserialize)]
struct StepState {
    done: bool,
}

/// Wait for the viewer root container, failing with `ViewerNotFound`.
pub fn await_viewer_ready<S: Session>(session: &mut S, config: &CaptureConfig) -> Result<()> {
    let timeout = Duration::from_millis(config.viewer_timeout_ms);
    if session.wait_for_selector(&config.viewer_selector, timeout)? {
        debug!("Viewer container `{}` is present", config.viewer_selector);
        Ok(())
    } else {
        Err(Error::ViewerNotFound(config.viewer_selector.clone()))
    }
}

/// Resolve `Auto` by checking whether the viewer exposes a "next page" control.
pub fn probe_strategy<S: Session>(session: &mut S, config: &CaptureConfig) -> Result<LoadStrategy> {
    if config.load_strategy != LoadStrategy::Auto {
        return Ok(config.load_strategy);
    }
    let script = format!(
        "/* rfcapture:probe */ document.querySelector({}) !== null",
        js_string(&config.next_page_selector)
    );
    let has_next: bool = session.evaluate_as(&script, false)?;
    Ok(if has_next {
        LoadStrategy::Paginate
    } else {
        LoadStrategy::Scroll
    })
}

/// Walk the whole document so that every page image gets instantiated, then
/// give the last triggered renders time to finish.
pub fn load_all_pages<S: Session>(session: &mut S, config: &CaptureConfig) -> Result<LoadReport> {
    let strategy = probe_strategy(session, config)?;
    let retry = RetryLoop::new(
        config.max_load_steps,
        Duration::from_millis(config.load_step_delay_ms),
    );

    let outcome = match strategy {
        LoadStrategy::Paginate => paginate(session, config, &retry)?,
        _ => scroll_to_end(session, config, &retry)?,
    };

    match outcome {
        LoopOutcome::Completed(n) => info!("Loaded viewer pages with {:?} strategy in {} steps", strategy, n),
        LoopOutcome::Exhausted(n) => warn!(
            "{:?} strategy did not reach the end of the document within {} steps",
            strategy, n
        ),
    }

    session.sleep(Duration::from_millis(config.settle_delay_ms));
    Ok(LoadReport { strategy, outcome })
}

fn scroll_to_end<S: Session>(
    session: &mut S,
    config: &CaptureConfig,
    retry: &RetryLoop,
) -> Result<LoopOutcome> {
    let script = scroll_step_script(config);
    retry.run(session, |s| {
        let state: StepState = s.evaluate_as(&script, false)?;
        Ok(if state.done { Step::Done } else { Step::Continue })
    })
}

fn paginate<S: Session>(
    session: &mut S,
    config: &CaptureConfig,
    retry: &RetryLoop,
) -> Result<LoopOutcome> {
    let forward = click_step_script(&config.next_page_selector);
    let outcome = retry.run(session, |s| {
        let state: StepState = s.evaluate_as(&forward, false)?;
        Ok(if state.done { Step::Done } else { Step::Continue })
    })?;

    let backward = click_step_script(&config.prev_page_selector);
    let rewind = retry.run(session, |s| {
        let state: StepState = s.evaluate_as(&backward, false)?;
        Ok(if state.done { Step::Done } else { Step::Continue })
    })?;
    debug!("Rewound viewer to the first page in {} steps", rewind.steps());

    Ok(outcome)
}

/// One scroll increment on the first scrollable element among the viewer
/// root, its descendants and its ancestors, in that order.
///
/// Reports `done` once the scroll position covers the
/// full extent (checked before scrolling, so content appended by the previous
/// step extends the walk). A missing scroll target also counts as done.
fn scroll_step_script(config: &CaptureConfig) -> String {
    let explicit = config
        .scroll_container_selector
        .as_deref()
        .map(js_string)
        .unwrap_or_else(|| "null".to_string());

    r#"/* rfcapture:scroll-step */ (function() {
        const explicit = {{EXPLICIT}};
        function scrolls(el) {
            return el.scrollHeight > el.clientHeight
                && /(auto|scroll)/.test(getComputedStyle(el).overflowY);
        }
        function scrollTarget() {
            if (explicit) return document.querySelector(explicit);
            const root = document.querySelector({{VIEWER}});
            if (root) {
                if (scrolls(root)) return root;
                const inner = Array.from(root.querySelectorAll('*')).find(scrolls);
                if (inner) return inner;
                for (let el = root.parentElement; el; el = el.parentElement) {
                    if (scrolls(el)) return el;
                }
            }
            return document.scrollingElement || document.documentElement;
        }
        const el = scrollTarget();
        if (!el) return { done: true };
        if (el.scrollTop + el.clientHeight >= el.scrollHeight - 1) return { done: true };
        el.scrollTop = Math.min(el.scrollTop + el.clientHeight, el.scrollHeight);
        return { done: false };
    })()"#
        .replace("{{EXPLICIT}}", &explicit)
        .replace("{{VIEWER}}", &js_string(&config.viewer_selector))
}

/// Click a pagination control once; absent or disabled means done.
fn click_step_script(selector: &str) -> String {
    r#"/* rfcapture:click-step */ (function() {
        const control = document.querySelector({{SELECTOR}});
        if (!control || control.disabled || control.getAttribute('aria-disabled') === 'true') {
            return { done: true };
        }
        control.click();
        return { done: false };
    })()"#
        .replace("{{SELECTOR}}", &js_string(selector))
}
