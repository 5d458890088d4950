use super::{PageRenderer, RenderOptions, RenderedPage};
use crate::config::ScraperConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const SETTLE_POLL: Duration = Duration::from_millis(500);

/// Unchanged polls in a row that count as the network having gone quiet.
const QUIET_POLLS: u32 = 3;

/// Document size once loading is complete, -1 while it is not.
const DOCUMENT_SIZE_JS: &str =
    "document.readyState === 'complete' ? document.documentElement.outerHTML.length : -1";

fn scroll_script(step_px: u32) -> String {
    format!("window.scrollBy(0, {});", step_px)
}

/// Tracks the document size between polls.
#[derive(Debug, Default)]
struct QuietTracker {
    last: Option<i64>,
    unchanged: u32,
}

impl QuietTracker {
    /// Record one poll; `true` once the size has held for `QUIET_POLLS`.
    fn observe(&mut self, size: i64) -> bool {
        if size >= 0 && self.last == Some(size) {
            self.unchanged += 1;
        } else {
            self.unchanged = 0;
        }
        self.last = Some(size);
        self.unchanged >= QUIET_POLLS
    }
}

/// Idle limit for the browser process: the whole page budget plus slack,
/// so Chrome is not reaped mid-scroll.
fn idle_budget(options: &RenderOptions) -> Duration {
    options.timeout + options.settle * 2 + options.scroll_pause * options.scroll_passes + Duration::from_secs(30)
}

/// Headless Chrome renderer. Each page gets a fresh browser, which keeps
/// long sleeps between cycles from leaving a dead connection behind.
pub struct BrowserRenderer {
    user_agent: String,
}

impl BrowserRenderer {
    pub fn new(config: &ScraperConfig) -> Self {
        Self { user_agent: config.user_agent.clone() }
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn open(&self, url: &str, options: &RenderOptions) -> Result<RenderedPage> {
        let page_url = url.to_string();
        let options = options.clone();
        let user_agent = self.user_agent.clone();

        let html = tokio::task::spawn_blocking(move || render_blocking(&page_url, &options, &user_agent))
            .await
            .context("Browser task panicked")??;
        Ok(RenderedPage::new(url, html))
    }
}

fn render_blocking(url: &str, options: &RenderOptions, user_agent: &str) -> Result<String> {
    let launch = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .window_size(Some((1920, 1080)))
        .idle_browser_timeout(idle_budget(options))
        .args(vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--mute-audio"),
            OsStr::new("--no-first-run"),
        ])
        .build()
        .map_err(|e| anyhow!("Invalid browser launch options: {e}"))?;

    let browser = Browser::new(launch).context("Failed to launch Chrome")?;
    let tab = browser.new_tab().context("Failed to open tab")?;
    tab.set_default_timeout(options.timeout);
    tab.set_user_agent(user_agent, None, None)?;

    debug!("Navigating to {}", url);
    tab.navigate_to(url)
        .and_then(|t| t.wait_until_navigated())
        .with_context(|| format!("Navigation to {} failed", url))?;
    wait_for_quiet(&tab, options.settle)?;

    for pass in 1..=options.scroll_passes {
        trace!("scroll {}/{} on {}", pass, options.scroll_passes, url);
        tab.evaluate(&scroll_script(options.scroll_step_px), false)
            .with_context(|| format!("Scroll {} on {} failed", pass, url))?;
        thread::sleep(options.scroll_pause);
    }
    if options.scroll_passes > 0 {
        wait_for_quiet(&tab, options.settle)?;
    }

    let html = tab.get_content().context("Could not read rendered document")?;
    if let Err(e) = tab.close(true) {
        trace!("closing tab: {:#}", e);
    }
    Ok(html)
}

/// Poll the document until its size stops changing or `max_wait` runs out.
/// Running out is not an error; whatever has loaded gets read.
fn wait_for_quiet(tab: &Tab, max_wait: Duration) -> Result<()> {
    let deadline = Instant::now() + max_wait;
    let mut tracker = QuietTracker::default();
    while Instant::now() < deadline {
        let size = tab
            .evaluate(DOCUMENT_SIZE_JS, false)?
            .value
            .and_then(|v| v.as_i64())
            .unwrap_or(-1);
        if tracker.observe(size) {
            trace!("document settled at {} bytes", size);
            return Ok(());
        }
        thread::sleep(SETTLE_POLL);
    }
    debug!("Document still changing after {:?}, reading it anyway", max_wait);
    Ok(())
}
