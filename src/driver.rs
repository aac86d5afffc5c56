//! Browser driver abstraction.
//!
//! `Driver` is the one interface between the pool/slot state machine and the
//! actual rendering engine. Everything DOM-shaped is expressed in terms of
//! the named roles in [`crate::selectors`] rather than raw CSS, so a UI
//! change is absorbed by editing the selector catalog alone. The trait is
//! mirrored with a blanket `Arc<T>` impl (the same pattern this codebase
//! uses for its other pluggable collaborators) so `Arc<ChromeDriver>` and
//! `Arc<StubDriver>` are interchangeable wherever a `Driver` is expected.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::page::Page;
use tokio::sync::Mutex;

use crate::config::BrowserConfig;
use crate::error::PoolError;
use crate::selectors;

/// Opaque handle to a browser tab. Carries no browser-specific state itself;
/// the concrete `Driver` implementation owns the mapping to a real page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle(u64);

impl PageHandle {
    /// A fixed handle for tests that exercise `Driver` stubs ignoring the
    /// handle's identity.
    pub fn default_for_test() -> Self {
        PageHandle(0)
    }
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// Idempotent launch. Reuses any initial tab the engine opens on its own.
    async fn start(&self) -> Result<(), PoolError>;

    /// Return a tab navigated to the target URL, cookies dismissed, model set.
    async fn create_slot_page(&self) -> Result<PageHandle, PoolError>;

    /// Open a bare blank tab with none of `create_slot_page`'s navigation,
    /// for use only as a last-resort distinct placeholder when the full
    /// dance fails repeatedly.
    async fn open_blank_page(&self) -> Result<PageHandle, PoolError>;

    /// Close `old` (best-effort) and create a fresh replacement tab.
    async fn restart_slot_page(&self, old: PageHandle) -> Result<PageHandle, PoolError>;

    /// Reset a tab to a fresh conversation, then re-ensure the preferred model.
    async fn navigate_to_new_chat(&self, page: PageHandle) -> Result<(), PoolError>;

    async fn is_logged_in(&self, page: PageHandle) -> bool;
    async fn is_enterprise(&self, page: PageHandle) -> bool;

    /// Poll `is_logged_in` until true or the login timeout elapses.
    async fn wait_for_login(&self, page: PageHandle) -> bool;

    /// Scan for bot-detection/session-expired/error-dialog indicators.
    /// Auto-dismisses a generic "try again" dialog when it is safe to do so.
    async fn detect_errors(&self, page: PageHandle) -> Option<String>;

    /// Cheap IPC ping, gated by the context-closed event flag.
    async fn check_context_alive(&self) -> bool;

    /// Evaluate a trivial expression in the tab; closed tabs are dead.
    async fn check_page_alive(&self, page: PageHandle) -> bool;

    /// Close and relaunch the whole browser context. Callers must recreate tabs.
    async fn restart_browser(&self) -> Result<(), PoolError>;

    /// Number of response-container elements currently rendered.
    async fn response_count(&self, page: PageHandle) -> Result<usize, PoolError>;

    /// Whether the newest response is still generating.
    async fn is_generating(&self, page: PageHandle) -> Result<bool, PoolError>;

    /// Visible text of the newest response container, if any exists.
    async fn last_response_text(&self, page: PageHandle) -> Result<Option<String>, PoolError>;

    /// Click the named role's affordance if present and visible.
    async fn click_role(&self, page: PageHandle, role: &str, force: bool)
        -> Result<bool, PoolError>;

    /// Whether the named role's affordance is currently visible.
    async fn is_role_visible(&self, page: PageHandle, role: &str) -> Result<bool, PoolError>;

    /// Click, select-all, backspace on the named editor role.
    async fn focus_and_clear(&self, page: PageHandle, role: &str) -> Result<(), PoolError>;

    async fn press_enter(&self, page: PageHandle) -> Result<(), PoolError>;

    /// Press paste (Ctrl+V) while the named editor role is focused.
    async fn paste_shortcut(&self, page: PageHandle, role: &str) -> Result<(), PoolError>;

    /// Current rendered text of the named editor role.
    async fn editor_text(&self, page: PageHandle, role: &str) -> Result<String, PoolError>;

    /// Attach files via a direct file input or the upload-button/chooser path.
    async fn upload_files(&self, page: PageHandle, files: &[String]) -> Result<(), PoolError>;

    /// Whether the send affordance still carries a disabled attribute.
    async fn send_affordance_disabled(&self, page: PageHandle) -> Result<bool, PoolError>;

    /// Click the copy affordance inside the newest response.
    async fn click_copy_button(&self, page: PageHandle) -> Result<bool, PoolError>;

    /// Read the in-page (JS) clipboard API as a fallback to the OS clipboard.
    async fn read_in_page_clipboard(&self, page: PageHandle) -> Result<Option<String>, PoolError>;

    /// Scrape the rendered markdown panel of the newest response directly.
    async fn dom_scrape_response(&self, page: PageHandle) -> Result<String, PoolError>;
}

#[async_trait]
impl<T: Driver + ?Sized> Driver for Arc<T> {
    async fn start(&self) -> Result<(), PoolError> {
        (**self).start().await
    }
    async fn create_slot_page(&self) -> Result<PageHandle, PoolError> {
        (**self).create_slot_page().await
    }
    async fn open_blank_page(&self) -> Result<PageHandle, PoolError> {
        (**self).open_blank_page().await
    }
    async fn restart_slot_page(&self, old: PageHandle) -> Result<PageHandle, PoolError> {
        (**self).restart_slot_page(old).await
    }
    async fn navigate_to_new_chat(&self, page: PageHandle) -> Result<(), PoolError> {
        (**self).navigate_to_new_chat(page).await
    }
    async fn is_logged_in(&self, page: PageHandle) -> bool {
        (**self).is_logged_in(page).await
    }
    async fn is_enterprise(&self, page: PageHandle) -> bool {
        (**self).is_enterprise(page).await
    }
    async fn wait_for_login(&self, page: PageHandle) -> bool {
        (**self).wait_for_login(page).await
    }
    async fn detect_errors(&self, page: PageHandle) -> Option<String> {
        (**self).detect_errors(page).await
    }
    async fn check_context_alive(&self) -> bool {
        (**self).check_context_alive().await
    }
    async fn check_page_alive(&self, page: PageHandle) -> bool {
        (**self).check_page_alive(page).await
    }
    async fn restart_browser(&self) -> Result<(), PoolError> {
        (**self).restart_browser().await
    }
    async fn response_count(&self, page: PageHandle) -> Result<usize, PoolError> {
        (**self).response_count(page).await
    }
    async fn is_generating(&self, page: PageHandle) -> Result<bool, PoolError> {
        (**self).is_generating(page).await
    }
    async fn last_response_text(&self, page: PageHandle) -> Result<Option<String>, PoolError> {
        (**self).last_response_text(page).await
    }
    async fn click_role(
        &self,
        page: PageHandle,
        role: &str,
        force: bool,
    ) -> Result<bool, PoolError> {
        (**self).click_role(page, role, force).await
    }
    async fn is_role_visible(&self, page: PageHandle, role: &str) -> Result<bool, PoolError> {
        (**self).is_role_visible(page, role).await
    }
    async fn focus_and_clear(&self, page: PageHandle, role: &str) -> Result<(), PoolError> {
        (**self).focus_and_clear(page, role).await
    }
    async fn press_enter(&self, page: PageHandle) -> Result<(), PoolError> {
        (**self).press_enter(page).await
    }
    async fn paste_shortcut(&self, page: PageHandle, role: &str) -> Result<(), PoolError> {
        (**self).paste_shortcut(page, role).await
    }
    async fn editor_text(&self, page: PageHandle, role: &str) -> Result<String, PoolError> {
        (**self).editor_text(page, role).await
    }
    async fn upload_files(&self, page: PageHandle, files: &[String]) -> Result<(), PoolError> {
        (**self).upload_files(page, files).await
    }
    async fn send_affordance_disabled(&self, page: PageHandle) -> Result<bool, PoolError> {
        (**self).send_affordance_disabled(page).await
    }
    async fn click_copy_button(&self, page: PageHandle) -> Result<bool, PoolError> {
        (**self).click_copy_button(page).await
    }
    async fn read_in_page_clipboard(&self, page: PageHandle) -> Result<Option<String>, PoolError> {
        (**self).read_in_page_clipboard(page).await
    }
    async fn dom_scrape_response(&self, page: PageHandle) -> Result<String, PoolError> {
        (**self).dom_scrape_response(page).await
    }
}

const LOGIN_TIMEOUT_MS: u64 = 300_000;
const LOGIN_POLL_INTERVAL_MS: u64 = 2_000;

/// chromiumoxide-backed `Driver`.
///
/// Owns one long-lived `Browser` (a persistent profile, one context) and a
/// table of the tabs handed out as [`PageHandle`]s.
pub struct ChromeDriver {
    config: BrowserConfig,
    browser: Mutex<Option<Browser>>,
    pages: Mutex<std::collections::HashMap<PageHandle, Page>>,
    next_handle: AtomicU64,
    context_dead: std::sync::atomic::AtomicBool,
}

impl ChromeDriver {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
            pages: Mutex::new(std::collections::HashMap::new()),
            next_handle: AtomicU64::new(0),
            context_dead: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn allocate_handle(&self) -> PageHandle {
        PageHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    async fn page_for(&self, handle: PageHandle) -> Result<Page, PoolError> {
        self.pages
            .lock()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| PoolError::Driver(format!("unknown page handle {:?}", handle)))
    }

    /// Open a fresh tab at an arbitrary URL, bypassing the target-app
    /// navigation/model-selection dance in [`Driver::create_slot_page`].
    /// Used by the diagnostic login probe, which needs to land on the base
    /// auth domain rather than the configured target variant.
    pub async fn open_page(&self, url: &str) -> Result<PageHandle, PoolError> {
        let browser = self.browser.lock().await;
        let browser = browser
            .as_ref()
            .ok_or_else(|| PoolError::Driver("browser not started".into()))?;
        let page = browser
            .new_page(url)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        let handle = self.allocate_handle();
        self.pages.lock().await.insert(handle, page);
        Ok(handle)
    }

    /// The raw chromiumoxide page behind a handle, for callers that need
    /// direct CDP access beyond what [`Driver`] exposes (the login probe).
    pub async fn raw_page(&self, handle: PageHandle) -> Result<Page, PoolError> {
        self.page_for(handle).await
    }

    fn clean_stale_profile_locks(profile_dir: &PathBuf) {
        for name in ["SingletonLock", "SingletonCookie", "SingletonSocket"] {
            let _ = std::fs::remove_file(profile_dir.join(name));
        }
    }

    async fn navigate_to_target(&self, page: &Page) -> Result<(), PoolError> {
        let mut last_err = None;
        for attempt in 1..=self.config.navigation_retries {
            let timeout = Duration::from_millis(self.config.navigation_timeout_ms);
            let result: Result<(), PoolError> = async {
                tokio::time::timeout(timeout, page.goto(&self.config.target_url))
                    .await
                    .map_err(|_| PoolError::Driver("navigation timed out".into()))?
                    .map_err(|e| PoolError::Driver(e.to_string()))?;
                tokio::time::timeout(
                    timeout,
                    page.wait_for_navigation(),
                )
                .await
                .map_err(|_| PoolError::Driver("waiting for load timed out".into()))?
                .map_err(|e| PoolError::Driver(e.to_string()))?;
                tokio::time::sleep(Duration::from_millis(1000)).await;
                Ok(())
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(attempt, retries = self.config.navigation_retries, error = %e, "navigation attempt failed");
                    last_err = Some(e);
                    if attempt < self.config.navigation_retries {
                        tokio::time::sleep(Duration::from_millis(2000)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| PoolError::Driver("navigation failed".into())))
    }

    async fn dismiss_cookie_consent(&self, page: &Page) {
        if let Ok(Some(el)) = page.find_element(selectors::COOKIE_ACCEPT_BTN).await.map(Some) {
            let _ = el.click().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    async fn ensure_preferred_model(&self, page: &Page) -> Result<(), PoolError> {
        let preferred = self.config.preferred_model.trim();
        if preferred.is_empty() {
            return Ok(());
        }

        let selector = selectors::combined("model_selector").expect("model_selector role exists");
        let model_btn = match tokio::time::timeout(
            Duration::from_millis(10_000),
            page.find_element(&selector),
        )
        .await
        {
            Ok(Ok(el)) => el,
            _ => {
                tracing::warn!("model selector button not found after 10s, skipping model switch");
                return Ok(());
            }
        };

        let current = model_btn
            .inner_text()
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?
            .unwrap_or_default();
        let current_first_line = current.lines().next().unwrap_or("").trim();

        if matches_preferred(current_first_line, preferred) {
            return Ok(());
        }

        model_btn.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(800)).await;

        let item_selector = selectors::combined("model_menu_item").expect("role exists");
        let items = page
            .find_elements(&item_selector)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;

        let mut clicked = false;
        for item in &items {
            let text = item
                .inner_text()
                .await
                .map_err(|e| PoolError::Driver(e.to_string()))?
                .unwrap_or_default();
            let first_line = text.lines().next().unwrap_or("").trim();
            if matches_preferred(first_line, preferred) {
                item.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
                clicked = true;
                break;
            }
        }

        if !clicked {
            tracing::warn!(preferred, "could not find preferred model in menu, closing menu");
            let _ = page.press_key("Escape").await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }
}

/// Whole-word, case-insensitive match: `preferred` must equal the candidate
/// or appear as a separate word within it. Never a bare substring check —
/// that would let "Pro" match "Probleme".
fn matches_preferred(candidate: &str, preferred: &str) -> bool {
    let candidate = candidate.to_lowercase();
    let preferred = preferred.to_lowercase();
    if candidate == preferred {
        return true;
    }
    candidate
        .split_whitespace()
        .any(|word| word == preferred)
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn start(&self) -> Result<(), PoolError> {
        let mut guard = self.browser.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let profile_dir = self.config.resolved_profile_dir();
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| PoolError::Driver(format!("creating profile dir: {e}")))?;
        Self::clean_stale_profile_locks(&profile_dir);

        let cdp_config = CdpBrowserConfig::builder()
            .user_data_dir(&profile_dir)
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: 1280,
                height: 900,
                ..Default::default()
            })
            .args(vec![
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-session-crashed-bubble",
            ]);
        let cdp_config = if self.config.headless {
            cdp_config.new_headless_mode()
        } else {
            cdp_config.with_head()
        }
        .build()
        .map_err(PoolError::Driver)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;

        tokio::spawn(async move { while handler.next().await.is_some() {} });

        *guard = Some(browser);
        self.context_dead.store(false, Ordering::Relaxed);
        tracing::info!(headless = self.config.headless, profile = %profile_dir.display(), "browser started");
        Ok(())
    }

    async fn create_slot_page(&self) -> Result<PageHandle, PoolError> {
        let browser = self.browser.lock().await;
        let browser = browser
            .as_ref()
            .ok_or_else(|| PoolError::Driver("browser not started".into()))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;

        self.navigate_to_target(&page).await?;
        self.dismiss_cookie_consent(&page).await;
        self.ensure_preferred_model(&page).await?;

        let handle = self.allocate_handle();
        self.pages.lock().await.insert(handle, page);
        Ok(handle)
    }

    async fn open_blank_page(&self) -> Result<PageHandle, PoolError> {
        self.open_page("about:blank").await
    }

    async fn restart_slot_page(&self, old: PageHandle) -> Result<PageHandle, PoolError> {
        if let Some(page) = self.pages.lock().await.remove(&old) {
            let _ = page.close().await;
        }
        self.create_slot_page().await
    }

    async fn navigate_to_new_chat(&self, page: PageHandle) -> Result<(), PoolError> {
        let page = self.page_for(page).await?;
        self.navigate_to_target(&page).await?;
        self.ensure_preferred_model(&page).await
    }

    async fn is_logged_in(&self, page: PageHandle) -> bool {
        let Ok(page) = self.page_for(page).await else {
            return false;
        };
        let Ok(url) = page.url().await else {
            return false;
        };
        let Some(url) = url else { return false };
        if !url.contains("gemini.google.com") {
            return false;
        }
        if page.find_element(selectors::ENTERPRISE_INDICATORS).await.is_ok() {
            return true;
        }
        if page
            .find_element("a[aria-label*=\"Google-Konto:\"], a[aria-label*=\"Google Account:\"]")
            .await
            .is_ok()
        {
            return true;
        }
        page.find_element("rich-textarea").await.is_ok()
    }

    async fn is_enterprise(&self, page: PageHandle) -> bool {
        let Ok(page) = self.page_for(page).await else {
            return false;
        };
        page.find_element(selectors::ENTERPRISE_INDICATORS).await.is_ok()
    }

    async fn wait_for_login(&self, page: PageHandle) -> bool {
        let mut elapsed = 0u64;
        let mut reloaded = false;
        while elapsed < LOGIN_TIMEOUT_MS {
            if let Ok(p) = self.page_for(page).await {
                if let Ok(Some(url)) = p.url().await {
                    if url.contains("gemini.google.com") && elapsed > 0 && !reloaded {
                        if let Ok(has_zero) = p
                            .evaluate("document.body.classList.contains('zero-state-theme')")
                            .await
                            .and_then(|v| v.into_value::<bool>())
                        {
                            if has_zero {
                                let _ = p.reload().await;
                                tokio::time::sleep(Duration::from_millis(3000)).await;
                                reloaded = true;
                            }
                        }
                    }
                }
            }
            if self.is_logged_in(page).await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(LOGIN_POLL_INTERVAL_MS)).await;
            elapsed += LOGIN_POLL_INTERVAL_MS;
        }
        false
    }

    async fn detect_errors(&self, page: PageHandle) -> Option<String> {
        let page = self.page_for(page).await.ok()?;

        if page.find_element(selectors::BOT_DETECTION).await.is_ok() {
            return Some("google_bot_detection".into());
        }
        if page
            .find_element(selectors::SESSION_EXPIRED_INDICATORS)
            .await
            .is_ok()
        {
            return Some("session_expired".into());
        }
        if let Ok(el) = page.find_element(selectors::ERROR_DIALOGS).await {
            let _ = el.click().await;
            tokio::time::sleep(Duration::from_millis(1000)).await;
            return Some("error_dialog_dismissed".into());
        }
        None
    }

    async fn check_context_alive(&self) -> bool {
        if self.context_dead.load(Ordering::Relaxed) {
            return false;
        }
        let browser = self.browser.lock().await;
        let Some(browser) = browser.as_ref() else {
            return false;
        };
        if browser.version().await.is_err() {
            self.context_dead.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    async fn check_page_alive(&self, page: PageHandle) -> bool {
        let Ok(page) = self.page_for(page).await else {
            return false;
        };
        page.evaluate("document.readyState").await.is_ok()
    }

    async fn restart_browser(&self) -> Result<(), PoolError> {
        tracing::warn!("restarting browser context");
        {
            let mut guard = self.browser.lock().await;
            if let Some(browser) = guard.take() {
                let _ = browser.close().await;
            }
        }
        self.pages.lock().await.clear();
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.start().await
    }

    async fn response_count(&self, page: PageHandle) -> Result<usize, PoolError> {
        let page = self.page_for(page).await?;
        let elements = page
            .find_elements(selectors::RESPONSE_CONTAINER)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        Ok(elements.len())
    }

    async fn is_generating(&self, page: PageHandle) -> Result<bool, PoolError> {
        let page = self.page_for(page).await?;
        let busy = !page
            .find_elements(selectors::GENERATION_BUSY)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?
            .is_empty();
        if busy {
            return Ok(true);
        }
        let stop_selector = selectors::combined("stop_button").expect("role exists");
        Ok(page.find_element(&stop_selector).await.is_ok())
    }

    async fn last_response_text(&self, page: PageHandle) -> Result<Option<String>, PoolError> {
        let page = self.page_for(page).await?;
        let responses = page
            .find_elements(selectors::RESPONSE_CONTAINER)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        let Some(last) = responses.last() else {
            return Ok(None);
        };
        let text = last
            .inner_text()
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?
            .unwrap_or_default();
        Ok(Some(text))
    }

    async fn click_role(
        &self,
        page: PageHandle,
        role: &str,
        force: bool,
    ) -> Result<bool, PoolError> {
        let page = self.page_for(page).await?;
        let selector =
            selectors::combined(role).ok_or_else(|| PoolError::Driver(format!("unknown role {role}")))?;
        match page.find_element(&selector).await {
            Ok(el) => {
                let _ = force;
                el.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn is_role_visible(&self, page: PageHandle, role: &str) -> Result<bool, PoolError> {
        let page = self.page_for(page).await?;
        let selector =
            selectors::combined(role).ok_or_else(|| PoolError::Driver(format!("unknown role {role}")))?;
        Ok(page.find_element(&selector).await.is_ok())
    }

    async fn focus_and_clear(&self, page: PageHandle, role: &str) -> Result<(), PoolError> {
        let page = self.page_for(page).await?;
        let selector =
            selectors::combined(role).ok_or_else(|| PoolError::Driver(format!("unknown role {role}")))?;
        let el = page
            .find_element(&selector)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        el.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        page.press_key("Control+A")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        page.press_key("Backspace")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    async fn press_enter(&self, page: PageHandle) -> Result<(), PoolError> {
        let page = self.page_for(page).await?;
        page.press_key("Enter")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        Ok(())
    }

    async fn paste_shortcut(&self, page: PageHandle, _role: &str) -> Result<(), PoolError> {
        let page = self.page_for(page).await?;
        page.press_key("Control+V")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        Ok(())
    }

    async fn editor_text(&self, page: PageHandle, role: &str) -> Result<String, PoolError> {
        let page = self.page_for(page).await?;
        let selector =
            selectors::combined(role).ok_or_else(|| PoolError::Driver(format!("unknown role {role}")))?;
        let el = page
            .find_element(&selector)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        Ok(el
            .inner_text()
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?
            .unwrap_or_default())
    }

    async fn upload_files(&self, page: PageHandle, files: &[String]) -> Result<(), PoolError> {
        let page = self.page_for(page).await?;

        if let Ok(input) = page.find_element("input[type=\"file\"]").await {
            input
                .set_input_files(files.to_vec())
                .await
                .map_err(|e| PoolError::Driver(e.to_string()))?;
            return Ok(());
        }

        let upload_selector = concat!(
            "button.upload-card-button, ",
            "button[aria-label*=\"Datei hochladen\"], ",
            "button[aria-label*=\"Upload file\"]"
        );
        let upload_btn = page
            .find_element(upload_selector)
            .await
            .map_err(|_| PoolError::Driver("no upload button or file input found".into()))?;
        upload_btn.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;

        // chromiumoxide surfaces the resulting file-chooser input directly;
        // locate it after the click and supply the files.
        let input = page
            .find_element("input[type=\"file\"]")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        input
            .set_input_files(files.to_vec())
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        Ok(())
    }

    async fn send_affordance_disabled(&self, page: PageHandle) -> Result<bool, PoolError> {
        let page = self.page_for(page).await?;
        let selector = concat!(
            "button.send-button[disabled], ",
            "button.send-button.disabled, ",
            "button[aria-label=\"Nachricht senden\"][disabled]"
        );
        Ok(page.find_element(selector).await.is_ok())
    }

    async fn click_copy_button(&self, page: PageHandle) -> Result<bool, PoolError> {
        let page = self.page_for(page).await?;
        let responses = page
            .find_elements(selectors::RESPONSE_CONTAINER)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        let Some(last) = responses.last() else {
            return Ok(false);
        };

        if let Ok(btn) = last.find_element("button[data-test-id=\"copy-button\"]").await {
            btn.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
            return Ok(true);
        }
        if let Ok(btn) = last
            .find_element("button[aria-label=\"Kopieren\"], button[aria-label=\"Copy\"]")
            .await
        {
            btn.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
            return Ok(true);
        }
        let page_wide = page
            .find_elements("button[data-test-id=\"copy-button\"]")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        if let Some(btn) = page_wide.last() {
            btn.click().await.map_err(|e| PoolError::Driver(e.to_string()))?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn read_in_page_clipboard(&self, page: PageHandle) -> Result<Option<String>, PoolError> {
        let page = self.page_for(page).await?;
        let value = page
            .evaluate("navigator.clipboard.readText()")
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?
            .into_value::<String>()
            .unwrap_or_default();
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    async fn dom_scrape_response(&self, page: PageHandle) -> Result<String, PoolError> {
        let page = self.page_for(page).await?;
        let responses = page
            .find_elements(selectors::RESPONSE_CONTAINER)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        if let Some(last) = responses.last() {
            if let Ok(markdown) = last.find_element(selectors::RESPONSE_TEXT).await {
                return Ok(markdown
                    .inner_text()
                    .await
                    .map_err(|e| PoolError::Driver(e.to_string()))?
                    .unwrap_or_default());
            }
            return Ok(last
                .inner_text()
                .await
                .map_err(|e| PoolError::Driver(e.to_string()))?
                .unwrap_or_default());
        }
        let panels = page
            .find_elements(selectors::RESPONSE_TEXT)
            .await
            .map_err(|e| PoolError::Driver(e.to_string()))?;
        if let Some(last) = panels.last() {
            return Ok(last
                .inner_text()
                .await
                .map_err(|e| PoolError::Driver(e.to_string()))?
                .unwrap_or_default());
        }
        Ok(String::new())
    }
}
