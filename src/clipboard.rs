//! Response extraction: waiting for a reply to finish, then pulling its text
//! out through the OS clipboard (with in-page and DOM-scrape fallbacks).
//!
//! Extraction is serialized two ways. An intra-process `tokio::sync::Mutex`
//! keeps concurrent slots in this one process from stepping on each other's
//! clipboard writes, and an `fs2` advisory file lock extends that same
//! serialization across any other process on the machine that might also be
//! driving the OS clipboard (a second pool instance, a human at the
//! keyboard). The file lock is taken with `spawn_blocking` since `fs2`'s
//! locking call is synchronous.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::driver::{Driver, PageHandle};
use crate::error::PoolError;
use crate::selectors::{CLIPBOARD_SENTINEL, STOPPED_RESPONSE_INDICATORS};

const RESPONSE_POLL_INTERVAL_MS: u64 = 1_000;
const NEW_RESPONSE_TIMEOUT_MS: u64 = 30_000;
const SETTLE_MS: u64 = 1_500;
const COPY_SETTLE_MS: u64 = 800;

pub struct ClipboardExtractor {
    intra_process: AsyncMutex<()>,
    lock_file_path: PathBuf,
}

/// A successfully extracted response, tagged with how it was obtained:
/// a successful copy-button click yields the engine's rendered markdown,
/// while the DOM-scrape fallback only recovers plain rendered text.
pub struct ExtractedResponse {
    pub text: String,
    pub format: &'static str,
}

impl ClipboardExtractor {
    pub fn new(lock_file_path: PathBuf) -> Self {
        Self {
            intra_process: AsyncMutex::new(()),
            lock_file_path,
        }
    }

    /// Wait for a new response to a message sent against `baseline_count`
    /// (the response count observed just before sending) and return its
    /// text, preferring the OS clipboard over DOM scraping.
    pub async fn extract_response(
        &self,
        driver: &Arc<dyn Driver>,
        page: PageHandle,
        slot_id: u32,
        baseline_count: usize,
        response_timeout: Duration,
    ) -> Result<ExtractedResponse, PoolError> {
        self.wait_for_new_response(driver, page, slot_id, baseline_count)
            .await?;
        self.wait_for_generation_done(driver, page, slot_id, response_timeout)
            .await?;
        tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;
        self.check_stopped_or_empty(driver, page, slot_id).await?;
        self.copy_response(driver, page, slot_id).await
    }

    async fn wait_for_new_response(
        &self,
        driver: &Arc<dyn Driver>,
        page: PageHandle,
        slot_id: u32,
        baseline_count: usize,
    ) -> Result<(), PoolError> {
        let deadline = Instant::now() + Duration::from_millis(NEW_RESPONSE_TIMEOUT_MS);
        loop {
            let count = driver.response_count(page).await?;
            if count > baseline_count {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PoolError::SendTimeout(slot_id));
            }
            tokio::time::sleep(Duration::from_millis(RESPONSE_POLL_INTERVAL_MS)).await;
        }
    }

    async fn wait_for_generation_done(
        &self,
        driver: &Arc<dyn Driver>,
        page: PageHandle,
        slot_id: u32,
        response_timeout: Duration,
    ) -> Result<(), PoolError> {
        let deadline = Instant::now() + response_timeout;
        loop {
            let generating = driver.is_generating(page).await?;
            let stop_visible = driver.is_role_visible(page, "stop_button").await?;
            if !generating && !stop_visible {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PoolError::SendTimeout(slot_id));
            }
            tokio::time::sleep(Duration::from_millis(RESPONSE_POLL_INTERVAL_MS)).await;
        }
    }

    async fn check_stopped_or_empty(
        &self,
        driver: &Arc<dyn Driver>,
        page: PageHandle,
        slot_id: u32,
    ) -> Result<(), PoolError> {
        let text = driver.last_response_text(page).await?.unwrap_or_default();
        let lowered = text.to_lowercase();
        if STOPPED_RESPONSE_INDICATORS
            .iter()
            .any(|phrase| lowered.contains(phrase))
        {
            return Err(PoolError::ResponseStopped(slot_id));
        }
        if text.trim().is_empty() {
            return Err(PoolError::ResponseEmpty(slot_id));
        }
        Ok(())
    }

    async fn copy_response(
        &self,
        driver: &Arc<dyn Driver>,
        page: PageHandle,
        slot_id: u32,
    ) -> Result<ExtractedResponse, PoolError> {
        let _intra = self.intra_process.lock().await;
        let _file_guard = self.lock_cross_process().await?;

        write_os_clipboard(CLIPBOARD_SENTINEL)?;

        if !driver.click_copy_button(page).await? {
            tracing::warn!(slot_id, "copy button not found, falling back to DOM scrape");
            return dom_scrape(driver, page).await;
        }

        tokio::time::sleep(Duration::from_millis(COPY_SETTLE_MS)).await;

        match read_os_clipboard() {
            Ok(text) if !text.is_empty() && text != CLIPBOARD_SENTINEL => {
                return Ok(ExtractedResponse {
                    text,
                    format: "markdown",
                });
            }
            Ok(_) => {
                tracing::warn!(slot_id, "OS clipboard still holds the sentinel, trying fallbacks");
            }
            Err(e) => {
                tracing::warn!(slot_id, error = %e, "OS clipboard read failed, trying fallbacks");
            }
        }

        if let Some(text) = driver.read_in_page_clipboard(page).await? {
            if !text.is_empty() {
                return Ok(ExtractedResponse {
                    text,
                    format: "markdown",
                });
            }
        }

        tracing::warn!(slot_id, "in-page clipboard empty, falling back to DOM scrape");
        dom_scrape(driver, page).await
    }

    async fn lock_cross_process(&self) -> Result<FileLockGuard, PoolError> {
        let path = self.lock_file_path.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&path)
                .map_err(|e| PoolError::Driver(format!("opening clipboard lock file: {e}")))?;
            file.lock_exclusive()
                .map_err(|e| PoolError::Driver(format!("acquiring clipboard lock: {e}")))?;
            Ok(FileLockGuard { file })
        })
        .await
        .map_err(|e| PoolError::Driver(format!("lock task panicked: {e}")))?
    }
}

async fn dom_scrape(driver: &Arc<dyn Driver>, page: PageHandle) -> Result<ExtractedResponse, PoolError> {
    let text = driver.dom_scrape_response(page).await?;
    Ok(ExtractedResponse {
        text,
        format: "plaintext",
    })
}

/// Releases the `fs2` advisory lock when dropped.
struct FileLockGuard {
    file: std::fs::File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Write arbitrary text to the OS clipboard. Used both for the sentinel
/// write before a copy click and for pasting outbound message text into the
/// editor (bypassing the engine's native keyboard-typing path, which is too
/// slow and too easy to race against re-renders for long messages).
pub(crate) fn write_to_os_clipboard(text: &str) -> Result<(), PoolError> {
    write_os_clipboard(text)
}

fn write_os_clipboard(text: &str) -> Result<(), PoolError> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| PoolError::Driver(format!("opening clipboard: {e}")))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| PoolError::Driver(format!("writing clipboard: {e}")))
}

fn read_os_clipboard() -> Result<String, PoolError> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| PoolError::Driver(format!("opening clipboard: {e}")))?;
    clipboard
        .get_text()
        .map_err(|e| PoolError::Driver(format!("reading clipboard: {e}")))
}
