//! A single leased browser tab and the send-and-extract protocol run against it.
//!
//! The protocol itself (`send_message` and its helpers) is free functions
//! over a `PageHandle` rather than `Slot` methods: the pool drives the
//! browser without holding its own bookkeeping lock for the whole call, so
//! there is deliberately no `&Slot` borrow alive across the `.await`s here.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::clipboard::ClipboardExtractor;
use crate::driver::{Driver, PageHandle};
use crate::error::PoolError;

const MAX_PASTE_RETRIES: u32 = 3;
const UPLOAD_TIMEOUT_MS: u64 = 60_000;
const UPLOAD_POLL_INTERVAL_MS: u64 = 500;
pub(crate) const SEND_TIMEOUT_MARGIN_S: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Busy,
    Error,
}

impl SlotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Free => "free",
            SlotState::Busy => "busy",
            SlotState::Error => "error",
        }
    }
}

pub struct Slot {
    pub id: u32,
    pub page: PageHandle,
    state: SlotState,
    owner: Option<String>,
    lease_token: Option<String>,
    last_activity: Instant,
    message_count: u64,
    last_preview: Option<String>,
    is_sending: bool,
}

impl Slot {
    pub fn new(id: u32, page: PageHandle) -> Self {
        Self {
            id,
            page,
            state: SlotState::Free,
            owner: None,
            lease_token: None,
            last_activity: Instant::now(),
            message_count: 0,
            last_preview: None,
            is_sending: false,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    /// Mark this slot as mid-send (or done), so the background monitors
    /// leave it alone for the duration of a long-running browser drive.
    pub fn set_sending(&mut self, sending: bool) {
        self.is_sending = sending;
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn last_preview(&self) -> Option<&str> {
        self.last_preview.as_deref()
    }

    /// Record a completed send: bumps the per-lease message count and keeps
    /// a short preview of the reply for `get_status`.
    pub fn record_message(&mut self, response_text: &str) {
        self.message_count += 1;
        const PREVIEW_LEN: usize = 50;
        let preview: String = response_text.chars().take(PREVIEW_LEN).collect();
        self.last_preview = Some(preview);
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn lease_token(&self) -> Option<&str> {
        self.lease_token.as_deref()
    }

    pub fn is_free(&self) -> bool {
        self.state == SlotState::Free
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Lease this slot to `owner`, generating a fresh token. Callers must
    /// check `is_free()` first; this does not itself enforce FIFO ordering.
    pub fn acquire(&mut self, owner: String) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.owner = Some(owner);
        self.lease_token = Some(token.clone());
        self.state = SlotState::Busy;
        self.message_count = 0;
        self.last_preview = None;
        self.is_sending = false;
        self.touch();
        token
    }

    pub fn release(&mut self) {
        self.owner = None;
        self.lease_token = None;
        self.state = SlotState::Free;
        self.is_sending = false;
        self.touch();
    }

    pub fn mark_error(&mut self) {
        self.owner = None;
        self.lease_token = None;
        self.is_sending = false;
        self.state = SlotState::Error;
    }

    /// Force this slot to FREE regardless of its previous state, clearing
    /// owner and token — the only path (reset) that can free a still-BUSY
    /// slot out from under its lease holder.
    pub fn mark_free(&mut self) {
        self.owner = None;
        self.lease_token = None;
        self.is_sending = false;
        self.state = SlotState::Free;
        self.touch();
    }

    /// Validate that `token` matches the current lease. The `X-Lease-Token`
    /// header is the sole credential for send/release; the token already
    /// encodes which owner it was handed to.
    pub fn validate_lease(&self, token: &str) -> Result<(), PoolError> {
        if self.state != SlotState::Busy {
            return Err(PoolError::LeaseExpired(self.id));
        }
        match &self.lease_token {
            Some(t) if t == token => Ok(()),
            _ => Err(PoolError::InvalidToken(self.id)),
        }
    }
}

/// Run the full send-and-extract protocol on `page`: upload, paste, submit,
/// and wait for the reply. `response_timeout` bounds the reply wait only;
/// the caller should additionally bound the whole call with
/// `response_timeout + Duration::from_secs(SEND_TIMEOUT_MARGIN_S)`.
pub async fn send_message(
    driver: &Arc<dyn Driver>,
    extractor: &ClipboardExtractor,
    page: PageHandle,
    slot_id: u32,
    text: &str,
    files: &[String],
    response_timeout: Duration,
) -> Result<crate::clipboard::ExtractedResponse, PoolError> {
    let baseline_count = driver.response_count(page).await?;

    if !files.is_empty() {
        upload_files(driver, page, slot_id, files).await?;
    }

    paste_and_verify(driver, page, slot_id, text).await?;
    driver.press_enter(page).await?;

    let empty_check_deadline = Instant::now() + Duration::from_secs(2);
    let mut editor_cleared = false;
    while Instant::now() < empty_check_deadline {
        if driver.editor_text(page, "prompt_textarea").await?.trim().is_empty() {
            editor_cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let generating = driver.is_role_visible(page, "stop_button").await.unwrap_or(false);
    if !editor_cleared && !generating {
        // The Enter key sometimes fails to submit (focus loss, IME state);
        // fall back to an explicit click if nothing is visibly running.
        let _ = driver.click_role(page, "send_button", false).await;
    }

    extractor
        .extract_response(driver, page, slot_id, baseline_count, response_timeout)
        .await
}

async fn upload_files(
    driver: &Arc<dyn Driver>,
    page: PageHandle,
    slot_id: u32,
    files: &[String],
) -> Result<(), PoolError> {
    driver.upload_files(page, files).await?;

    let deadline = Instant::now() + Duration::from_millis(UPLOAD_TIMEOUT_MS);
    loop {
        if driver.send_affordance_disabled(page).await.map(|d| !d).unwrap_or(true) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(PoolError::Driver(format!(
                "upload did not complete within {UPLOAD_TIMEOUT_MS}ms on slot {slot_id}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(UPLOAD_POLL_INTERVAL_MS)).await;
    }
}

async fn paste_and_verify(
    driver: &Arc<dyn Driver>,
    page: PageHandle,
    slot_id: u32,
    text: &str,
) -> Result<(), PoolError> {
    let normalized_expected = normalize_text(text);

    for attempt in 1..=MAX_PASTE_RETRIES {
        driver.focus_and_clear(page, "prompt_textarea").await?;
        crate::clipboard::write_to_os_clipboard(text)?;
        driver.paste_shortcut(page, "prompt_textarea").await?;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let pasted = driver.editor_text(page, "prompt_textarea").await?;
        if normalize_text(&pasted) == normalized_expected {
            return Ok(());
        }

        tracing::warn!(
            slot_id,
            attempt,
            retries = MAX_PASTE_RETRIES,
            "pasted text did not match expected text, retrying"
        );
    }

    Err(PoolError::PasteVerificationFailed(slot_id, MAX_PASTE_RETRIES))
}

/// Trim, unify line endings, and collapse whitespace runs to a single space
/// so a pasted value can be compared against what was meant to be sent
/// regardless of how the editor reflows it.
fn normalize_text(text: &str) -> String {
    static WHITESPACE_RUN: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE_RUN.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    re.replace_all(unified.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_line_endings() {
        assert_eq!(normalize_text("  hello\r\nworld  \r  "), "hello world");
        assert_eq!(normalize_text("a\t\tb   c"), "a b c");
    }

    #[test]
    fn acquire_assigns_fresh_token_and_marks_busy() {
        let mut slot = Slot::new(0, PageHandle::default_for_test());
        let token = slot.acquire("owner-a".to_string());
        assert_eq!(slot.state(), SlotState::Busy);
        assert!(slot.validate_lease(&token).is_ok());
        assert!(matches!(
            slot.validate_lease("wrong-token"),
            Err(PoolError::InvalidToken(0))
        ));
    }

    #[test]
    fn release_returns_slot_to_free_with_no_owner() {
        let mut slot = Slot::new(1, PageHandle::default_for_test());
        slot.acquire("owner-a".to_string());
        slot.release();
        assert_eq!(slot.state(), SlotState::Free);
        assert_eq!(slot.owner(), None);
    }

    #[test]
    fn validate_lease_on_free_slot_is_lease_expired() {
        let slot = Slot::new(2, PageHandle::default_for_test());
        assert!(matches!(
            slot.validate_lease("anything"),
            Err(PoolError::LeaseExpired(2))
        ));
    }

    #[test]
    fn mark_free_clears_owner_even_when_forced_from_busy() {
        let mut slot = Slot::new(3, PageHandle::default_for_test());
        slot.acquire("owner-a".to_string());
        slot.mark_free();
        assert_eq!(slot.state(), SlotState::Free);
        assert_eq!(slot.owner(), None);
        assert_eq!(slot.lease_token(), None);
    }

    #[test]
    fn record_message_sets_count_and_truncated_preview() {
        let mut slot = Slot::new(4, PageHandle::default_for_test());
        slot.acquire("owner-a".to_string());
        slot.record_message(&"x".repeat(200));
        assert_eq!(slot.message_count(), 1);
        assert_eq!(slot.last_preview().unwrap().len(), 50);
    }
}
