//! The fleet of slots, the FIFO wait queue, and the background monitors that
//! keep them healthy.
//!
//! All mutable pool state lives behind one `tokio::sync::Mutex`, guarded
//! just long enough to make a decision; the mutex is never held across an
//! `.await` that drives the browser. That keeps the locking discipline
//! trivial to reason about at the cost of serializing pool-state decisions
//! (acquiring, releasing, queue bookkeeping) across slots — acceptable,
//! since those decisions are themselves sub-millisecond.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::clipboard::ClipboardExtractor;
use crate::config::{AppConfig, HealthConfig, PoolConfig};
use crate::driver::Driver;
use crate::error::PoolError;
use crate::slot::{Slot, SlotState};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AcquireResult {
    #[serde(rename = "acquired")]
    Acquired {
        slot_id: u32,
        lease_token: String,
        reattached: bool,
        expires_after_inactive_s: u64,
    },
    #[serde(rename = "queued")]
    Queued {
        queue_position: usize,
        estimated_wait_s: u64,
    },
    #[serde(rename = "rejected")]
    Rejected {
        error: &'static str,
        total_slots: usize,
        queue_depth: usize,
        queue_max: usize,
    },
}

struct QueueEntry {
    owner: String,
    queued_at: Instant,
}

struct PoolState {
    slots: Vec<Slot>,
    queue: VecDeque<QueueEntry>,
}

pub struct Pool {
    state: Mutex<PoolState>,
    driver: Arc<dyn Driver>,
    extractor: ClipboardExtractor,
    pool_config: PoolConfig,
    health_config: HealthConfig,
    response_timeout: Duration,
    max_files_per_turn: usize,
    started_at: Instant,
    login_ok: AtomicBool,
    last_health_check: Mutex<Option<Instant>>,
}

const ESTIMATED_SLOT_TURNAROUND_S: u64 = 30;

impl Pool {
    pub fn new(
        slots: Vec<Slot>,
        driver: Arc<dyn Driver>,
        extractor: ClipboardExtractor,
        config: &AppConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState {
                slots,
                queue: VecDeque::new(),
            }),
            driver,
            extractor,
            pool_config: config.pool.clone(),
            health_config: config.health.clone(),
            response_timeout: Duration::from_millis(config.browser.response_timeout_ms),
            max_files_per_turn: config.browser.max_files_per_turn,
            started_at: Instant::now(),
            login_ok: AtomicBool::new(true),
            last_health_check: Mutex::new(None),
        })
    }

    /// Lease a slot to `owner`, queue the request, or reject it outright.
    ///
    /// Idempotent: calling this again with the same `owner` while they
    /// already hold (or are queued for) a slot returns the same assignment
    /// rather than creating a second one.
    pub async fn acquire(&self, owner: String) -> AcquireResult {
        let mut state = self.state.lock().await;

        if let Some(slot) = state.slots.iter().find(|s| s.is_owned_by(&owner)) {
            return AcquireResult::Acquired {
                slot_id: slot.id,
                lease_token: slot.lease_token().unwrap_or_default().to_string(),
                reattached: true,
                expires_after_inactive_s: self.pool_config.inactivity_timeout_s,
            };
        }

        if let Some(pos) = state.queue.iter().position(|e| e.owner == owner) {
            return AcquireResult::Queued {
                queue_position: pos + 1,
                estimated_wait_s: ((pos + 1) as u64) * ESTIMATED_SLOT_TURNAROUND_S,
            };
        }

        if let Some(slot) = state.slots.iter_mut().find(|s| s.is_free()) {
            let token = slot.acquire(owner);
            return AcquireResult::Acquired {
                slot_id: slot.id,
                lease_token: token,
                reattached: false,
                expires_after_inactive_s: self.pool_config.inactivity_timeout_s,
            };
        }

        if state.queue.len() < self.pool_config.max_queue_depth {
            state.queue.push_back(QueueEntry {
                owner,
                queued_at: Instant::now(),
            });
            return AcquireResult::Queued {
                queue_position: state.queue.len(),
                estimated_wait_s: (state.queue.len() as u64) * ESTIMATED_SLOT_TURNAROUND_S,
            };
        }

        AcquireResult::Rejected {
            error: "pool_exhausted",
            total_slots: state.slots.len(),
            queue_depth: state.queue.len(),
            queue_max: self.pool_config.max_queue_depth,
        }
    }

    /// Release a held slot back to the pool and hand it to the next queued
    /// owner, if any. Resets the tab to a new chat in the background once
    /// there is no new owner to hand it to directly.
    pub async fn release(&self, slot_id: u32, token: &str) -> Result<(), PoolError> {
        let mut state = self.state.lock().await;
        let slot = get_slot_mut(&mut state.slots, slot_id)?;
        slot.validate_lease(token)?;
        slot.release();

        self.assign_next_in_queue(&mut state).await;
        let still_free = state
            .slots
            .iter()
            .any(|s| s.id == slot_id && s.is_free());
        drop(state);

        if still_free {
            let driver = self.driver.clone();
            let page = self.page_for(slot_id).await;
            if let Some(page) = page {
                tokio::spawn(async move {
                    if let Err(e) = driver.navigate_to_new_chat(page).await {
                        tracing::warn!(slot_id, error = %e, "background new-chat navigation failed");
                    }
                });
            }
        }

        Ok(())
    }

    async fn page_for(&self, slot_id: u32) -> Option<crate::driver::PageHandle> {
        let state = self.state.lock().await;
        state.slots.iter().find(|s| s.id == slot_id).map(|s| s.page)
    }

    async fn assign_next_in_queue(&self, state: &mut PoolState) {
        let Some(free_idx) = state.slots.iter().position(Slot::is_free) else {
            return;
        };
        let Some(entry) = state.queue.pop_front() else {
            return;
        };
        let wait = entry.queued_at.elapsed();
        let slot = &mut state.slots[free_idx];
        let token = slot.acquire(entry.owner.clone());
        tracing::info!(
            slot_id = slot.id,
            owner = %entry.owner,
            wait_s = wait.as_secs_f64(),
            "assigned queued request to freed slot"
        );
        let _ = token;
    }

    /// Validate the lease, then run the send-and-extract protocol.
    pub async fn send(
        &self,
        slot_id: u32,
        token: &str,
        text: &str,
        files: &[String],
    ) -> Result<crate::clipboard::ExtractedResponse, PoolError> {
        if files.len() > self.max_files_per_turn {
            return Err(PoolError::Validation(format!(
                "at most {} files may be attached per turn, got {}",
                self.max_files_per_turn,
                files.len()
            )));
        }

        let page = {
            let mut state = self.state.lock().await;
            let slot = get_slot_mut(&mut state.slots, slot_id)?;
            slot.validate_lease(token)?;
            slot.touch();
            slot.set_sending(true);
            slot.page
        };

        let outer_timeout =
            self.response_timeout + Duration::from_secs(crate::slot::SEND_TIMEOUT_MARGIN_S);

        // Deliberately unlocked for the duration of the drive: this is the
        // one call in the pool that can run for minutes, and it must not
        // block acquire/release/status for every other slot meanwhile.
        let send_fut = crate::slot::send_message(
            &self.driver,
            &self.extractor,
            page,
            slot_id,
            text,
            files,
            self.response_timeout,
        );
        let result = tokio::time::timeout(outer_timeout, send_fut).await;

        let mut state = self.state.lock().await;
        let Ok(slot) = get_slot_mut(&mut state.slots, slot_id) else {
            return result.unwrap_or(Err(PoolError::SendTimeout(slot_id)));
        };
        match result {
            Ok(Ok(extracted)) => {
                slot.touch();
                slot.set_sending(false);
                slot.record_message(&extracted.text);
                Ok(extracted)
            }
            Ok(Err(e)) => {
                slot.mark_error();
                Err(e)
            }
            Err(_) => {
                slot.mark_error();
                Err(PoolError::SendTimeout(slot_id))
            }
        }
    }

    pub async fn get_status(&self) -> PoolStatus {
        let state = self.state.lock().await;

        let slots = state
            .slots
            .iter()
            .map(|s| SlotSnapshot {
                id: s.id,
                state: s.state().as_str(),
                owner: s.owner().map(str::to_string),
                idle_s: (s.state() == SlotState::Busy).then(|| s.idle_for().as_secs()),
                message_count: (s.state() == SlotState::Busy).then(|| s.message_count()),
                preview: s.last_preview().map(str::to_string),
            })
            .collect();

        let queue = state
            .queue
            .iter()
            .enumerate()
            .map(|(i, entry)| QueueSnapshot {
                owner: entry.owner.clone(),
                wait_s: entry.queued_at.elapsed().as_secs(),
                position: i + 1,
            })
            .collect();

        let total_slots = state.slots.len();
        let free_slots = state.slots.iter().filter(|s| s.state() == SlotState::Free).count();
        let busy_slots = state.slots.iter().filter(|s| s.state() == SlotState::Busy).count();
        let error_slots = state.slots.iter().filter(|s| s.state() == SlotState::Error).count();
        let queue_depth = state.queue.len();
        drop(state);

        let last_health_check_age_s = self
            .last_health_check
            .lock()
            .await
            .map(|t| t.elapsed().as_secs());

        PoolStatus {
            slots,
            queue,
            total_slots,
            free_slots,
            busy_slots,
            error_slots,
            queue_depth,
            queue_max: self.pool_config.max_queue_depth,
            system: SystemSnapshot {
                driver_up: self.driver.check_context_alive().await,
                login_ok: self.login_ok.load(Ordering::Relaxed),
                uptime_s: self.started_at.elapsed().as_secs(),
                last_health_check_age_s,
            },
        }
    }

    /// Re-home `slot_id` onto a freshly navigated tab and return it to FREE.
    /// Returns the slot's resulting state so callers can report it without a
    /// second round trip.
    pub async fn reset_slot(&self, slot_id: u32) -> Result<SlotState, PoolError> {
        let page = {
            let state = self.state.lock().await;
            get_slot(&state.slots, slot_id)?.page
        };
        let new_page = self.driver.restart_slot_page(page).await?;
        let mut state = self.state.lock().await;
        let slot = get_slot_mut(&mut state.slots, slot_id)?;
        slot.page = new_page;
        slot.mark_free();
        let resulting_state = slot.state();
        self.assign_next_in_queue(&mut state).await;
        Ok(resulting_state)
    }

    /// Full pool reset: drop every lease and queued entry, restart the
    /// browser context, and recreate every tab from scratch. A tab that
    /// fails to recreate is left ERROR rather than aborting the whole
    /// reset. Returns the count of slots that ended up FREE.
    pub async fn reset_all(&self) -> Result<usize, PoolError> {
        let ids: Vec<u32> = {
            let mut state = self.state.lock().await;
            state.queue.clear();
            state.slots.iter().map(|s| s.id).collect()
        };

        self.driver.restart_browser().await?;

        for id in ids {
            match self.driver.create_slot_page().await {
                Ok(page) => {
                    let mut state = self.state.lock().await;
                    if let Ok(slot) = get_slot_mut(&mut state.slots, id) {
                        slot.page = page;
                        slot.mark_free();
                    }
                }
                Err(e) => {
                    tracing::error!(slot_id = id, error = %e, "failed to recreate tab during pool reset");
                    let mut state = self.state.lock().await;
                    if let Ok(slot) = get_slot_mut(&mut state.slots, id) {
                        slot.mark_error();
                    }
                }
            }
        }

        let state = self.state.lock().await;
        Ok(state.slots.iter().filter(|s| s.is_free()).count())
    }

    /// Spawn the inactivity and health background monitors. Holds only a
    /// weak reference to `self` so the monitors die once the pool does.
    pub fn start_monitors(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let inactivity_interval =
            Duration::from_secs(self.health_config.inactivity_check_interval_s);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(inactivity_interval);
            loop {
                tick.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                pool.inactivity_tick().await;
            }
        });

        let weak = Arc::downgrade(self);
        let health_interval = Duration::from_secs(self.health_config.check_interval_s);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(health_interval);
            loop {
                tick.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                pool.health_tick().await;
            }
        });
    }

    async fn inactivity_tick(&self) {
        let timeout = Duration::from_secs(self.pool_config.inactivity_timeout_s);
        let expired: Vec<u32> = {
            let state = self.state.lock().await;
            state
                .slots
                .iter()
                .filter(|s| s.state() == SlotState::Busy && !s.is_sending() && s.idle_for() >= timeout)
                .map(|s| s.id)
                .collect()
        };

        for slot_id in expired {
            tracing::info!(slot_id, "releasing slot idle past inactivity timeout");
            let mut state = self.state.lock().await;
            if let Ok(slot) = get_slot_mut(&mut state.slots, slot_id) {
                slot.release();
            }
            self.assign_next_in_queue(&mut state).await;
            let still_free = state
                .slots
                .iter()
                .any(|s| s.id == slot_id && s.is_free());
            drop(state);

            if still_free {
                let driver = self.driver.clone();
                if let Some(page) = self.page_for(slot_id).await {
                    tokio::spawn(async move {
                        let _ = driver.navigate_to_new_chat(page).await;
                    });
                }
            }
        }
    }

    async fn health_tick(&self) {
        *self.last_health_check.lock().await = Some(Instant::now());

        let any_busy = {
            let state = self.state.lock().await;
            state.slots.iter().any(|s| s.state() == SlotState::Busy)
        };
        if !any_busy {
            // Nothing busy, nothing to gain by probing — and probing can
            // steal window focus on some platforms.
            return;
        }

        if !self.driver.check_context_alive().await {
            tracing::error!("browser context is dead, restarting");
            if let Err(e) = self.driver.restart_browser().await {
                tracing::error!(error = %e, "failed to restart browser context");
            }
            return;
        }

        let ids: Vec<(u32, crate::driver::PageHandle)> = {
            let state = self.state.lock().await;
            state
                .slots
                .iter()
                .filter(|s| s.state() != SlotState::Error && !s.is_sending())
                .map(|s| (s.id, s.page))
                .collect()
        };

        let mut checked_login = false;
        for (id, page) in ids {
            if !self.driver.check_page_alive(page).await {
                tracing::warn!(slot_id = id, "slot page is dead, marking error");
                let mut state = self.state.lock().await;
                if let Ok(slot) = get_slot_mut(&mut state.slots, id) {
                    slot.mark_error();
                }
                continue;
            }

            if !checked_login {
                checked_login = true;
                let logged_in = self.driver.is_logged_in(page).await;
                self.login_ok.store(logged_in, Ordering::Relaxed);
                if !logged_in {
                    tracing::error!(slot_id = id, "session appears logged out");
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        tracing::info!("pool shutting down");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSnapshot {
    pub id: u32,
    pub state: &'static str,
    pub owner: Option<String>,
    pub idle_s: Option<u64>,
    pub message_count: Option<u64>,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub owner: String,
    pub wait_s: u64,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub driver_up: bool,
    pub login_ok: bool,
    pub uptime_s: u64,
    pub last_health_check_age_s: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub slots: Vec<SlotSnapshot>,
    pub queue: Vec<QueueSnapshot>,
    pub total_slots: usize,
    pub free_slots: usize,
    pub busy_slots: usize,
    pub error_slots: usize,
    pub queue_depth: usize,
    pub queue_max: usize,
    pub system: SystemSnapshot,
}

fn get_slot(slots: &[Slot], slot_id: u32) -> Result<&Slot, PoolError> {
    slots.iter().find(|s| s.id == slot_id).ok_or(PoolError::NotFound(slot_id))
}

fn get_slot_mut(slots: &mut [Slot], slot_id: u32) -> Result<&mut Slot, PoolError> {
    slots.iter_mut().find(|s| s.id == slot_id).ok_or(PoolError::NotFound(slot_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PageHandle;
    use async_trait::async_trait;

    /// A `Driver` that never touches a real browser, for pool-level tests
    /// that only exercise queue and lease bookkeeping.
    struct NoopDriver;

    #[async_trait]
    impl Driver for NoopDriver {
        async fn start(&self) -> Result<(), PoolError> {
            Ok(())
        }
        async fn create_slot_page(&self) -> Result<PageHandle, PoolError> {
            Ok(PageHandle::default_for_test())
        }
        async fn open_blank_page(&self) -> Result<PageHandle, PoolError> {
            Ok(PageHandle::default_for_test())
        }
        async fn restart_slot_page(&self, _old: PageHandle) -> Result<PageHandle, PoolError> {
            Ok(PageHandle::default_for_test())
        }
        async fn navigate_to_new_chat(&self, _page: PageHandle) -> Result<(), PoolError> {
            Ok(())
        }
        async fn is_logged_in(&self, _page: PageHandle) -> bool {
            true
        }
        async fn is_enterprise(&self, _page: PageHandle) -> bool {
            false
        }
        async fn wait_for_login(&self, _page: PageHandle) -> bool {
            true
        }
        async fn detect_errors(&self, _page: PageHandle) -> Option<String> {
            None
        }
        async fn check_context_alive(&self) -> bool {
            true
        }
        async fn check_page_alive(&self, _page: PageHandle) -> bool {
            true
        }
        async fn restart_browser(&self) -> Result<(), PoolError> {
            Ok(())
        }
        async fn response_count(&self, _page: PageHandle) -> Result<usize, PoolError> {
            Ok(0)
        }
        async fn is_generating(&self, _page: PageHandle) -> Result<bool, PoolError> {
            Ok(false)
        }
        async fn last_response_text(&self, _page: PageHandle) -> Result<Option<String>, PoolError> {
            Ok(None)
        }
        async fn click_role(&self, _page: PageHandle, _role: &str, _force: bool) -> Result<bool, PoolError> {
            Ok(true)
        }
        async fn is_role_visible(&self, _page: PageHandle, _role: &str) -> Result<bool, PoolError> {
            Ok(false)
        }
        async fn focus_and_clear(&self, _page: PageHandle, _role: &str) -> Result<(), PoolError> {
            Ok(())
        }
        async fn press_enter(&self, _page: PageHandle) -> Result<(), PoolError> {
            Ok(())
        }
        async fn paste_shortcut(&self, _page: PageHandle, _role: &str) -> Result<(), PoolError> {
            Ok(())
        }
        async fn editor_text(&self, _page: PageHandle, _role: &str) -> Result<String, PoolError> {
            Ok(String::new())
        }
        async fn upload_files(&self, _page: PageHandle, _files: &[String]) -> Result<(), PoolError> {
            Ok(())
        }
        async fn send_affordance_disabled(&self, _page: PageHandle) -> Result<bool, PoolError> {
            Ok(false)
        }
        async fn click_copy_button(&self, _page: PageHandle) -> Result<bool, PoolError> {
            Ok(false)
        }
        async fn read_in_page_clipboard(&self, _page: PageHandle) -> Result<Option<String>, PoolError> {
            Ok(None)
        }
        async fn dom_scrape_response(&self, _page: PageHandle) -> Result<String, PoolError> {
            Ok(String::new())
        }
    }

    fn test_pool(size: usize, max_queue_depth: usize) -> Arc<Pool> {
        let mut config = AppConfig::default();
        config.pool.size = size;
        config.pool.max_queue_depth = max_queue_depth;

        let slots: Vec<Slot> = (0..size as u32)
            .map(|id| Slot::new(id, PageHandle::default_for_test()))
            .collect();
        let driver: Arc<dyn Driver> = Arc::new(NoopDriver);
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = ClipboardExtractor::new(dir.path().join("lock"));
        std::mem::forget(dir);

        Pool::new(slots, driver, extractor, &config)
    }

    #[tokio::test]
    async fn acquire_is_idempotent_for_the_same_owner() {
        let pool = test_pool(1, 10);
        let first = pool.acquire("A".to_string()).await;
        let second = pool.acquire("A".to_string()).await;
        match (first, second) {
            (
                AcquireResult::Acquired { slot_id: s1, lease_token: t1, reattached: r1, .. },
                AcquireResult::Acquired { slot_id: s2, lease_token: t2, reattached: r2, .. },
            ) => {
                assert_eq!(s1, s2);
                assert_eq!(t1, t2);
                assert!(!r1);
                assert!(r2);
            }
            other => panic!("expected two Acquired results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_hands_freed_slot_to_next_queued_owner_fifo() {
        let pool = test_pool(1, 10);
        pool.acquire("A".to_string()).await;
        let queued = pool.acquire("B".to_string()).await;
        let AcquireResult::Queued { queue_position, .. } = queued else {
            panic!("expected B to queue");
        };
        assert_eq!(queue_position, 1);

        pool.release(0, &pool_token(&pool, "A").await).await.unwrap();

        let status = pool.get_status().await;
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.slots[0].owner.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn acquire_rejects_once_queue_and_slots_are_full() {
        let pool = test_pool(1, 1);
        pool.acquire("A".to_string()).await;
        pool.acquire("B".to_string()).await;
        let rejected = pool.acquire("C".to_string()).await;
        assert!(matches!(
            rejected,
            AcquireResult::Rejected { total_slots: 1, queue_depth: 1, queue_max: 1, .. }
        ));
    }

    #[tokio::test]
    async fn reset_slot_clears_owner_even_when_busy() {
        let pool = test_pool(1, 10);
        pool.acquire("A".to_string()).await;
        let resulting_state = pool.reset_slot(0).await.unwrap();
        assert_eq!(resulting_state, SlotState::Free);

        let status = pool.get_status().await;
        assert_eq!(status.slots[0].owner, None);
        assert_eq!(status.free_slots, 1);
    }

    #[tokio::test]
    async fn reset_all_reports_count_of_free_slots() {
        let pool = test_pool(2, 10);
        pool.acquire("A".to_string()).await;
        let slots_available = pool.reset_all().await.unwrap();
        assert_eq!(slots_available, 2);
    }

    async fn pool_token(pool: &Arc<Pool>, owner: &str) -> String {
        match pool.acquire(owner.to_string()).await {
            AcquireResult::Acquired { lease_token, .. } => lease_token,
            other => panic!("expected {owner} to already hold a slot, got {other:?}"),
        }
    }
}
