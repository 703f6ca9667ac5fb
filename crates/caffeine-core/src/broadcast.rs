//! Broadcast controller: the heartbeat and long-poll loops that keep a
//! negotiated feed alive, matching `Broadcast.cpp::startHeartbeat` and
//! `Broadcast.cpp::startLongpollThread`.
//!
//! The original drives these from two OS threads sharing a
//! `std::mutex`-guarded `optional<StageRequest>`; this translates that to two
//! `tokio::spawn` tasks sharing a `tokio::sync::Mutex` (Open Question
//! decision #5 in DESIGN.md), preserving the ordering and timing contracts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use caffeine_protocol::{BroadcastConfig, BroadcastMetrics, CaffeineError, StageRequest};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::credentials::CredentialStore;
use crate::rest::RestClient;
use crate::screenshot::ScreenshotHandoff;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastState {
    Offline = 0,
    Starting = 1,
    Online = 2,
    Stopping = 3,
}

impl From<u8> for BroadcastState {
    fn from(value: u8) -> Self {
        match value {
            0 => BroadcastState::Offline,
            1 => BroadcastState::Starting,
            2 => BroadcastState::Online,
            3 => BroadcastState::Stopping,
            _ => unreachable!("BroadcastState only ever stores 0..=3"),
        }
    }
}

/// Owns the heartbeat/long-poll lifecycle for one negotiated feed. Created
/// after `negotiator::negotiate` succeeds; `start` takes over from there.
pub struct BroadcastController {
    state: AtomicU8,
    feed_id: String,
    stream_url: String,
    rest: Arc<RestClient>,
    creds: CredentialStore,
    config: BroadcastConfig,
    next_request: AsyncMutex<Option<StageRequest>>,
    is_mutating_feed: Arc<AtomicBool>,
    screenshot: Arc<ScreenshotHandoff>,
    failures: tokio::sync::mpsc::UnboundedSender<CaffeineError>,
    heartbeat_handle: AsyncMutex<Option<JoinHandle<()>>>,
    longpoll_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl BroadcastController {
    pub fn new(
        feed_id: String,
        stream_url: String,
        rest: Arc<RestClient>,
        creds: CredentialStore,
        config: BroadcastConfig,
        screenshot: Arc<ScreenshotHandoff>,
        failures: tokio::sync::mpsc::UnboundedSender<CaffeineError>,
    ) -> Self {
        Self {
            state: AtomicU8::new(BroadcastState::Offline as u8),
            feed_id,
            stream_url,
            rest,
            creds,
            config,
            next_request: AsyncMutex::new(None),
            is_mutating_feed: Arc::new(AtomicBool::new(false)),
            screenshot,
            failures,
            heartbeat_handle: AsyncMutex::new(None),
            longpoll_handle: AsyncMutex::new(None),
        }
    }

    pub fn state(&self) -> BroadcastState {
        BroadcastState::from(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: BroadcastState, to: BroadcastState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn report_failure(&self, error: CaffeineError) {
        let _ = self.failures.send(error);
    }

    /// Last connection quality known for our feed, or `None` if no heartbeat
    /// has landed yet.
    pub async fn connection_quality(&self) -> Option<String> {
        let guard = self.next_request.lock().await;
        guard
            .as_ref()?
            .payload
            .feeds
            .get(&self.feed_id)?
            .source_connection_quality
            .clone()
    }

    /// Begin heartbeating and long-polling. `request` is the stage request
    /// left over from `negotiator::negotiate`, already carrying our feed and
    /// its (as yet, broadcast-id-less) entry.
    pub async fn start(self: &Arc<Self>, request: StageRequest) {
        if !self.transition(BroadcastState::Offline, BroadcastState::Starting) {
            self.report_failure(CaffeineError::BroadcastFailed);
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.heartbeat_loop(request).await });
        *self.heartbeat_handle.lock().await = Some(handle);
    }

    async fn heartbeat_loop(self: Arc<Self>, mut request: StageRequest) {
        self.transition(BroadcastState::Starting, BroadcastState::Online);

        // Obtain a broadcast id, retrying the mutation up to 3 times.
        let mut broadcast_id = request.payload.broadcast_id.clone();
        let mut attempt = 0;
        while broadcast_id.is_none() && attempt < 3 {
            request.payload.upsert_broadcast = Some(true);
            if self.rest.stage_update(&mut request, &self.creds).await.is_err()
                || !request.payload.feeds.contains_key(&self.feed_id)
            {
                self.report_failure(CaffeineError::BroadcastFailed);
                return;
            }
            broadcast_id = request.payload.broadcast_id.clone();
            attempt += 1;
        }
        let broadcast_id = match broadcast_id {
            Some(id) => id,
            None => {
                self.report_failure(CaffeineError::BroadcastFailed);
                return;
            }
        };

        match self.screenshot.wait().await {
            Ok(jpeg) => {
                if self
                    .rest
                    .update_screenshot(&broadcast_id, jpeg, &self.creds.snapshot())
                    .await
                    .is_err()
                {
                    self.report_failure(CaffeineError::BroadcastFailed);
                    return;
                }
            }
            Err(_) => {
                self.report_failure(CaffeineError::BroadcastFailed);
                return;
            }
        }

        request.payload.live = true;
        if self.rest.stage_update(&mut request, &self.creds).await.is_err()
            || !request.payload.live
            || !request.payload.feeds.contains_key(&self.feed_id)
        {
            self.report_failure(CaffeineError::BroadcastFailed);
            return;
        }

        *self.next_request.lock().await = Some(request);

        let longpoll = Arc::clone(&self);
        let longpoll_handle = tokio::spawn(async move { longpoll.longpoll_loop().await });
        *self.longpoll_handle.lock().await = Some(longpoll_handle);

        let check_interval = Duration::from_millis(self.config.check_interval_ms);
        let heartbeat_interval = Duration::from_millis(self.config.heartbeat_interval_ms);
        let mut elapsed = Duration::ZERO;
        let mut failures = 0u32;

        while self.state() == BroadcastState::Online {
            tokio::time::sleep(check_interval).await;
            elapsed += check_interval;
            if elapsed < heartbeat_interval {
                continue;
            }
            elapsed = Duration::ZERO;

            // Mark the feed as mutating before `next_request` is cleared, not
            // after the network awaits below complete, so `longpoll_loop`
            // never observes the `None` left by an ordinary heartbeat pulse
            // and mistakes it for a terminated feed.
            self.is_mutating_feed.store(true, Ordering::SeqCst);
            let mut request = match self.next_request.lock().await.take() {
                Some(request) => request,
                None => {
                    self.report_failure(CaffeineError::BroadcastFailed);
                    return;
                }
            };

            if !request.payload.feeds.contains_key(&self.feed_id) {
                self.report_failure(CaffeineError::Takeover);
                return;
            }

            let mut should_mutate_feed = false;
            match self
                .rest
                .heartbeat_stream(&self.stream_url, &self.creds.snapshot())
                .await
            {
                Ok(heartbeat) => {
                    failures = 0;
                    if let Some(feed) = request.payload.feeds.get_mut(&self.feed_id) {
                        if feed.source_connection_quality.as_deref()
                            != Some(heartbeat.connection_quality.as_str())
                        {
                            feed.source_connection_quality = Some(heartbeat.connection_quality);
                            should_mutate_feed = true;
                        }
                    }
                }
                Err(_) => {
                    failures += 1;
                    if failures > self.config.max_heartbeat_failures {
                        self.report_failure(CaffeineError::Disconnected);
                        *self.next_request.lock().await = Some(request);
                        break;
                    }
                }
            }

            let _ = self
                .rest
                .post_broadcast_metrics(
                    &BroadcastMetrics {
                        feed_id: self.feed_id.clone(),
                        timestamp_ms: 0,
                        connection_quality: request
                            .payload
                            .feeds
                            .get(&self.feed_id)
                            .and_then(|feed| feed.source_connection_quality.clone())
                            .unwrap_or_default(),
                    },
                    &self.creds.snapshot(),
                )
                .await;

            if !should_mutate_feed {
                *self.next_request.lock().await = Some(request);
                self.is_mutating_feed.store(false, Ordering::SeqCst);
                continue;
            }

            if self.rest.stage_update(&mut request, &self.creds).await.is_err() {
                // Per the stated concurrency model, the flag stays set until
                // a mutation succeeds, pausing long-polling during retries.
                *self.next_request.lock().await = Some(request);
                continue;
            }

            if !request.payload.live || !request.payload.feeds.contains_key(&self.feed_id) {
                self.report_failure(CaffeineError::Takeover);
                return;
            }

            *self.next_request.lock().await = Some(request);
            self.is_mutating_feed.store(false, Ordering::SeqCst);
        }

        self.shut_down_feed().await;
    }

    async fn shut_down_feed(&self) {
        self.is_mutating_feed.store(true, Ordering::SeqCst);
        let request = self.next_request.lock().await.take();
        if let Some(mut request) = request {
            if request.payload.feeds.contains_key(&self.feed_id) {
                request.payload.live = false;
                request.payload.feeds.clear();
                let _ = self.rest.stage_update(&mut request, &self.creds).await;
            }
        }
    }

    async fn longpoll_loop(self: Arc<Self>) {
        let check_interval = Duration::from_millis(self.config.check_interval_ms);
        let mut retry_interval = Duration::ZERO;
        let mut elapsed = Duration::ZERO;

        while self.state() == BroadcastState::Online {
            tokio::time::sleep(check_interval).await;
            elapsed += check_interval;
            if elapsed < retry_interval || self.is_mutating_feed.load(Ordering::SeqCst) {
                continue;
            }
            elapsed = Duration::ZERO;

            let mut request = match self.next_request.lock().await.clone() {
                Some(request) => request,
                None => break,
            };

            match self.rest.stage_update(&mut request, &self.creds).await {
                Err(_) => {
                    retry_interval = Duration::from_millis(self.config.longpoll_retry_ms);
                    continue;
                }
                Ok(outcome) => {
                    let is_live_feed_present =
                        request.payload.live && request.payload.feeds.contains_key(&self.feed_id);
                    *self.next_request.lock().await = Some(request);
                    if !is_live_feed_present {
                        break;
                    }
                    elapsed = Duration::ZERO;
                    retry_interval = outcome.retry_in;
                }
            }
        }
    }

    /// Stop both loops and mark the broadcast offline. Best-effort; the
    /// final stage update is ignored on failure, matching `Broadcast::stop`.
    pub async fn stop(&self) {
        self.state.store(BroadcastState::Stopping as u8, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.longpoll_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.state.store(BroadcastState::Offline as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caffeine_protocol::{CaffeineConfig, Credentials};

    fn controller() -> Arc<BroadcastController> {
        let config = CaffeineConfig::default();
        let rest = Arc::new(RestClient::new(&config));
        let creds = CredentialStore::new(Credentials::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(BroadcastController::new(
            "feed-1".to_string(),
            "https://realtime.caffeine.tv/abc".to_string(),
            rest,
            creds,
            config.broadcast,
            Arc::new(ScreenshotHandoff::new()),
            tx,
        ))
    }

    #[test]
    fn starts_offline() {
        let controller = controller();
        assert_eq!(controller.state(), BroadcastState::Offline);
    }

    #[tokio::test]
    async fn connection_quality_is_none_before_any_heartbeat() {
        let controller = controller();
        assert_eq!(controller.connection_quality().await, None);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_harmless_no_op() {
        let controller = controller();
        controller.stop().await;
        assert_eq!(controller.state(), BroadcastState::Offline);
    }
}
