//! The host-facing facade, matching `Instance.hpp`/`Instance.cpp`: owns sign
//! in, cached user info, and at most one active broadcast.
//!
//! Unlike the original, which owns a shared `webrtc::PeerConnectionFactoryInterface`
//! constructed once in the constructor, this crate treats the WebRTC engine
//! and JPEG encoder as per-broadcast collaborators supplied by the host at
//! [`Instance::start_broadcast`] time (SPEC_FULL.md §1's external boundary).

use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Instant;

use caffeine_protocol::{CaffeineConfig, CaffeineError, Credentials, UserInfo};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;

use crate::audio_adapter::AudioChunker;
use crate::broadcast::{BroadcastController, BroadcastState};
use crate::credentials::CredentialStore;
use crate::negotiator;
use crate::policy;
use crate::rest::{AuthOutcome, RestClient};
use crate::screenshot::{I420Frame, JpegEncoder, ScreenshotHandoff};
use crate::urls::Endpoints;
use crate::video_adapter;
use crate::webrtc_iface::PeerConnection;

struct SignedIn {
    credentials: CredentialStore,
    user_info: UserInfo,
}

/// Per-frame state for the frame-rate gate of SPEC_FULL.md §4.9.
#[derive(Default)]
struct VideoSendState {
    last_sent: Option<Instant>,
}

struct ActiveBroadcast {
    controller: Arc<BroadcastController>,
    screenshot: Arc<ScreenshotHandoff>,
    encoder: Arc<dyn JpegEncoder>,
    peer: Arc<dyn PeerConnection>,
    video_state: SyncMutex<VideoSendState>,
    audio_chunker: SyncMutex<AudioChunker>,
}

/// One signed-in session with at most one concurrently active broadcast.
pub struct Instance {
    config: CaffeineConfig,
    rest: Arc<RestClient>,
    signed_in: AsyncMutex<Option<SignedIn>>,
    broadcast: AsyncMutex<Option<ActiveBroadcast>>,
    failures_tx: mpsc::UnboundedSender<CaffeineError>,
    failures_rx: AsyncMutex<mpsc::UnboundedReceiver<CaffeineError>>,
}

impl Instance {
    pub fn new(config: CaffeineConfig) -> Self {
        let rest = Arc::new(RestClient::new(&config));
        Self::from_parts(config, rest)
    }

    /// Build against explicit endpoints, bypassing domain resolution. Used
    /// by tests to point at a `wiremock::MockServer`.
    pub fn with_endpoints(config: CaffeineConfig, endpoints: Endpoints) -> Self {
        let rest = Arc::new(RestClient::with_endpoints(&config, endpoints));
        Self::from_parts(config, rest)
    }

    fn from_parts(config: CaffeineConfig, rest: Arc<RestClient>) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            config,
            rest,
            signed_in: AsyncMutex::new(None),
            broadcast: AsyncMutex::new(None),
            failures_tx,
            failures_rx: AsyncMutex::new(failures_rx),
        }
    }

    async fn adopt(&self, credentials: Credentials) -> Result<(), CaffeineError> {
        let store = CredentialStore::new(credentials.clone());
        let user_info = match self.rest.get_user_info(&credentials.caid, &credentials).await {
            Ok(user_info) => user_info,
            Err(_) => return Err(CaffeineError::Failure {
                kind: "failed to load user info after authentication".to_string(),
            }),
        };
        *self.signed_in.lock().await = Some(SignedIn {
            credentials: store,
            user_info,
        });
        Ok(())
    }

    /// `caff_SignIn`. Maps every non-credential [`AuthOutcome`] to its
    /// matching [`CaffeineError`].
    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<(), CaffeineError> {
        if username.is_empty() {
            return Err(CaffeineError::UsernameRequired);
        }
        if password.is_empty() {
            return Err(CaffeineError::PasswordRequired);
        }
        match self.rest.sign_in(username, password, otp).await? {
            AuthOutcome::Success(credentials) => self.adopt(credentials).await,
            AuthOutcome::InfoIncorrect => Err(CaffeineError::AuthInfoIncorrect),
            AuthOutcome::MfaOtpRequired => Err(CaffeineError::MfaOtpRequired),
            AuthOutcome::MfaOtpIncorrect => Err(CaffeineError::MfaOtpIncorrect),
            AuthOutcome::LegalAcceptanceRequired => Err(CaffeineError::LegalAcceptanceRequired),
            AuthOutcome::EmailVerificationRequired => {
                Err(CaffeineError::EmailVerificationRequired)
            }
        }
    }

    /// `caff_RefreshAuth`.
    pub async fn refresh_auth(&self, refresh_token: &str) -> Result<(), CaffeineError> {
        if refresh_token.is_empty() {
            return Err(CaffeineError::RefreshTokenRequired);
        }
        let credentials = self.rest.refresh_auth(refresh_token).await?;
        self.adopt(credentials).await
    }

    /// `caff_CheckVersion`. Call before signing in so a client too old to
    /// broadcast finds out before spending a sign-in attempt.
    pub async fn check_version(&self) -> Result<(), CaffeineError> {
        self.rest.check_version().await
    }

    pub async fn is_signed_in(&self) -> bool {
        self.signed_in.lock().await.is_some()
    }

    pub async fn sign_out(&self) {
        self.end_broadcast().await;
        *self.signed_in.lock().await = None;
    }

    pub async fn get_refresh_token(&self) -> Option<String> {
        self.signed_in
            .lock()
            .await
            .as_ref()
            .map(|signed_in| signed_in.credentials.snapshot().refresh_token)
    }

    pub async fn get_username(&self) -> Option<String> {
        self.signed_in
            .lock()
            .await
            .as_ref()
            .map(|signed_in| signed_in.user_info.username.clone())
    }

    pub async fn get_stage_id(&self) -> Option<String> {
        self.signed_in
            .lock()
            .await
            .as_ref()
            .map(|signed_in| signed_in.user_info.stage_id.clone())
    }

    pub async fn can_broadcast(&self) -> bool {
        self.signed_in
            .lock()
            .await
            .as_ref()
            .map(|signed_in| signed_in.user_info.can_broadcast)
            .unwrap_or(false)
    }

    /// `caff_StartBroadcast`. Fails fast on `NotSignedIn`/`BroadcastNotAllowed`/
    /// `AlreadyBroadcasting`, then checks the intended capture resolution
    /// against the aspect ratio policy (SPEC_FULL.md §4.12, applied to the
    /// same clamped resolution the video adapter will send at), negotiates a
    /// session, and starts the heartbeat/long-poll loops. Failures
    /// discovered later (heartbeat disconnects, takeover) surface through
    /// [`Instance::next_failure`].
    pub async fn start_broadcast(
        &self,
        title: &str,
        capture_width: u32,
        capture_height: u32,
        peer: Arc<dyn PeerConnection>,
        encoder: Arc<dyn JpegEncoder>,
    ) -> Result<(), CaffeineError> {
        let (username, credentials) = {
            let guard = self.signed_in.lock().await;
            let signed_in = guard.as_ref().ok_or(CaffeineError::NotSignedIn)?;
            if !signed_in.user_info.can_broadcast {
                return Err(CaffeineError::BroadcastNotAllowed);
            }
            (signed_in.user_info.username.clone(), signed_in.credentials.clone())
        };

        let mut broadcast_guard = self.broadcast.lock().await;
        if broadcast_guard.is_some() {
            return Err(CaffeineError::AlreadyBroadcasting);
        }

        let (clamped_width, clamped_height) = video_adapter::clamp_dimensions(capture_width, capture_height);
        policy::check_aspect_ratio(clamped_width as i32, clamped_height as i32)?;

        let negotiated = negotiator::negotiate(
            &username,
            title,
            &self.rest,
            &credentials,
            &peer,
            self.config.broadcast.max_bitrate_bps,
        )
        .await?;

        let screenshot = Arc::new(ScreenshotHandoff::new());
        let controller = Arc::new(BroadcastController::new(
            negotiated.feed_id,
            negotiated.stream_url,
            Arc::clone(&self.rest),
            credentials,
            self.config.broadcast.clone(),
            Arc::clone(&screenshot),
            self.failures_tx.clone(),
        ));
        controller.start(negotiated.next_request).await;

        *broadcast_guard = Some(ActiveBroadcast {
            controller,
            screenshot,
            encoder,
            peer,
            video_state: SyncMutex::new(VideoSendState::default()),
            audio_chunker: SyncMutex::new(AudioChunker::new()),
        });
        Ok(())
    }

    /// Hand a freshly captured frame to the screenshot pipeline. A no-op if
    /// no broadcast is active or a screenshot has already been captured.
    pub async fn offer_video_frame(&self, frame: I420Frame) {
        let guard = self.broadcast.lock().await;
        if let Some(active) = guard.as_ref() {
            active.screenshot.offer_frame(frame, active.encoder.as_ref()).await;
        }
    }

    /// `caff_SendVideo`. Routed through the frame-rate gate and dimension
    /// clamp of SPEC_FULL.md §4.9 before reaching the peer connection. A
    /// no-op while no broadcast is active or the broadcast isn't yet
    /// `Online`, matching `Broadcast::sendVideo`'s `isOnline()` guard.
    pub async fn send_video(&self, frame: I420Frame) {
        let guard = self.broadcast.lock().await;
        let Some(active) = guard.as_ref() else {
            return;
        };
        if active.controller.state() != BroadcastState::Online {
            return;
        }

        let dropped = {
            let mut state = active.video_state.lock().expect("video send state poisoned");
            let now = Instant::now();
            let elapsed_ms = state
                .last_sent
                .map(|last| now.duration_since(last).as_millis() as u64)
                .unwrap_or(u64::MAX);
            let dropped = video_adapter::should_drop_frame(elapsed_ms);
            if !dropped {
                state.last_sent = Some(now);
            }
            dropped
        };
        if dropped {
            return;
        }

        let (width, height) = video_adapter::clamp_dimensions(frame.width, frame.height);
        active
            .peer
            .send_video_frame(I420Frame { width, height, data: frame.data })
            .await;
    }

    /// `caff_SendAudio`. Routed through the 480-sample chunker of
    /// SPEC_FULL.md §4.10 before reaching the peer connection.
    pub async fn send_audio(&self, samples: &[i16]) {
        let guard = self.broadcast.lock().await;
        let Some(active) = guard.as_ref() else {
            return;
        };
        if active.controller.state() != BroadcastState::Online {
            return;
        }

        let frames = {
            let mut chunker = active.audio_chunker.lock().expect("audio chunker poisoned");
            chunker.push(samples)
        };
        for frame in frames {
            active.peer.send_audio_frame(frame).await;
        }
    }

    pub async fn connection_quality(&self) -> Option<String> {
        let guard = self.broadcast.lock().await;
        match guard.as_ref() {
            Some(active) => active.controller.connection_quality().await,
            None => None,
        }
    }

    pub async fn is_broadcasting(&self) -> bool {
        self.broadcast.lock().await.is_some()
    }

    /// `caff_EndBroadcast`.
    pub async fn end_broadcast(&self) {
        if let Some(active) = self.broadcast.lock().await.take() {
            active.controller.stop().await;
            active.peer.close().await;
        }
    }

    /// Drain one asynchronously-discovered broadcast failure, if any is
    /// pending. The host is expected to poll this (or await it) and react
    /// the way `Instance::authenticate`'s `dispatchFailure` reacts: tear the
    /// broadcast down and surface the error.
    pub async fn next_failure(&self) -> Option<CaffeineError> {
        self.failures_rx.lock().await.recv().await
    }
}
