//! The boundary between this crate and the caller-supplied WebRTC engine.
//!
//! The engine itself is explicitly out of scope (SPEC_FULL.md §1): this
//! crate only drives it through the shape `Broadcast.cpp` drives
//! `PeerConnectionInterface` through. A host embeds its own implementation;
//! `crate::test_support` provides an in-memory fake for this crate's own
//! tests.

use async_trait::async_trait;
use caffeine_protocol::IceCandidate;

use crate::screenshot::I420Frame;

/// Audio processing toggles passed to the engine's audio source, matching
/// `Broadcast.cpp`'s `cricket::AudioOptions` block field for field. Every
/// flag defaults to (and, per spec, is configured as) `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProcessingOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub automatic_gain_control: bool,
    pub highpass_filter: bool,
    pub typing_detection: bool,
    pub comfort_noise: bool,
    pub delay_agnostic_aec: bool,
    pub intelligibility_enhancer: bool,
    pub residual_echo_detector: bool,
    pub tx_agc_limiter: bool,
    pub stereo_swap: bool,
}

impl Default for AudioProcessingOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: false,
            noise_suppression: false,
            automatic_gain_control: false,
            highpass_filter: false,
            typing_detection: false,
            comfort_noise: false,
            delay_agnostic_aec: false,
            intelligibility_enhancer: false,
            residual_echo_detector: false,
            tx_agc_limiter: false,
            stereo_swap: false,
        }
    }
}

/// Everything the session negotiator needs from a WebRTC peer connection.
/// The client is always the offering side, unlike a browser-facing answer
/// responder (SPEC_FULL.md §4.4).
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Apply the audio processing configuration before any track is added.
    async fn configure_audio_source(&self, options: AudioProcessingOptions);

    /// Create a local media stream carrying one audio and one video track
    /// and attach it to the peer connection, matching
    /// `Broadcast.cpp::start`'s `CreateVideoTrack`/`CreateAudioTrack`/
    /// `CreateLocalMediaStream`/`AddStream` sequence.
    async fn add_media_tracks(&self) -> Result<(), String>;

    /// Cap the connection's start and max send bitrate, matching
    /// `Broadcast.cpp::start`'s `webrtc::BitrateSettings`/`SetBitrate` call.
    async fn set_max_bitrate_bps(&self, bps: u32) -> Result<(), String>;

    /// Create a local offer and set it as the local description, returning
    /// the serialized SDP.
    async fn create_offer(&self) -> Result<String, String>;

    /// Apply a remote SDP answer.
    async fn set_remote_answer(&self, sdp: &str) -> Result<(), String>;

    /// Wait for ICE gathering to reach its terminal state and return every
    /// candidate collected, in the order they were produced.
    async fn collect_ice_candidates(&self) -> Vec<IceCandidate>;

    /// Push one already-adapted (frame-rate gated, dimension clamped) video
    /// frame onto the video track, matching `VideoCapturer::sendVideo`'s
    /// `OnFrame` call.
    async fn send_video_frame(&self, frame: I420Frame);

    /// Push one 480-sample (10ms) chunk of interleaved stereo audio onto the
    /// audio track, matching `AudioDevice::sendAudio`.
    async fn send_audio_frame(&self, samples: Vec<i16>);

    /// Tear down the peer connection.
    async fn close(&self);
}
