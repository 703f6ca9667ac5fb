//! In-memory fakes for the external collaborators this crate doesn't own
//! (the WebRTC engine and the JPEG encoder), used only by this crate's own
//! tests.

use async_trait::async_trait;
use caffeine_protocol::IceCandidate;

use crate::screenshot::{I420Frame, JpegEncoder};
use crate::webrtc_iface::{AudioProcessingOptions, PeerConnection};

pub struct FakePeerConnection {
    pub offer_sdp: String,
    pub candidates: Vec<IceCandidate>,
}

impl FakePeerConnection {
    pub fn new() -> Self {
        Self {
            offer_sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n".to_string(),
            candidates: vec![IceCandidate {
                candidate: "candidate:1 1 UDP 2130706431 127.0.0.1 1 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            }],
        }
    }
}

impl Default for FakePeerConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn configure_audio_source(&self, _options: AudioProcessingOptions) {}

    async fn add_media_tracks(&self) -> Result<(), String> {
        Ok(())
    }

    async fn set_max_bitrate_bps(&self, _bps: u32) -> Result<(), String> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, String> {
        Ok(self.offer_sdp.clone())
    }

    async fn set_remote_answer(&self, _sdp: &str) -> Result<(), String> {
        Ok(())
    }

    async fn collect_ice_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.clone()
    }

    async fn send_video_frame(&self, _frame: I420Frame) {}

    async fn send_audio_frame(&self, _samples: Vec<i16>) {}

    async fn close(&self) {}
}

pub struct FakeJpegEncoder;

#[async_trait]
impl JpegEncoder for FakeJpegEncoder {
    async fn encode(&self, frame: I420Frame) -> Result<Vec<u8>, String> {
        Ok(vec![0xFF, 0xD8, 0xFF, (frame.width % 256) as u8])
    }
}
