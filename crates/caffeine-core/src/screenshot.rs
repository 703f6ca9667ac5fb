//! Screenshot hand-off, matching `Broadcast.cpp::sendVideo`/`createScreenshot`.
//!
//! The I420->RAW24 color conversion and the JPEG writer itself are external
//! collaborators (SPEC_FULL.md §1); this module only owns the one-shot
//! hand-off contract between "a frame became available" and "a JPEG is
//! ready to upload".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// A single I420 video frame, passed in by the video adapter the first
/// time a screenshot is needed after broadcast start.
#[derive(Debug, Clone)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// The external JPEG encoder: I420 in, JPEG bytes out, quality 95 per the
/// original's `stbi_write_jpg_to_func` call.
#[async_trait]
pub trait JpegEncoder: Send + Sync {
    async fn encode(&self, frame: I420Frame) -> Result<Vec<u8>, String>;
}

/// Coordinates the exactly-once screenshot request between the heartbeat
/// loop (which awaits the result) and the video send path (which fulfills
/// it at most once per broadcast).
pub struct ScreenshotHandoff {
    needed: AtomicBool,
    sender: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<Result<Vec<u8>, String>>>>,
    receiver: std::sync::Mutex<Option<tokio::sync::oneshot::Receiver<Result<Vec<u8>, String>>>>,
}

impl ScreenshotHandoff {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::oneshot::channel();
        Self {
            needed: AtomicBool::new(true),
            sender: std::sync::Mutex::new(Some(tx)),
            receiver: std::sync::Mutex::new(Some(rx)),
        }
    }

    /// Called from the video send path for every frame. Encodes and
    /// fulfills the pending request exactly once; a no-op on every later
    /// call, matching `isScreenshotNeeded.compare_exchange_strong`.
    pub async fn offer_frame(&self, frame: I420Frame, encoder: &dyn JpegEncoder) {
        if self
            .needed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let result = encoder.encode(frame).await;
        if let Some(sender) = self.sender.lock().expect("screenshot sender poisoned").take() {
            let _ = sender.send(result);
        }
    }

    /// Awaited once by the heartbeat loop at broadcast start.
    pub async fn wait(&self) -> Result<Vec<u8>, String> {
        let receiver = self
            .receiver
            .lock()
            .expect("screenshot receiver poisoned")
            .take();
        match receiver {
            Some(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err("screenshot sender dropped".to_string())),
            None => Err("screenshot already awaited".to_string()),
        }
    }
}

impl Default for ScreenshotHandoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEncoder;

    #[async_trait]
    impl JpegEncoder for FakeEncoder {
        async fn encode(&self, frame: I420Frame) -> Result<Vec<u8>, String> {
            Ok(vec![0xFF, 0xD8, frame.width as u8])
        }
    }

    #[tokio::test]
    async fn second_offer_after_fulfillment_is_a_no_op() {
        let handoff = ScreenshotHandoff::new();
        let encoder = FakeEncoder;
        let frame = I420Frame {
            width: 640,
            height: 480,
            data: Arc::from(vec![0u8; 16]),
        };

        handoff.offer_frame(frame.clone(), &encoder).await;
        // Must not panic or attempt a second send on an already-consumed channel.
        handoff.offer_frame(frame, &encoder).await;
    }

    #[tokio::test]
    async fn wait_resolves_with_the_encoded_bytes() {
        let handoff = Arc::new(ScreenshotHandoff::new());
        let encoder = FakeEncoder;
        let frame = I420Frame {
            width: 10,
            height: 10,
            data: Arc::from(vec![0u8; 4]),
        };

        let waiter = {
            let handoff = Arc::clone(&handoff);
            tokio::spawn(async move { handoff.wait().await })
        };

        handoff.offer_frame(frame, &encoder).await;
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, vec![0xFF, 0xD8, 10]);
    }
}
