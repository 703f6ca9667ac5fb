//! Client-side control plane for live broadcasting.
//!
//! A host application feeds audio/video samples in through [`Instance`] and
//! this crate handles sign-in, WebRTC session negotiation against the
//! stage service, and the broadcast lifecycle (heartbeat, long-poll,
//! screenshot upload) for as long as the broadcast is live.

pub mod audio_adapter;
pub mod broadcast;
pub mod credentials;
pub mod instance;
pub mod negotiator;
pub mod policy;
pub mod rest;
pub mod screenshot;
pub mod test_support;
pub mod title;
pub mod unique_id;
pub mod urls;
pub mod video_adapter;
pub mod webrtc_iface;

pub use caffeine_protocol::{CaffeineConfig, CaffeineError, Result};
pub use instance::Instance;

use std::sync::OnceLock;

static INIT: OnceLock<InitResult> = OnceLock::new();

/// Initialization result of the first [`init`] call.
///
/// `init` is idempotent: the first call installs the global `tracing`
/// subscriber and returns its outcome; every later call is a no-op that
/// returns the same outcome, mirroring the Host API's
/// "second call is a no-op" requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitResult {
    pub installed: bool,
}

/// Install the global logging subscriber. Safe to call more than once;
/// only the first call has any effect.
pub fn init() -> InitResult {
    *INIT.get_or_init(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok();
        InitResult { installed }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let first = init();
        let second = init();
        assert_eq!(first, second);
    }
}
