//! Session negotiator, matching `Broadcast.cpp::createFeed` and the offer
//! half of `Broadcast.cpp::start`. The client is always the offering side:
//! it creates the SDP offer, publishes it as a feed on the stage, and reads
//! back the server's SDP answer and stream URL.

use std::collections::HashMap;
use std::sync::Arc;

use caffeine_protocol::{
    CaffeineError, Client, Feed, FeedCapabilities, FeedStream, Stage, StageRequest,
};

use crate::credentials::CredentialStore;
use crate::rest::RestClient;
use crate::title::annotate_title;
use crate::unique_id::generate_unique_id;
use crate::webrtc_iface::{AudioProcessingOptions, PeerConnection};

pub struct NegotiatedSession {
    pub feed_id: String,
    pub stream_url: String,
    pub next_request: StageRequest,
}

/// Drive a single broadcast negotiation: create an offer, publish it as a
/// feed, read back the answer, trickle ICE candidates, and apply the
/// remote answer. Returns the state the heartbeat/longpoll loops continue
/// from.
pub async fn negotiate(
    username: &str,
    title: &str,
    rest: &RestClient,
    creds: &CredentialStore,
    peer: &Arc<dyn PeerConnection>,
    max_bitrate_bps: u32,
) -> Result<NegotiatedSession, CaffeineError> {
    peer.configure_audio_source(AudioProcessingOptions::default()).await;

    peer.add_media_tracks()
        .await
        .map_err(|_| CaffeineError::RequestFailed)?;

    peer.set_max_bitrate_bps(max_bitrate_bps)
        .await
        .map_err(|_| CaffeineError::RequestFailed)?;

    let offer_sdp = peer
        .create_offer()
        .await
        .map_err(|_| CaffeineError::RequestFailed)?;

    let feed_id = generate_unique_id();
    let client_id = generate_unique_id();

    // Step 1: obtain an initial cursor with an empty stage payload.
    let mut request = RestClient::cursor_only_request(username, &client_id);
    rest.stage_update(&mut request, creds).await?;

    // Step 2: publish the feed carrying our offer.
    request.payload = Stage {
        id: request.payload.id,
        username: username.to_string(),
        title: Some(annotate_title(title)),
        broadcast_id: None,
        upsert_broadcast: Some(true),
        live: false,
        feeds: {
            let mut feeds = HashMap::new();
            feeds.insert(
                feed_id.clone(),
                Feed {
                    id: feed_id.clone(),
                    client_id: client_id.clone(),
                    role: "primary".to_string(),
                    description: None,
                    source_connection_quality: None,
                    volume: 1.0,
                    capabilities: FeedCapabilities {
                        audio: true,
                        video: true,
                    },
                    content: None,
                    stream: Some(FeedStream {
                        sdp_offer: Some(offer_sdp),
                        ..Default::default()
                    }),
                },
            );
            feeds
        },
    };
    request.client = Client {
        id: client_id.clone(),
        headless: false,
        constrained_baseline: false,
    };

    let update = match rest.stage_update(&mut request, creds).await {
        Ok(update) => update,
        Err(CaffeineError::OutOfCapacity) => return Err(CaffeineError::OutOfCapacity),
        Err(_) => return Err(CaffeineError::BroadcastFailed),
    };
    let _ = update;

    let feed = request
        .payload
        .feeds
        .get(&feed_id)
        .cloned()
        .ok_or(CaffeineError::BroadcastFailed)?;
    let stream = feed.stream.ok_or(CaffeineError::RequestFailed)?;
    let sdp_answer = stream
        .sdp_answer
        .filter(|s| !s.is_empty())
        .ok_or(CaffeineError::RequestFailed)?;
    let stream_url = stream
        .url
        .filter(|s| !s.is_empty())
        .ok_or(CaffeineError::RequestFailed)?;

    // Trickle ICE candidates to the stream URL before setting the remote
    // description, matching the ordering in `Broadcast.cpp::start`.
    let candidates = peer.collect_ice_candidates().await;
    if !candidates.is_empty() {
        let credentials = creds.snapshot();
        rest.trickle_candidates(&stream_url, &candidates, &credentials)
            .await?;
    }

    peer.set_remote_answer(&sdp_answer)
        .await
        .map_err(|_| CaffeineError::RequestFailed)?;

    Ok(NegotiatedSession {
        feed_id,
        stream_url,
        next_request: request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePeerConnection;
    use caffeine_protocol::{CaffeineConfig, Credentials};

    #[tokio::test]
    async fn negotiate_fails_gracefully_against_a_dead_server() {
        let config = CaffeineConfig::default();
        let rest = RestClient::new(&config);
        let creds = CredentialStore::new(Credentials::default());
        let peer: Arc<dyn PeerConnection> = Arc::new(FakePeerConnection::new());

        // No mock server is listening on api./realtime.caffeine.tv from a
        // test sandbox, so this must fail rather than hang or panic. The
        // happy path is covered by the wiremock-backed integration tests.
        let result = negotiate("bob", "My Stream", &rest, &creds, &peer, 2_000_000).await;
        assert!(result.is_err());
    }
}
