use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Credentials issued by the sign-in/refresh endpoints.
///
/// `Debug` is hand-rolled to redact every secret field; nothing here should
/// ever reach a log line unredacted.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub caid: String,
    pub credential: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("caid", &"[REDACTED]")
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub stage_id: String,
    pub can_broadcast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
    pub process_names: Vec<String>,
}

/// One ICE candidate, in the camelCase shape the trickle endpoint expects
/// (distinct from the snake_case convention used by the rest of the Stage
/// Protocol wire types — preserved exactly as the server requires it).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Client {
    pub id: String,
    pub headless: bool,
    pub constrained_baseline: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FeedCapabilities {
    pub audio: bool,
    pub video: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedContent {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FeedStream {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Feed {
    pub id: String,
    pub client_id: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_connection_quality: Option<String>,
    pub volume: f64,
    pub capabilities: FeedCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<FeedContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<FeedStream>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsert_broadcast: Option<bool>,
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub feeds: HashMap<String, Feed>,
}

/// The client's desired stage state, echoing the last cursor it observed.
///
/// Wire key for the embedded `Stage` is `payload`, not `stage` — carried
/// over from the server's actual JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StageRequest {
    pub client: Client,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub payload: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StageResponse {
    pub cursor: String,
    #[serde(default)]
    pub retry_in: u64,
    pub payload: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DisplayMessage {
    #[serde(default)]
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureResponse {
    #[serde(rename = "type")]
    pub failure_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_message: Option<DisplayMessage>,
}

impl FailureResponse {
    pub fn is_out_of_capacity(&self) -> bool {
        self.failure_type == "OutOfCapacity"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub connection_quality: String,
}

/// Minimal broadcast metrics payload for the `/v1/broadcast_metrics` upload.
///
/// Not a metrics system; just enough to exercise the endpoint the server
/// expects a broadcasting client to call periodically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastMetrics {
    pub feed_id: String,
    pub timestamp_ms: u64,
    pub connection_quality: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_everything() {
        let creds = Credentials {
            access_token: "at-secret".into(),
            refresh_token: "rt-secret".into(),
            caid: "caid-secret".into(),
            credential: "cred-secret".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn stage_request_uses_payload_key() {
        let req = StageRequest {
            client: Client {
                id: "client-1".into(),
                headless: true,
                constrained_baseline: false,
            },
            cursor: Some("cursor-1".into()),
            payload: Stage {
                username: "bob".into(),
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""payload":"#));
        assert!(!json.contains(r#""stage":"#));
        assert!(json.contains(r#""cursor":"cursor-1""#));
    }

    #[test]
    fn stage_request_omits_cursor_when_absent() {
        let req = StageRequest {
            client: Client::default(),
            cursor: None,
            payload: Stage::default(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("cursor"));
    }

    #[test]
    fn ice_candidate_is_camel_case_on_the_wire() {
        let ice = IceCandidate {
            candidate: "candidate:1 1 UDP 2130706431 127.0.0.1 1 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        };
        let json = serde_json::to_string(&ice).unwrap();
        assert!(json.contains(r#""sdpMid":"0""#));
        assert!(json.contains(r#""sdpMLineIndex":0"#));
        assert!(!json.contains("sdp_mid"));
    }

    #[test]
    fn stage_response_roundtrip() {
        let mut feeds = HashMap::new();
        feeds.insert(
            "feed-1".to_string(),
            Feed {
                id: "feed-1".into(),
                client_id: "client-1".into(),
                role: "primary".into(),
                description: None,
                source_connection_quality: Some("GOOD".into()),
                volume: 1.0,
                capabilities: FeedCapabilities {
                    audio: true,
                    video: true,
                },
                content: None,
                stream: Some(FeedStream {
                    url: Some("https://realtime.caffeine.tv/abc".into()),
                    sdp_answer: Some("v=0...".into()),
                    ..Default::default()
                }),
            },
        );
        let resp = StageResponse {
            cursor: "cursor-2".into(),
            retry_in: 5000,
            payload: Stage {
                username: "bob".into(),
                live: true,
                feeds,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: StageResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, resp);
        assert!(parsed.payload.feeds.contains_key("feed-1"));
    }

    #[test]
    fn failure_response_out_of_capacity() {
        let json = r#"{"type":"OutOfCapacity","reason":"full","display_message":{"title":"Busy","body":"Try later"}}"#;
        let failure: FailureResponse = serde_json::from_str(json).unwrap();
        assert!(failure.is_out_of_capacity());
        assert_eq!(failure.display_message.unwrap().body, "Try later");
    }

    #[test]
    fn failure_response_generic_is_not_out_of_capacity() {
        let json = r#"{"type":"BroadcastFailed"}"#;
        let failure: FailureResponse = serde_json::from_str(json).unwrap();
        assert!(!failure.is_out_of_capacity());
    }
}
