//! Endpoint construction, matching `Urls.cpp`. Resolved once from the
//! configured/overridden domain into immutable values, per the design
//! note in SPEC_FULL.md §9 ("capture them once into immutable values").

use caffeine_protocol::CaffeineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api: String,
    realtime: String,
    events: String,
}

impl Endpoints {
    pub fn from_config(config: &CaffeineConfig) -> Self {
        Self::for_domain(&config.resolved_domain())
    }

    pub fn for_domain(domain: &str) -> Self {
        Self {
            api: format!("https://api.{domain}"),
            realtime: format!("https://realtime.{domain}"),
            events: format!("https://events.{domain}"),
        }
    }

    /// Point every base URL (api/realtime/events) at the same origin. Used
    /// to aim this crate's REST client at a single `wiremock::MockServer` in
    /// tests, where there's no need for three separate subdomains.
    pub fn single_base(base_url: &str) -> Self {
        Self {
            api: base_url.trim_end_matches('/').to_string(),
            realtime: base_url.trim_end_matches('/').to_string(),
            events: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn version_check(&self) -> String {
        format!("{}/v1/version-check", self.api)
    }

    pub fn sign_in(&self) -> String {
        format!("{}/v1/account/signin", self.api)
    }

    pub fn refresh_token(&self) -> String {
        format!("{}/v1/account/token", self.api)
    }

    pub fn get_games(&self) -> String {
        format!("{}/v1/games", self.api)
    }

    pub fn get_user(&self, id: &str) -> String {
        format!("{}/v1/users/{id}", self.api)
    }

    pub fn broadcast(&self, id: &str) -> String {
        format!("{}/v1/broadcasts/{id}", self.api)
    }

    pub fn broadcast_metrics(&self) -> String {
        format!("{}/v1/broadcast_metrics", self.events)
    }

    /// `PUT /v4/stage/{username}` — implemented with the slash spec.md §6
    /// specifies; see DESIGN.md for the original source's apparent typo.
    pub fn stage_update(&self, username: &str) -> String {
        format!("{}/v4/stage/{username}", self.realtime)
    }

    pub fn stream_heartbeat(&self, stream_url: &str) -> String {
        format!("{stream_url}/heartbeat")
    }
}
