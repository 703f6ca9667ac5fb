//! REST client for the Caffeine control plane, matching `RestApi.cpp` and
//! the stage-update portions of `Api.cpp`.
//!
//! Every call is bounded to 3 attempts with backoff `min(1 + retry_index,
//! max_backoff_secs)` seconds between attempts (never before the first,
//! never after the last). Authenticated calls additionally carry a single
//! nested refresh-and-retry on a `401`, which does not consume the outer
//! retry budget.

use std::future::Future;
use std::time::Duration;

use caffeine_protocol::{
    BroadcastMetrics, CaffeineConfig, CaffeineError, Client, Credentials, FailureResponse,
    GameInfo, HeartbeatResponse, IceCandidate, StageRequest, StageResponse, UserInfo,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::credentials::CredentialStore;
use crate::urls::Endpoints;

/// Outcome classification for the bounded retry loop, modeled on the
/// original's `Retryable<T>` template: `Retry` asks the loop to try again
/// (consulted only while attempts remain), `Complete` ends it immediately.
pub enum Retryable<T> {
    Retry(T),
    Complete(T),
}

impl<T> Retryable<T> {
    fn into_inner(self) -> T {
        match self {
            Retryable::Retry(t) | Retryable::Complete(t) => t,
        }
    }

    fn is_retry(&self) -> bool {
        matches!(self, Retryable::Retry(_))
    }
}

/// Outcome of a sign-in attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success(Credentials),
    InfoIncorrect,
    MfaOtpRequired,
    MfaOtpIncorrect,
    LegalAcceptanceRequired,
    EmailVerificationRequired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdateOutcome {
    pub retry_in: Duration,
}

pub struct RestClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    num_retries: u32,
    max_backoff_secs: u64,
    client_type: String,
    client_version: String,
    library_version: String,
}

impl RestClient {
    pub fn new(config: &CaffeineConfig) -> Self {
        Self::with_endpoints(config, Endpoints::from_config(config))
    }

    /// Build a client against explicit endpoints, bypassing domain
    /// resolution. Used by tests to point at a `wiremock::MockServer`.
    pub fn with_endpoints(config: &CaffeineConfig, endpoints: Endpoints) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.rest.request_timeout_secs))
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            http,
            endpoints,
            num_retries: config.rest.num_retries,
            max_backoff_secs: config.rest.max_backoff_secs,
            client_type: config.client.client_type.clone(),
            client_version: config.client.client_version.clone(),
            library_version: config.client.library_version.clone(),
        }
    }

    fn backoff_for(&self, retry_index: u32) -> Duration {
        Duration::from_secs((1 + retry_index as u64).min(self.max_backoff_secs))
    }

    /// Run `f` up to `num_retries` times, sleeping `backoff_for(retry_index)`
    /// before every attempt after the first. Stops early on `Complete`.
    async fn run_with_retry<T, F, Fut>(&self, mut f: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Retryable<T>>,
    {
        let mut last = None;
        for try_num in 0..self.num_retries {
            if try_num > 0 {
                tokio::time::sleep(self.backoff_for(try_num - 1)).await;
            }
            let outcome = f().await;
            let is_retry = outcome.is_retry();
            let value = outcome.into_inner();
            if !is_retry {
                return value;
            }
            last = Some(value);
        }
        last.expect("run_with_retry always attempts at least once")
    }

    fn basic_headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-Client-Type", self.client_type.parse().expect("client_type is a valid header value"));
        headers.insert(
            "X-Client-Version",
            self.client_version.parse().expect("client_version is a valid header value"),
        );
        headers.insert(
            "X-Libcaffeine-Version",
            self.library_version.parse().expect("library_version is a valid header value"),
        );
        headers
    }

    fn authenticated_headers(&self, credentials: &Credentials) -> reqwest::header::HeaderMap {
        let mut headers = self.basic_headers();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", credentials.access_token)
                .parse()
                .expect("access_token is a valid header value"),
        );
        headers.insert(
            "X-Credential",
            credentials.credential.parse().expect("credential is a valid header value"),
        );
        headers
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: reqwest::header::HeaderMap,
    ) -> Retryable<Result<R, CaffeineError>> {
        let response = match self.http.post(url).headers(headers).json(body).send().await {
            Ok(response) => response,
            Err(err) => return Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
        };
        let status = response.status();
        if status.is_success() {
            match response.json::<R>().await {
                Ok(parsed) => Retryable::Complete(Ok(parsed)),
                Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            }
        } else {
            Retryable::Complete(Err(CaffeineError::Failure {
                kind: format!("http {status}"),
            }))
        }
    }

    /// `GET /v1/version-check`. Success means the client version is still
    /// accepted; a non-empty `errors._expired` array means it is not.
    pub async fn check_version(&self) -> Result<(), CaffeineError> {
        let url = self.endpoints.version_check();
        self.run_with_retry(|| async {
            let response = match self.http.get(&url).headers(self.basic_headers()).send().await {
                Ok(response) => response,
                Err(err) => return Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            };
            if !response.status().is_success() {
                return Retryable::Complete(Err(CaffeineError::Failure {
                    kind: format!("http {}", response.status()),
                }));
            }
            let json: serde_json::Value = match response.json().await {
                Ok(json) => json,
                Err(err) => return Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            };
            let expired = json
                .get("errors")
                .and_then(|errors| errors.get("_expired"))
                .and_then(|expired| expired.as_array())
                .map(|expired| !expired.is_empty())
                .unwrap_or(false);
            if expired {
                Retryable::Complete(Err(CaffeineError::OldVersion))
            } else {
                Retryable::Complete(Ok(()))
            }
        })
        .await
    }

    /// `POST /v1/account/signin`.
    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        otp: Option<&str>,
    ) -> Result<AuthOutcome, CaffeineError> {
        let url = self.endpoints.sign_in();
        #[derive(Serialize)]
        struct Account<'a> {
            username: &'a str,
            password: &'a str,
        }
        #[derive(Serialize)]
        struct Mfa<'a> {
            otp: &'a str,
        }
        #[derive(Serialize)]
        struct SignInBody<'a> {
            account: Account<'a>,
            #[serde(skip_serializing_if = "Option::is_none")]
            mfa: Option<Mfa<'a>>,
        }
        let body = SignInBody {
            account: Account { username, password },
            mfa: otp.map(|otp| Mfa { otp }),
        };

        self.run_with_retry(|| async {
            let response = match self
                .http
                .post(&url)
                .headers(self.basic_headers())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => return Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            };
            let status = response.status();
            let json: serde_json::Value = match response.json().await {
                Ok(json) => json,
                Err(err) => return Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            };

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Retryable::Complete(Ok(AuthOutcome::InfoIncorrect));
            }

            if let Some(otp_error) = json.get("errors").and_then(|e| e.get("otp")) {
                let _ = otp_error;
                return Retryable::Complete(Ok(if otp.is_some() {
                    AuthOutcome::MfaOtpIncorrect
                } else {
                    AuthOutcome::MfaOtpRequired
                }));
            }

            if let Some(credentials) = json.get("credentials") {
                return match serde_json::from_value::<Credentials>(credentials.clone()) {
                    Ok(credentials) => Retryable::Complete(Ok(AuthOutcome::Success(credentials))),
                    Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                };
            }

            match json.get("next").and_then(|v| v.as_str()) {
                Some("mfa_otp_required") => Retryable::Complete(Ok(AuthOutcome::MfaOtpRequired)),
                Some("legal_acceptance_required") => {
                    Retryable::Complete(Ok(AuthOutcome::LegalAcceptanceRequired))
                }
                Some("email_verification") => {
                    Retryable::Complete(Ok(AuthOutcome::EmailVerificationRequired))
                }
                _ => Retryable::Complete(Err(CaffeineError::Failure {
                    kind: "unrecognized_auth_response".to_string(),
                })),
            }
        })
        .await
    }

    /// `POST /v1/account/token`.
    pub async fn refresh_auth(&self, refresh_token: &str) -> Result<Credentials, CaffeineError> {
        #[derive(Serialize)]
        struct RefreshBody<'a> {
            refresh_token: &'a str,
        }
        let url = self.endpoints.refresh_token();
        let body = RefreshBody { refresh_token };
        self.post_json(&url, &body, self.basic_headers())
            .await
            .into_inner_result()
    }

    /// `GET /v1/users/{id}`.
    pub async fn get_user_info(
        &self,
        user_id: &str,
        credentials: &Credentials,
    ) -> Result<UserInfo, CaffeineError> {
        let url = self.endpoints.get_user(user_id);
        self.run_with_retry(|| async {
            match self
                .http
                .get(&url)
                .headers(self.authenticated_headers(credentials))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    match response.json::<UserInfo>().await {
                        Ok(user) => Retryable::Complete(Ok(user)),
                        Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                    }
                }
                Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                    kind: format!("http {}", response.status()),
                })),
                Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            }
        })
        .await
    }

    /// `GET /v1/games`.
    pub async fn get_supported_games(&self) -> Result<Vec<GameInfo>, CaffeineError> {
        let url = self.endpoints.get_games();
        self.run_with_retry(|| async {
            match self.http.get(&url).headers(self.basic_headers()).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Vec<GameInfo>>().await {
                        Ok(games) => Retryable::Complete(Ok(games)),
                        Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                    }
                }
                Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                    kind: format!("http {}", response.status()),
                })),
                Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            }
        })
        .await
    }

    /// `PUT {stream_url}` with trickled ICE candidates.
    pub async fn trickle_candidates(
        &self,
        stream_url: &str,
        candidates: &[IceCandidate],
        credentials: &Credentials,
    ) -> Result<(), CaffeineError> {
        #[derive(Serialize)]
        struct Body<'a> {
            ice_candidates: &'a [IceCandidate],
        }
        let body = Body { ice_candidates: candidates };
        self.run_with_retry(|| async {
            match self
                .http
                .put(stream_url)
                .headers(self.authenticated_headers(credentials))
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => Retryable::Complete(Ok(())),
                Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                    kind: format!("http {}", response.status()),
                })),
                Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            }
        })
        .await
    }

    /// `POST {stream_url}/heartbeat`.
    pub async fn heartbeat_stream(
        &self,
        stream_url: &str,
        credentials: &Credentials,
    ) -> Result<HeartbeatResponse, CaffeineError> {
        let url = self.endpoints.stream_heartbeat(stream_url);
        self.run_with_retry(|| async {
            match self
                .http
                .post(&url)
                .headers(self.authenticated_headers(credentials))
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    match response.json::<HeartbeatResponse>().await {
                        Ok(heartbeat) => Retryable::Complete(Ok(heartbeat)),
                        Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                    }
                }
                Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                    kind: format!("http {}", response.status()),
                })),
                Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
            }
        })
        .await
    }

    /// `PUT /v1/broadcasts/{id}`, a multipart upload of the JPEG under the
    /// `broadcast[game_image]` field, matching `RestApi.cpp::doUpdateScreenshot`.
    pub async fn update_screenshot(
        &self,
        broadcast_id: &str,
        jpeg: Vec<u8>,
        credentials: &Credentials,
    ) -> Result<(), CaffeineError> {
        let url = self.endpoints.broadcast(broadcast_id);
        self.run_with_retry(|| {
            let jpeg = jpeg.clone();
            async move {
                let part = match reqwest::multipart::Part::bytes(jpeg)
                    .file_name("game_image.jpg")
                    .mime_str("image/jpeg")
                {
                    Ok(part) => part,
                    Err(err) => {
                        return Retryable::Complete(Err(CaffeineError::Transport(err.to_string())))
                    }
                };
                let form = reqwest::multipart::Form::new().part("broadcast[game_image]", part);
                match self
                    .http
                    .put(&url)
                    .headers(self.authenticated_headers(credentials))
                    .multipart(form)
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => Retryable::Complete(Ok(())),
                    Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                        kind: format!("http {}", response.status()),
                    })),
                    Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                }
            }
        })
        .await
    }

    /// `POST /v1/broadcast_metrics`, a multipart upload of a JSON payload.
    pub async fn post_broadcast_metrics(
        &self,
        metrics: &BroadcastMetrics,
        credentials: &Credentials,
    ) -> Result<(), CaffeineError> {
        let url = self.endpoints.broadcast_metrics();
        let json = serde_json::to_vec(metrics).expect("BroadcastMetrics always serializes");
        self.run_with_retry(|| {
            let json = json.clone();
            async move {
                let part = reqwest::multipart::Part::bytes(json).mime_str("application/json");
                let part = match part {
                    Ok(part) => part,
                    Err(err) => {
                        return Retryable::Complete(Err(CaffeineError::Transport(err.to_string())))
                    }
                };
                let form = reqwest::multipart::Form::new().part("primary", part);
                match self
                    .http
                    .post(&url)
                    .headers(self.authenticated_headers(credentials))
                    .multipart(form)
                    .send()
                    .await
                {
                    Ok(response) if response.status().is_success() => Retryable::Complete(Ok(())),
                    Ok(response) => Retryable::Complete(Err(CaffeineError::Failure {
                        kind: format!("http {}", response.status()),
                    })),
                    Err(err) => Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                }
            }
        })
        .await
    }

    /// `PUT /v4/stage/{username}`.
    ///
    /// On success, `request.cursor`/`request.payload` are overwritten with
    /// the server's response (matching `requestStageUpdate`'s move of the
    /// response's cursor/stage into the caller's next request). On a `401`
    /// the credential store is refreshed and the call is retried exactly
    /// once, independent of the outer attempt budget.
    pub async fn stage_update(
        &self,
        request: &mut StageRequest,
        creds: &CredentialStore,
    ) -> Result<StageUpdateOutcome, CaffeineError> {
        if request.payload.username.trim().is_empty() {
            return Err(CaffeineError::RequestFailed);
        }
        let url = self.endpoints.stage_update(&request.payload.username);

        let mut try_num = 0;
        loop {
            if try_num > 0 {
                tokio::time::sleep(self.backoff_for(try_num - 1)).await;
            }

            let mut attempted_refresh = false;
            let outcome = loop {
                let credentials = creds.snapshot();
                let response = match self
                    .http
                    .put(&url)
                    .headers(self.authenticated_headers(&credentials))
                    .json(request)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(err) => break Retryable::Retry(Err(CaffeineError::Transport(err.to_string()))),
                };

                let status = response.status();
                if status == reqwest::StatusCode::UNAUTHORIZED {
                    if attempted_refresh {
                        break Retryable::Complete(Err(CaffeineError::AuthInfoIncorrect));
                    }
                    attempted_refresh = true;
                    if creds.refresh(self).await {
                        continue;
                    }
                    break Retryable::Complete(Err(CaffeineError::AuthInfoIncorrect));
                }

                if status.is_success() {
                    match response.json::<StageResponse>().await {
                        Ok(parsed) => {
                            request.cursor = Some(parsed.cursor);
                            request.payload = parsed.payload;
                            break Retryable::Complete(Ok(StageUpdateOutcome {
                                retry_in: Duration::from_millis(parsed.retry_in),
                            }));
                        }
                        Err(err) => {
                            break Retryable::Retry(Err(CaffeineError::Transport(err.to_string())))
                        }
                    }
                } else {
                    match response.json::<FailureResponse>().await {
                        Ok(failure) if failure.is_out_of_capacity() => {
                            break Retryable::Complete(Err(CaffeineError::OutOfCapacity))
                        }
                        Ok(_) | Err(_) => {
                            break Retryable::Complete(Err(CaffeineError::Failure {
                                kind: format!("http {status}"),
                            }))
                        }
                    }
                }
            };

            let is_retry = outcome.is_retry();
            let value = outcome.into_inner();
            if !is_retry || try_num + 1 >= self.num_retries {
                return value;
            }
            try_num += 1;
        }
    }

    /// Build a stage request with no feeds, just enough to obtain an
    /// initial cursor (matching `createFeed`'s first `requestStageUpdate`
    /// call before the feed/offer is attached).
    pub fn cursor_only_request(username: &str, client_id: &str) -> StageRequest {
        StageRequest {
            client: Client {
                id: client_id.to_string(),
                headless: false,
                constrained_baseline: false,
            },
            cursor: None,
            payload: caffeine_protocol::Stage {
                username: username.to_string(),
                ..Default::default()
            },
        }
    }
}

trait IntoInnerResult<T> {
    fn into_inner_result(self) -> Result<T, CaffeineError>;
}

impl<T> IntoInnerResult<T> for Retryable<Result<T, CaffeineError>> {
    fn into_inner_result(self) -> Result<T, CaffeineError> {
        self.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_is_one_then_two_seconds() {
        let config = CaffeineConfig::default();
        let rest = RestClient::new(&config);
        assert_eq!(rest.backoff_for(0), Duration::from_secs(1));
        assert_eq!(rest.backoff_for(1), Duration::from_secs(2));
    }

    #[test]
    fn backoff_is_capped_at_max_backoff_secs() {
        let mut config = CaffeineConfig::default();
        config.rest.max_backoff_secs = 5;
        let rest = RestClient::new(&config);
        assert_eq!(rest.backoff_for(100), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn run_with_retry_sleeps_exactly_twice_for_three_failing_attempts() {
        let config = CaffeineConfig::default();
        let rest = RestClient::new(&config);
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        tokio::time::pause();
        let result: Result<(), CaffeineError> = rest
            .run_with_retry(|| async {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Retryable::Retry(Err(CaffeineError::Transport("boom".into())))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
        // 1s + 2s of paused virtual time should have elapsed.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn run_with_retry_stops_immediately_on_complete() {
        let config = CaffeineConfig::default();
        let rest = RestClient::new(&config);
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), CaffeineError> = rest
            .run_with_retry(|| async {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Retryable::Complete(Ok(()))
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
