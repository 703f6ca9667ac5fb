use thiserror::Error;

/// Error taxonomy for the broadcast control plane.
///
/// Transport-level failures and untyped server failures are retried by the
/// REST client before ever reaching a caller (see `caffeine_core::rest`);
/// everything that surfaces here is terminal for the call that produced it.
#[derive(Debug, Error)]
pub enum CaffeineError {
    #[error("incorrect username or password")]
    AuthInfoIncorrect,
    #[error("username required")]
    UsernameRequired,
    #[error("password required")]
    PasswordRequired,
    #[error("refresh token required")]
    RefreshTokenRequired,
    #[error("multi-factor authentication code required")]
    MfaOtpRequired,
    #[error("multi-factor authentication code incorrect")]
    MfaOtpIncorrect,
    #[error("legal acceptance required before sign-in can complete")]
    LegalAcceptanceRequired,
    #[error("email verification required before sign-in can complete")]
    EmailVerificationRequired,
    #[error("not signed in")]
    NotSignedIn,
    #[error("account is not permitted to broadcast")]
    BroadcastNotAllowed,
    #[error("a broadcast is already in progress on this instance")]
    AlreadyBroadcasting,
    #[error("client version is too old to broadcast")]
    OldVersion,
    #[error("title is wider than {max_aspect_width}:{max_aspect_height}")]
    AspectTooWide {
        max_aspect_width: i64,
        max_aspect_height: i64,
    },
    #[error("title is narrower than {min_aspect_width}:{min_aspect_height}")]
    AspectTooNarrow {
        min_aspect_width: i64,
        min_aspect_height: i64,
    },
    #[error("stage is out of capacity")]
    OutOfCapacity,
    #[error("broadcast request failed")]
    RequestFailed,
    #[error("broadcast failed to negotiate")]
    BroadcastFailed,
    #[error("broadcast was taken over by another session")]
    Takeover,
    #[error("broadcast disconnected after repeated heartbeat failures")]
    Disconnected,
    #[error("server reported failure: {kind}")]
    Failure { kind: String },
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, CaffeineError>;
