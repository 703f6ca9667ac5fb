//! Credential store, matching `SharedCredentials` in the original source.
//!
//! A single `std::sync::Mutex` guards the four credential strings. Refresh
//! copies the refresh token out under the lock, performs the REST call
//! *without* holding the lock, then swaps in the new credentials under a
//! fresh lock acquisition — never holding the lock across an `.await`.

use std::sync::{Arc, Mutex};

use caffeine_protocol::Credentials;

use crate::rest::RestClient;

#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Mutex<Credentials>>,
}

impl CredentialStore {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            inner: Arc::new(Mutex::new(credentials)),
        }
    }

    /// Snapshot the current credentials (cheap clone, released immediately).
    pub fn snapshot(&self) -> Credentials {
        self.inner.lock().expect("credential store poisoned").clone()
    }

    fn replace(&self, credentials: Credentials) {
        *self.inner.lock().expect("credential store poisoned") = credentials;
    }

    /// Copy out the refresh token, call the refresh endpoint outside the
    /// lock, then swap the new credentials in. Returns whether the refresh
    /// succeeded.
    pub async fn refresh(&self, rest: &RestClient) -> bool {
        let refresh_token = {
            let guard = self.inner.lock().expect("credential store poisoned");
            guard.refresh_token.clone()
        };

        match rest.refresh_auth(&refresh_token).await {
            Ok(credentials) => {
                self.replace(credentials);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_credentials() -> Credentials {
        Credentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            caid: "caid".into(),
            credential: "cred".into(),
        }
    }

    #[test]
    fn snapshot_returns_a_copy() {
        let store = CredentialStore::new(sample_credentials());
        let snap = store.snapshot();
        assert_eq!(snap.access_token, "at");
    }

    #[test]
    fn replace_swaps_all_four_fields() {
        let store = CredentialStore::new(sample_credentials());
        store.replace(Credentials {
            access_token: "at2".into(),
            refresh_token: "rt2".into(),
            caid: "caid2".into(),
            credential: "cred2".into(),
        });
        let snap = store.snapshot();
        assert_eq!(snap.access_token, "at2");
        assert_eq!(snap.refresh_token, "rt2");
        assert_eq!(snap.caid, "caid2");
        assert_eq!(snap.credential, "cred2");
    }
}
