//! Unique id generator, matching `Broadcast.cpp::createUniqueId`.
//!
//! Seeded once per process from wall-clock time; this is explicitly NOT a
//! cryptographically strong generator and must never be used to derive a
//! secret. It exists purely to give feeds and clients an identifier the
//! stage service can key off of.

use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 12;

fn generator() -> &'static Mutex<StdRng> {
    static GENERATOR: OnceLock<Mutex<StdRng>> = OnceLock::new();
    GENERATOR.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Mutex::new(StdRng::seed_from_u64(seed))
    })
}

/// Generate a 12-character id drawn from `[a-z0-9]`.
pub fn generate_unique_id() -> String {
    let mut rng = generator().lock().expect("unique id generator poisoned");
    (0..ID_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_twelve_characters() {
        assert_eq!(generate_unique_id().len(), ID_LENGTH);
    }

    #[test]
    fn id_is_lowercase_alphanumeric() {
        let id = generate_unique_id();
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn successive_ids_are_not_trivially_identical() {
        let ids: Vec<String> = (0..20).map(|_| generate_unique_id()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert!(unique.len() > 1, "expected some variation across 20 draws");
    }
}
