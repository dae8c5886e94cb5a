//! Short opaque identifier generation.
//!
//! # Responsibility
//! - Produce identifiers for new entities, deployment keys and upload nonces.
//!
//! # Invariants
//! - Generation is infallible and needs no coordination between callers.
//! - Output is 16 characters from the URL-safe alphabet `[A-Za-z0-9_-]`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

const ID_RANDOM_BYTES: usize = 12;

/// Generates one short, URL-safe, statistically unique identifier.
pub fn generate() -> String {
    let raw = Uuid::new_v4().into_bytes();
    // Bytes 6..10 carry the UUID version and variant bits.
    let mut random = [0u8; ID_RANDOM_BYTES];
    random[..6].copy_from_slice(&raw[..6]);
    random[6..].copy_from_slice(&raw[10..]);
    URL_SAFE_NO_PAD.encode(random)
}

#[cfg(test)]
mod tests {
    use super::generate;
    use std::collections::HashSet;

    #[test]
    fn ids_are_short_and_url_safe() {
        let id = generate();
        assert_eq!(id.len(), 16);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn ids_do_not_collide_across_many_calls() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn concurrent_generation_needs_no_coordination() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1_000).map(|_| generate()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("generator thread should not panic") {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 4_000);
    }
}
