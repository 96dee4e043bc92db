//! Registry of per-sender tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::token::Token;

/// Concurrent map from sender key to its [`Token`].
///
/// Tokens are created lazily on first use and shared by reference. The map
/// is sharded; creating an entry locks only the shard owning the key, which
/// makes check-then-insert atomic per key.
#[derive(Default)]
pub struct TokenRegistry {
    tokens: DashMap<String, Arc<Token>>,
}

impl TokenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the token for `key`, creating and registering it if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<Token> {
        if let Some(token) = self.tokens.get(key) {
            return Arc::clone(token.value());
        }

        let entry = self.tokens.entry(key.to_string()).or_insert_with(|| {
            debug!(key = %key, "Creating new sender token");
            Arc::new(Token::new(key))
        });
        Arc::clone(entry.value())
    }

    /// Insert a token under its own key, replacing any existing one.
    pub fn add(&self, token: Token) -> Arc<Token> {
        let token = Arc::new(token);
        self.tokens
            .insert(token.key().to_string(), Arc::clone(&token));
        token
    }

    /// Look up a token without creating it.
    pub fn get(&self, key: &str) -> Option<Arc<Token>> {
        self.tokens.get(key).map(|t| Arc::clone(t.value()))
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Remove tokens with no buckets at or after `cutoff`.
    ///
    /// A token somebody else still holds is kept even when empty, so a
    /// message being recorded concurrently is never lost with it.
    /// Returns the number of tokens removed.
    pub fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.tokens.len();

        self.tokens.retain(|_, token| {
            if Arc::strong_count(token) > 1 {
                return true;
            }
            token.prune(cutoff);
            token.bucket_count() > 0
        });

        let evicted = before.saturating_sub(self.tokens.len());
        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.tokens.len(), "Evicted idle tokens");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Barrier;
    use std::thread;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_get_or_create_returns_same_token() {
        let registry = TokenRegistry::new();

        let first = registry.get_or_create("a@x.com");
        let second = registry.get_or_create("a@x.com");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_token() {
        let registry = Arc::new(TokenRegistry::new());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_create("racy@x.com")
                })
            })
            .collect();

        let tokens: Vec<Arc<Token>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        for token in &tokens[1..] {
            assert!(Arc::ptr_eq(&tokens[0], token));
        }
    }

    #[test]
    fn test_add_overwrites_existing() {
        let registry = TokenRegistry::new();
        let original = registry.get_or_create("a@x.com");
        original.record_message(at(10, 0), 3);

        let seeded = registry.add(Token::new("a@x.com"));

        let current = registry.get("a@x.com").unwrap();
        assert!(Arc::ptr_eq(&seeded, &current));
        assert_eq!(current.count(), 0);
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = TokenRegistry::new();
        assert!(registry.get("nobody@x.com").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_idle_removes_only_empty_tokens() {
        let registry = TokenRegistry::new();
        registry.get_or_create("old@x.com").record_message(at(9, 0), 1);
        registry.get_or_create("new@x.com").record_message(at(10, 30), 1);

        let evicted = registry.evict_idle(at(10, 0));

        assert_eq!(evicted, 1);
        assert!(registry.get("old@x.com").is_none());
        assert!(registry.get("new@x.com").is_some());
    }

    #[test]
    fn test_evict_idle_keeps_held_tokens() {
        let registry = TokenRegistry::new();
        let held = registry.get_or_create("held@x.com");

        assert_eq!(registry.evict_idle(at(10, 0)), 0);
        assert_eq!(registry.len(), 1);

        drop(held);
        assert_eq!(registry.evict_idle(at(10, 0)), 1);
        assert!(registry.is_empty());
    }
}
