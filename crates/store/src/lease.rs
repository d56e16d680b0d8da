//! In-memory lease store with real TTL semantics
//!
//! A single mutex over the lease table makes each primitive trivially
//! atomic, matching what a scripted key-value server guarantees. Expiry is
//! lazy: an entry past its deadline counts as absent the next time any
//! operation touches its key.

use parking_lot::Mutex;
use ratchet_core::{HolderToken, LeaseStore, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct LeaseEntry {
    token: HolderToken,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local [`LeaseStore`] backed by a mutex-guarded table
#[derive(Default)]
pub struct MemoryLeaseStore {
    entries: Mutex<HashMap<String, LeaseEntry>>,
}

impl MemoryLeaseStore {
    /// Create an empty lease store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) leases, for test assertions
    pub fn live_count(&self) -> usize {
        let entries = self.entries.lock();
        entries.values().filter(|e| !e.is_expired()).count()
    }
}

/// What an operation found under a key: (expired, token matches)
fn probe(entries: &HashMap<String, LeaseEntry>, key: &str, token: HolderToken) -> Option<(bool, bool)> {
    entries.get(key).map(|e| (e.is_expired(), e.token == token))
}

impl LeaseStore for MemoryLeaseStore {
    fn put_if_absent(&self, key: &str, token: HolderToken, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        if let Some((false, _)) = probe(&entries, key, token) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            LeaseEntry {
                token,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    fn delete_if_match(&self, key: &str, token: HolderToken) -> Result<bool> {
        let mut entries = self.entries.lock();
        match probe(&entries, key, token) {
            Some((true, _)) => {
                entries.remove(key);
                Ok(false)
            }
            Some((false, true)) => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn expire_if_match(&self, key: &str, token: HolderToken, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        match probe(&entries, key, token) {
            Some((true, _)) => {
                entries.remove(key);
                Ok(false)
            }
            Some((false, true)) => {
                if let Some(existing) = entries.get_mut(key) {
                    existing.expires_at = Instant::now() + ttl;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(5);

    #[test]
    fn test_put_if_absent_grants_once() {
        let store = MemoryLeaseStore::new();
        let a = HolderToken::generate();
        let b = HolderToken::generate();

        assert!(store.put_if_absent("ticket:1", a, TTL).unwrap());
        assert!(!store.put_if_absent("ticket:1", b, TTL).unwrap());
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_expired_entry_counts_as_absent() {
        let store = MemoryLeaseStore::new();
        let a = HolderToken::generate();
        let b = HolderToken::generate();

        store
            .put_if_absent("ticket:1", a, Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(store.put_if_absent("ticket:1", b, TTL).unwrap());
    }

    #[test]
    fn test_delete_requires_matching_token() {
        let store = MemoryLeaseStore::new();
        let holder = HolderToken::generate();
        let imposter = HolderToken::generate();

        store.put_if_absent("ticket:1", holder, TTL).unwrap();
        assert!(!store.delete_if_match("ticket:1", imposter).unwrap());
        assert_eq!(store.live_count(), 1);
        assert!(store.delete_if_match("ticket:1", holder).unwrap());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_delete_of_expired_entry_reports_false() {
        let store = MemoryLeaseStore::new();
        let holder = HolderToken::generate();

        store
            .put_if_absent("ticket:1", holder, Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(!store.delete_if_match("ticket:1", holder).unwrap());
    }

    #[test]
    fn test_expire_if_match_extends_deadline() {
        let store = MemoryLeaseStore::new();
        let holder = HolderToken::generate();

        store
            .put_if_absent("ticket:1", holder, Duration::from_millis(40))
            .unwrap();
        assert!(store
            .expire_if_match("ticket:1", holder, Duration::from_secs(5))
            .unwrap());
        std::thread::sleep(Duration::from_millis(60));
        // Original deadline passed; renewed lease still live
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn test_expire_requires_matching_token() {
        let store = MemoryLeaseStore::new();
        let holder = HolderToken::generate();
        let imposter = HolderToken::generate();

        store.put_if_absent("ticket:1", holder, TTL).unwrap();
        assert!(!store
            .expire_if_match("ticket:1", imposter, Duration::from_secs(5))
            .unwrap());
    }

    #[test]
    fn test_absent_key_operations_report_false() {
        let store = MemoryLeaseStore::new();
        let token = HolderToken::generate();
        assert!(!store.delete_if_match("missing", token).unwrap());
        assert!(!store.expire_if_match("missing", token, TTL).unwrap());
    }
}
