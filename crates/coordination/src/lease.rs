//! Distributed mutual-exclusion leases
//!
//! ## Design
//!
//! 1. **Single atomic grant**: acquisition is one set-if-absent-with-expiry
//!    call, so only one caller can hold a given lock key at a time.
//! 2. **Token-guarded release**: release is compare-and-delete against the
//!    holder token. A caller whose TTL expired cannot release a lease that
//!    another process has since acquired.
//! 3. **Expiry is the crash recovery**: if a holder dies mid-operation, the
//!    TTL is the only thing that frees the key. Leases are created and
//!    deleted, never mutated.
//!
//! A lock timeout is a normal contention outcome, not a fault. The acquire
//! loop polls with jittered backoff inside a wait budget and reports
//! `LockTimeout` when the budget runs out.

use rand::Rng;
use ratchet_core::{Error, HolderToken, LeaseStore, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Poll delay ceiling inside the acquire loop
const MAX_POLL_DELAY: Duration = Duration::from_millis(250);

/// Configuration for lease acquisition
///
/// # Example
/// ```ignore
/// let config = LeaseConfig::new()
///     .with_ttl(Duration::from_secs(30))
///     .with_wait_budget(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Lease lifetime; sole recovery window if the holder crashes
    pub ttl: Duration,
    /// Total time acquire may spend polling before reporting timeout
    pub wait_budget: Duration,
    /// First poll delay; doubles (with jitter) on each miss
    pub initial_poll_delay: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            wait_budget: Duration::from_secs(2),
            initial_poll_delay: Duration::from_millis(20),
        }
    }
}

impl LeaseConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lease TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the acquire wait budget
    pub fn with_wait_budget(mut self, wait_budget: Duration) -> Self {
        self.wait_budget = wait_budget;
        self
    }

    /// Set the initial poll delay
    pub fn with_initial_poll_delay(mut self, delay: Duration) -> Self {
        self.initial_poll_delay = delay;
        self
    }
}

/// A granted lease on one lock key
///
/// Transient: created on acquire, deleted on release or TTL expiry.
#[derive(Debug, Clone)]
pub struct LockLease {
    /// The coordination-store key this lease holds
    pub lock_key: String,
    /// Token proving ownership for release and renew
    pub holder_token: HolderToken,
    /// When the grant happened (process-local clock)
    pub acquired_at: Instant,
    /// Lifetime granted at acquisition
    pub ttl: Duration,
}

/// Acquires and releases leases against a coordination store
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
}

impl LockManager {
    /// Create a manager over a coordination store
    pub fn new(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    /// The configuration this manager acquires with
    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// The coordination store this manager acquires against
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Acquire a lease on `lock_key`, polling within the wait budget
    ///
    /// Each attempt generates a fresh holder token. On contention the loop
    /// sleeps a jittered, doubling delay and tries again until the budget
    /// is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] when the budget runs out (retryable),
    /// or [`Error::StorageUnavailable`] if the coordination store fails.
    pub fn acquire(&self, lock_key: &str) -> Result<LockLease> {
        let started = Instant::now();
        let token = HolderToken::generate();
        let mut poll_delay = self.config.initial_poll_delay;

        loop {
            if self.store.put_if_absent(lock_key, token, self.config.ttl)? {
                debug!(
                    target: "ratchet::lease",
                    lock_key,
                    %token,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "lease acquired"
                );
                return Ok(LockLease {
                    lock_key: lock_key.to_string(),
                    holder_token: token,
                    acquired_at: Instant::now(),
                    ttl: self.config.ttl,
                });
            }

            let remaining = self
                .config
                .wait_budget
                .checked_sub(started.elapsed())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                let waited_ms = started.elapsed().as_millis() as u64;
                debug!(target: "ratchet::lease", lock_key, waited_ms, "lease wait budget spent");
                return Err(Error::LockTimeout {
                    lock_key: lock_key.to_string(),
                    waited_ms,
                });
            }

            std::thread::sleep(jittered(poll_delay).min(remaining));
            poll_delay = (poll_delay * 2).min(MAX_POLL_DELAY);
        }
    }

    /// Release a lease, guarded by its holder token
    ///
    /// Returns true if this call deleted the key. False means the lease had
    /// already expired and may belong to another holder now. Not an error,
    /// but logged since it indicates the TTL was too short for the work.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store fails.
    pub fn release(&self, lease: &LockLease) -> Result<bool> {
        let deleted = self
            .store
            .delete_if_match(&lease.lock_key, lease.holder_token)?;
        if deleted {
            debug!(target: "ratchet::lease", lock_key = %lease.lock_key, "lease released");
        } else {
            warn!(
                target: "ratchet::lease",
                lock_key = %lease.lock_key,
                held_ms = lease.acquired_at.elapsed().as_millis() as u64,
                "lease expired before release"
            );
        }
        Ok(deleted)
    }

    /// Extend a held lease's TTL, guarded by its holder token
    ///
    /// Used by long-running transitions to avoid expiry mid-operation.
    /// Returns false if the lease already expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store fails.
    pub fn renew(&self, lease: &LockLease, ttl: Duration) -> Result<bool> {
        self.store
            .expire_if_match(&lease.lock_key, lease.holder_token, ttl)
    }

    /// Acquire a lease wrapped in an RAII guard
    ///
    /// The guard releases on every exit path, including unwinding. Prefer
    /// calling [`LeaseGuard::release`] explicitly so release errors are
    /// observable; the drop path is the fallback, not the mechanism.
    ///
    /// # Errors
    ///
    /// Same as [`LockManager::acquire`].
    pub fn acquire_guard(&self, lock_key: &str) -> Result<LeaseGuard> {
        let lease = self.acquire(lock_key)?;
        Ok(LeaseGuard {
            manager: self.clone(),
            lease,
            released: false,
        })
    }
}

/// Scoped lease: guaranteed release on all exit paths
///
/// Holding the guard is holding the lease. Dropping it without an explicit
/// release performs a best-effort token-guarded delete, so a panicking or
/// cancelled caller still frees the key promptly instead of waiting out
/// the TTL.
pub struct LeaseGuard {
    manager: LockManager,
    lease: LockLease,
    released: bool,
}

impl LeaseGuard {
    /// The lease this guard holds
    pub fn lease(&self) -> &LockLease {
        &self.lease
    }

    /// Extend the held lease's TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store fails.
    pub fn renew(&self, ttl: Duration) -> Result<bool> {
        self.manager.renew(&self.lease, ttl)
    }

    /// Release the lease now, reporting whether this call deleted the key
    ///
    /// # Errors
    ///
    /// Returns an error if the coordination store fails; the drop fallback
    /// is disarmed either way.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.manager.release(&self.lease)
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.released {
            // Unwind path: release errors have nowhere to go, log instead.
            if let Err(e) = self.manager.release(&self.lease) {
                warn!(
                    target: "ratchet::lease",
                    lock_key = %self.lease.lock_key,
                    error = %e,
                    "lease release failed during drop"
                );
            }
        }
    }
}

/// Add uniform jitter in [0, delay/2] to a poll delay
fn jittered(delay: Duration) -> Duration {
    let half = delay.as_millis() as u64 / 2;
    if half == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=half))
}
