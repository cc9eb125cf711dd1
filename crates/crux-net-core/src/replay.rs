//! Replay protection for nonce-bound certificates.
//!
//! Each sender gets its own bounded window of accepted nonces, so one party
//! flooding the receiver can only ever push out its own entries. Nonces are
//! random, not sequential, so a window is a FIFO set rather than a counter
//! bitmap.
//!
//! Every tracked packet carries the sender's signed creation time. Packets
//! older than the maximum age are refused outright, and a window that has to
//! evict an entry raises that sender's floor: nothing created at or before
//! the evicted entry is accepted again.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::identity::Identity;

/// Default number of remembered nonces per sender.
pub const DEFAULT_REPLAY_WINDOW: usize = 4096;

/// Default maximum packet age in milliseconds.
pub const DEFAULT_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Full sweep of idle senders every this many checks.
const SWEEP_EVERY: u64 = 256;

/// Milliseconds since the Unix epoch, saturating.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Outcome of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// First sighting; now recorded.
    Fresh,
    /// The nonce was already accepted from this sender.
    Duplicate,
    /// Outside the age bound, or at or below the sender's floor.
    Expired,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        self == Freshness::Fresh
    }
}

#[derive(Debug, Default)]
struct SenderWindow {
    seen: HashSet<String>,
    order: VecDeque<(String, u64)>,
    floor: Option<u64>,
}

impl SenderWindow {
    fn pop_front(&mut self) -> Option<u64> {
        let (nonce, created_at) = self.order.pop_front()?;
        self.seen.remove(&nonce);
        Some(created_at)
    }
}

/// Per-sender bounded sets of accepted nonces.
#[derive(Debug)]
pub struct ReplayGuard {
    capacity: usize,
    max_age_ms: u64,
    senders: HashMap<Identity, SenderWindow>,
    checks: u64,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW).with_max_age(DEFAULT_MAX_AGE_MS)
    }
}

impl ReplayGuard {
    /// `capacity` is per sender. Zero disables the guard.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            max_age_ms: 0,
            senders: HashMap::new(),
            checks: 0,
        }
    }

    /// Refuse packets created more than `max_age_ms` away from now. Zero
    /// disables the age bound.
    pub fn with_max_age(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    /// Check against the wall clock.
    pub fn check(&mut self, sender: &Identity, nonce: &str, created_at: u64) -> Freshness {
        self.check_at(sender, nonce, created_at, now_millis())
    }

    /// Check a nonce and record it if fresh.
    pub fn check_at(&mut self, sender: &Identity, nonce: &str, created_at: u64, now: u64) -> Freshness {
        if self.capacity == 0 {
            return Freshness::Fresh;
        }
        if self.is_stale(created_at, now) {
            return Freshness::Expired;
        }

        self.checks = self.checks.wrapping_add(1);
        if self.max_age_ms > 0 && self.checks % SWEEP_EVERY == 0 {
            self.sweep(now);
        }

        let max_age_ms = self.max_age_ms;
        let capacity = self.capacity;
        let window = self.senders.entry(sender.clone()).or_default();

        if max_age_ms > 0 {
            while let Some(&(_, oldest)) = window.order.front() {
                if oldest.saturating_add(max_age_ms) >= now {
                    break;
                }
                window.pop_front();
            }
        }

        if window.floor.is_some_and(|floor| created_at <= floor) {
            return Freshness::Expired;
        }
        if window.seen.contains(nonce) {
            return Freshness::Duplicate;
        }

        while window.order.len() >= capacity {
            match window.pop_front() {
                Some(evicted) => {
                    window.floor = Some(window.floor.map_or(evicted, |f| f.max(evicted)))
                }
                None => break,
            }
        }
        window.seen.insert(nonce.to_owned());
        window.order.push_back((nonce.to_owned(), created_at));
        Freshness::Fresh
    }

    fn is_stale(&self, created_at: u64, now: u64) -> bool {
        self.max_age_ms > 0
            && (created_at.saturating_add(self.max_age_ms) < now
                || created_at > now.saturating_add(self.max_age_ms))
    }

    /// Drop expired entries and forget senders with nothing left to guard.
    pub fn sweep(&mut self, now: u64) {
        if self.max_age_ms == 0 {
            return;
        }
        let max_age_ms = self.max_age_ms;
        self.senders.retain(|_, window| {
            while let Some(&(_, oldest)) = window.order.front() {
                if oldest.saturating_add(max_age_ms) >= now {
                    break;
                }
                window.pop_front();
            }
            let floor_live = window
                .floor
                .is_some_and(|floor| floor.saturating_add(max_age_ms) >= now);
            !window.order.is_empty() || floor_live
        });
    }

    /// Total remembered nonces across all senders.
    pub fn len(&self) -> usize {
        self.senders.values().map(|w| w.order.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }
}
