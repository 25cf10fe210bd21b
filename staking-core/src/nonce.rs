//! Monotonic nonce issuance
//!
//! Nonces are seeded from wall-clock milliseconds but never repeat or go
//! backwards: if the clock stalls or is adjusted backwards, the sequencer
//! issues `last + 1` instead. Ordering holds per sequencer instance only.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of wall-clock values for nonce seeding
pub trait Clock: Send + Sync {
    /// Current time in milliseconds
    fn now_millis(&self) -> u64;
}

/// System wall clock (milliseconds since the Unix epoch)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Strictly increasing nonce generator for one logical signer
pub struct NonceSequencer {
    clock: Arc<dyn Clock>,
    last_issued: Mutex<u64>,
}

impl NonceSequencer {
    /// Sequencer backed by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Sequencer backed by a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_issued: Mutex::new(0),
        }
    }

    /// Issue the next nonce
    pub fn next(&self) -> u64 {
        let mut last = self.last_issued.lock();
        let candidate = self.clock.now_millis();
        let issued = if candidate <= *last { *last + 1 } else { candidate };
        *last = issued;
        issued
    }

    /// Last issued nonce (0 if none yet)
    pub fn last_issued(&self) -> u64 {
        *self.last_issued.lock()
    }
}

impl Default for NonceSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NonceSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceSequencer")
            .field("last_issued", &self.last_issued())
            .finish()
    }
}

/// One [`NonceSequencer`] per signer address.
///
/// Addresses are compared case-insensitively. There is no ordering
/// relation between nonces of different signers.
pub struct NonceRegistry {
    clock: Arc<dyn Clock>,
    sequencers: DashMap<String, Arc<NonceSequencer>>,
}

impl NonceRegistry {
    /// Registry backed by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry whose sequencers share a custom clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequencers: DashMap::new(),
        }
    }

    /// Sequencer for a signer, created on first use
    pub fn sequencer(&self, signer_address: &str) -> Arc<NonceSequencer> {
        let key = signer_address.to_lowercase();
        self.sequencers
            .entry(key)
            .or_insert_with(|| Arc::new(NonceSequencer::with_clock(Arc::clone(&self.clock))))
            .clone()
    }

    /// Issue the next nonce for a signer
    pub fn next(&self, signer_address: &str) -> u64 {
        self.sequencer(signer_address).next()
    }

    /// Number of signers seen so far
    pub fn len(&self) -> usize {
        self.sequencers.len()
    }

    /// Returns `true` if no signer has been seen
    pub fn is_empty(&self) -> bool {
        self.sequencers.is_empty()
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NonceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceRegistry")
            .field("signers", &self.sequencers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock whose reading is set by the test
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(millis: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(millis)))
        }

        fn set(&self, millis: u64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_frozen_clock_still_increases() {
        let clock = ManualClock::at(1_700_000_000_000);
        let sequencer = NonceSequencer::with_clock(clock);

        let mut previous = 0;
        for _ in 0..10_000 {
            let nonce = sequencer.next();
            assert!(nonce > previous);
            previous = nonce;
        }
        assert_eq!(previous, 1_700_000_000_000 + 9_999);
    }

    #[test]
    fn test_clock_moving_backwards() {
        let clock = ManualClock::at(5_000);
        let sequencer = NonceSequencer::with_clock(clock.clone());

        assert_eq!(sequencer.next(), 5_000);
        clock.set(4_000);
        assert_eq!(sequencer.next(), 5_001);
        clock.set(5_001);
        assert_eq!(sequencer.next(), 5_002);
        clock.set(9_000);
        assert_eq!(sequencer.next(), 9_000);
        assert_eq!(sequencer.last_issued(), 9_000);
    }

    #[test]
    fn test_system_clock_sequencer() {
        let sequencer = NonceSequencer::new();
        let a = sequencer.next();
        let b = sequencer.next();
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_issuance_is_unique() {
        let sequencer = Arc::new(NonceSequencer::with_clock(ManualClock::at(1)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sequencer = Arc::clone(&sequencer);
                std::thread::spawn(move || (0..500).map(|_| sequencer.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4_000);
    }

    #[test]
    fn test_registry_is_per_signer() {
        let registry = NonceRegistry::with_clock(ManualClock::at(100));

        assert_eq!(registry.next("0xAbC"), 100);
        assert_eq!(registry.next("0xabc"), 101);
        assert_eq!(registry.next("0xdef"), 100);
        assert_eq!(registry.len(), 2);
    }
}
