//! Fault-injecting storage wrapper.
//!
//! Delegates to another storage but fails writes at a configurable rate.
//! Reads always pass through so tests can inspect what survived.

use std::sync::{Arc, Mutex};

use super::{KeyStorage, StorageError};

/// Storage wrapper that randomly fails `store` and `remove`.
///
/// The failure rate can be changed while the wrapper is in use, so a test can
/// let setup succeed and then break the disk under a running client.
#[derive(Clone)]
pub struct ChaoticStorage<S: KeyStorage> {
    inner: S,
    chaos: Arc<Mutex<Chaos>>,
}

/// Deterministic failure source
struct Chaos {
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// LCG state
    state: u64,
    /// Writes attempted
    writes: usize,
    /// Writes failed
    failures: usize,
}

impl Chaos {
    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    fn should_fail(&mut self) -> bool {
        self.writes += 1;
        let fail = self.next() < self.failure_rate;
        if fail {
            self.failures += 1;
        }
        fail
    }
}

impl<S: KeyStorage> ChaoticStorage<S> {
    /// Wrap `inner`, failing writes with probability `failure_rate`.
    ///
    /// The rate is clamped to [0.0, 1.0].
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            chaos: Arc::new(Mutex::new(Chaos {
                failure_rate: failure_rate.clamp(0.0, 1.0),
                state: seed,
                writes: 0,
                failures: 0,
            })),
        }
    }

    /// Underlying storage (for checking what was persisted).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Change the failure rate for all clones.
    pub fn set_failure_rate(&self, failure_rate: f64) {
        if let Ok(mut chaos) = self.chaos.lock() {
            chaos.failure_rate = failure_rate.clamp(0.0, 1.0);
        }
    }

    /// Writes attempted and writes failed so far.
    pub fn write_stats(&self) -> (usize, usize) {
        self.chaos.lock().map(|chaos| (chaos.writes, chaos.failures)).unwrap_or((0, 0))
    }

    fn inject(&self, name: &str) -> Result<(), StorageError> {
        let fail = self.chaos.lock().map_err(|_| StorageError::Poisoned)?.should_fail();
        if fail {
            return Err(StorageError::Io {
                name: name.to_string(),
                reason: "chaotic failure injection".to_string(),
            });
        }
        Ok(())
    }
}

impl<S: KeyStorage> KeyStorage for ChaoticStorage<S> {
    fn load(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.inner.load(name)
    }

    fn store(&self, name: &str, value: &str) -> Result<(), StorageError> {
        self.inject(name)?;
        self.inner.store(name, value)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.inject(name)?;
        self.inner.remove(name)
    }
}
