//! Simulated environment with virtual time and seeded randomness.
//!
//! Every clone shares one clock and one RNG, so a cluster of clients built
//! from the same `SimEnv` draws keys from a single reproducible stream.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use hushlink_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Wall clock at virtual time zero (2024-01-01T00:00:00Z).
const EPOCH_WALL_CLOCK: u64 = 1_704_067_200;

/// Virtual instant: time since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    now: SimInstant,
    rng: ChaCha20Rng,
}

/// Deterministic environment for simulation.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                now: SimInstant::default(),
                rng: ChaCha20Rng::seed_from_u64(seed),
            })),
        }
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now = state.now + by;
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // a panic while holding the lock already failed the test
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.lock().now
    }

    fn wall_clock_secs(&self) -> u64 {
        EPOCH_WALL_CLOCK + self.lock().now.elapsed().as_secs()
    }

    fn wall_clock_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.lock().now.elapsed().as_millis()).unwrap_or(u64::MAX);
        (EPOCH_WALL_CLOCK * 1000).saturating_add(elapsed)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
