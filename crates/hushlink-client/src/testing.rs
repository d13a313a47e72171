//! Deterministic environment for unit tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use hushlink_core::Environment;

#[derive(Clone)]
pub(crate) struct TestEnv {
    state: Arc<Mutex<State>>,
}

struct State {
    now: Duration,
    wall_clock: u64,
    rng: u64,
}

impl TestEnv {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                now: Duration::ZERO,
                wall_clock: 1_700_000_000,
                rng: seed | 1,
            })),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now += by;
        state.wall_clock += by.as_secs();
    }
}

impl Environment for TestEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.state.lock().unwrap().now
    }

    fn wall_clock_secs(&self) -> u64 {
        self.state.lock().unwrap().wall_clock
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut state = self.state.lock().unwrap();
        for byte in buffer {
            // xorshift64
            state.rng ^= state.rng << 13;
            state.rng ^= state.rng >> 7;
            state.rng ^= state.rng << 17;
            *byte = state.rng as u8;
        }
    }
}
