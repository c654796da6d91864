//! Production Environment implementation using system time and RNG.
//!
//! Real monotonic time that advances naturally, and OS cryptographic RNG
//! (getrandom) for session ids. Non-deterministic by nature; tests that need
//! reproducibility implement [`Environment`] over fixed values instead.

use buswatch_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional - session ids double as
/// unguessable connection handles, and a server without functioning
/// cryptographic randomness should not come up at all.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - refusing to hand out guessable session ids");
    }
}
