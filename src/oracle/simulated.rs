use super::Oracle;
use crate::AttackError;

use rand::Rng;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// An in-process latency model of an early-exit comparison: answering takes
/// `base + k * per_char` where `k` is the number of leading characters the
/// candidate shares with the secret, plus up to `jitter` of uniform noise.
///
/// Durations are returned without sleeping. Clones share the request counter.
#[derive(Debug, Clone)]
pub struct SimulatedOracle {
    secret: String,
    base: Duration,
    per_char: Duration,
    jitter: Duration,
    requests: Arc<AtomicUsize>,
}

impl SimulatedOracle {
    pub fn new(secret: &str, base: Duration, per_char: Duration) -> Self {
        Self {
            secret: secret.to_string(),
            base,
            per_char,
            jitter: Duration::ZERO,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Leading characters `candidate` has in common with the secret.
    pub fn matching_prefix_len(&self, candidate: &str) -> usize {
        self.secret
            .chars()
            .zip(candidate.chars())
            .take_while(|(s, c)| s == c)
            .count()
    }

    pub fn latency(&self, candidate: &str) -> Duration {
        let matched = u32::try_from(self.matching_prefix_len(candidate)).unwrap_or(u32::MAX);
        self.base + self.per_char.saturating_mul(matched) + self.noise()
    }

    /// Total requests answered by this oracle and its clones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn noise(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::thread_rng().gen_range(0..=max))
    }
}

impl Oracle for SimulatedOracle {
    async fn measure(&self, candidate: &str) -> Result<Duration, AttackError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.latency(candidate))
    }
}
