//! Measuring the baseline latency of a credential that cannot match, and
//! deriving the fixed decision threshold from it.
use crate::{AttackError, DecisionConfig, Oracle};

use rand::{distributions::Alphanumeric, Rng};
use tracing::{debug, info};

use std::time::Duration;

const TOKEN_LEN: usize = 24;
const TOKEN_MARKER: char = '#';

/// Latency cutoff above which a candidate is suspected of matching part of
/// the secret. Fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    baseline: Duration,
    multiplier: f64,
    cutoff: Duration,
}

impl Threshold {
    /// `cutoff = baseline + baseline * multiplier`, to the nearest nanosecond.
    pub fn from_baseline(baseline: Duration, multiplier: f64) -> Self {
        let extra_nanos = (baseline.as_nanos() as f64 * multiplier).round();
        let extra = Duration::from_nanos(extra_nanos as u64);
        Self {
            baseline,
            multiplier,
            cutoff: baseline.saturating_add(extra),
        }
    }

    pub fn baseline(&self) -> Duration {
        self.baseline
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn cutoff(&self) -> Duration {
        self.cutoff
    }

    pub fn is_exceeded_by(&self, elapsed: Duration) -> bool {
        elapsed > self.cutoff
    }
}

/// A random username that will not be registered on the target. The leading
/// marker keeps it from sharing even a first character with a plausible
/// secret.
pub fn random_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN - 1)
        .map(char::from)
        .collect();
    format!("{TOKEN_MARKER}{random}")
}

/// Time requests for random credentials and derive the run's threshold from
/// the fastest of them. Any failure to reach the oracle is fatal, since no
/// measurement means anything without a baseline.
pub async fn calibrate<O: Oracle>(
    oracle: &O,
    settings: &DecisionConfig,
) -> Result<Threshold, AttackError> {
    for _ in 0..settings.calibration_discard {
        oracle
            .measure(&random_token())
            .await
            .map_err(|e| AttackError::Calibration(Box::new(e)))?;
    }

    let mut baseline: Option<Duration> = None;
    for _ in 0..settings.calibration_samples.max(1) {
        let sample = oracle
            .measure(&random_token())
            .await
            .map_err(|e| AttackError::Calibration(Box::new(e)))?;
        debug!(?sample, "calibration sample");
        baseline = Some(baseline.map_or(sample, |b| b.min(sample)));
    }

    let baseline = baseline.unwrap_or_default();
    let threshold = Threshold::from_baseline(baseline, settings.multiplier);
    info!(
        ?baseline,
        cutoff = ?threshold.cutoff(),
        multiplier = settings.multiplier,
        "calibrated"
    );
    Ok(threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{HttpOracle, SimulatedOracle};

    use rstest::rstest;

    #[rstest]
    #[case(50_000, 0.5, 75_000)]
    #[case(50_000, 8.0, 450_000)]
    #[case(10_000, 0.0, 10_000)]
    #[case(3_000, 1.5, 7_500)]
    fn threshold_adds_multiple_of_baseline(
        #[case] baseline_us: u64,
        #[case] multiplier: f64,
        #[case] expected_us: u64,
    ) {
        let baseline = Duration::from_micros(baseline_us);

        let threshold = Threshold::from_baseline(baseline, multiplier);

        assert_eq!(threshold.cutoff(), Duration::from_micros(expected_us));
        assert_eq!(threshold.baseline(), baseline);
    }

    #[test]
    fn threshold_is_strictly_exceeded() {
        let threshold = Threshold::from_baseline(Duration::from_millis(50), 0.5);

        assert!(!threshold.is_exceeded_by(Duration::from_millis(75)));
        assert!(threshold.is_exceeded_by(Duration::from_millis(76)));
    }

    #[test]
    fn random_tokens_are_distinct_and_marked() {
        let a = random_token();
        let b = random_token();

        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.starts_with(TOKEN_MARKER));
        assert!(a.chars().skip(1).all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn calibrate_uses_fastest_sample_and_discards_warmup() {
        let oracle = SimulatedOracle::new(
            "secret",
            Duration::from_millis(50),
            Duration::from_millis(40),
        );
        let settings = DecisionConfig {
            multiplier: 0.5,
            calibration_discard: 2,
            calibration_samples: 3,
            ..Default::default()
        };

        let threshold = calibrate(&oracle, &settings).await.unwrap();

        assert_eq!(threshold.baseline(), Duration::from_millis(50));
        assert_eq!(threshold.cutoff(), Duration::from_millis(75));
        assert_eq!(oracle.requests(), 5);
    }

    #[tokio::test]
    async fn calibrate_fails_when_oracle_unreachable() {
        let oracle = HttpOracle::new("http://127.0.0.1:9/vulnerable", "", None).unwrap();

        let err = calibrate(&oracle, &DecisionConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AttackError::Calibration(_)));
        assert!(err.is_connectivity());
    }
}
