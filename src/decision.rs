//! Two-phase decision: a single measurement screens a candidate, then a
//! fixed number of re-samples must all stay above the threshold before the
//! candidate is accepted. Taking the minimum of the re-samples throws away
//! one-off delays from scheduling or the network.
use crate::{AttackError, DecisionConfig, Oracle, RequestErrorPolicy, Threshold};

use tracing::{debug, warn};

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPolicy {
    pub confirmation_samples: usize,
    pub on_request_error: RequestErrorPolicy,
}

impl From<&DecisionConfig> for DecisionPolicy {
    fn from(config: &DecisionConfig) -> Self {
        Self {
            confirmation_samples: config.confirmation_samples,
            on_request_error: config.on_request_error,
        }
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        (&DecisionConfig::default()).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The screening measurement did not exceed the threshold.
    BelowThreshold,
    /// Screening exceeded the threshold but the fastest re-sample did not.
    Unconfirmed { fastest: Duration },
    /// Every re-sample exceeded the threshold.
    Confirmed { fastest: Duration },
    /// A request errored and was counted as a miss.
    Failed,
}

/// The outcome of judging one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub candidate: String,
    /// The screening round trip, `None` if it errored.
    pub elapsed: Option<Duration>,
    pub verdict: Verdict,
}

impl Measurement {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.verdict, Verdict::Confirmed { .. })
    }
}

/// Whether the fastest of `samples` still exceeds the threshold.
pub fn is_confirmed_by(samples: &[Duration], threshold: &Threshold) -> bool {
    samples
        .iter()
        .min()
        .is_some_and(|&fastest| threshold.is_exceeded_by(fastest))
}

pub async fn judge<O: Oracle>(
    oracle: &O,
    candidate: String,
    threshold: &Threshold,
    policy: &DecisionPolicy,
) -> Result<Measurement, AttackError> {
    let Some(elapsed) = measure(oracle, &candidate, policy).await? else {
        return Ok(Measurement {
            candidate,
            elapsed: None,
            verdict: Verdict::Failed,
        });
    };
    if !threshold.is_exceeded_by(elapsed) {
        return Ok(Measurement {
            candidate,
            elapsed: Some(elapsed),
            verdict: Verdict::BelowThreshold,
        });
    }

    debug!(candidate = %candidate, ?elapsed, "screened, re-sampling");
    let mut samples = Vec::with_capacity(policy.confirmation_samples);
    for _ in 0..policy.confirmation_samples {
        match measure(oracle, &candidate, policy).await? {
            Some(sample) => samples.push(sample),
            None => {
                return Ok(Measurement {
                    candidate,
                    elapsed: Some(elapsed),
                    verdict: Verdict::Failed,
                })
            }
        }
    }

    let fastest = samples.iter().copied().min().unwrap_or(elapsed);
    let verdict = if is_confirmed_by(&samples, threshold) {
        Verdict::Confirmed { fastest }
    } else {
        Verdict::Unconfirmed { fastest }
    };
    Ok(Measurement {
        candidate,
        elapsed: Some(elapsed),
        verdict,
    })
}

/// One round trip, with errors either propagated or swallowed as a miss.
async fn measure<O: Oracle>(
    oracle: &O,
    candidate: &str,
    policy: &DecisionPolicy,
) -> Result<Option<Duration>, AttackError> {
    match oracle.measure(candidate).await {
        Ok(elapsed) => Ok(Some(elapsed)),
        Err(e) if policy.on_request_error == RequestErrorPolicy::Miss => {
            warn!(candidate, "request failed, counting as a miss: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
