//! Drives a whole run: calibrate once, then push the candidate sequence
//! through the worker pool batch by batch.
use crate::{
    calibrate, candidates::batches, generate, AttackConfig, AttackError, DecisionPolicy, Oracle,
    PrefixTracker, ResultSet, TargetOracle, Threshold, Verdict, WorkerPool,
};

use tracing::{debug, info};

/// Characters of a candidate that make up a progress line.
const PROGRESS_PREFIX_LEN: usize = 2;

#[derive(Debug, Clone)]
pub struct AttackReport {
    pub threshold: Threshold,
    /// Candidates that stayed above the threshold through confirmation, in
    /// no particular order.
    pub confirmed: Vec<String>,
    pub tried: usize,
    /// Candidates whose first measurement exceeded the threshold.
    pub screened: usize,
    pub failed: usize,
    pub batches: usize,
}

pub struct Attack {
    config: AttackConfig,
}

impl Attack {
    pub fn new(config: AttackConfig) -> Result<Self, AttackError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    /// Attack the configured target with the configured candidates.
    pub async fn run(&self) -> Result<AttackReport, AttackError> {
        let candidates = generate(&self.config.candidates)?;
        let target = &self.config.target;
        self.run_with(candidates, || TargetOracle::connect(target)).await
    }

    /// Attack using oracles built by `connect`: one for calibration, then one
    /// per worker. The sequence is only ever read one batch ahead, and the
    /// run ends when it is exhausted.
    pub async fn run_with<O, F, I>(
        &self,
        candidates: I,
        connect: F,
    ) -> Result<AttackReport, AttackError>
    where
        O: Oracle + 'static,
        F: Fn() -> Result<O, AttackError>,
        I: IntoIterator<Item = String>,
    {
        let threshold = {
            let oracle = connect()?;
            calibrate(&oracle, &self.config.decision).await?
        };

        let results = ResultSet::default();
        let policy = DecisionPolicy::from(&self.config.decision);
        let pool = WorkerPool::start(
            &self.config.dispatch,
            threshold,
            policy,
            results.clone(),
            connect,
        )
        .await?;

        let mut progress = PrefixTracker::new(PROGRESS_PREFIX_LEN);
        let mut report = AttackReport {
            threshold,
            confirmed: Vec::new(),
            tried: 0,
            screened: 0,
            failed: 0,
            batches: 0,
        };
        for batch in batches(candidates, self.config.dispatch.batch_size) {
            let measurements = match pool.dispatch(batch).await {
                Ok(measurements) => measurements,
                Err(e) => {
                    pool.shutdown().await;
                    return Err(e);
                }
            };

            report.batches += 1;
            report.tried += measurements.len();
            for m in &measurements {
                if progress.observe(&m.candidate) {
                    info!(candidate = %m.candidate, elapsed = ?m.elapsed, "progress");
                }
                match m.verdict {
                    Verdict::BelowThreshold => {}
                    Verdict::Unconfirmed { fastest } => {
                        report.screened += 1;
                        debug!(candidate = %m.candidate, ?fastest, "rejected on re-sampling");
                    }
                    Verdict::Confirmed { fastest } => {
                        report.screened += 1;
                        info!(
                            candidate = %m.candidate,
                            elapsed = ?m.elapsed,
                            ?fastest,
                            "confirmed"
                        );
                    }
                    Verdict::Failed => report.failed += 1,
                }
            }
            debug!(
                batch = report.batches,
                tried = report.tried,
                confirmed = results.len(),
                "batch complete"
            );
        }
        pool.shutdown().await;

        report.confirmed = results.into_vec();
        info!(
            tried = report.tried,
            confirmed = report.confirmed.len(),
            "attack finished"
        );
        Ok(report)
    }
}
