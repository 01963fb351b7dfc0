//! Attack configuration, loadable from TOML and overridable from the command line.

use crate::AttackError;

use serde::{Deserialize, Serialize};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    pub target: TargetConfig,
    pub candidates: CandidateSource,
    pub dispatch: DispatchConfig,
    pub decision: DecisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Endpoint guarded by Basic auth. For a Unix socket only the path and
    /// query are sent.
    pub url: String,
    pub transport: Transport,
    /// Sent as the password half of every credential.
    pub password: String,
    /// Unset means a hung request stalls its batch forever.
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    #[default]
    Tcp,
    Unix { socket_path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CandidateSource {
    Exhaustive {
        alphabet: String,
        min_len: usize,
        max_len: usize,
    },
    Wordlist {
        path: PathBuf,
    },
    Extend {
        prefix: String,
        alphabet: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub batch_size: usize,
    pub workers: usize,
    /// Throwaway requests each worker makes once before timing anything.
    pub warmup_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub multiplier: f64,
    pub calibration_discard: usize,
    pub calibration_samples: usize,
    pub confirmation_samples: usize,
    pub on_request_error: RequestErrorPolicy,
}

/// What to do with a request that errors rather than merely being slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestErrorPolicy {
    /// Abort the whole run.
    #[default]
    Abort,
    /// Count the candidate as a non-match for this round.
    Miss,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000/vulnerable".to_string(),
            transport: Transport::Tcp,
            password: ".".to_string(),
            request_timeout_ms: None,
        }
    }
}

impl Default for CandidateSource {
    fn default() -> Self {
        Self::Exhaustive {
            alphabet: DEFAULT_ALPHABET.to_string(),
            min_len: 2,
            max_len: 4,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            workers: 8,
            warmup_requests: 3,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            multiplier: 8.0,
            calibration_discard: 1,
            calibration_samples: 1,
            confirmation_samples: 5,
            on_request_error: RequestErrorPolicy::Abort,
        }
    }
}

impl AttackConfig {
    pub fn load(path: &Path) -> Result<Self, AttackError> {
        let content = std::fs::read_to_string(path).map_err(|e| AttackError::read_file(path, e))?;
        let config: AttackConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AttackError> {
        if let Err(e) = reqwest::Url::parse(&self.target.url) {
            return Err(AttackError::InvalidUrl {
                url: self.target.url.clone(),
                reason: e.to_string(),
            });
        }

        match &self.candidates {
            CandidateSource::Exhaustive {
                alphabet,
                min_len,
                max_len,
            } => {
                validate_alphabet(alphabet)?;
                if *min_len == 0 {
                    return Err(invalid("candidate min_len must be at least 1"));
                }
                if min_len > max_len {
                    return Err(invalid(&format!(
                        "candidate min_len ({min_len}) exceeds max_len ({max_len})"
                    )));
                }
            }
            CandidateSource::Extend { alphabet, .. } => validate_alphabet(alphabet)?,
            CandidateSource::Wordlist { .. } => {}
        }

        if self.dispatch.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.dispatch.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }

        let multiplier = self.decision.multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(invalid(&format!(
                "multiplier must be finite and non-negative, got {multiplier}"
            )));
        }
        if self.decision.calibration_samples == 0 {
            return Err(invalid("calibration_samples must be at least 1"));
        }
        if self.decision.confirmation_samples == 0 {
            return Err(invalid("confirmation_samples must be at least 1"));
        }
        Ok(())
    }
}

fn validate_alphabet(alphabet: &str) -> Result<(), AttackError> {
    if alphabet.is_empty() {
        return Err(invalid("alphabet must not be empty"));
    }
    let mut seen = HashSet::new();
    if let Some(c) = alphabet.chars().find(|&c| !seen.insert(c)) {
        return Err(invalid(&format!("alphabet repeats '{c}'")));
    }
    Ok(())
}

fn invalid(reason: &str) -> AttackError {
    AttackError::InvalidConfig(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn default_config_is_valid() {
        AttackConfig::default().validate().unwrap();
    }

    #[test]
    fn config_parses_from_toml_with_defaults_for_missing_fields() {
        let toml = r#"
            [target]
            url = "http://127.0.0.1:9000/vulnerable"
            transport = { kind = "unix", socket_path = "/tmp/oracle.sock" }

            [candidates]
            strategy = "wordlist"
            path = "usernames.txt"

            [decision]
            multiplier = 0.5
            on_request_error = "miss"
        "#;

        let config: AttackConfig = toml::from_str(toml).unwrap();

        assert_eq!(
            config.target.transport,
            Transport::Unix {
                socket_path: PathBuf::from("/tmp/oracle.sock")
            }
        );
        assert_eq!(
            config.candidates,
            CandidateSource::Wordlist {
                path: PathBuf::from("usernames.txt")
            }
        );
        assert_eq!(config.decision.multiplier, 0.5);
        assert_eq!(config.decision.on_request_error, RequestErrorPolicy::Miss);
        assert_eq!(config.decision.confirmation_samples, 5);
        assert_eq!(config.dispatch.batch_size, 25);
        assert_eq!(config.target.password, ".");
    }

    #[rstest]
    #[case::empty_alphabet(CandidateSource::Exhaustive { alphabet: String::new(), min_len: 1, max_len: 2 })]
    #[case::repeated_alphabet(CandidateSource::Exhaustive { alphabet: "abca".to_string(), min_len: 1, max_len: 2 })]
    #[case::zero_min_len(CandidateSource::Exhaustive { alphabet: "ab".to_string(), min_len: 0, max_len: 2 })]
    #[case::inverted_range(CandidateSource::Exhaustive { alphabet: "ab".to_string(), min_len: 3, max_len: 2 })]
    #[case::empty_extension_alphabet(CandidateSource::Extend { prefix: "a".to_string(), alphabet: String::new() })]
    fn validate_rejects_bad_candidate_source(#[case] candidates: CandidateSource) {
        let config = AttackConfig {
            candidates,
            ..Default::default()
        };

        let err = config.validate().unwrap_err();

        assert!(matches!(err, AttackError::InvalidConfig(_)));
    }

    #[test]
    fn validate_rejects_zero_confirmation_samples() {
        let mut config = AttackConfig::default();
        config.decision.confirmation_samples = 0;

        assert!(matches!(
            config.validate(),
            Err(AttackError::InvalidConfig(_))
        ));
    }

    #[rstest]
    #[case(-1.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn validate_rejects_bad_multiplier(#[case] multiplier: f64) {
        let mut config = AttackConfig::default();
        config.decision.multiplier = multiplier;

        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attack.toml");

        let err = AttackConfig::load(&path).unwrap_err();

        assert!(matches!(err, AttackError::ReadFile { .. }));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn validate_rejects_unparsable_url() {
        let mut config = AttackConfig::default();
        config.target.url = "not a url".to_string();

        assert!(matches!(
            config.validate(),
            Err(AttackError::InvalidUrl { .. })
        ));
    }
}
