mod attack;
mod auth;
mod calibration;
mod candidates;
mod config;
mod decision;
mod dispatch;
mod error;
mod oracle;
mod progress;
mod results;
pub mod server;

pub use attack::{Attack, AttackReport};
pub use auth::{basic_auth_header, decode_basic_auth};
pub use calibration::{calibrate, random_token, Threshold};
pub use candidates::{
    batches, generate, Batches, Candidates, ExhaustiveCandidates, PrefixExtension,
    WordlistCandidates,
};
pub use config::{
    AttackConfig, CandidateSource, DecisionConfig, DispatchConfig, RequestErrorPolicy,
    TargetConfig, Transport, DEFAULT_ALPHABET,
};
pub use decision::{is_confirmed_by, judge, DecisionPolicy, Measurement, Verdict};
pub use dispatch::WorkerPool;
pub use error::AttackError;
#[cfg(unix)]
pub use oracle::UnixSocketOracle;
pub use oracle::{HttpOracle, Oracle, SimulatedOracle, TargetOracle};
pub use progress::PrefixTracker;
pub use results::ResultSet;
