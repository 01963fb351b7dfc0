//! Transports that time one credential check against the target.
mod http;
mod simulated;
#[cfg(unix)]
mod unix;

pub use http::HttpOracle;
pub use simulated::SimulatedOracle;
#[cfg(unix)]
pub use unix::UnixSocketOracle;

use crate::{AttackError, TargetConfig, Transport};

use std::future::Future;
use std::time::Duration;

/// Something that answers a credential check slower the closer the
/// candidate is to the secret.
pub trait Oracle: Send + Sync {
    /// Perform one round trip with `candidate` as the username and return
    /// the time spent waiting on the response, excluding request setup.
    fn measure(&self, candidate: &str)
        -> impl Future<Output = Result<Duration, AttackError>> + Send;
}

/// The oracle selected by a [`TargetConfig`].
pub enum TargetOracle {
    Http(HttpOracle),
    #[cfg(unix)]
    Unix(UnixSocketOracle),
}

impl TargetOracle {
    pub fn connect(target: &TargetConfig) -> Result<Self, AttackError> {
        let timeout = target.request_timeout_ms.map(Duration::from_millis);
        match &target.transport {
            Transport::Tcp => Ok(Self::Http(HttpOracle::new(
                &target.url,
                &target.password,
                timeout,
            )?)),
            #[cfg(unix)]
            Transport::Unix { socket_path } => Ok(Self::Unix(UnixSocketOracle::new(
                socket_path,
                &target.url,
                &target.password,
                timeout,
            )?)),
            #[cfg(not(unix))]
            Transport::Unix { .. } => Err(AttackError::InvalidConfig(
                "unix socket transport is not supported on this platform".to_string(),
            )),
        }
    }
}

impl Oracle for TargetOracle {
    async fn measure(&self, candidate: &str) -> Result<Duration, AttackError> {
        match self {
            TargetOracle::Http(oracle) => oracle.measure(candidate).await,
            #[cfg(unix)]
            TargetOracle::Unix(oracle) => oracle.measure(candidate).await,
        }
    }
}
