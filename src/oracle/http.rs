use super::Oracle;
use crate::{basic_auth_header, AttackError};

use reqwest::{header::AUTHORIZATION, Client, Url};
use tracing::trace;

use std::time::{Duration, Instant};

/// Times Basic-auth GET requests over TCP.
///
/// Each instance owns its own client holding a single pooled connection, so
/// one instance per worker keeps connection setup out of the measurements
/// once the worker has warmed up.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    url: Url,
    password: String,
}

impl HttpOracle {
    pub fn new(url: &str, password: &str, timeout: Option<Duration>) -> Result<Self, AttackError> {
        let url = Url::parse(url).map_err(|e| AttackError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut builder = Client::builder().pool_max_idle_per_host(1);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url,
            password: password.to_string(),
        })
    }
}

impl Oracle for HttpOracle {
    async fn measure(&self, candidate: &str) -> Result<Duration, AttackError> {
        let request = self
            .client
            .get(self.url.clone())
            .header(AUTHORIZATION, basic_auth_header(candidate, &self.password))
            .build()?;

        let start = Instant::now();
        let response = self.client.execute(request).await?;
        let elapsed = start.elapsed();

        let status = response.status();
        // Read the body so the connection goes back to the pool.
        response.bytes().await?;
        trace!(candidate, %status, ?elapsed, "oracle responded");
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::server::{spawn_server, CredentialStore};

    #[tokio::test]
    async fn http_oracle_times_slower_for_matching_prefix() {
        let store = CredentialStore::new(std::time::Duration::from_millis(30))
            .with_user("ab", "secret");
        let addr = spawn_server("127.0.0.1:0", store).await.unwrap();
        let oracle = HttpOracle::new(&format!("{addr}/vulnerable"), ".", None).unwrap();
        oracle.measure("zz").await.unwrap();

        let miss = oracle.measure("zz").await.unwrap();
        let hit = oracle.measure("ab").await.unwrap();

        assert!(hit >= Duration::from_millis(60), "hit took {hit:?}");
        assert!(hit > miss, "hit {hit:?} not slower than miss {miss:?}");
    }

    #[tokio::test]
    async fn http_oracle_reports_unreachable_target() {
        // Nothing listens on the discard port.
        let oracle = HttpOracle::new("http://127.0.0.1:9/vulnerable", ".", None).unwrap();

        let err = oracle.measure("aa").await.unwrap_err();

        assert!(err.is_connectivity());
    }

    #[test]
    fn http_oracle_rejects_bad_url() {
        assert!(matches!(
            HttpOracle::new("::not a url::", ".", None),
            Err(AttackError::InvalidUrl { .. })
        ));
    }
}
