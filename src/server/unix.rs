use super::{router, CredentialStore};

use hyper::server::conn::http1;
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::{net::UnixListener, task::JoinHandle};
use tracing::{debug, error};

use std::path::Path;

/// Serve the oracle on a Unix domain socket in the background. A stale
/// socket file left at `path` is replaced.
pub async fn spawn_unix_server(
    path: &Path,
    store: CredentialStore,
) -> std::io::Result<JoinHandle<()>> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = UnixListener::bind(path)?;
    let app = router(store);
    Ok(tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("oracle socket stopped accepting: {e}");
                    return;
                }
            };
            let service = TowerToHyperService::new(app.clone());
            tokio::spawn(async move {
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("oracle socket connection ended: {e}");
                }
            });
        }
    }))
}
