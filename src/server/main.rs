use timing_attack::server::{self, CredentialStore};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use std::{path::PathBuf, time::Duration};

/// Demo login server whose `/vulnerable` route leaks how much of a username
/// is right through its response time
#[derive(Parser)]
#[command(name = "timing-oracle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// TCP address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Listen on a Unix domain socket instead
    #[arg(long)]
    unix_socket: Option<PathBuf>,

    /// Registered user as USERNAME:PASSWORD, repeatable
    #[arg(short, long = "user", value_parser = parse_user)]
    users: Vec<(String, String)>,

    /// Key checked by the /api routes
    #[arg(long, default_value = "58c32806ef12e036b2df5f9b74ef6da144080b3b")]
    api_key: String,

    /// Delay per matching character in the vulnerable comparison
    #[arg(long, default_value_t = 50)]
    char_delay_ms: u64,

    /// Simulated password hashing time, paid once a username is found
    #[arg(long, default_value_t = 0)]
    verify_cost_ms: u64,
}

fn parse_user(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .map(|(user, password)| (user.to_string(), password.to_string()))
        .ok_or_else(|| format!("expected USERNAME:PASSWORD, got '{s}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let mut store = CredentialStore::new(Duration::from_millis(cli.char_delay_ms))
        .with_api_key(&cli.api_key)
        .with_verify_cost(Duration::from_millis(cli.verify_cost_ms));
    for (username, password) in &cli.users {
        store = store.with_user(username, password);
    }

    match cli.unix_socket {
        #[cfg(unix)]
        Some(path) => {
            let server = server::spawn_unix_server(&path, store)
                .await
                .with_context(|| format!("could not listen on {}", path.display()))?;
            info!(socket = %path.display(), users = cli.users.len(), "oracle listening");
            server.await?;
        }
        #[cfg(not(unix))]
        Some(_) => anyhow::bail!("unix sockets are not supported on this platform"),
        None => {
            let listener = tokio::net::TcpListener::bind(&cli.bind)
                .await
                .with_context(|| format!("could not listen on {}", cli.bind))?;
            info!(address = %listener.local_addr()?, users = cli.users.len(), "oracle listening");
            axum::serve(listener, server::router(store)).await?;
        }
    }
    Ok(())
}
