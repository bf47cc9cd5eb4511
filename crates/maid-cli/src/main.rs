//! `maid` binary

use maid_cli::{command, run, LOG_ENV};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr so reports on stdout stay machine readable
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let matches = command().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let mut stdout = std::io::stdout().lock();
    match run(&matches, &mut stdout).await {
        Ok(code) => std::process::exit(code.exit_code()),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}
