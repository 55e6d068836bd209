//! htsgate server entry point.
//!
//! Usage:
//!   htsgate-server [OPTIONS]
//!
//! Streams genomic data assembled by an on-demand subprocess pipeline,
//! reporting truncation and a content checksum through HTTP trailers.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use htsgate_engine::{Config, FsCatalog, RequestProcessor};
use htsgate_server::{build_router, GatewayState};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let mut port = 8080u16;
    let mut socket: Option<PathBuf> = None;
    let mut data = PathBuf::from(".");
    let mut config = Config::default();

    for arg in env::args().skip(1) {
        if arg == "-h" || arg == "--help" {
            print_help();
            return Ok(ExitCode::SUCCESS);
        } else if arg == "-V" || arg == "--version" {
            println!("htsgate-server {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        } else if let Some(value) = arg.strip_prefix("--port=") {
            port = value.parse().context("--port expects a number")?;
        } else if let Some(value) = arg.strip_prefix("--socket=") {
            socket = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--data=") {
            data = PathBuf::from(value);
        } else if let Some(value) = arg.strip_prefix("--tempdir=") {
            config.tempdir = PathBuf::from(value);
        } else if let Some(value) = arg.strip_prefix("--timeout=") {
            config.timeout = value.parse().context("--timeout expects seconds")?;
        } else if let Some(value) = arg.strip_prefix("--reference=") {
            config.reference = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--aligner=") {
            config.aligner = value.to_string();
        } else if let Some(value) = arg.strip_prefix("--markdup=") {
            config.markdup = value.to_string();
        } else if let Some(value) = arg.strip_prefix("--varcall=") {
            config.varcall = value.to_string();
        } else {
            bail!("unknown option: {arg} (run with --help)");
        }
    }

    let config = Arc::new(config);
    let catalog = Arc::new(FsCatalog::new(&data, config.reference.clone()));
    let state = GatewayState {
        processor: Arc::new(RequestProcessor::new(config)),
        catalog,
    };
    let router = build_router(state);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match socket {
            Some(path) => {
                // A previous run may have left the socket file behind.
                let _ = std::fs::remove_file(&path);
                let listener = tokio::net::UnixListener::bind(&path)
                    .with_context(|| format!("failed to bind {}", path.display()))?;
                info!(socket = %path.display(), "starting htsgate server");
                axum::serve(listener, router).await?;
            }
            None => {
                let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                    .await
                    .with_context(|| format!("failed to bind port {port}"))?;
                info!(port, "starting htsgate server");
                axum::serve(listener, router).await?;
            }
        }
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(ExitCode::SUCCESS)
}

fn print_help() {
    println!(
        r#"htsgate-server v{}

Usage:
  htsgate-server [OPTIONS]

Options:
  --port=<n>            TCP port to listen on (default: 8080)
  --socket=<path>       Listen on a UNIX socket instead of TCP
  --data=<dir>          Archive directory served by the catalog (default: .)
  --tempdir=<dir>       Base for per-request working directories (default: OS temp)
  --timeout=<seconds>   Grace period after client hangup (default: 3)
  --reference=<path>    Reference FASTA used for VCF output
  --aligner=<path>      Alignment toolkit executable (default: samtools)
  --markdup=<path>      Duplicate-marking executable (default: bamstreamingmarkduplicates)
  --varcall=<path>      Variant-caller executable (default: freebayes)
  -h, --help            Show this help
  -V, --version         Show version

Examples:
  htsgate-server --data=/archive --port=9090
  htsgate-server --data=/archive --socket=/run/htsgate.sock --timeout=10
"#,
        env!("CARGO_PKG_VERSION")
    );
}
