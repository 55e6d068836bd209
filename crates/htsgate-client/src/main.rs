//! htsgate manifest-walker CLI.
//!
//! Usage:
//!   htsgate-client <manifest-url> [-o <file>]
//!
//! Fetches a redirect manifest, streams every referenced URI in order, and
//! concatenates the bytes to stdout or a file. Exits non-zero when any leg
//! reports `data-truncated: true` in its trailer block.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use htsgate_client::{WalkError, Walker};

fn main() -> ExitCode {
    // Log to stderr so the payload on stdout stays clean.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
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
    let mut url: Option<String> = None;
    let mut output: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "-h" || arg == "--help" {
            print_help();
            return Ok(ExitCode::SUCCESS);
        } else if arg == "-V" || arg == "--version" {
            println!("htsgate-client {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        } else if arg == "-o" {
            let Some(path) = args.next() else {
                bail!("-o requires a file argument");
            };
            output = Some(PathBuf::from(path));
        } else if let Some(path) = arg.strip_prefix("--output=") {
            output = Some(PathBuf::from(path));
        } else if arg.starts_with('-') {
            bail!("unknown option: {arg} (run with --help)");
        } else if url.is_none() {
            url = Some(arg);
        } else {
            bail!("unexpected argument: {arg}");
        }
    }

    let Some(url) = url else {
        print_help();
        return Ok(ExitCode::FAILURE);
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let walker = Walker::new();
        let result = match output {
            Some(path) => {
                let file = tokio::fs::File::create(&path).await?;
                let mut out = tokio::io::BufWriter::new(file);
                walker.walk(&url, &mut out).await
            }
            None => {
                let mut out = tokio::io::stdout();
                walker.walk(&url, &mut out).await
            }
        };
        match result {
            Ok(summary) => {
                info!(legs = summary.legs, bytes = summary.bytes, "walk complete");
                Ok(ExitCode::SUCCESS)
            }
            Err(WalkError::Truncated) => {
                eprintln!("Error: stream truncated by the server");
                Ok(ExitCode::from(3))
            }
            Err(err) => Err(err.into()),
        }
    })
}

fn print_help() {
    println!(
        r#"htsgate-client v{}

Usage:
  htsgate-client <manifest-url> [-o <file>]

Options:
  -o <file>, --output=<file>   Write the payload to a file instead of stdout
  -h, --help                   Show this help
  -V, --version                Show version

Examples:
  htsgate-client http://gw:8080/ga4gh/sample/ABC123456 -o sample.bam
  htsgate-client http://gw:8080/ga4gh/sample/ABC123456?format=SAM
"#,
        env!("CARGO_PKG_VERSION")
    );
}
