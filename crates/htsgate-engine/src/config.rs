//! Gateway configuration, read once at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by every request.
///
/// Read-only after startup; per-request state (working directories, process
/// handles) never lives here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for per-request working directories.
    pub tempdir: PathBuf,
    /// Grace period in seconds between client hangup and forced kills.
    pub timeout: u64,
    /// Alignment toolkit executable (`view` and `merge` modes).
    pub aligner: String,
    /// Duplicate-marking executable.
    pub markdup: String,
    /// Variant-caller executable.
    pub varcall: String,
    /// Default reference FASTA for VCF output.
    pub reference: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tempdir: env::temp_dir(),
            timeout: 3,
            aligner: "samtools".to_string(),
            markdup: "bamstreamingmarkduplicates".to_string(),
            varcall: "freebayes".to_string(),
            reference: None,
        }
    }
}

impl Config {
    /// Grace period armed on client hangup.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.timeout * 1000)
    }
}
