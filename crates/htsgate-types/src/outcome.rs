//! Settlement value of one pipeline run.

/// How a pipeline run ended.
///
/// This is the single value the engine resolves with once every stage has
/// reached a terminal state: either the full payload was streamed and its
/// digest is known, or the stream is truncated and carries no digest.
/// The accessor methods produce the literal strings sent in the HTTP
/// trailer block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// True when any stage, conduit, or the sink failed mid-stream.
    pub truncated: bool,
    /// Hex MD5 of the streamed body; present only on complete runs.
    pub checksum: Option<String>,
}

impl PipelineOutcome {
    /// All stages exited cleanly and every body byte reached the sink.
    pub fn complete(checksum: impl Into<String>) -> Self {
        Self {
            truncated: false,
            checksum: Some(checksum.into()),
        }
    }

    /// Something failed after streaming may have begun.
    pub fn failed() -> Self {
        Self {
            truncated: true,
            checksum: None,
        }
    }

    /// Value of the `data-truncated` trailer.
    pub fn truncated_value(&self) -> &'static str {
        if self.truncated {
            "true"
        } else {
            "false"
        }
    }

    /// Value of the `checksum` trailer.
    pub fn checksum_value(&self) -> &str {
        self.checksum.as_deref().unwrap_or("null")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_carries_digest() {
        let out = PipelineOutcome::complete("16b3d79daec1da26d98a4e1b63e800b0");
        assert!(!out.truncated);
        assert_eq!(out.truncated_value(), "false");
        assert_eq!(out.checksum_value(), "16b3d79daec1da26d98a4e1b63e800b0");
    }

    #[test]
    fn failed_reports_null_checksum() {
        let out = PipelineOutcome::failed();
        assert!(out.truncated);
        assert_eq!(out.truncated_value(), "true");
        assert_eq!(out.checksum_value(), "null");
    }
}
