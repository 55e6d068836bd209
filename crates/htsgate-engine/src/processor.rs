//! Per-request driver: validate, plan, spawn, run, report, clean up.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use htsgate_types::{Format, PipelineOutcome, Query};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ProcessError, QueryError};
use crate::pipeline::PipelineEngine;
use crate::plan::{self, PipelinePlan};
use crate::process::ProcessHandle;
use crate::response::ResponseChannel;
use crate::trailer;

/// Drives one query through plan, pipeline, trailers, and cleanup.
///
/// Holds nothing but the startup configuration; all per-request state (the
/// plan, the working directory, the process handles) lives on the stack of
/// [`RequestProcessor::process`] and dies with it.
#[derive(Clone)]
pub struct RequestProcessor {
    config: Arc<Config>,
}

impl RequestProcessor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Formats the gateway can produce.
    pub fn supported_formats() -> [Format; 4] {
        [Format::Bam, Format::Cram, Format::Sam, Format::Vcf]
    }

    /// Format assumed when a query names none.
    pub fn default_format() -> Format {
        Format::Bam
    }

    /// Formats whose payload is text.
    pub fn textual_formats() -> [Format; 2] {
        [Format::Sam, Format::Vcf]
    }

    /// Fail-fast validation, usable by the controller before streaming.
    pub fn validate(&self, query: &Query) -> Result<(), QueryError> {
        plan::validate_query(query)
    }

    /// Drive one request to settlement.
    ///
    /// Streams the pipeline into `sink`, then emits the trailer block when
    /// one was declared. Pre-stream failures (validation, working
    /// directory, spawn) are returned as errors; once the stream may have
    /// started, failures are reported through the outcome instead.
    pub async fn process(
        &self,
        query: &Query,
        sink: &mut ResponseChannel,
    ) -> Result<PipelineOutcome, ProcessError> {
        self.validate(query)?;

        // Multi-file pipelines get a private working directory for merge
        // and duplicate-marking temp files. Drop removes it on early-error
        // paths; the settlement path closes it explicitly so removal
        // failures reach the log.
        let workdir = if query.is_multi_file() {
            let dir = tempfile::Builder::new()
                .prefix("htsgate_")
                .tempdir_in(&self.config.tempdir)
                .map_err(|source| ProcessError::Workdir {
                    base: self.config.tempdir.clone(),
                    source,
                })?;
            Some(dir)
        } else {
            None
        };
        let plan_dir = workdir
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .unwrap_or_else(|| self.config.tempdir.clone());

        let plan = plan::build_plan(query, &self.config, &plan_dir)?;
        let engine = PipelineEngine::new(self.spawn_stages(&plan)?);

        // Grace timer: armed on client hangup, it force-kills every stage
        // that has not reached a terminal state once the grace elapses.
        // The engine's own hangup handling (kill the head, let EOF cascade)
        // runs first; this is the backstop.
        let guards = engine.stage_guards();
        let hangup = sink.hangup();
        let grace = self.config.grace_period();
        let watchdog = tokio::spawn(async move {
            hangup.await;
            tokio::time::sleep(grace).await;
            for (token, closed) in &guards {
                if !closed.load(Ordering::SeqCst) {
                    warn!("grace period elapsed, force-killing stage");
                    token.cancel();
                }
            }
        });

        let outcome = engine.run(sink).await;
        watchdog.abort();
        let _ = watchdog.await;

        if sink.trailer_declared() {
            trailer::set_data_truncation(sink, outcome.truncated, outcome.checksum.as_deref())?;
        }

        if let Some(dir) = workdir {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                warn!(path = %path.display(), error = %err, "failed to remove working directory");
            }
        }

        debug!(truncated = outcome.truncated, "pipeline settled");
        Ok(outcome)
    }

    /// Spawn every stage of the plan, reaping already-spawned stages when a
    /// later one fails to start.
    fn spawn_stages(&self, plan: &PipelinePlan) -> Result<Vec<ProcessHandle>, ProcessError> {
        let mut handles: Vec<ProcessHandle> = Vec::with_capacity(plan.stages.len());
        for (i, stage) in plan.stages.iter().enumerate() {
            match ProcessHandle::spawn(stage, i > 0) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    for handle in handles {
                        handle.kill_token().cancel();
                        let _ = tokio::spawn(handle.supervise());
                    }
                    return Err(ProcessError::Spawn {
                        title: stage.title,
                        source,
                    });
                }
            }
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::response_channel;
    use htsgate_types::FileRef;
    use md5::{Digest, Md5};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    // Stand-in for the external toolchain: cats every argument that names a
    // file, or stdin when none does.
    const CAT_TOOL: &str = r#"found=0
for a in "$@"; do
  if [ -f "$a" ]; then cat "$a"; found=1; fi
done
if [ "$found" -eq 0 ]; then cat; fi
exit 0"#;

    fn fake_tool(dir: &Path, name: &str, script: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    struct Fixture {
        _tools: TempDir,
        tempdir: TempDir,
        data: TempDir,
        config: Arc<Config>,
    }

    fn fixture(tool_script: &str) -> Fixture {
        let tools = TempDir::new().unwrap();
        let tempdir = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let tool = fake_tool(tools.path(), "toolkit", tool_script);
        let config = Arc::new(Config {
            tempdir: tempdir.path().to_path_buf(),
            timeout: 1,
            aligner: tool.clone(),
            markdup: tool.clone(),
            varcall: tool,
            reference: None,
        });
        Fixture {
            _tools: tools,
            tempdir,
            data,
            config,
        }
    }

    fn data_file(fx: &Fixture, name: &str, content: &[u8]) -> FileRef {
        let path = fx.data.path().join(name);
        fs::write(&path, content).unwrap();
        FileRef::new(name, path)
    }

    #[tokio::test]
    async fn single_file_request_streams_with_trailers() {
        let fx = fixture(CAT_TOOL);
        let file = data_file(&fx, "sample.bam", b"read1\nread2\n");
        let query = Query::new(vec![file]).with_format(Format::Sam);

        let processor = RequestProcessor::new(fx.config.clone());
        let (mut sink, body) = response_channel(4);
        trailer::declare(&mut sink).unwrap();
        let collector = tokio::spawn(body.collect());

        let outcome = processor.process(&query, &mut sink).await.unwrap();
        drop(sink);
        let (bytes, trailers) = collector.await.unwrap();

        assert!(!outcome.truncated);
        assert_eq!(bytes, b"read1\nread2\n");
        let trailers = trailers.expect("trailer block");
        assert_eq!(trailers.get("data-truncated").unwrap(), "false");
        assert_eq!(
            trailers.get("checksum").unwrap(),
            hex::encode(Md5::digest(b"read1\nread2\n")).as_str()
        );
    }

    #[tokio::test]
    async fn multi_file_request_merges_and_removes_workdir() {
        let fx = fixture(CAT_TOOL);
        let a = data_file(&fx, "ABC123456_1.bam", b"AAAA");
        let b = data_file(&fx, "ABC123456_2.bam", b"BBBB");
        let query = Query::new(vec![a, b]).with_format(Format::Sam);

        let processor = RequestProcessor::new(fx.config.clone());
        let (mut sink, body) = response_channel(4);
        trailer::declare(&mut sink).unwrap();
        let collector = tokio::spawn(body.collect());

        let outcome = processor.process(&query, &mut sink).await.unwrap();
        drop(sink);
        let (bytes, trailers) = collector.await.unwrap();

        assert!(!outcome.truncated);
        assert_eq!(bytes, b"AAAABBBB");
        assert_eq!(
            trailers.unwrap().get("checksum").unwrap(),
            hex::encode(Md5::digest(b"AAAABBBB")).as_str()
        );
        // The per-request working directory is gone after settlement.
        assert_eq!(fs::read_dir(fx.tempdir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failing_stage_reports_truncation_trailer() {
        let fx = fixture("exit 7");
        let file = data_file(&fx, "sample.bam", b"ignored");
        let query = Query::new(vec![file]).with_format(Format::Sam);

        let processor = RequestProcessor::new(fx.config.clone());
        let (mut sink, body) = response_channel(4);
        trailer::declare(&mut sink).unwrap();
        let collector = tokio::spawn(body.collect());

        let outcome = processor.process(&query, &mut sink).await.unwrap();
        drop(sink);
        let (bytes, trailers) = collector.await.unwrap();

        assert!(outcome.truncated);
        assert!(bytes.is_empty());
        let trailers = trailers.expect("trailer block");
        assert_eq!(trailers.get("data-truncated").unwrap(), "true");
        assert_eq!(trailers.get("checksum").unwrap(), "null");
    }

    #[tokio::test]
    async fn validation_failures_spawn_nothing() {
        let fx = fixture(CAT_TOOL);
        let processor = RequestProcessor::new(fx.config.clone());

        let (mut sink, _body) = response_channel(4);
        let err = processor.process(&Query::default(), &mut sink).await.unwrap_err();
        assert!(matches!(err, ProcessError::Query(QueryError::NoFiles)));

        let file = data_file(&fx, "sample.bam", b"x");
        let query = Query::new(vec![file]).with_format(Format::Vcf);
        let err = processor.process(&query, &mut sink).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Query(QueryError::MissingReference)
        ));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_before_streaming() {
        let fx = fixture(CAT_TOOL);
        let file = data_file(&fx, "sample.bam", b"x");
        let query = Query::new(vec![file]).with_format(Format::Sam);

        let config = Arc::new(Config {
            aligner: "/nonexistent/toolkit".to_string(),
            ..(*fx.config).clone()
        });
        let processor = RequestProcessor::new(config);
        let (mut sink, _body) = response_channel(4);
        let err = processor.process(&query, &mut sink).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Spawn {
                title: "alignment-view",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn hangup_settles_a_stuck_pipeline() {
        let fx = fixture("exec sleep 30");
        let file = data_file(&fx, "sample.bam", b"ignored");
        let query = Query::new(vec![file]).with_format(Format::Sam);

        let processor = RequestProcessor::new(fx.config.clone());
        let (mut sink, body) = response_channel(4);
        let task = tokio::spawn(async move { processor.process(&query, &mut sink).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(body);

        let outcome = timeout(Duration::from_secs(10), task)
            .await
            .expect("hangup must settle the request")
            .unwrap()
            .unwrap();
        assert!(outcome.truncated);
    }

    #[tokio::test]
    async fn undeclared_trailers_are_skipped_silently() {
        let fx = fixture(CAT_TOOL);
        let file = data_file(&fx, "sample.bam", b"payload");
        let query = Query::new(vec![file]).with_format(Format::Sam);

        let processor = RequestProcessor::new(fx.config.clone());
        let (mut sink, body) = response_channel(4);
        let collector = tokio::spawn(body.collect());

        let outcome = processor.process(&query, &mut sink).await.unwrap();
        drop(sink);
        let (bytes, trailers) = collector.await.unwrap();

        assert!(!outcome.truncated);
        assert_eq!(bytes, b"payload");
        assert!(trailers.is_none());
    }

    #[test]
    fn format_queries() {
        assert_eq!(
            RequestProcessor::supported_formats(),
            [Format::Bam, Format::Cram, Format::Sam, Format::Vcf]
        );
        assert_eq!(RequestProcessor::default_format(), Format::Bam);
        assert_eq!(
            RequestProcessor::textual_formats(),
            [Format::Sam, Format::Vcf]
        );
    }
}
