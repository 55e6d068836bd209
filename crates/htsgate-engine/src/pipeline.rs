//! Pipeline execution: chain stages over OS pipes and stream the tail.
//!
//! Stages run as OS processes in parallel; all bookkeeping happens on the
//! async runtime. Intermediate stages are connected stdout-to-stdin by copy
//! conduits; the terminal stage's stdout is read exactly once and the same
//! bytes feed both the MD5 accumulator and the response sink, so the digest
//! always matches the delivered byte sequence.
//!
//! ```text
//!   stage[0] ──pipe──▶ stage[1] ──pipe──▶ … ──▶ stage[n-1]
//!                                                   │ stdout
//!                                            ┌──────┴──────┐
//!                                            ▼             ▼
//!                                        MD5 digest   response sink
//! ```
//!
//! Failure propagation: a failed stage kills its immediate successor (its
//! predecessors see EOF once the consumer dies); a transport hangup kills
//! the head and the EOF cascade finishes the rest.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use htsgate_types::PipelineOutcome;

use crate::process::ProcessHandle;
use crate::response::ResponseChannel;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Executes one spawned pipeline to settlement.
pub struct PipelineEngine {
    stages: Vec<ProcessHandle>,
}

impl PipelineEngine {
    pub fn new(stages: Vec<ProcessHandle>) -> Self {
        assert!(!stages.is_empty(), "pipeline requires at least one stage");
        Self { stages }
    }

    /// Kill token and closed flag of every stage, in pipeline order.
    ///
    /// The request processor uses these for the grace-timer backstop.
    pub fn stage_guards(&self) -> Vec<(CancellationToken, Arc<AtomicBool>)> {
        self.stages
            .iter()
            .map(|stage| (stage.kill_token(), stage.closed_flag()))
            .collect()
    }

    /// Run the pipeline into `sink` and settle exactly once.
    ///
    /// Resolves only after every stage has reached a terminal state: with a
    /// digest when all of them exited cleanly and every byte reached the
    /// sink, truncated otherwise.
    pub async fn run(mut self, sink: &mut ResponseChannel) -> PipelineOutcome {
        let count = self.stages.len();
        let tokens: Vec<CancellationToken> =
            self.stages.iter().map(|s| s.kill_token()).collect();

        if sink.is_closed() {
            warn!("destination closed before pipeline start");
            for token in &tokens {
                token.cancel();
            }
            for stage in self.stages {
                let _ = stage.supervise().await;
            }
            return PipelineOutcome::failed();
        }

        // Wire stage[i].stdout into stage[i+1].stdin. A conduit error is a
        // stage failure; the downstream neighbour is killed so a blocked
        // writer cannot deadlock the pipeline.
        let mut conduits: Vec<JoinHandle<Result<(), std::io::Error>>> =
            Vec::with_capacity(count.saturating_sub(1));
        for i in 0..count - 1 {
            let mut upstream = self.stages[i]
                .stdout
                .take()
                .expect("stage stdout is piped");
            let mut downstream = self.stages[i + 1]
                .stdin
                .take()
                .expect("inner stage stdin is piped");
            let next = tokens[i + 1].clone();
            conduits.push(tokio::spawn(async move {
                // Dropping `downstream` on return closes the successor's stdin.
                match tokio::io::copy(&mut upstream, &mut downstream).await {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        next.cancel();
                        Err(err)
                    }
                }
            }));
        }

        let mut tail = self.stages[count - 1]
            .stdout
            .take()
            .expect("stage stdout is piped");

        // One supervisor per stage; a failing stage kills its successor.
        let mut supervisors = Vec::with_capacity(count);
        for (i, stage) in self.stages.into_iter().enumerate() {
            let next = tokens.get(i + 1).cloned();
            supervisors.push(tokio::spawn(async move {
                let result = stage.supervise().await;
                if result.is_err() {
                    if let Some(next) = next {
                        next.cancel();
                    }
                }
                result
            }));
        }

        let mut hasher = Md5::new();
        let mut sink_broken = false;
        let hangup = sink.hangup();
        tokio::pin!(hangup);
        let mut hung_up = false;
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            tokio::select! {
                read = tail.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(len) => {
                        hasher.update(&buf[..len]);
                        if sink.write(Bytes::copy_from_slice(&buf[..len])).await.is_err() {
                            warn!("response sink closed mid-stream");
                            sink_broken = true;
                            tokens[0].cancel();
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "terminal stage read failed");
                        sink_broken = true;
                        tokens[0].cancel();
                        break;
                    }
                },
                _ = &mut hangup, if !hung_up => {
                    hung_up = true;
                    warn!("client transport closed, cancelling pipeline head");
                    tokens[0].cancel();
                    // Keep draining so every stage settles from the EOF cascade.
                }
            }
        }
        drop(tail);

        let mut failed = sink_broken;
        for supervisor in supervisors {
            match supervisor.await {
                Ok(Ok(())) => {}
                // The stage logged its own failure.
                Ok(Err(_)) => failed = true,
                Err(err) => {
                    warn!(error = %err, "stage supervisor panicked");
                    failed = true;
                }
            }
        }
        for conduit in conduits {
            match conduit.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(error = %err, "pipe conduit ended with error");
                    failed = true;
                }
                Err(err) => {
                    warn!(error = %err, "pipe conduit panicked");
                    failed = true;
                }
            }
        }

        if failed {
            PipelineOutcome::failed()
        } else {
            PipelineOutcome::complete(hex::encode(hasher.finalize()))
        }
    }
}
