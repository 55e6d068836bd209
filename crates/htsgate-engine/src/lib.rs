//! htsgate-engine — the streaming execution core of the gateway.
//!
//! Given a validated query, the engine selects a subprocess pipeline, wires
//! the stages together over OS pipes, streams the terminal stage into the
//! HTTP response while checksumming it in flight, reports truncation
//! through HTTP trailers, and cleans up processes and temp directories on
//! every exit path.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RequestProcessor                        │
//! │  Query ──▶ plan builder ──▶ [Stage; 1..=4]                   │
//! │                                  │ spawn                     │
//! │                                  ▼                           │
//! │  ProcessHandle × N ──▶ PipelineEngine ──▶ ResponseChannel    │
//! │                              │                   │           │
//! │                              ▼                   ▼           │
//! │                      PipelineOutcome ──▶ trailer block       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod process;
pub mod processor;
pub mod response;
pub mod trailer;

pub use catalog::{Catalog, FsCatalog};
pub use config::Config;
pub use error::{CatalogError, ProcessError, QueryError, StageFailure, TrailerError};
pub use pipeline::PipelineEngine;
pub use plan::{build_plan, validate_query, PipelinePlan, Stage};
pub use process::ProcessHandle;
pub use processor::RequestProcessor;
pub use response::{
    response_channel, ResponseBody, ResponseChannel, SinkClosed, RESPONSE_CHANNEL_CAPACITY,
};
