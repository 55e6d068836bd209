//! Translate a validated query into an ordered pipeline plan.
//!
//! The builder is a pure function over the query and configuration; the only
//! outside input is the caller-owned working directory that multi-file plans
//! use for merge and duplicate-marking temp files.

use std::path::{Path, PathBuf};

use htsgate_types::{Format, Query};

use crate::config::Config;
use crate::error::QueryError;

/// Stage titles, used to correlate log lines with pipeline positions.
pub const TITLE_VIEW: &str = "alignment-view";
pub const TITLE_MERGE: &str = "merge";
pub const TITLE_MARKDUP: &str = "markdup";
pub const TITLE_VARCALL: &str = "varcall";

/// One subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub title: &'static str,
    pub executable: String,
    pub args: Vec<String>,
    /// Private working directory; set only on the merge stage.
    pub cwd: Option<PathBuf>,
}

/// Ordered stages satisfying one query: one to four entries, the last one
/// terminal. VCF plans end in the variant caller; multi-file plans start
/// with a merge stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub stages: Vec<Stage>,
}

/// Check the invariants the builder relies on.
///
/// Fails fast, before anything is spawned: non-empty input, a single
/// container family for merges, a reference when variants are called.
pub fn validate_query(query: &Query) -> Result<(), QueryError> {
    if query.files.is_empty() {
        return Err(QueryError::NoFiles);
    }
    if query.is_multi_file() {
        let first = query.files[0].container();
        if query.files.iter().any(|f| f.container() != first) {
            return Err(QueryError::InconsistentFormat);
        }
    }
    if query.format == Format::Vcf && query.reference.is_none() {
        return Err(QueryError::MissingReference);
    }
    Ok(())
}

/// Build the pipeline plan for `query`.
///
/// `workdir` is only read by multi-file plans; it must outlive the spawned
/// pipeline and be private to the request.
pub fn build_plan(
    query: &Query,
    config: &Config,
    workdir: &Path,
) -> Result<PipelinePlan, QueryError> {
    validate_query(query)?;

    let mut stages = Vec::new();
    if query.is_multi_file() {
        stages.push(merge_stage(query, config, workdir));
        stages.push(markdup_stage(config, workdir));
        // Files and regions were consumed by the merge; this stage only
        // converts the merged stream to the requested container.
        stages.push(view_stage(query.format, None, &[], config));
    } else {
        stages.push(view_stage(
            query.format,
            Some(&query.files[0].path),
            &query.regions,
            config,
        ));
    }
    if query.format == Format::Vcf {
        stages.push(varcall_stage(query, config)?);
    }
    Ok(PipelinePlan { stages })
}

/// `view -h` with the format-appropriate output flag.
fn view_stage(
    format: Format,
    input: Option<&Path>,
    regions: &[String],
    config: &Config,
) -> Stage {
    let mut args = vec!["view".to_string(), "-h".to_string()];
    match format {
        // The variant caller consumes BAM, so VCF plans view to BAM too.
        Format::Bam | Format::Vcf => args.push("-b".to_string()),
        Format::Cram => args.push("-C".to_string()),
        Format::Sam => {}
    }
    match input {
        Some(path) => args.push(path.display().to_string()),
        None => args.push("-".to_string()),
    }
    args.extend(regions.iter().cloned());
    Stage {
        title: TITLE_VIEW,
        executable: config.aligner.clone(),
        args,
        cwd: None,
    }
}

/// `merge -u` over every input, sliced by region, writing to stdout.
fn merge_stage(query: &Query, config: &Config, workdir: &Path) -> Stage {
    let mut args = vec!["merge".to_string(), "-u".to_string()];
    for region in &query.regions {
        args.push("-R".to_string());
        args.push(region.clone());
    }
    args.push("-".to_string());
    for file in &query.files {
        args.push(file.path.display().to_string());
    }
    Stage {
        title: TITLE_MERGE,
        executable: config.aligner.clone(),
        args,
        // Merge scatters its own temp files into the cwd.
        cwd: Some(workdir.to_path_buf()),
    }
}

/// Streaming duplicate marker between merge and view.
fn markdup_stage(config: &Config, workdir: &Path) -> Stage {
    let tmpfile = workdir.join("markdup_tmp");
    Stage {
        title: TITLE_MARKDUP,
        executable: config.markdup.clone(),
        args: vec![
            "level=0".to_string(),
            "verbose=0".to_string(),
            "resetdupflag=1".to_string(),
            format!("tmpfile={}", tmpfile.display()),
            "M=/dev/null".to_string(),
        ],
        cwd: None,
    }
}

/// Variant caller over the viewed stream.
fn varcall_stage(query: &Query, config: &Config) -> Result<Stage, QueryError> {
    let reference = query
        .reference
        .as_ref()
        .ok_or(QueryError::MissingReference)?;
    let mut args = vec![
        "-c".to_string(),
        "-f".to_string(),
        reference.display().to_string(),
    ];
    if query.regions.len() == 1 {
        args.push("-r".to_string());
        args.push(query.regions[0].clone());
    }
    Ok(Stage {
        title: TITLE_VARCALL,
        executable: config.varcall.clone(),
        args,
        cwd: None,
    })
}
