//! Validated query input for the request processor.

use std::path::{Path, PathBuf};

use crate::format::Format;

/// One input file resolved by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Data-object name, used for container-format sniffing.
    pub data_object: String,
    /// Resolved filesystem path.
    pub path: PathBuf,
}

impl FileRef {
    pub fn new(data_object: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            data_object: data_object.into(),
            path: path.into(),
        }
    }

    /// Container format of this input, sniffed from the data-object name.
    pub fn container(&self) -> Format {
        Format::sniff(&self.data_object)
    }
}

/// Immutable input to one gateway request.
///
/// The plan builder and the request processor only ever borrow a query;
/// nothing downstream mutates it.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Input files; must be non-empty, and all BAM or all CRAM when merged.
    pub files: Vec<FileRef>,
    /// Genomic region tokens, e.g. `"chr1:100-2000"`.
    pub regions: Vec<String>,
    /// Requested output format.
    pub format: Format,
    /// Reference FASTA, required for VCF output.
    pub reference: Option<PathBuf>,
}

impl Query {
    pub fn new(files: Vec<FileRef>) -> Self {
        Self {
            files,
            regions: Vec::new(),
            format: Format::default(),
            reference: None,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.regions.push(region.into());
        self
    }

    pub fn with_reference(mut self, reference: impl AsRef<Path>) -> Self {
        self.reference = Some(reference.as_ref().to_path_buf());
        self
    }

    /// True when the request must go through the merge pipeline.
    pub fn is_multi_file(&self) -> bool {
        self.files.len() > 1
    }
}
