//! Resolving logical identifiers to on-disk data objects.

use std::path::PathBuf;

use async_trait::async_trait;
use htsgate_types::FileRef;

use crate::error::CatalogError;

/// Metadata lookup the controller consults before building a query.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All data objects recorded under an accession, in stable order.
    async fn by_accession(&self, accession: &str) -> Result<Vec<FileRef>, CatalogError>;

    /// A single data object by name.
    async fn by_name(&self, name: &str) -> Result<FileRef, CatalogError>;

    /// Reference FASTA to use when calling variants over `file`.
    async fn reference_for(&self, file: &FileRef) -> Result<Option<PathBuf>, CatalogError>;
}

/// Directory-backed catalog: every alignment container under a root
/// directory is a data object, and an accession matches every file whose
/// name starts with it. Stands in for a real metadata store when serving a
/// curated archive directory.
pub struct FsCatalog {
    root: PathBuf,
    reference: Option<PathBuf>,
}

impl FsCatalog {
    pub fn new(root: impl Into<PathBuf>, reference: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            reference,
        }
    }

    fn is_alignment(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".bam") || lower.ends_with(".cram")
    }
}

#[async_trait]
impl Catalog for FsCatalog {
    async fn by_accession(&self, accession: &str) -> Result<Vec<FileRef>, CatalogError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(accession) && Self::is_alignment(&name) {
                files.push(FileRef::new(name, entry.path()));
            }
        }
        if files.is_empty() {
            return Err(CatalogError::NotFound(accession.to_string()));
        }
        files.sort_by(|a, b| a.data_object.cmp(&b.data_object));
        Ok(files)
    }

    async fn by_name(&self, name: &str) -> Result<FileRef, CatalogError> {
        // Data-object names are flat; anything path-like is rejected rather
        // than resolved outside the root.
        if name.contains('/') || name.contains("..") {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        let path = self.root.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(FileRef::new(name, path)),
            Ok(_) => Err(CatalogError::NotFound(name.to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CatalogError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn reference_for(&self, _file: &FileRef) -> Result<Option<PathBuf>, CatalogError> {
        Ok(self.reference.clone())
    }
}
