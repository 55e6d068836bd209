//! Sequencing-data formats the gateway can serve.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output format of a streamed response.
///
/// BAM and CRAM are binary alignment containers, SAM is their text form,
/// VCF is the text output of the variant-calling pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Format {
    Bam,
    Cram,
    Sam,
    Vcf,
}

impl Format {
    /// Canonical upper-case name, as used in query strings and tickets.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Format::Bam => "BAM",
            Format::Cram => "CRAM",
            Format::Sam => "SAM",
            Format::Vcf => "VCF",
        }
    }

    /// True for formats whose payload is line-oriented text.
    pub const fn is_textual(&self) -> bool {
        matches!(self, Format::Sam | Format::Vcf)
    }

    /// Guess the on-disk container format from a data-object filename.
    ///
    /// Only the input container matters here: anything that is not CRAM is
    /// treated as BAM.
    pub fn sniff(data_object: &str) -> Format {
        if data_object.to_ascii_lowercase().ends_with(".cram") {
            Format::Cram
        } else {
            Format::Bam
        }
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::Bam
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a format name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown format: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BAM" => Ok(Format::Bam),
            "CRAM" => Ok(Format::Cram),
            "SAM" => Ok(Format::Sam),
            "VCF" => Ok(Format::Vcf),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("bam".parse::<Format>().unwrap(), Format::Bam);
        assert_eq!("Cram".parse::<Format>().unwrap(), Format::Cram);
        assert_eq!("SAM".parse::<Format>().unwrap(), Format::Sam);
        assert_eq!("vcf".parse::<Format>().unwrap(), Format::Vcf);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = "FASTQ".parse::<Format>().unwrap_err();
        assert_eq!(err, UnknownFormat("FASTQ".to_string()));
    }

    #[test]
    fn default_is_bam() {
        assert_eq!(Format::default(), Format::Bam);
    }

    #[test]
    fn textual_formats() {
        assert!(!Format::Bam.is_textual());
        assert!(!Format::Cram.is_textual());
        assert!(Format::Sam.is_textual());
        assert!(Format::Vcf.is_textual());
    }

    #[test]
    fn sniff_by_extension() {
        assert_eq!(Format::sniff("20818_1#888.bam"), Format::Bam);
        assert_eq!(Format::sniff("sample.CRAM"), Format::Cram);
        // Unindexed or unknown names default to BAM
        assert_eq!(Format::sniff("whatever"), Format::Bam);
    }
}
