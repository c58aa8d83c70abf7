use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeotagError>;

#[derive(Debug, Error)]
pub enum GeotagError {
    /// A rational with a zero denominator.
    #[error("invalid rational: zero denominator")]
    InvalidRational,

    #[error("invalid decimal coordinate `{value}`")]
    InvalidDecimal { value: String },

    /// A DMS component too large for the target rational width.
    #[error("rational {value} does not fit an unsigned EXIF rational")]
    RationalOutOfRange { value: String },

    #[error("no GPS metadata present")]
    MissingGpsBlock,

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("location `{location}` not found in reference table")]
    ReferenceLookupMiss { location: String },

    #[error("reference entry `{location}` has no coordinates")]
    MissingCoordinate { location: String },

    #[error("failed to write {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to list images under {}: {reason}", path.display())]
    Discovery { path: PathBuf, reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GeotagError {
    /// Returns a closure wrapping an I/O error with the path it happened on.
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short stable name of the variant, used in run reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRational => "invalid_rational",
            Self::InvalidDecimal { .. } => "invalid_decimal",
            Self::RationalOutOfRange { .. } => "rational_out_of_range",
            Self::MissingGpsBlock => "missing_gps_block",
            Self::MalformedMetadata(_) => "malformed_metadata",
            Self::ReferenceLookupMiss { .. } => "reference_lookup_miss",
            Self::MissingCoordinate { .. } => "missing_coordinate",
            Self::WriteFailed { .. } => "write_failed",
            Self::Io { .. } => "io",
            Self::Discovery { .. } => "discovery",
            Self::Csv(_) => "csv",
            Self::Config(_) => "config",
        }
    }
}
