//! Per-image results and run-level tallies.

use std::fmt;

use serde::Serialize;

use crate::coordinate::DecimalCoordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Match,
    Mismatch,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Write,
    Validate,
    /// Write, then validate the written file in the same pass.
    WriteAndValidate,
}

/// Signed coordinates decoded from an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedCoordinates {
    pub latitude: DecimalCoordinate,
    pub longitude: DecimalCoordinate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    Written,
    /// The reference row has no coordinates; the image was left alone.
    Missing,
    Matched { embedded: EmbeddedCoordinates },
    Mismatched { embedded: EmbeddedCoordinates },
    Failed { kind: String, message: String },
}

impl ImageStatus {
    #[must_use]
    pub fn outcome(&self) -> Option<ValidationOutcome> {
        match self {
            Self::Matched { .. } => Some(ValidationOutcome::Match),
            Self::Mismatched { .. } => Some(ValidationOutcome::Mismatch),
            Self::Missing => Some(ValidationOutcome::Missing),
            Self::Written | Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub file: String,
    pub location: String,
    #[serde(flatten)]
    pub status: ImageStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub matched: usize,
    pub mismatched: usize,
    pub missing: usize,
    pub written: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub counts: Counts,
    pub images: Vec<ImageReport>,
    /// Files that were not eligible for processing.
    pub skipped: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn new(mode: Mode, images: Vec<ImageReport>, skipped: Vec<String>) -> Self {
        let mut counts = Counts {
            skipped: skipped.len(),
            ..Counts::default()
        };
        for image in &images {
            match image.status {
                ImageStatus::Written => counts.written += 1,
                ImageStatus::Missing => counts.missing += 1,
                ImageStatus::Matched { .. } => counts.matched += 1,
                ImageStatus::Mismatched { .. } => counts.mismatched += 1,
                ImageStatus::Failed { .. } => counts.failed += 1,
            }
        }
        Self {
            mode,
            counts,
            images,
            skipped,
        }
    }

    /// Locations of the images with the given outcome, in processing order.
    #[must_use]
    pub fn locations(&self, outcome: ValidationOutcome) -> Vec<&str> {
        self.images
            .iter()
            .filter(|image| image.status.outcome() == Some(outcome))
            .map(|image| image.location.as_str())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageReport> {
        self.images
            .iter()
            .filter(|image| matches!(image.status, ImageStatus::Failed { .. }))
    }

    /// True if anything needs an operator's attention.
    #[must_use]
    pub fn has_problems(&self) -> bool {
        self.counts.failed > 0 || self.counts.mismatched > 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Completed processing. {} images processed, {} skipped.",
            self.images.len(),
            self.counts.skipped
        )?;

        if self.mode == Mode::Write {
            writeln!(f, "\nWRITE SUMMARY\n\nWritten:\n{} files", self.counts.written)?;
        } else {
            writeln!(f, "\nVALIDATION SUMMARY")?;
            for (title, outcome) in [
                ("Success", ValidationOutcome::Match),
                ("Failure", ValidationOutcome::Mismatch),
            ] {
                let locations = self.locations(outcome);
                writeln!(f, "\n{title}:\n{locations:?}\n{} files", locations.len())?;
            }
        }

        let missing = self.locations(ValidationOutcome::Missing);
        writeln!(f, "\nMissing GPS Data:\n{missing:?}\n{} files", missing.len())?;

        if self.counts.failed > 0 {
            writeln!(f, "\nErrors:")?;
            for image in self.failures() {
                if let ImageStatus::Failed { message, .. } = &image.status {
                    writeln!(f, "  {}: {message}", image.file)?;
                }
            }
            writeln!(f, "{} files", self.counts.failed)?;
        }
        Ok(())
    }
}

/// Result of one route folder in route-processing mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteReport {
    pub route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for RouteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Route {} ===", self.route)?;
        if let Some(report) = &self.report {
            write!(f, "{report}")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "Route skipped: {error}")?;
        }
        Ok(())
    }
}
