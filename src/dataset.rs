//! Core types for **reference datasets**, **samples** and per-sample **work items**.
//!
//! This module holds the data model used across the crate. It is intentionally
//! simple: dataset identity stays on `&'static str` so the whole registry can
//! live in the binary as constants, and the per-sample records are flat.
//!
//! # Lifecycle
//! A [`Sample`] comes from a samplesheet or a loose FASTA path. Pairing it with
//! the shared, already-fetched dataset directory yields a [`WorkItem`]; running
//! the external tool over a work item yields a [`SampleOutcome`].
use core::fmt;
use std::path::PathBuf;

/// Canonical identifier for a Nextclade reference dataset (e.g. `"sars-cov-2"`,
/// `"flu_h3n2_ha"`). The string is exactly what `nextclade dataset get --name`
/// expects.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DatasetId(pub &'static str);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// A reference dataset definition: ties a dataset id to its pathogen and scope.
#[derive(Clone, Debug)]
pub struct Dataset {
    /// Identifier such as `"sars-cov-2"` or `"hMPXV_B1"`.
    pub id: DatasetId,
    /// Pathogen / segment label (e.g. `"Influenza A H3N2"`).
    pub pathogen: &'static str,
    /// One-line description (reference strain and scope).
    pub description: &'static str,
}

/// A named input sequence file.
///
/// The name doubles as the sample's output directory name, so it is validated
/// at load time (non-empty, no path separators).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    pub name: String,
    pub fasta: PathBuf,
}

/// Per-sample task input: one sample plus the shared dataset directory.
#[derive(Clone, Debug)]
pub struct WorkItem {
    pub name: String,
    pub fasta: PathBuf,
    pub dataset_dir: PathBuf,
}

/// Terminal state of one sample's run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunStatus {
    /// The tool exited 0; the output directory was produced.
    Done,
    /// The retry budget was exhausted without a successful exit.
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }
}

/// What one sample's run produced.
#[derive(Clone, Debug)]
pub struct SampleOutcome {
    pub name: String,
    pub status: RunStatus,
    /// Invocations spent on this sample (1..=retry budget).
    pub attempts: usize,
    /// Present iff `status == Done`.
    pub output_dir: Option<PathBuf>,
    /// Error-message lines scanned out of the final failed transcript.
    pub errors: Vec<String>,
}

impl SampleOutcome {
    pub fn is_done(&self) -> bool { self.status == RunStatus::Done }
}
