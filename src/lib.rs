#![forbid(unsafe_code)]
//! # claderun
//!
//! Batch runner for **Nextclade**: fetch a reference dataset once, fan a set
//! of FASTA samples out over a worker pool, and collect one analysis
//! directory per sample. Alignment, mutation calling, clade assignment and
//! phylogenetic placement all happen inside the external `nextclade` binary;
//! this crate only orchestrates it, consuming the tool through its command
//! line, its combined output stream and its exit code.
//!
//! ## Highlights
//! - 📚 **Embedded dataset registry**: the supported reference datasets live
//!   in the binary as constants, so discovery needs no network round-trip.
//! - 🧪 **Preflight**: every input FASTA is opened and counted before a
//!   single subprocess is scheduled.
//! - ♻️ **Bounded retries**: each sample gets a fixed invocation budget
//!   (default 3), and one failed sample never sinks the rest of the batch.
//!
//! ## Examples
//! ```rust
//! // Discover datasets:
//! for d in claderun::list_supported_datasets() { println!("{} — {}", d.id, d.pathogen); }
//! // Case-insensitive lookup:
//! let ds = claderun::get_dataset("SARS-COV-2").unwrap();
//! assert_eq!(ds.id.0, "sars-cov-2");
//! ```
//!
//! ## Version
//! This build is "0.2.0".

pub mod dataset;
pub mod datasets;
pub mod exec;
pub mod fasta;
pub mod pipeline;
pub mod samplesheet;

use dataset::*;

/// Return the static registry of supported reference datasets.
pub fn list_supported_datasets() -> &'static [Dataset] { datasets::DATASETS }

/// Retrieve the dataset definition for an identifier.
///
/// Identifiers are case-insensitive, so `"sars-cov-2"` and `"SARS-CoV-2"`
/// resolve to the same record.
///
/// # Examples
/// ```rust
/// let d = claderun::get_dataset("hmpxv_b1").unwrap();
/// assert_eq!(d.id.0, "hMPXV_B1");
/// ```
pub fn get_dataset(name: &str) -> Option<&'static Dataset> {
    datasets::DATASETS.iter().find(|d| d.id.0.eq_ignore_ascii_case(name))
}

/// Convenience: return a vector of rows describing each dataset (for CLI/UX).
/// Each row is `(dataset_id, pathogen, description)`.
pub fn dataset_rows() -> Vec<(String, String, String)> {
    list_supported_datasets()
        .iter()
        .map(|d| (d.id.0.to_string(), d.pathogen.to_string(), d.description.to_string()))
        .collect()
}

/// Crate version string (from `CARGO_PKG_VERSION`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod cli_support_tests {
    use super::*;

    #[test]
    fn rows_cover_the_registry() {
        let rows = dataset_rows();
        assert_eq!(rows.len(), list_supported_datasets().len());
        assert!(rows.iter().any(|(id, _, _)| id == "flu_h3n2_ha"));
        // Pathogen labels present on every row
        assert!(rows.iter().all(|(_, pathogen, _)| !pathogen.is_empty()));
    }
}
