//! Light-weight preflight over **FASTA / FASTA.GZ** inputs.
//!
//! ### Design
//! - Parsed with `needletail`; gzip inputs are handled transparently.
//! - Sequences are otherwise opaque to this crate: the analysis itself is the
//!   external tool's job. The preflight only counts records so that empty or
//!   unreadable inputs fail before any subprocess is scheduled.
//!
//! ### Errors
//! Parsing/IO errors are bubbled via `anyhow::Result` to the caller.

use std::path::Path;

use anyhow::{bail, Context, Result};
use needletail::parse_fastx_file;

/// Record and base tallies for one FASTA input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastaSummary {
    pub records: usize,
    pub bases: u64,
}

/// Count records and bases in a FASTA file. Zero records is an error: the
/// external tool would produce an empty analysis for such an input.
pub fn preflight<P: AsRef<Path>>(path: P) -> Result<FastaSummary> {
    let p = path.as_ref();
    let mut reader = parse_fastx_file(p)
        .with_context(|| format!("failed to open FASTA {}", p.display()))?;

    let mut records = 0usize;
    let mut bases = 0u64;
    while let Some(record) = reader.next() {
        let rec = record.with_context(|| format!("failed to parse FASTA {}", p.display()))?;
        records += 1;
        bases += rec.num_bases() as u64;
    }

    if records == 0 {
        bail!("{} contains no sequence records", p.display());
    }
    Ok(FastaSummary { records, bases })
}
