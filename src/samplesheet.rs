//! Sample intake: CSV/TSV samplesheets and loose FASTA paths.
//!
//! Two ways in: a samplesheet with a header row and `name,fasta` columns, or
//! positional FASTA paths whose names are derived from the file stem. Either
//! way the resulting names must be usable as output directory names and must
//! be unique across the batch.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::dataset::Sample;

const FASTA_EXTS: &[&str] = &[".fa", ".fasta", ".fna"];

/// `true` when the file name looks like FASTA (optionally gzip-compressed).
pub fn is_supported_fasta(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    FASTA_EXTS
        .iter()
        .any(|e| name.ends_with(e) || (name.ends_with(".gz") && name[..name.len() - 3].ends_with(e)))
}

/// Partition paths into supported FASTA inputs and everything else.
pub fn split_supported_files(paths: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut ok = Vec::new();
    let mut bad = Vec::new();
    for p in paths {
        if is_supported_fasta(&p) { ok.push(p); } else { bad.push(p); }
    }
    (ok, bad)
}

/// Derive a sample name from a FASTA path: the file name with the FASTA
/// (and optional `.gz`) suffix stripped.
///
/// # Examples
/// ```
/// use std::path::Path;
/// assert_eq!(claderun::samplesheet::sample_name_for(Path::new("/data/cluster_cov.fasta")), "cluster_cov");
/// assert_eq!(claderun::samplesheet::sample_name_for(Path::new("sars_sequences.fa.gz")), "sars_sequences");
/// ```
pub fn sample_name_for(path: &Path) -> String {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    let lower = name.to_ascii_lowercase();
    for e in FASTA_EXTS {
        let gz = format!("{e}.gz");
        if lower.ends_with(&gz) {
            return name[..name.len() - gz.len()].to_string();
        }
        if lower.ends_with(e) {
            return name[..name.len() - e.len()].to_string();
        }
    }
    name.to_string()
}

/// Sample names become output directory names, so they must be path-safe.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("empty sample name");
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') || name.contains('\0') {
        bail!("sample name {:?} is not usable as a directory name", name);
    }
    Ok(())
}

/// Load samples from a samplesheet with a header row and `name,fasta` columns.
/// Files with a `.tsv` extension are tab-delimited, anything else comma.
pub fn load_samplesheet<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>> {
    let p = path.as_ref();
    let delim = if p.extension().map(|e| e == "tsv").unwrap_or(false) { b'\t' } else { b',' };
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delim)
        .from_path(p)
        .with_context(|| format!("failed to open samplesheet {}", p.display()))?;

    let mut samples = Vec::new();
    for rec in rdr.records() {
        let r = rec?;
        if r.len() < 2 {
            bail!("samplesheet row needs name and fasta columns, got {:?}", r);
        }
        let name = r[0].trim().to_string();
        validate_name(&name).with_context(|| format!("bad samplesheet entry in {}", p.display()))?;
        samples.push(Sample { name, fasta: PathBuf::from(r[1].trim()) });
    }
    if samples.is_empty() {
        bail!("samplesheet {} contains no samples", p.display());
    }
    reject_duplicates(&samples)?;
    Ok(samples)
}

/// Build samples from loose FASTA paths; names come from the file stems.
pub fn samples_from_files(paths: Vec<PathBuf>) -> Result<Vec<Sample>> {
    let (ok, bad) = split_supported_files(paths);
    if !bad.is_empty() {
        let listed: Vec<String> = bad.iter().map(|p| p.display().to_string()).collect();
        bail!(
            "unsupported input files (expected .fa/.fasta/.fna, optionally .gz): {}",
            listed.join(", ")
        );
    }
    if ok.is_empty() {
        bail!("no input FASTA files given");
    }
    let mut samples = Vec::new();
    for p in ok {
        let name = sample_name_for(&p);
        validate_name(&name).with_context(|| format!("cannot derive a sample name from {}", p.display()))?;
        samples.push(Sample { name, fasta: p });
    }
    reject_duplicates(&samples)?;
    Ok(samples)
}

fn reject_duplicates(samples: &[Sample]) -> Result<()> {
    let mut seen = HashSet::new();
    for s in samples {
        if !seen.insert(s.name.as_str()) {
            bail!("duplicate sample name {:?}; each sample maps to exactly one output directory", s.name);
        }
    }
    Ok(())
}
