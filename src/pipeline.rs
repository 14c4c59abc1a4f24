//! The three pipeline stages and the batch driver.
//!
//! 1. [`fetch_dataset`] downloads the shared reference dataset
//!    (`nextclade dataset get`).
//! 2. [`prepare_work_items`] pairs every sample with that dataset directory.
//! 3. [`run_sample`] invokes `nextclade run` for one work item.
//!
//! [`run_batch`] drives all three: preflight, fetch, then stage 3 mapped over
//! the samples by a dedicated worker pool fed from a bounded queue. A failed
//! sample never sinks the batch; its outcome carries the scanned error lines
//! and the caller decides the process exit code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};

use anyhow::{bail, ensure, Context, Result};
use polars::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::dataset::{Dataset, RunStatus, Sample, SampleOutcome, WorkItem};
use crate::{exec, fasta};

/// Default parent directory for fetched datasets.
pub const DEFAULT_DATASET_ROOT: &str = "nextclade_dataset";

/// How many error-message lines to keep from a failed transcript.
const ERROR_LINES_CAP: usize = 20;

/// Everything `run_batch` needs.
#[derive(Debug, Clone)]
pub struct BatchOpts {
    pub dataset: &'static Dataset,
    pub samples: Vec<Sample>,
    /// Per-sample output directories are created under here.
    pub outdir: PathBuf,
    /// Reuse an already-fetched dataset directory instead of downloading.
    pub dataset_dir: Option<PathBuf>,
    /// Concurrent tool invocations (None = all logical cores).
    pub threads: Option<usize>,
    /// Invocation budget per sample (>= 1).
    pub retries: usize,
    /// Name or path of the external binary.
    pub nextclade: String,
}

/// Where a dataset lands when no explicit directory is given.
pub fn default_dataset_dir(dataset: &Dataset) -> PathBuf {
    PathBuf::from(DEFAULT_DATASET_ROOT).join(dataset.id.0)
}

/// Stage 1: download the reference dataset into `output_dir`.
///
/// A nonzero exit aborts the batch: without the dataset there is nothing for
/// the per-sample stage to align against.
pub fn fetch_dataset(program: &str, dataset: &Dataset, output_dir: &Path) -> Result<PathBuf> {
    let args = vec![
        "dataset".to_string(),
        "get".to_string(),
        "--name".to_string(),
        dataset.id.0.to_string(),
        "--output-dir".to_string(),
        output_dir.to_string_lossy().into_owned(),
    ];
    eprintln!("[fetch] downloading reference dataset {} into {}", dataset.id, output_dir.display());
    let cap = exec::run_captured(program, &args, "fetch")?;
    if !cap.success {
        let mut msg = format!("dataset fetch for {} exited {}", dataset.id, cap.exit_label());
        for line in exec::scan_error_lines(&cap.transcript, ERROR_LINES_CAP) {
            msg.push_str("\n  ");
            msg.push_str(&line);
        }
        bail!(msg);
    }
    Ok(output_dir.canonicalize().unwrap_or_else(|_| output_dir.to_path_buf()))
}

/// Stage 2: pair every sample with the shared dataset directory.
pub fn prepare_work_items(samples: &[Sample], dataset_dir: &Path) -> Vec<WorkItem> {
    samples
        .iter()
        .map(|s| WorkItem {
            name: s.name.clone(),
            fasta: s.fasta.clone(),
            dataset_dir: dataset_dir.to_path_buf(),
        })
        .collect()
}

/// Stage 3: run the tool over one work item.
///
/// The output directory is `<outdir>/<sample name>`. Exit 0 yields a `Done`
/// outcome carrying that directory; an exhausted retry budget yields `Failed`
/// with the error lines scanned from the final transcript.
pub fn run_sample(program: &str, item: &WorkItem, outdir: &Path, retries: usize) -> SampleOutcome {
    let sample_out = outdir.join(&item.name);
    let args = vec![
        "run".to_string(),
        "--input-dataset".to_string(),
        item.dataset_dir.to_string_lossy().into_owned(),
        "--output-all".to_string(),
        sample_out.to_string_lossy().into_owned(),
        item.fasta.to_string_lossy().into_owned(),
    ];
    eprintln!("[{}] analysing {} against {}", item.name, item.fasta.display(), item.dataset_dir.display());

    match exec::run_with_retries(program, &args, &item.name, retries) {
        Ok((cap, attempts)) if cap.success => SampleOutcome {
            name: item.name.clone(),
            status: RunStatus::Done,
            attempts,
            output_dir: Some(sample_out),
            errors: Vec::new(),
        },
        Ok((cap, attempts)) => {
            let mut errors = exec::scan_error_lines(&cap.transcript, ERROR_LINES_CAP);
            if errors.is_empty() {
                errors.push(format!("nextclade exited {}", cap.exit_label()));
            }
            SampleOutcome {
                name: item.name.clone(),
                status: RunStatus::Failed,
                attempts,
                output_dir: None,
                errors,
            }
        }
        Err(e) => SampleOutcome {
            name: item.name.clone(),
            status: RunStatus::Failed,
            attempts: 1,
            output_dir: None,
            errors: vec![format!("{e:#}")],
        },
    }
}

/// Collected outcomes for one batch, in samplesheet order.
#[derive(Clone, Debug)]
pub struct BatchSummary {
    pub dataset: String,
    pub dataset_dir: PathBuf,
    pub outcomes: Vec<SampleOutcome>,
}

impl BatchSummary {
    pub fn n_done(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }
    pub fn n_failed(&self) -> usize {
        self.outcomes.len() - self.n_done()
    }
}

/// Run the whole pipeline: preflight, fetch, fan out, collect.
pub fn run_batch(opts: BatchOpts) -> Result<BatchSummary> {
    ensure!(!opts.samples.is_empty(), "no samples to run");

    // Preflight every input before anything is scheduled.
    let mut bad = Vec::new();
    for s in &opts.samples {
        match fasta::preflight(&s.fasta) {
            Ok(sum) => eprintln!(
                "[{}] {}: {} records, {} bases",
                s.name,
                s.fasta.display(),
                sum.records,
                sum.bases
            ),
            Err(e) => bad.push(format!("{}: {e:#}", s.name)),
        }
    }
    if !bad.is_empty() {
        bail!("input preflight failed:\n  {}", bad.join("\n  "));
    }

    let dataset_dir = match &opts.dataset_dir {
        Some(dir) => {
            ensure!(dir.is_dir(), "dataset directory {} does not exist", dir.display());
            dir.clone()
        }
        None => {
            let dir = default_dataset_dir(opts.dataset);
            if let Some(parent) = dir.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fetch_dataset(&opts.nextclade, opts.dataset, &dir)?
        }
    };

    std::fs::create_dir_all(&opts.outdir)
        .with_context(|| format!("failed to create {}", opts.outdir.display()))?;

    let items = prepare_work_items(&opts.samples, &dataset_dir);

    // Fan the work items out over a dedicated pool; workers pull from a
    // bounded queue and record outcomes as they finish.
    let threads_n = opts.threads.unwrap_or_else(num_cpus::get).max(1).min(items.len());
    let pool = ThreadPoolBuilder::new().num_threads(threads_n).build()?;

    let (tx, rx) = mpsc::sync_channel::<WorkItem>(threads_n * 2);
    let rx = Arc::new(Mutex::new(rx));
    let outcomes: Arc<Mutex<Vec<SampleOutcome>>> = Arc::new(Mutex::new(Vec::new()));

    let producer = std::thread::spawn(move || {
        for item in items {
            if tx.send(item).is_err() {
                break;
            }
        }
    });

    let program = opts.nextclade.clone();
    let outdir = opts.outdir.clone();
    let retries = opts.retries;
    pool.install(|| {
        rayon::scope(|s| {
            for _ in 0..threads_n {
                let rx_c = rx.clone();
                let outcomes_c = outcomes.clone();
                let program = program.clone();
                let outdir = outdir.clone();
                s.spawn(move |_| loop {
                    let item = {
                        let guard = rx_c.lock().unwrap();
                        guard.recv()
                    };
                    let item = match item {
                        Ok(i) => i,
                        Err(_) => break,
                    };
                    let outcome = run_sample(&program, &item, &outdir, retries);
                    outcomes_c.lock().unwrap().push(outcome);
                });
            }
        });
    });

    let _ = producer.join();

    // Report in samplesheet order regardless of completion order.
    let mut by_name: HashMap<String, SampleOutcome> = outcomes
        .lock()
        .unwrap()
        .drain(..)
        .map(|o| (o.name.clone(), o))
        .collect();
    let ordered: Vec<SampleOutcome> =
        opts.samples.iter().filter_map(|s| by_name.remove(&s.name)).collect();

    Ok(BatchSummary {
        dataset: opts.dataset.id.0.to_string(),
        dataset_dir,
        outcomes: ordered,
    })
}

/// Per-sample outcome table for the console.
pub fn summary_df(summary: &BatchSummary) -> PolarsResult<DataFrame> {
    let names: Vec<String> = summary.outcomes.iter().map(|o| o.name.clone()).collect();
    let status: Vec<String> = summary.outcomes.iter().map(|o| o.status.as_str().to_string()).collect();
    let attempts: Vec<u64> = summary.outcomes.iter().map(|o| o.attempts as u64).collect();
    let outs: Vec<String> = summary
        .outcomes
        .iter()
        .map(|o| o.output_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default())
        .collect();
    let errs: Vec<String> = summary.outcomes.iter().map(|o| o.errors.join("; ")).collect();

    df!(
        "sample"     => names,
        "status"     => status,
        "attempts"   => attempts,
        "output_dir" => outs,
        "errors"     => errs,
    )
}

/// Write the batch summary as pretty JSON.
pub fn write_json_summary(summary: &BatchSummary, path: &Path) -> Result<()> {
    let samples: Vec<serde_json::Value> = summary
        .outcomes
        .iter()
        .map(|o| {
            serde_json::json!({
                "name": o.name,
                "status": o.status.as_str(),
                "attempts": o.attempts,
                "output_dir": o.output_dir.as_ref().map(|p| p.display().to_string()),
                "errors": o.errors,
            })
        })
        .collect();
    let combined = serde_json::json!({
        "dataset": summary.dataset,
        "dataset_dir": summary.dataset_dir.display().to_string(),
        "done": summary.n_done(),
        "failed": summary.n_failed(),
        "samples": samples,
    });
    let mut f = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(&mut f, &combined)?;
    Ok(())
}

#[cfg(test)]
mod prepare_tests {
    use super::*;

    #[test]
    fn every_sample_gets_the_shared_dataset_dir() {
        let samples = vec![
            Sample { name: "a".into(), fasta: PathBuf::from("/in/a.fasta") },
            Sample { name: "b".into(), fasta: PathBuf::from("/in/b.fasta") },
        ];
        let items = prepare_work_items(&samples, Path::new("/db/sars-cov-2"));
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.dataset_dir == PathBuf::from("/db/sars-cov-2")));
        assert_eq!(items[1].name, "b");
    }
}

#[cfg(unix)]
#[cfg(test)]
mod run_tests {
    use super::*;
    use crate::get_dataset;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn fake_tool(dir: &Path, body: &str) -> String {
        let p = dir.join("nextclade");
        std::fs::write(&p, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perm = std::fs::metadata(&p).unwrap().permissions();
        perm.set_mode(0o755);
        std::fs::set_permissions(&p, perm).unwrap();
        p.to_string_lossy().into_owned()
    }

    fn write_fasta(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(b">r1\nACGTACGT\n").unwrap();
        p
    }

    #[test]
    fn fetch_creates_and_resolves_the_dataset_dir() {
        let dir = tempfile::tempdir().unwrap();
        // args: dataset get --name <id> --output-dir <dir>; $6 is the dir
        let tool = fake_tool(dir.path(), "mkdir -p \"$6\"");
        let ds = get_dataset("sars-cov-2").unwrap();
        let target = dir.path().join("db");
        let resolved = fetch_dataset(&tool, ds, &target).unwrap();
        assert!(resolved.is_dir());
    }

    #[test]
    fn fetch_failure_carries_error_lines() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'Error: no such dataset' 1>&2; exit 1");
        let ds = get_dataset("MPXV").unwrap();
        let err = fetch_dataset(&tool, ds, &dir.path().join("db")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exited 1"));
        assert!(msg.contains("no such dataset"));
    }

    #[test]
    fn run_sample_success_returns_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        // args: run --input-dataset <db> --output-all <out> <fasta>; $5 is <out>
        let tool = fake_tool(dir.path(), "mkdir -p \"$5\"");
        let item = WorkItem {
            name: "s1".into(),
            fasta: write_fasta(dir.path(), "s1.fasta"),
            dataset_dir: dir.path().to_path_buf(),
        };
        let out = run_sample(&tool, &item, dir.path(), 3);
        assert_eq!(out.status, RunStatus::Done);
        assert_eq!(out.attempts, 1);
        assert_eq!(out.output_dir, Some(dir.path().join("s1")));
        assert!(out.errors.is_empty());
    }

    #[test]
    fn run_sample_failure_scans_messages_and_spends_the_budget() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "echo 'Message: unable to align'; exit 1");
        let item = WorkItem {
            name: "s1".into(),
            fasta: write_fasta(dir.path(), "s1.fasta"),
            dataset_dir: dir.path().to_path_buf(),
        };
        let out = run_sample(&tool, &item, dir.path(), 2);
        assert_eq!(out.status, RunStatus::Failed);
        assert_eq!(out.attempts, 2);
        assert!(out.output_dir.is_none());
        assert!(out.errors.iter().any(|e| e.contains("unable to align")));
    }

    #[test]
    fn batch_isolates_failures_and_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        // Fail only the sample whose FASTA path mentions "bad" ($6).
        let tool = fake_tool(
            dir.path(),
            "case \"$6\" in *bad*) echo 'Message: unable to align'; exit 1;; esac\nmkdir -p \"$5\"",
        );
        let db = dir.path().join("db");
        std::fs::create_dir_all(&db).unwrap();
        let samples = vec![
            Sample { name: "good".into(), fasta: write_fasta(dir.path(), "good.fasta") },
            Sample { name: "bad".into(), fasta: write_fasta(dir.path(), "bad.fasta") },
        ];
        let summary = run_batch(BatchOpts {
            dataset: get_dataset("sars-cov-2").unwrap(),
            samples,
            outdir: dir.path().join("out"),
            dataset_dir: Some(db),
            threads: Some(2),
            retries: 2,
            nextclade: tool,
        })
        .unwrap();

        assert_eq!(summary.n_done(), 1);
        assert_eq!(summary.n_failed(), 1);
        let names: Vec<_> = summary.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["good", "bad"]);
        assert_eq!(summary.outcomes[0].output_dir, Some(dir.path().join("out").join("good")));
        assert_eq!(summary.outcomes[1].attempts, 2);
    }

    #[test]
    fn empty_fasta_fails_preflight_before_any_run() {
        let dir = tempfile::tempdir().unwrap();
        // A tool that would record any invocation; it must never run.
        let marker = dir.path().join("invoked");
        let tool = fake_tool(dir.path(), &format!("touch {}", marker.display()));
        let empty = dir.path().join("empty.fasta");
        std::fs::File::create(&empty).unwrap();
        let db = dir.path().join("db");
        std::fs::create_dir_all(&db).unwrap();
        let err = run_batch(BatchOpts {
            dataset: get_dataset("sars-cov-2").unwrap(),
            samples: vec![Sample { name: "empty".into(), fasta: empty }],
            outdir: dir.path().join("out"),
            dataset_dir: Some(db),
            threads: Some(1),
            retries: 1,
            nextclade: tool,
        })
        .unwrap_err();
        assert!(err.to_string().contains("preflight failed"));
        assert!(!marker.exists());
    }

    #[test]
    fn json_summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let summary = BatchSummary {
            dataset: "sars-cov-2".into(),
            dataset_dir: PathBuf::from("/db/sars-cov-2"),
            outcomes: vec![
                SampleOutcome {
                    name: "s1".into(),
                    status: RunStatus::Done,
                    attempts: 1,
                    output_dir: Some(PathBuf::from("/out/s1")),
                    errors: Vec::new(),
                },
                SampleOutcome {
                    name: "s2".into(),
                    status: RunStatus::Failed,
                    attempts: 3,
                    output_dir: None,
                    errors: vec!["Message: unable to align".into()],
                },
            ],
        };
        let path = dir.path().join("summary.json");
        write_json_summary(&summary, &path).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["dataset"], "sars-cov-2");
        assert_eq!(v["done"], 1);
        assert_eq!(v["failed"], 1);
        assert_eq!(v["samples"][1]["status"], "failed");
        assert_eq!(v["samples"][1]["errors"][0], "Message: unable to align");
        assert!(v["samples"][1]["output_dir"].is_null());
    }
}
