use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use polars::prelude::*;

use claderun::pipeline::{self, BatchOpts};
use claderun::samplesheet;

/// Claderun CLI
#[derive(Parser)]
#[command(name = "claderun")]
#[command(version)]
#[command(about = "Nextclade batch runner: dataset fetch, per-sample fan-out, output collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all supported reference datasets
    ListDatasets,

    /// Describe a dataset by id (e.g., "sars-cov-2")
    Describe {
        /// Dataset id to describe
        id: String,
    },

    /// Download a reference dataset without running any samples
    Fetch {
        /// Dataset id (e.g., "sars-cov-2")
        id: String,
        /// Target directory (default: nextclade_dataset/<id>)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Name or path of the nextclade binary
        #[arg(long, default_value = "nextclade")]
        nextclade: String,
    },

    /// Run the full pipeline over a batch of FASTA samples
    Run {
        /// Input FASTA files (.fa/.fasta/.fna, optionally .gz); names from file stems
        files: Vec<PathBuf>,
        /// Samplesheet with name,fasta columns (alternative to positional files)
        #[arg(long)]
        samplesheet: Option<PathBuf>,
        /// Dataset id (e.g., "sars-cov-2")
        #[arg(long, default_value = "sars-cov-2")]
        dataset: String,
        /// Per-sample output directories are created here
        #[arg(long, default_value = "nextclade_outputs")]
        outdir: PathBuf,
        /// Reuse an already-fetched dataset directory (skips the download)
        #[arg(long)]
        dataset_dir: Option<PathBuf>,
        /// Concurrent nextclade invocations (0/None = all cores)
        #[arg(long)]
        threads: Option<usize>,
        /// Invocation budget per sample
        #[arg(long, default_value_t = 3)]
        retries: usize,
        /// Name or path of the nextclade binary
        #[arg(long, default_value = "nextclade")]
        nextclade: String,
        /// Write the batch summary to a JSON file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ListDatasets => {
            cmd_list_datasets();
        }

        Commands::Describe { id } => {
            cmd_describe(id);
        }

        Commands::Fetch { id, output_dir, nextclade } => {
            let Some(ds) = claderun::get_dataset(&id) else {
                bail!("Unknown dataset: {}. Use `claderun list-datasets` to see valid ids.", id);
            };
            let dir = output_dir.unwrap_or_else(|| pipeline::default_dataset_dir(ds));
            if let Some(parent) = dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let resolved = pipeline::fetch_dataset(&nextclade, ds, &dir)?;
            println!("{}", resolved.display());
        }

        Commands::Run {
            files,
            samplesheet: sheet,
            dataset,
            outdir,
            dataset_dir,
            threads,
            retries,
            nextclade,
            json,
        } => {
            let Some(ds) = claderun::get_dataset(&dataset) else {
                bail!("Unknown dataset: {}. Use `claderun list-datasets` to see valid ids.", dataset);
            };

            let samples = match (sheet, files.is_empty()) {
                (Some(p), true) => samplesheet::load_samplesheet(p)?,
                (None, false) => samplesheet::samples_from_files(files)?,
                (Some(_), false) => bail!("give either --samplesheet or positional FASTA files, not both"),
                (None, true) => bail!("no inputs: give FASTA files or --samplesheet"),
            };

            let n_samples = samples.len();
            let summary = pipeline::run_batch(BatchOpts {
                dataset: ds,
                samples,
                outdir,
                dataset_dir,
                threads: threads.filter(|t| *t > 0),
                retries,
                nextclade,
            })?;

            if let Some(path) = &json {
                pipeline::write_json_summary(&summary, path)?;
            }
            print_summary(&summary);

            if summary.n_failed() > 0 {
                bail!("{} of {} samples failed", summary.n_failed(), n_samples);
            }
        }
    }

    Ok(())
}

fn cmd_list_datasets() {
    let rows = claderun::dataset_rows();
    let ids: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
    let pathogens: Vec<String> = rows.iter().map(|r| r.1.clone()).collect();
    let descs: Vec<String> = rows.iter().map(|r| r.2.clone()).collect();

    let df = df!(
        "dataset" => ids,
        "pathogen" => pathogens,
        "description" => descs,
    ).expect("dataframe");

    set_full_width_fmt();

    // Print the DataFrame directly (requires polars 'fmt' feature)
    println!("{}", df);
}

fn cmd_describe(id: String) {
    match claderun::get_dataset(id.as_str()) {
        Some(ds) => {
            println!("id: {}", ds.id.0);
            println!("pathogen: {}", ds.pathogen);
            println!("description: {}", ds.description);
            println!("fetch command: nextclade dataset get --name {} --output-dir <dir>", ds.id.0);
        }
        None => {
            eprintln!("Unknown dataset: {}", id);
        }
    }
}

fn print_summary(summary: &pipeline::BatchSummary) {
    set_full_width_fmt();
    println!(
        "\n=== Batch summary: {} ({} done, {} failed) ===",
        summary.dataset,
        summary.n_done(),
        summary.n_failed()
    );
    match pipeline::summary_df(summary) {
        Ok(df) => println!("{}", df),
        Err(e) => eprintln!("summary table error: {e}"),
    }
}

// Configure Polars display to show all columns and full cell width.
// These env vars are read by Polars' pretty-printer (fmt feature).
fn set_full_width_fmt() {
    std::env::set_var("POLARS_FMT_TABLE_FORMATTING", "UTF8_FULL");
    std::env::set_var("POLARS_FMT_MAX_COLS", "100000");
    std::env::set_var("POLARS_FMT_MAX_ROWS", "1000000"); // effectively show all rows
    std::env::set_var("POLARS_FMT_STR_LEN", "100000"); // don't truncate long strings
    std::env::set_var("POLARS_TABLE_WIDTH", "65535"); // safe upper bound for width in polars 0.42
}
