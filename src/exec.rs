//! Subprocess engine for the external tool.
//!
//! The tool is consumed only through its command line, its combined
//! stdout/stderr stream and its exit code. Both pipes are pumped on their own
//! threads so output is echoed to the console as it arrives (tagged with the
//! originating step or sample) while a transcript is kept for the error scan.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{Context, Result};

/// Exit status and combined-output transcript of one finished invocation.
#[derive(Clone, Debug)]
pub struct Captured {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// stdout and stderr merged, line-interleaved in arrival order.
    pub transcript: String,
}

impl Captured {
    /// Exit code as text for status lines (`"signal"` when there is none).
    pub fn exit_label(&self) -> String {
        self.code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
    }
}

fn pump<R: Read + Send + 'static>(
    stream: R,
    tag: String,
    sink: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(|l| l.ok()) {
            eprintln!("[{tag}] {line}");
            sink.lock().unwrap().push(line);
        }
    })
}

/// Spawn `program` with `args`, stream its output and wait for it to finish.
///
/// Failing to spawn at all (missing binary, permissions) is an `Err`; a
/// nonzero exit is a normal return with `success == false` so callers can
/// apply their own retry and error-scan policy.
pub fn run_captured(program: &str, args: &[String], tag: &str) -> Result<Captured> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let sink: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let mut pumps = Vec::new();
    if let Some(out) = child.stdout.take() {
        pumps.push(pump(out, tag.to_string(), sink.clone()));
    }
    if let Some(err) = child.stderr.take() {
        pumps.push(pump(err, tag.to_string(), sink.clone()));
    }
    for jh in pumps {
        let _ = jh.join();
    }

    let status = child.wait().with_context(|| format!("failed to wait on {program}"))?;
    let transcript = sink.lock().unwrap().join("\n");
    Ok(Captured { code: status.code(), success: status.success(), transcript })
}

/// Run up to `attempts` times, stopping at the first success. Returns the
/// final capture and the number of invocations spent.
pub fn run_with_retries(
    program: &str,
    args: &[String],
    tag: &str,
    attempts: usize,
) -> Result<(Captured, usize)> {
    let attempts = attempts.max(1);
    let mut used = 1;
    let mut cap = run_captured(program, args, tag)?;
    while !cap.success && used < attempts {
        used += 1;
        eprintln!("[{tag}] exit {}, retrying ({used}/{attempts})", cap.exit_label());
        cap = run_captured(program, args, tag)?;
    }
    Ok((cap, used))
}

/// Best-effort scan of a failed run's transcript for error-message lines.
///
/// Nextclade reports per-sequence problems on `Message`-bearing lines and
/// fatal ones on `Error:`-style lines; anything matching either is kept, up
/// to `cap` lines.
pub fn scan_error_lines(transcript: &str, cap: usize) -> Vec<String> {
    transcript
        .lines()
        .map(str::trim)
        .filter(|l| l.contains("Message") || l.to_ascii_lowercase().contains("error"))
        .take(cap)
        .map(str::to_string)
        .collect()
}
