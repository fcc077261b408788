//! Pairwise comparison in a child process.
//!
//! Native decoders can crash or hang on broken files. Running the comparison
//! in `vidsim worker` confines that to one pair: a crash, a non-zero exit, a
//! timeout or unparsable output all become a failed [`PairwiseResult`].

use super::PairwiseResult;
use super::config::{Algorithm, ComparatorWeights, SearchConfig};
use super::engine::SimilaritySearchEngine;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Settings a worker needs to score a pair the way the calling engine would
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerOptions {
    pub algorithm: Algorithm,
    pub fast_frame_samples: usize,
    pub hamming_threshold: u32,
    pub weights: ComparatorWeights,
}

impl From<&SearchConfig> for WorkerOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            fast_frame_samples: config.fast_frame_samples,
            hamming_threshold: config.hamming_threshold,
            weights: config.weights,
        }
    }
}

impl WorkerOptions {
    fn args(&self) -> Vec<String> {
        vec![
            "--algorithm".to_string(),
            self.algorithm.as_str().to_string(),
            "--fast-frames".to_string(),
            self.fast_frame_samples.to_string(),
            "--hamming".to_string(),
            self.hamming_threshold.to_string(),
            "--histogram-weight".to_string(),
            self.weights.histogram.to_string(),
            "--phash-weight".to_string(),
            self.weights.phash.to_string(),
        ]
    }

    fn into_config(self) -> SearchConfig {
        SearchConfig {
            algorithm: self.algorithm,
            fast_frame_samples: self.fast_frame_samples,
            hamming_threshold: self.hamming_threshold,
            weights: self.weights,
            frame_cache_capacity: 0,
            ..SearchConfig::default()
        }
    }
}

pub struct IsolatedComparator {
    program: PathBuf,
    leading_args: Vec<OsString>,
    options: WorkerOptions,
    timeout: Duration,
}

impl IsolatedComparator {
    /// Spawn `program worker ...` for each comparison, scoring with the
    /// algorithm, weights and hash settings of `config`.
    pub fn new(program: impl Into<PathBuf>, config: &SearchConfig) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            options: WorkerOptions::from(config),
            timeout: config.worker_timeout,
        }
    }

    /// Use the running executable as the worker.
    pub fn current_exe(config: &SearchConfig) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the current executable")?;
        Ok(Self::new(exe, config))
    }

    /// Arguments placed before the `worker` subcommand.
    pub fn with_leading_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn compare(&self, video_a: &Path, video_b: &Path, max_frames: usize) -> PairwiseResult {
        match self.run(video_a, video_b, max_frames) {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "Isolated comparison of {:?} and {:?} failed: {:#}",
                    video_a,
                    video_b,
                    e
                );
                PairwiseResult::failed(format!("{:#}", e))
            }
        }
    }

    fn run(&self, video_a: &Path, video_b: &Path, max_frames: usize) -> Result<PairwiseResult> {
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("worker")
            .args(self.options.args())
            .arg("--max-frames")
            .arg(max_frames.to_string())
            .arg(video_a)
            .arg(video_b)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn worker {:?}", self.program))?;

        let mut stdout = child.stdout.take().context("Worker stdout was not captured")?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        wait_with_timeout(&mut child, self.timeout)?;

        let output = reader
            .join()
            .map_err(|_| anyhow::anyhow!("Worker output reader panicked"))?
            .context("Failed to read worker output")?;

        serde_json::from_str(output.trim()).context("Malformed worker output")
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<()> {
    let started = Instant::now();

    loop {
        if let Some(status) = child.try_wait().context("Failed to poll worker")? {
            if !status.success() {
                anyhow::bail!("Worker exited with {}", status);
            }
            return Ok(());
        }

        if started.elapsed() >= timeout {
            // the process may exit between the poll and the kill
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("Worker timed out after {:?}", timeout);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// Body of `vidsim worker`: compare in-process with the given options.
/// Failures are folded into the result so the worker always prints JSON.
pub fn run_worker(
    options: WorkerOptions,
    video_a: &Path,
    video_b: &Path,
    max_frames: usize,
) -> PairwiseResult {
    let outcome = SimilaritySearchEngine::new(options.into_config())
        .and_then(|engine| engine.compare(video_a, video_b, max_frames));

    match outcome {
        Ok(result) => result,
        Err(e) => PairwiseResult::failed(e.to_string()),
    }
}
