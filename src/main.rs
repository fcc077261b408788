use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vidsim::similarity::config::{
    DEFAULT_FAST_FRAME_SAMPLES, DEFAULT_FRAME_SAMPLES, DEFAULT_HAMMING_THRESHOLD,
};
use vidsim::similarity::worker::{WorkerOptions, run_worker};
use vidsim::{
    Algorithm, CancelFlag, ComparatorWeights, Evidence, IsolatedComparator, PairingStrategy,
    PairwiseResult, SearchConfig, SimilarityPair, SimilaritySearchEngine, group_pairs,
    scan_videos,
};

#[derive(Parser, Debug)]
#[command(name = "vidsim", version, about = "Find near-duplicate videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search directories for similar videos
    Scan {
        /// Directories or files to scan
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Minimum similarity, 0.1 to 1.0
        #[arg(short, long, default_value_t = 0.7)]
        threshold: f64,
        /// simple, thorough, phash or cnn_faiss
        #[arg(short, long, default_value = "simple")]
        algorithm: Algorithm,
        /// Frames sampled per video
        #[arg(short, long, default_value_t = DEFAULT_FRAME_SAMPLES)]
        frames: usize,
        /// Maximum hamming distance for a phash frame match
        #[arg(long, default_value_t = DEFAULT_HAMMING_THRESHOLD)]
        hamming: u32,
        /// Compare candidate pairs in parallel
        #[arg(long)]
        parallel: bool,
        /// Merge pairs into groups
        #[arg(long)]
        groups: bool,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compare two videos
    Compare {
        video_a: PathBuf,
        video_b: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_FRAME_SAMPLES)]
        frames: usize,
        #[arg(short, long, default_value = "simple")]
        algorithm: Algorithm,
        /// Maximum hamming distance for a phash frame match
        #[arg(long, default_value_t = DEFAULT_HAMMING_THRESHOLD)]
        hamming: u32,
        /// Pair frames by best match instead of by index
        #[arg(long)]
        best_match: bool,
        /// Run the comparison in a child process
        #[arg(long)]
        isolated: bool,
        /// Child process timeout in seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
        #[arg(long)]
        json: bool,
    },

    /// Compare two videos and print the result as JSON (used by --isolated)
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value = "simple")]
        algorithm: Algorithm,
        #[arg(long, default_value_t = DEFAULT_FRAME_SAMPLES)]
        max_frames: usize,
        #[arg(long, default_value_t = DEFAULT_FAST_FRAME_SAMPLES)]
        fast_frames: usize,
        #[arg(long, default_value_t = DEFAULT_HAMMING_THRESHOLD)]
        hamming: u32,
        #[arg(long, default_value_t = ComparatorWeights::default().histogram)]
        histogram_weight: f64,
        #[arg(long, default_value_t = ComparatorWeights::default().phash)]
        phash_weight: f64,
        video_a: PathBuf,
        video_b: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            paths,
            threshold,
            algorithm,
            frames,
            hamming,
            parallel,
            groups,
            json,
        } => {
            let config = SearchConfig {
                algorithm,
                frame_samples: frames,
                hamming_threshold: hamming,
                similarity_threshold: threshold,
                parallel,
                ..SearchConfig::default()
            };
            let pairs = scan(&paths, config)?;

            if groups {
                let groups = group_pairs(&pairs);
                if json {
                    println!("{}", serde_json::to_string_pretty(&groups)?);
                } else if groups.is_empty() {
                    println!("No similar videos found.");
                } else {
                    println!("Found {} group(s):", groups.len());
                    for group in &groups {
                        println!(
                            " {} ({:.1}%..{:.1}%)",
                            group.name,
                            group.lowest_score * 100.0,
                            group.best_score * 100.0
                        );
                        for video in &group.videos {
                            println!("   ▶ {}", video.display());
                        }
                    }
                }
            } else if json {
                println!("{}", serde_json::to_string_pretty(&pairs)?);
            } else {
                print_pairs(&pairs);
            }
        }

        Commands::Compare {
            video_a,
            video_b,
            frames,
            algorithm,
            hamming,
            best_match,
            isolated,
            timeout,
            json,
        } => {
            let config = SearchConfig {
                algorithm,
                hamming_threshold: hamming,
                worker_timeout: Duration::from_secs(timeout),
                ..SearchConfig::default()
            };

            let result = benchmark("comparison", || -> Result<PairwiseResult> {
                if isolated {
                    let comparator = IsolatedComparator::current_exe(&config)?;
                    return Ok(comparator.compare(&video_a, &video_b, frames));
                }

                let engine = SimilaritySearchEngine::new(config.clone())?;

                if best_match {
                    Ok(engine.compare_with_strategy(
                        &video_a,
                        &video_b,
                        frames,
                        PairingStrategy::BestMatch,
                    ))
                } else {
                    Ok(engine.compare(&video_a, &video_b, frames)?)
                }
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_comparison(&video_a, &video_b, &result);
            }
        }

        Commands::Worker {
            algorithm,
            max_frames,
            fast_frames,
            hamming,
            histogram_weight,
            phash_weight,
            video_a,
            video_b,
        } => {
            let options = WorkerOptions {
                algorithm,
                fast_frame_samples: fast_frames,
                hamming_threshold: hamming,
                weights: ComparatorWeights {
                    histogram: histogram_weight,
                    phash: phash_weight,
                },
            };
            let result = run_worker(options, &video_a, &video_b, max_frames);
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}

fn scan(roots: &[PathBuf], config: SearchConfig) -> Result<Vec<SimilarityPair>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for videos…");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let videos = scan_videos(roots);
    spinner.finish_with_message(format!("Found {} videos", videos.len()));

    let threshold = config.similarity_threshold;
    let engine = SimilaritySearchEngine::new(config).context("Invalid search configuration")?;

    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos:>3}% {wide_msg}",
    )?);
    let report = |percent: u8, message: &str| {
        bar.set_position(u64::from(percent));
        bar.set_message(message.to_string());
    };

    let pairs = benchmark("search", || {
        engine.find_similar_with(&videos, threshold, &report, &CancelFlag::new())
    })?;
    bar.finish_and_clear();

    Ok(pairs)
}

fn print_pairs(pairs: &[SimilarityPair]) {
    if pairs.is_empty() {
        println!("No similar videos found.");
        return;
    }

    println!("Found {} similar pair(s):", pairs.len());
    for pair in pairs {
        let evidence = match &pair.evidence {
            Evidence::ExactDuplicate => "exact duplicate".to_string(),
            Evidence::Frames(result) => format!(
                "{} frame pairs",
                result.frame_comparisons.len()
            ),
            Evidence::HashCoverage {
                matched, compared, ..
            } => format!("{}/{} frames matched", matched, compared),
        };
        println!(
            " {:5.1}%  {} ⇄ {}  ({})",
            pair.score * 100.0,
            pair.path_a.display(),
            pair.path_b.display(),
            evidence
        );
    }
}

fn print_comparison(video_a: &Path, video_b: &Path, result: &PairwiseResult) {
    println!("▶ {} vs {}", video_a.display(), video_b.display());
    if let Some(error) = &result.error {
        println!("⚠ {}", error);
    }
    println!(
        "Frames extracted: {} / {}",
        result.frames_extracted.video_a, result.frames_extracted.video_b
    );
    for comparison in &result.frame_comparisons {
        let scores: Vec<String> = comparison
            .scores
            .iter()
            .map(|(name, score)| format!("{}={:.3}", name, score))
            .collect();
        println!(
            "  frame {:>3} ⇄ {:>3}: {:.3}  [{}]",
            slot(comparison.frame_a),
            slot(comparison.frame_b),
            comparison.overall,
            scores.join(", ")
        );
    }
    println!("Similarity: {:.1}%", result.similarity * 100.0);
}

fn slot(index: Option<usize>) -> String {
    index.map_or_else(|| "-".to_string(), |i| i.to_string())
}

fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
