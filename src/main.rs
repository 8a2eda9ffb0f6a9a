//! Order decoding CLI.
//!
//! Reads one position as JSON, decodes it against the per-step logits it
//! carries and writes the resulting order sets as JSONL.
//!
//! Usage:
//!   realpolitik-decoder [OPTIONS] < position.json
//!
//! Input:
//!   {"units": [5, 12], "phase": "movement", "num_areas": 81, "logits": [[...], [...]]}
//!   `phase` and `num_areas` are optional; `logits` holds one row of 7 + 2P
//!   scores per unit, in ascending unit order.
//!
//! Options:
//!   --input FILE      Position file (default: stdin)
//!   --config FILE     JSON decode config; flags below override it
//!   --mode MODE       greedy | beam | sample | candidates (default: candidates)
//!   --beam-width N    Beams kept per step (default: 5)
//!   --samples N       Samples drawn in sample mode (default: 10)
//!   --candidates N    Candidate pool size (default: 10)
//!   --temperature T   Logit temperature (default: 1.0)
//!   --top-k N         Sample only from the top N entries, 0 disables (default: 20)
//!   --unconstrained   Allow two orders to claim the same destination
//!   --seed N          Random seed, 0 for entropy (default: 0)
//!   --threads N       Worker threads (default: 1)
//!   --quiet           Suppress the summary line
//!
//! Logging goes to stderr and is controlled by RUST_LOG.

use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::process;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use realpolitik_decoder::board::{Area, OrderToken, Phase, UnitList};
use realpolitik_decoder::nn::StaticScorer;
use realpolitik_decoder::search::{Candidate, Origin};
use realpolitik_decoder::{DecodeConfig, Decoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Greedy,
    Beam,
    Sample,
    Candidates,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Mode::Greedy),
            "beam" => Ok(Mode::Beam),
            "sample" => Ok(Mode::Sample),
            "candidates" => Ok(Mode::Candidates),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Position {
    units: Vec<Area>,
    #[serde(default)]
    phase: Phase,
    num_areas: Option<usize>,
    logits: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
struct OutputLine {
    rank: usize,
    score: f64,
    origin: Origin,
    indices: Vec<usize>,
    orders: Vec<OrderToken>,
}

#[derive(Debug, Default)]
struct Args {
    input: Option<String>,
    config: Option<String>,
    mode: Option<Mode>,
    beam_width: Option<usize>,
    samples: Option<usize>,
    candidates: Option<usize>,
    temperature: Option<f64>,
    top_k: Option<usize>,
    unconstrained: bool,
    seed: Option<u64>,
    threads: Option<usize>,
    quiet: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args(env::args().skip(1).collect());
    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn parse_args(raw: Vec<String>) -> Args {
    let mut args = Args::default();
    let mut i = 0;
    while i < raw.len() {
        match raw[i].as_str() {
            "--input" => args.input = Some(value(&raw, &mut i)),
            "--config" => args.config = Some(value(&raw, &mut i)),
            "--mode" => args.mode = Some(parsed(&raw, &mut i)),
            "--beam-width" => args.beam_width = Some(parsed(&raw, &mut i)),
            "--samples" => args.samples = Some(parsed(&raw, &mut i)),
            "--candidates" => args.candidates = Some(parsed(&raw, &mut i)),
            "--temperature" => args.temperature = Some(parsed(&raw, &mut i)),
            "--top-k" => args.top_k = Some(parsed(&raw, &mut i)),
            "--seed" => args.seed = Some(parsed(&raw, &mut i)),
            "--threads" => args.threads = Some(parsed(&raw, &mut i)),
            "--unconstrained" => args.unconstrained = true,
            "--quiet" => args.quiet = true,
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }
    args
}

/// Returns the value following the flag at `raw[*i]`, advancing `i`.
fn value(raw: &[String], i: &mut usize) -> String {
    let flag = &raw[*i];
    *i += 1;
    match raw.get(*i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("missing value for {}", flag);
            process::exit(1);
        }
    }
}

fn parsed<T: FromStr>(raw: &[String], i: &mut usize) -> T {
    let flag = raw[*i].clone();
    let text = value(raw, i);
    match text.parse() {
        Ok(v) => v,
        Err(_) => {
            eprintln!("invalid {} value: {}", flag, text);
            process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let position: Position = serde_json::from_str(&text)?;

    let mut config = match &args.config {
        Some(path) => DecodeConfig::load(path)?,
        None => DecodeConfig::default(),
    };
    if let Some(n) = position.num_areas {
        config.num_areas = n;
    }
    if let Some(n) = args.beam_width {
        config.beam_width = n;
    }
    if let Some(n) = args.samples {
        config.num_samples = n;
    }
    if let Some(n) = args.candidates {
        config.num_candidates = n;
    }
    if let Some(t) = args.temperature {
        config.temperature = t;
    }
    if let Some(k) = args.top_k {
        config.top_k = k;
    }
    if let Some(s) = args.seed {
        config.seed = s;
    }
    if let Some(t) = args.threads {
        config.threads = t;
    }
    if args.unconstrained {
        config.constrain_destinations = false;
    }

    let units = UnitList::new(position.units)?.with_phase(position.phase);
    let mode = args.mode.unwrap_or(Mode::Candidates);
    let mut decoder = Decoder::new(StaticScorer::new(position.logits), config)?;

    let start = Instant::now();
    let candidates: Vec<Candidate> = match mode {
        Mode::Greedy => vec![decoder.greedy_decode(&(), &units)?],
        Mode::Beam => decoder.beam_decode(&(), &units)?.into_candidates(),
        Mode::Sample => decoder.sample_decode(&(), &units)?,
        Mode::Candidates => decoder.generate_candidates(&(), &units)?,
    };
    let elapsed = start.elapsed();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for (rank, cand) in candidates.iter().enumerate() {
        let line = OutputLine {
            rank,
            score: cand.score,
            origin: cand.origin,
            indices: cand.signature(),
            orders: cand.tokens(),
        };
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
    }
    out.flush()?;

    if !args.quiet {
        eprintln!(
            "Decoded {} units: {} candidates ({:?}) in {:.1}ms",
            units.len(),
            candidates.len(),
            mode,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

fn print_usage() {
    eprintln!("Usage: realpolitik-decoder [OPTIONS] < position.json");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --input FILE      Position file (default: stdin)");
    eprintln!("  --config FILE     JSON decode config; flags override it");
    eprintln!("  --mode MODE       greedy | beam | sample | candidates (default: candidates)");
    eprintln!("  --beam-width N    Beams kept per step (default: 5)");
    eprintln!("  --samples N       Samples drawn in sample mode (default: 10)");
    eprintln!("  --candidates N    Candidate pool size (default: 10)");
    eprintln!("  --temperature T   Logit temperature (default: 1.0)");
    eprintln!("  --top-k N         Sample from the top N entries, 0 disables (default: 20)");
    eprintln!("  --unconstrained   Allow repeated destinations");
    eprintln!("  --seed N          Random seed, 0 for entropy (default: 0)");
    eprintln!("  --threads N       Worker threads (default: 1)");
    eprintln!("  --quiet           Suppress the summary line");
}
