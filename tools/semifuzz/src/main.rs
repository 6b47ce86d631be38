// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command-line entry point for replaying semihosting corpora.
// Author: Lukas Bower

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use semifuzz::fuzzer::{builtin_seeds, load_corpus, load_limits, CorpusFuzzer};
use semihost_codec::DecodeLimits;

#[derive(Parser)]
#[command(about = "Replay and mutate RIFF semihosting corpora against the codec")]
struct Args {
    /// Directory of corpus files; built-in seeds are used when omitted.
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// Mutations generated per corpus entry.
    #[arg(long, env = "SEMIFUZZ_ITERS", default_value_t = 256)]
    iterations: usize,
    /// Seed for the mutation RNG.
    #[arg(long, default_value_t = 0x5E31_C0DE)]
    seed: u64,
    /// JSON file overriding the decode limits.
    #[arg(long)]
    limits: Option<PathBuf>,
    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let limits = match &args.limits {
        Some(path) => load_limits(path)?,
        None => DecodeLimits::default(),
    };
    let corpus = match &args.corpus {
        Some(dir) => load_corpus(dir)?,
        None => builtin_seeds()?,
    };
    info!(
        "replaying {} entries with {} mutations each (seed {:#x})",
        corpus.len(),
        args.iterations,
        args.seed
    );

    let mut fuzzer = CorpusFuzzer::new(limits, args.seed);
    let summary = fuzzer.run(&corpus, args.iterations);
    let report = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &report).with_context(|| format!("writing {}", path.display()))?
        }
        None => println!("{report}"),
    }

    if !summary.inconsistent.is_empty() {
        bail!(
            "{} inputs decoded to calls that did not re-encode",
            summary.inconsistent.len()
        );
    }
    Ok(())
}
