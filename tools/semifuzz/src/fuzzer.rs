// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Replay corpus entries and seeded mutations through the semihosting codec.
// Author: Lukas Bower

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use semihost_codec::{
    encode_reply, fuzz_decode_with, CallRequest, Codec, Configuration, DecodeLimits, Endianness,
    FuzzOutcome, Parameter, Response,
};
use serde::Serialize;

/// One input replayed by the fuzzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Aggregate outcome of a run, emitted as JSON.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub entries: usize,
    pub mutations: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Rejection counts keyed by the ERRO code a host would send.
    pub rejections: BTreeMap<String, usize>,
    /// Inputs whose decoded calls did not survive re-encoding.
    pub inconsistent: Vec<String>,
}

/// Load every regular file in `dir`, sorted by file name.
pub fn load_corpus(dir: &Path) -> Result<Vec<CorpusEntry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(dir).with_context(|| format!("reading corpus {}", dir.display()))? {
        let path = item?.path();
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        entries.push(CorpusEntry { name, bytes });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    info!("loaded {} corpus entries from {}", entries.len(), dir.display());
    Ok(entries)
}

/// Read decode limits from a JSON file; missing fields keep their defaults.
pub fn load_limits(path: &Path) -> Result<DecodeLimits> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading limits {}", path.display()))?;
    let limits = serde_json::from_str(&data)
        .with_context(|| format!("parsing limits {}", path.display()))?;
    Ok(limits)
}

/// Well-formed requests and replies used when no corpus directory is given.
pub fn builtin_seeds() -> Result<Vec<CorpusEntry>> {
    let codec = Codec::new();
    let narrow = Configuration::new(4, 4, Endianness::Little)?;
    let wide = Configuration::new(8, 8, Endianness::Big)?;
    let mut seeds = vec![CorpusEntry {
        name: "empty_container".to_owned(),
        bytes: b"RIFF\x04\x00\x00\x00SEMI".to_vec(),
    }];
    seeds.push(CorpusEntry {
        name: "errno_call".to_owned(),
        bytes: codec.encode_request(&narrow, &CallRequest::new(0x13))?,
    });
    seeds.push(CorpusEntry {
        name: "write_call".to_owned(),
        bytes: codec.encode_request(
            &wide,
            &CallRequest {
                opcode: 0x05,
                parameters: vec![
                    Parameter::new(1, 8),
                    Parameter::new(0x8000_0000, 8),
                    Parameter::new(5, 8),
                ],
                data: Some(b"hello"),
            },
        )?,
    });
    seeds.push(CorpusEntry {
        name: "return_reply".to_owned(),
        bytes: encode_reply(
            &narrow,
            &Response::Return {
                value: 5,
                errno: 0,
            },
        ),
    });
    seeds.push(CorpusEntry {
        name: "error_reply".to_owned(),
        bytes: encode_reply(&wide, &Response::Error { code: 0x04 }),
    });
    Ok(seeds)
}

/// Replays corpus entries and seeded mutations of them.
pub struct CorpusFuzzer {
    codec: Codec,
    rng: StdRng,
}

impl CorpusFuzzer {
    pub fn new(limits: DecodeLimits, seed: u64) -> Self {
        Self {
            codec: Codec::with_limits(limits),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Replay each entry, then `iterations` mutations of it.
    pub fn run(&mut self, corpus: &[CorpusEntry], iterations: usize) -> Summary {
        let mut summary = Summary::default();
        for entry in corpus {
            summary.entries += 1;
            let outcome = self.record(&mut summary, &entry.name, &entry.bytes);
            info!("{}: {}", entry.name, describe(&outcome));
            for i in 0..iterations {
                let mut mutated = entry.bytes.clone();
                self.mutate(&mut mutated);
                summary.mutations += 1;
                let label = format!("{}#{i}", entry.name);
                let outcome = self.record(&mut summary, &label, &mutated);
                debug!("{label}: {}", describe(&outcome));
            }
        }
        summary
    }

    fn record(&self, summary: &mut Summary, label: &str, bytes: &[u8]) -> FuzzOutcome {
        let outcome = fuzz_decode_with(&self.codec, bytes);
        match &outcome {
            FuzzOutcome::Accepted { .. } => summary.accepted += 1,
            FuzzOutcome::Rejected(err) => {
                summary.rejected += 1;
                *summary
                    .rejections
                    .entry(format!("{:?}", err.protocol_code()))
                    .or_default() += 1;
            }
            FuzzOutcome::Inconsistent { opcode } => {
                warn!("{label}: call {opcode:#x} did not survive re-encoding");
                summary.inconsistent.push(label.to_owned());
            }
        }
        outcome
    }

    fn mutate(&mut self, frame: &mut Vec<u8>) {
        let rng = &mut self.rng;
        match rng.random_range(0..4) {
            // Overwrite a little-endian size-sized window with a hostile value.
            0 if frame.len() >= 4 => {
                let at = rng.random_range(0..=frame.len() - 4);
                let hostile = match rng.random_range(0..4) {
                    0 => u32::MAX,
                    1 => 0,
                    2 => 0xFFFF_FFF0,
                    _ => rng.random(),
                };
                frame[at..at + 4].copy_from_slice(&hostile.to_le_bytes());
            }
            1 if !frame.is_empty() => {
                let new_len = rng.random_range(0..frame.len());
                frame.truncate(new_len);
            }
            2 => {
                let mut tail = vec![0u8; rng.random_range(1..16)];
                rng.fill(&mut tail[..]);
                frame.extend_from_slice(&tail);
            }
            _ => {
                let at = rng.random_range(0..frame.len().max(1));
                if let Some(byte) = frame.get_mut(at) {
                    *byte ^= rng.random_range(1..=u8::MAX);
                }
            }
        }
    }
}

fn describe(outcome: &FuzzOutcome) -> String {
    match outcome {
        FuzzOutcome::Accepted { calls } => format!("accepted ({calls} calls)"),
        FuzzOutcome::Rejected(err) => format!("rejected: {err}"),
        FuzzOutcome::Inconsistent { opcode } => format!("inconsistent call {opcode:#x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_seeds_are_accepted() {
        let seeds = builtin_seeds().expect("seeds");
        let mut fuzzer = CorpusFuzzer::new(DecodeLimits::default(), 1);
        let summary = fuzzer.run(&seeds, 0);
        assert_eq!(summary.entries, seeds.len());
        assert_eq!(summary.accepted, seeds.len());
        assert_eq!(summary.rejected, 0);
    }

    #[test]
    fn mutations_are_counted_and_consistent() {
        let seeds = builtin_seeds().expect("seeds");
        let mut fuzzer = CorpusFuzzer::new(DecodeLimits::default(), 0x5EED);
        let summary = fuzzer.run(&seeds, 32);
        assert_eq!(summary.mutations, seeds.len() * 32);
        assert_eq!(
            summary.accepted + summary.rejected,
            summary.entries + summary.mutations
        );
        assert!(summary.inconsistent.is_empty());
    }

    #[test]
    fn empty_and_tiny_entries_survive_mutation() {
        let corpus = [
            CorpusEntry {
                name: "empty".to_owned(),
                bytes: Vec::new(),
            },
            CorpusEntry {
                name: "two_bytes".to_owned(),
                bytes: vec![b'R', b'I'],
            },
        ];
        let summary = CorpusFuzzer::new(DecodeLimits::default(), 3).run(&corpus, 64);
        assert_eq!(summary.entries, 2);
        assert_eq!(summary.mutations, 2 * 64);
        assert_eq!(
            summary.accepted + summary.rejected,
            summary.entries + summary.mutations
        );
        assert!(summary.inconsistent.is_empty());
    }

    #[test]
    fn same_seed_gives_same_summary() {
        let seeds = builtin_seeds().expect("seeds");
        let first = CorpusFuzzer::new(DecodeLimits::default(), 7).run(&seeds, 16);
        let second = CorpusFuzzer::new(DecodeLimits::default(), 7).run(&seeds, 16);
        assert_eq!(first, second);
    }

    #[test]
    fn corpus_and_limits_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b_min"), b"RIFF\x04\x00\x00\x00SEMI").expect("write");
        fs::write(dir.path().join("a_neg1"), b"RIFF\xFF\xFF\xFF\xFFSEMI").expect("write");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        let corpus = load_corpus(dir.path()).expect("corpus");
        let names: Vec<_> = corpus.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["a_neg1", "b_min"]);

        let summary = CorpusFuzzer::new(DecodeLimits::default(), 0).run(&corpus, 0);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejections.get("MalformedRiff"), Some(&1));

        let limits_path = dir.path().join("limits.json");
        fs::write(&limits_path, r#"{"max_calls": 2}"#).expect("write");
        let limits = load_limits(&limits_path).expect("limits");
        assert_eq!(limits.max_calls, 2);
        assert_eq!(limits.max_chunks, DecodeLimits::default().max_chunks);
    }
}
