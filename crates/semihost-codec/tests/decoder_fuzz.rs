// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fuzz-style regression tests for semihosting message framing.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use semihost_codec::{
    fuzz_decode, CallRequest, Codec, Configuration, Endianness, FuzzOutcome, Parameter, Response,
};

#[test]
fn fuzz_decode_survives_mutation() {
    let iterations = std::env::var("SEMIHOST_FUZZ_ITERS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(512);
    let mut rng = StdRng::seed_from_u64(0x5E31_C0DE_u64);
    let codec = Codec::new();

    for _ in 0..iterations {
        let config = random_config(&mut rng);
        let data = random_data(&mut rng);
        let request = random_request(&mut rng, &config, data.as_deref());
        let mut frame = codec.encode_request(&config, &request).unwrap();
        mutate_frame(&mut rng, &mut frame);
        let outcome = catch_unwind(AssertUnwindSafe(|| fuzz_decode(&frame)));
        let outcome = outcome.expect("request decoder panicked on mutated frame");
        assert!(
            !matches!(outcome, FuzzOutcome::Inconsistent { .. }),
            "decoded call did not re-encode: {outcome:?}"
        );
    }

    for _ in 0..iterations {
        let config = random_config(&mut rng);
        let mut frame = codec.encode_reply(&config, &random_response(&mut rng));
        mutate_frame(&mut rng, &mut frame);
        let result = catch_unwind(AssertUnwindSafe(|| codec.decode_reply(&frame)));
        assert!(result.is_ok(), "reply decoder panicked on mutated frame");
    }
}

#[test]
fn unmutated_requests_are_accepted() {
    let mut rng = StdRng::seed_from_u64(0x0DDB_A11_u64);
    let codec = Codec::new();
    for _ in 0..64 {
        let config = random_config(&mut rng);
        let data = random_data(&mut rng);
        let request = random_request(&mut rng, &config, data.as_deref());
        let frame = codec.encode_request(&config, &request).unwrap();
        assert_eq!(fuzz_decode(&frame), FuzzOutcome::Accepted { calls: 1 });
    }
}

fn mutate_frame<R: Rng>(rng: &mut R, frame: &mut Vec<u8>) {
    if frame.len() < 12 {
        return;
    }
    match rng.random_range(0..4) {
        0 => {
            let declared: u32 = rng.random();
            frame[4..8].copy_from_slice(&declared.to_le_bytes());
        }
        1 => {
            let new_len = rng.random_range(8..frame.len());
            frame.truncate(new_len);
            if rng.random_bool(0.5) && new_len >= 8 {
                let declared = (new_len as u32).saturating_sub(8);
                frame[4..8].copy_from_slice(&declared.to_le_bytes());
            }
        }
        2 => {
            // Corrupt a chunk size field somewhere past the container header.
            if frame.len() > 20 {
                let at = rng.random_range(16..frame.len() - 3);
                let declared: u32 = rng.random();
                frame[at..at + 4].copy_from_slice(&declared.to_le_bytes());
            }
        }
        _ => {
            let tail_len = rng.random_range(1..16);
            let mut tail = vec![0u8; tail_len];
            rng.fill_bytes(&mut tail);
            frame.extend_from_slice(&tail);
            if rng.random_bool(0.5) {
                let declared = (frame.len() - 8) as u32;
                frame[4..8].copy_from_slice(&declared.to_le_bytes());
            }
        }
    }

    let at = rng.random_range(12..frame.len().max(13));
    if let Some(byte) = frame.get_mut(at) {
        *byte ^= rng.random_range(1..=0x7F);
    }
}

fn random_config<R: Rng>(rng: &mut R) -> Configuration {
    const WIDTHS: [u8; 4] = [1, 2, 4, 8];
    let endianness = if rng.random_bool(0.5) {
        Endianness::Little
    } else {
        Endianness::Big
    };
    Configuration::new(
        WIDTHS[rng.random_range(0..WIDTHS.len())],
        WIDTHS[rng.random_range(0..WIDTHS.len())],
        endianness,
    )
    .unwrap()
}

fn random_data<R: Rng>(rng: &mut R) -> Option<Vec<u8>> {
    rng.random_bool(0.5).then(|| {
        let mut data = vec![0u8; rng.random_range(0..64)];
        rng.fill_bytes(&mut data);
        data
    })
}

fn random_request<'a, R: Rng>(
    rng: &mut R,
    config: &Configuration,
    data: Option<&'a [u8]>,
) -> CallRequest<'a> {
    let slot = config.slot_width();
    CallRequest {
        opcode: rng.random_range(0x01..=0x31),
        parameters: (0..rng.random_range(0..6))
            .map(|_| Parameter::new(rng.random(), slot))
            .collect(),
        data,
    }
}

fn random_response<R: Rng>(rng: &mut R) -> Response {
    if rng.random_bool(0.5) {
        Response::Return {
            value: rng.random(),
            errno: rng.random_range(0..128),
        }
    } else {
        Response::Error {
            code: rng.random_range(0x01..=0x05),
        }
    }
}
