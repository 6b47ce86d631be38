// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode arbitrary bytes as semihosting messages and check re-encoding.
// Author: Lukas Bower

#![no_main]

use libfuzzer_sys::fuzz_target;
use semihost_codec::{fuzz_decode, FuzzOutcome};

fuzz_target!(|data: &[u8]| {
    if let FuzzOutcome::Inconsistent { opcode } = fuzz_decode(data) {
        panic!("decoded call {opcode:#x} did not survive re-encoding");
    }
});
