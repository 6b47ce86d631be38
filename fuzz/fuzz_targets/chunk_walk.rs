// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Walk arbitrary bytes as a flat chunk region and check cursor bounds.
// Author: Lukas Bower

#![no_main]

use libfuzzer_sys::fuzz_target;
use semihost_codec::ChunkReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = ChunkReader::new(data);
    while let Some(Ok(chunk)) = reader.next() {
        let end = chunk.offset() as usize + 8 + chunk.payload().len();
        assert!(end <= data.len());
        assert!(reader.cursor() as usize <= data.len());
    }
});
