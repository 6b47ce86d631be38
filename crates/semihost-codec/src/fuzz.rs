// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide a fuzz corpus harness for semihosting message decoding.
// Author: Lukas Bower

//! Fuzz corpus harness for semihosting message decoding.

use alloc::vec::Vec;

use crate::{Codec, CodecError};

/// Result of running one corpus entry through the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzOutcome {
    /// The entry decoded and every call re-encoded to an equal request.
    Accepted {
        /// Number of calls decoded.
        calls: usize,
    },
    /// The entry was rejected with a typed error.
    Rejected(CodecError),
    /// A decoded call did not survive re-encoding.
    Inconsistent {
        /// Opcode of the offending call.
        opcode: u32,
    },
}

/// Exercise decoder paths on arbitrary corpus bytes.
pub fn fuzz_decode(bytes: &[u8]) -> FuzzOutcome {
    fuzz_decode_with(&Codec::new(), bytes)
}

/// Exercise decoder paths under the limits of `codec`.
pub fn fuzz_decode_with(codec: &Codec, bytes: &[u8]) -> FuzzOutcome {
    // Both walks share one event iterator, so the request walk below reports
    // any error the reply walk would; the reply walk only has to not panic.
    let _ = codec.decode_reply(bytes);
    let calls = match codec.decode_message(bytes) {
        Ok(calls) => calls,
        Err(err) => return FuzzOutcome::Rejected(err),
    };
    for call in &calls {
        let reencoded: Result<Vec<u8>, CodecError> =
            codec.encode_request(&call.config, &call.request);
        let consistent = reencoded
            .ok()
            .and_then(|bytes| {
                codec
                    .decode_message(&bytes)
                    .ok()
                    .map(|decoded| decoded.len() == 1 && decoded[0] == *call)
            })
            .unwrap_or(false);
        if !consistent {
            return FuzzOutcome::Inconsistent {
                opcode: call.request.opcode,
            };
        }
    }
    FuzzOutcome::Accepted { calls: calls.len() }
}
