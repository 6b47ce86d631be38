// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide a bounds-checked RIFF codec for semihosting call envelopes.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![no_std]

//! RIFF-framed semihosting codec.
//!
//! A message is a `RIFF` container of form type `SEMI` holding a `CNFG`
//! chunk that negotiates the target's integer width, pointer width and byte
//! order, followed by `CALL` chunks (requests) or `RETN`/`ERRO` chunks
//! (replies). Every size field is untrusted; offsets are computed with checked
//! `u32` arithmetic and no allocation is sized by a declared length.

extern crate alloc;

#[cfg(test)]
extern crate std;

mod call;
mod chunk;
mod codec;
mod config;
mod fuzz;
mod response;
mod types;

pub use call::{decode_call, decode_call_with_limits, encode_call};
pub use chunk::{next_chunk, Chunk, ChunkReader, ChunkWriter};
pub use codec::{
    decode_message, decode_reply, encode_reply, encode_request, read_container, Codec, Container,
    DecodedCall, Event, MessageDecoder, Reply,
};
pub use config::negotiate;
pub use fuzz::{fuzz_decode, fuzz_decode_with, FuzzOutcome};
pub use response::{decode_error, decode_return, encode_error, encode_response, encode_return};
pub use types::*;
