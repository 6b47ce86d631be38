// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode RETN and ERRO reply chunks.
// Author: Lukas Bower

//! Reply chunks.
//!
//! Encoding is infallible: a [`Configuration`] bounds every field at eight
//! bytes, so a reply chunk never exceeds 24 bytes.

use alloc::vec::Vec;

use log::{debug, warn};

use crate::chunk::Chunk;
use crate::types::{
    sign_extend, width_mask, CodecError, Configuration, FourCc, Response, CHUNK_HEADER_SIZE,
    ERRO_PAYLOAD_SIZE,
};

/// Largest payload any reply chunk carries: two eight-byte integers.
const MAX_REPLY_PAYLOAD: usize = 16;

/// Emit a chunk whose payload is known to be at most [`MAX_REPLY_PAYLOAD`].
pub(crate) fn small_chunk(id: FourCc, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_REPLY_PAYLOAD);
    let mut out = Vec::with_capacity(CHUNK_HEADER_SIZE as usize + payload.len() + 1);
    out.extend_from_slice(&id.bytes());
    // Bounded by MAX_REPLY_PAYLOAD.
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn fits(value: i64, width: u8) -> bool {
    sign_extend(value as u64 & width_mask(width), width) == value
}

/// Encode a `RETN` chunk carrying `value` and `errno` at `int_size` width.
///
/// Values that do not fit are truncated to the low `int_size` bytes.
#[must_use]
pub fn encode_return(value: i64, errno: i64, config: &Configuration) -> Vec<u8> {
    let width = config.int_size();
    if !fits(value, width) || !fits(errno, width) {
        debug!("RETN value={value} errno={errno} truncated to {width} bytes");
    }
    let int_size = usize::from(width);
    let mut payload = [0u8; MAX_REPLY_PAYLOAD];
    let (value_slot, rest) = payload.split_at_mut(int_size);
    config.endianness().write_uint(value as u64, value_slot);
    config.endianness().write_uint(errno as u64, &mut rest[..int_size]);
    small_chunk(FourCc::RETN, &payload[..2 * int_size])
}

/// Encode an `ERRO` chunk. The code is always a little-endian `u32`.
#[must_use]
pub fn encode_error(code: u32) -> Vec<u8> {
    small_chunk(FourCc::ERRO, &code.to_le_bytes())
}

/// Encode either reply variant.
#[must_use]
pub fn encode_response(response: &Response, config: &Configuration) -> Vec<u8> {
    match *response {
        Response::Return { value, errno } => encode_return(value, errno, config),
        Response::Error { code } => encode_error(code),
    }
}

/// Decode a `RETN` chunk, sign-extending both fields from `int_size`.
pub fn decode_return(chunk: &Chunk<'_>, config: &Configuration) -> Result<Response, CodecError> {
    let needed = config.return_payload_size();
    if chunk.declared_size() < needed {
        warn!(
            "RETN payload of {} bytes, {needed} required for int_size={}",
            chunk.declared_size(),
            config.int_size()
        );
        return Err(CodecError::IncompletePayload {
            chunk: FourCc::RETN,
            needed,
            actual: chunk.declared_size(),
        });
    }
    let width = config.int_size();
    let (value, rest) = chunk.payload().split_at(usize::from(width));
    let errno = &rest[..usize::from(width)];
    let endianness = config.endianness();
    Ok(Response::Return {
        value: sign_extend(endianness.read_uint(value), width),
        errno: sign_extend(endianness.read_uint(errno), width),
    })
}

/// Decode an `ERRO` chunk.
pub fn decode_error(chunk: &Chunk<'_>) -> Result<Response, CodecError> {
    match chunk.payload() {
        [a, b, c, d, ..] => Ok(Response::Error {
            code: u32::from_le_bytes([*a, *b, *c, *d]),
        }),
        _ => {
            warn!("ERRO payload of {} bytes", chunk.declared_size());
            Err(CodecError::IncompletePayload {
                chunk: FourCc::ERRO,
                needed: ERRO_PAYLOAD_SIZE,
                actual: chunk.declared_size(),
            })
        }
    }
}
