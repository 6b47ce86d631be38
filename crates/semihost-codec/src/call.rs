// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode CALL envelopes and encode them for the target side.
// Author: Lukas Bower

//! `CALL` chunk decoding and encoding.
//!
//! A call payload is an opcode header followed by a nested chunk region. The
//! region is walked with [`ChunkReader`], so all size validation for `PARM`
//! and `DATA` lives in one place. `PARM` and `DATA` payloads are leaves and
//! are never walked, which caps nesting at container, call, sub-chunk.

use alloc::vec::Vec;

use log::{debug, trace, warn};

use crate::chunk::{Chunk, ChunkReader, ChunkWriter};
use crate::types::{
    width_mask, CallRequest, CodecError, Configuration, DecodeLimits, FourCc, Parameter,
};

/// Decode a `CALL` chunk using default limits.
pub fn decode_call<'a>(
    chunk: &Chunk<'a>,
    config: Option<&Configuration>,
) -> Result<CallRequest<'a>, CodecError> {
    decode_call_with_limits(chunk, config, &DecodeLimits::default())
}

/// Decode a `CALL` chunk, bounding sub-chunk and parameter counts.
pub fn decode_call_with_limits<'a>(
    chunk: &Chunk<'a>,
    config: Option<&Configuration>,
    limits: &DecodeLimits,
) -> Result<CallRequest<'a>, CodecError> {
    let config = config.ok_or_else(|| {
        warn!("CALL at offset {} before CNFG", chunk.offset());
        CodecError::ConfigurationMissing
    })?;
    if chunk.id() != FourCc::CALL {
        return Err(CodecError::InvalidFieldValue {
            field: "chunk id",
            value: u64::from(chunk.id().as_u32()),
        });
    }

    let payload = chunk.payload();
    let header_width = config.call_header_width();
    if chunk.declared_size() < header_width {
        warn!(
            "CALL payload of {} bytes cannot hold a {header_width}-byte opcode header",
            chunk.declared_size()
        );
        return Err(CodecError::IncompletePayload {
            chunk: FourCc::CALL,
            needed: header_width,
            actual: chunk.declared_size(),
        });
    }
    let (header, region) = payload.split_at(header_width as usize);
    let raw_opcode = config
        .endianness()
        .read_uint(&header[..usize::from(config.int_size())]);
    let opcode = u32::try_from(raw_opcode).map_err(|_| {
        warn!("CALL opcode {raw_opcode:#x} exceeds 32 bits");
        CodecError::InvalidFieldValue {
            field: "opcode",
            value: raw_opcode,
        }
    })?;

    let mut request = CallRequest::new(opcode);
    for sub in ChunkReader::with_max_chunks(region, limits.max_chunks) {
        let sub = sub?;
        match sub.id() {
            FourCc::PARM => read_parameters(&sub, config, limits, &mut request.parameters)?,
            FourCc::DATA => {
                if request.data.is_some() {
                    warn!("CALL {opcode:#x} carries a second DATA sub-chunk");
                    return Err(CodecError::DuplicateData);
                }
                request.data = Some(sub.payload());
            }
            other => trace!("skipping unknown {other} sub-chunk in CALL {opcode:#x}"),
        }
    }

    debug!(
        "decoded CALL {opcode:#x}: {} parameters, {} data bytes",
        request.parameters.len(),
        request.data.map_or(0, <[u8]>::len)
    );
    Ok(request)
}

fn read_parameters(
    chunk: &Chunk<'_>,
    config: &Configuration,
    limits: &DecodeLimits,
    out: &mut Vec<Parameter>,
) -> Result<(), CodecError> {
    let slot_width = config.slot_width();
    let payload = chunk.payload();
    if payload.len() % usize::from(slot_width) != 0 {
        warn!(
            "PARM payload of {} bytes is not a multiple of {slot_width}",
            payload.len()
        );
        return Err(CodecError::MalformedParameterList {
            length: chunk.declared_size(),
            slot_width,
        });
    }
    let slots = payload.len() / usize::from(slot_width);
    if out.len().saturating_add(slots) > limits.max_parameters {
        warn!("CALL exceeds {} parameters", limits.max_parameters);
        return Err(CodecError::LimitExceeded {
            limit: "parameters per call",
            max: limits.max_parameters as u64,
        });
    }
    out.reserve(slots);
    for slot in payload.chunks_exact(usize::from(slot_width)) {
        let raw = config.endianness().read_uint(slot);
        out.push(Parameter::new(raw, slot_width));
    }
    Ok(())
}

/// Encode the `CALL` chunk for `request` under `config`.
///
/// All parameters go into a single `PARM` sub-chunk, followed by `DATA` when
/// present.
pub fn encode_call(
    config: &Configuration,
    request: &CallRequest<'_>,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = ChunkWriter::new();
    write_call(&mut writer, config, request)?;
    Ok(writer.into_bytes())
}

pub(crate) fn write_call(
    writer: &mut ChunkWriter,
    config: &Configuration,
    request: &CallRequest<'_>,
) -> Result<(), CodecError> {
    let int_size = usize::from(config.int_size());
    if u64::from(request.opcode) > width_mask(config.int_size()) {
        return Err(CodecError::InvalidFieldValue {
            field: "opcode",
            value: u64::from(request.opcode),
        });
    }
    let mut header = [0u8; 8];
    let header = &mut header[..config.call_header_width() as usize];
    config
        .endianness()
        .write_uint(u64::from(request.opcode), &mut header[..int_size]);

    let slot_width = config.slot_width();
    let mut slots = Vec::with_capacity(request.parameters.len() * usize::from(slot_width));
    for param in &request.parameters {
        if param.raw() > width_mask(slot_width) {
            return Err(CodecError::InvalidFieldValue {
                field: "parameter",
                value: param.raw(),
            });
        }
        let start = slots.len();
        slots.resize(start + usize::from(slot_width), 0);
        config.endianness().write_uint(param.raw(), &mut slots[start..]);
    }

    writer.push_nested(FourCc::CALL, header, |inner| {
        if !slots.is_empty() {
            inner.push(FourCc::PARM, &slots)?;
        }
        if let Some(data) = request.data {
            inner.push(FourCc::DATA, data)?;
        }
        Ok(())
    })?;
    Ok(())
}
