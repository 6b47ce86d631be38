// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Compose container validation, negotiation, call decoding and reply encoding.
// Author: Lukas Bower

//! Message-level entry points.

use alloc::vec::Vec;

use log::{debug, trace, warn};

use crate::call::{decode_call_with_limits, write_call};
use crate::chunk::{ChunkReader, ChunkWriter};
use crate::config::negotiate;
use crate::response::{
    decode_error, decode_return, encode_error, encode_response, encode_return, small_chunk,
};
use crate::types::{
    CallRequest, CodecError, Configuration, DecodeLimits, FourCc, Response, MIN_CONTAINER_SIZE,
    RIFF_HEADER_SIZE,
};

/// A validated `RIFF`/`SEMI` container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container<'a> {
    declared_size: u32,
    body: &'a [u8],
}

impl<'a> Container<'a> {
    /// Container size as declared in the `RIFF` header, form type included.
    #[must_use]
    pub fn declared_size(&self) -> u32 {
        self.declared_size
    }

    /// Chunk region following the form type.
    #[must_use]
    pub fn body(&self) -> &'a [u8] {
        self.body
    }

    /// Walk the top-level chunks.
    #[must_use]
    pub fn chunks(&self, limits: &DecodeLimits) -> ChunkReader<'a> {
        ChunkReader::with_max_chunks(self.body, limits.max_chunks)
    }
}

/// Validate the container header of `buffer`.
///
/// Bytes past the declared container size are ignored.
pub fn read_container(buffer: &[u8]) -> Result<Container<'_>, CodecError> {
    let truncated = || {
        warn!("container header truncated: {} bytes", buffer.len());
        CodecError::Truncated {
            needed: RIFF_HEADER_SIZE as u64,
            available: buffer.len() as u64,
        }
    };
    let header: &[u8; 8] = buffer
        .get(..8)
        .and_then(|header| header.try_into().ok())
        .ok_or_else(truncated)?;
    let magic = FourCc::from_bytes([header[0], header[1], header[2], header[3]]);
    if magic != FourCc::RIFF {
        warn!("bad container magic {magic}");
        return Err(CodecError::BadMagic { found: magic });
    }
    // Checked before the form type so a hostile size is reported as such.
    let declared_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let available = buffer.len() as u64 - 8;
    if u64::from(declared_size) > available {
        warn!("container declares {declared_size} bytes, {available} available");
        return Err(CodecError::SizeExceedsBuffer {
            declared: declared_size,
            available,
        });
    }
    if declared_size < MIN_CONTAINER_SIZE {
        warn!("container size {declared_size} cannot hold a form type");
        return Err(CodecError::IncompletePayload {
            chunk: FourCc::RIFF,
            needed: MIN_CONTAINER_SIZE,
            actual: declared_size,
        });
    }
    let form = buffer.get(8..RIFF_HEADER_SIZE).ok_or_else(truncated)?;
    let form_type = FourCc::from_bytes([form[0], form[1], form[2], form[3]]);
    if form_type != FourCc::SEMI {
        warn!("bad form type {form_type}");
        return Err(CodecError::BadFormType { found: form_type });
    }
    let end = 8 + declared_size as usize;
    let body = buffer
        .get(RIFF_HEADER_SIZE..end)
        .ok_or(CodecError::SizeExceedsBuffer {
            declared: declared_size,
            available,
        })?;
    trace!("container of {declared_size} bytes");
    Ok(Container {
        declared_size,
        body,
    })
}

/// One step of the per-message state machine, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<'a> {
    /// A `CNFG` chunk was negotiated; later chunks use this configuration.
    Configured(Configuration),
    /// A `CALL` chunk was decoded under the current configuration.
    Call(DecodedCall<'a>),
    /// A `RETN` chunk was decoded under the current configuration.
    Return {
        /// Sign-extended return value.
        value: i64,
        /// Sign-extended host errno.
        errno: i64,
    },
    /// An `ERRO` chunk was decoded.
    Error {
        /// Protocol error code.
        code: u32,
    },
}

/// A decoded call paired with the configuration it was decoded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall<'a> {
    /// Configuration in effect when the call was decoded.
    pub config: Configuration,
    /// The call envelope. `data` borrows from the message buffer.
    pub request: CallRequest<'a>,
}

/// A decoded reply container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Last configuration seen, if the reply carried one.
    pub config: Option<Configuration>,
    /// Responses in wire order.
    pub responses: Vec<Response>,
}

/// Iterator over the events of one message.
///
/// Fused after the first error; a message is never partially recovered.
#[derive(Debug, Clone)]
pub struct MessageDecoder<'a> {
    chunks: ChunkReader<'a>,
    config: Option<Configuration>,
    limits: DecodeLimits,
    calls: usize,
    failed: bool,
}

impl<'a> MessageDecoder<'a> {
    /// Validate the container and prepare to walk it.
    pub fn new(buffer: &'a [u8], limits: DecodeLimits) -> Result<Self, CodecError> {
        let container = read_container(buffer)?;
        Ok(Self {
            chunks: container.chunks(&limits),
            config: None,
            limits,
            calls: 0,
            failed: false,
        })
    }

    /// Configuration currently in effect.
    #[must_use]
    pub fn config(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    fn step(&mut self) -> Option<Result<Event<'a>, CodecError>> {
        loop {
            let chunk = match self.chunks.next()? {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err)),
            };
            let event = match chunk.id() {
                FourCc::CNFG => negotiate(&chunk).map(|config| {
                    if self.config.is_some() {
                        debug!("CNFG at offset {} replaces configuration", chunk.offset());
                    }
                    self.config = Some(config);
                    Event::Configured(config)
                }),
                FourCc::CALL => {
                    if self.calls >= self.limits.max_calls {
                        warn!("message exceeds {} calls", self.limits.max_calls);
                        return Some(Err(CodecError::LimitExceeded {
                            limit: "calls per message",
                            max: self.limits.max_calls as u64,
                        }));
                    }
                    self.calls += 1;
                    let config = self.config;
                    decode_call_with_limits(&chunk, config.as_ref(), &self.limits).and_then(
                        |request| {
                            let config = config.ok_or(CodecError::ConfigurationMissing)?;
                            Ok(Event::Call(DecodedCall { config, request }))
                        },
                    )
                }
                FourCc::RETN => match self.config.as_ref() {
                    Some(config) => decode_return(&chunk, config).map(response_event),
                    None => {
                        warn!("RETN at offset {} before CNFG", chunk.offset());
                        Err(CodecError::ConfigurationMissing)
                    }
                },
                FourCc::ERRO => decode_error(&chunk).map(response_event),
                other => {
                    trace!("skipping unknown top-level {other} chunk");
                    continue;
                }
            };
            return Some(event);
        }
    }
}

fn response_event<'a>(response: Response) -> Event<'a> {
    match response {
        Response::Return { value, errno } => Event::Return { value, errno },
        Response::Error { code } => Event::Error { code },
    }
}

impl<'a> Iterator for MessageDecoder<'a> {
    type Item = Result<Event<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.step();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl core::iter::FusedIterator for MessageDecoder<'_> {}

/// Message codec holding the decode limits applied to untrusted input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    limits: DecodeLimits,
}

impl Codec {
    /// Codec with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with explicit limits.
    #[must_use]
    pub fn with_limits(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    /// Limits applied while decoding.
    #[must_use]
    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Walk `buffer` event by event.
    pub fn events<'a>(&self, buffer: &'a [u8]) -> Result<MessageDecoder<'a>, CodecError> {
        MessageDecoder::new(buffer, self.limits)
    }

    /// Decode every call in a request message.
    pub fn decode_message<'a>(
        &self,
        buffer: &'a [u8],
    ) -> Result<Vec<DecodedCall<'a>>, CodecError> {
        let mut calls = Vec::new();
        for event in self.events(buffer)? {
            if let Event::Call(call) = event? {
                calls.push(call);
            }
        }
        debug!("decoded message with {} calls", calls.len());
        Ok(calls)
    }

    /// Decode a reply message produced by [`Codec::encode_reply`].
    pub fn decode_reply(&self, buffer: &[u8]) -> Result<Reply, CodecError> {
        let mut reply = Reply {
            config: None,
            responses: Vec::new(),
        };
        for event in self.events(buffer)? {
            match event? {
                Event::Configured(config) => reply.config = Some(config),
                Event::Return { value, errno } => {
                    reply.responses.push(Response::Return { value, errno });
                }
                Event::Error { code } => reply.responses.push(Response::Error { code }),
                Event::Call(call) => {
                    trace!("ignoring CALL {:#x} in reply", call.request.opcode);
                }
            }
        }
        Ok(reply)
    }

    /// Encode a request container: `CNFG` followed by one `CALL`.
    pub fn encode_request(
        &self,
        config: &Configuration,
        request: &CallRequest<'_>,
    ) -> Result<Vec<u8>, CodecError> {
        let mut writer = ChunkWriter::new();
        writer.push(FourCc::CNFG, &config.to_payload())?;
        write_call(&mut writer, config, request)?;
        writer.into_container(FourCc::SEMI)
    }

    /// Encode a reply container echoing `config` ahead of the response chunk.
    #[must_use]
    pub fn encode_reply(&self, config: &Configuration, response: &Response) -> Vec<u8> {
        let mut body = small_chunk(FourCc::CNFG, &config.to_payload());
        body.extend_from_slice(&encode_response(response, config));
        let mut out = Vec::with_capacity(RIFF_HEADER_SIZE + body.len());
        out.extend_from_slice(&FourCc::RIFF.bytes());
        // At most 40 bytes: a CNFG chunk and one reply chunk.
        out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
        out.extend_from_slice(&FourCc::SEMI.bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Encode a bare response chunk.
    #[must_use]
    pub fn encode_response(&self, response: &Response, config: &Configuration) -> Vec<u8> {
        encode_response(response, config)
    }

    /// Encode a bare `RETN` chunk.
    #[must_use]
    pub fn encode_return(&self, value: i64, errno: i64, config: &Configuration) -> Vec<u8> {
        encode_return(value, errno, config)
    }

    /// Encode a bare `ERRO` chunk.
    #[must_use]
    pub fn encode_error(&self, code: u32) -> Vec<u8> {
        encode_error(code)
    }
}

/// Decode every call in a request message using default limits.
pub fn decode_message(buffer: &[u8]) -> Result<Vec<DecodedCall<'_>>, CodecError> {
    Codec::new().decode_message(buffer)
}

/// Decode a reply message using default limits.
pub fn decode_reply(buffer: &[u8]) -> Result<Reply, CodecError> {
    Codec::new().decode_reply(buffer)
}

/// Encode a request container using the default codec.
pub fn encode_request(
    config: &Configuration,
    request: &CallRequest<'_>,
) -> Result<Vec<u8>, CodecError> {
    Codec::new().encode_request(config, request)
}

/// Encode a reply container using the default codec.
#[must_use]
pub fn encode_reply(config: &Configuration, response: &Response) -> Vec<u8> {
    Codec::new().encode_reply(config, response)
}
