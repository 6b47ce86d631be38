// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Walk and emit RIFF chunks with checked offset arithmetic.
// Author: Lukas Bower

//! Bounds-checked RIFF chunk reader and writer.
//!
//! Offsets inside a region are `u32`, matching the width of the size fields on
//! the wire. Every addition that involves a declared size is checked, so a
//! hostile size is rejected in constant time without touching the payload.

use alloc::vec::Vec;

use log::{trace, warn};

use crate::types::{CodecError, FourCc, CHUNK_HEADER_SIZE};

/// One chunk borrowed from its parent region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    id: FourCc,
    offset: u32,
    payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Build a chunk over an existing payload, for callers that frame chunks
    /// themselves. The declared size is the payload length.
    pub fn new(id: FourCc, payload: &'a [u8]) -> Result<Self, CodecError> {
        region_len(payload)?;
        Ok(Self {
            id,
            offset: 0,
            payload,
        })
    }

    /// Chunk identifier.
    #[must_use]
    pub fn id(&self) -> FourCc {
        self.id
    }

    /// Unpadded payload length as declared on the wire.
    #[must_use]
    pub fn declared_size(&self) -> u32 {
        // Bounded by the region length, which `region_len` caps at u32::MAX.
        self.payload.len() as u32
    }

    /// Offset of the chunk header inside its parent region.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Payload bytes, excluding any padding byte.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Read the chunk whose header starts at `cursor` inside `region`.
///
/// Returns the chunk and the offset of the next sibling, past any padding.
pub fn next_chunk(region: &[u8], cursor: u32) -> Result<(Chunk<'_>, u32), CodecError> {
    let len = region_len(region)?;
    let remaining = len.saturating_sub(cursor);
    if remaining < CHUNK_HEADER_SIZE {
        warn!("chunk header truncated at offset {cursor}: {remaining} bytes left");
        return Err(CodecError::Truncated {
            needed: u64::from(CHUNK_HEADER_SIZE),
            available: u64::from(remaining),
        });
    }

    let start = cursor as usize;
    let header = region
        .get(start..start + CHUNK_HEADER_SIZE as usize)
        .ok_or(CodecError::Truncated {
            needed: u64::from(CHUNK_HEADER_SIZE),
            available: u64::from(remaining),
        })?;
    let id = FourCc::from_bytes([header[0], header[1], header[2], header[3]]);
    let declared = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let payload_start = cursor + CHUNK_HEADER_SIZE;
    let payload_end = cursor
        .checked_add(CHUNK_HEADER_SIZE)
        .and_then(|end| end.checked_add(declared))
        .ok_or_else(|| {
            warn!("{id} size {declared:#x} at offset {cursor} wraps the offset space");
            CodecError::SizeOverflow {
                offset: u64::from(cursor),
                size: u64::from(declared),
            }
        })?;
    if payload_end > len {
        warn!("{id} declares {declared} bytes, {} available", len - payload_start);
        return Err(CodecError::SizeExceedsBuffer {
            declared,
            available: u64::from(len - payload_start),
        });
    }

    let mut next = payload_end;
    if declared & 1 == 1 {
        next = payload_end.checked_add(1).ok_or(CodecError::SizeOverflow {
            offset: u64::from(cursor),
            size: u64::from(declared),
        })?;
        if next > len {
            warn!("{id} padding byte missing at offset {payload_end}");
            return Err(CodecError::Truncated {
                needed: 1,
                available: 0,
            });
        }
    }

    let payload = region
        .get(payload_start as usize..payload_end as usize)
        .ok_or(CodecError::SizeExceedsBuffer {
            declared,
            available: u64::from(len - payload_start),
        })?;
    trace!("{id} chunk at offset {cursor}, {declared} bytes");
    Ok((
        Chunk {
            id,
            offset: cursor,
            payload,
        },
        next,
    ))
}

fn region_len(region: &[u8]) -> Result<u32, CodecError> {
    u32::try_from(region.len()).map_err(|_| CodecError::LimitExceeded {
        limit: "region length",
        max: u64::from(u32::MAX),
    })
}

/// Iterator over sibling chunks inside one region.
///
/// The iterator is fused after its first error: a corrupted size invalidates
/// every later offset, so nothing past it is reported.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    region: &'a [u8],
    cursor: u32,
    seen: u32,
    max_chunks: u32,
    done: bool,
}

impl<'a> ChunkReader<'a> {
    /// Walk `region` with no chunk-count bound.
    #[must_use]
    pub fn new(region: &'a [u8]) -> Self {
        Self::with_max_chunks(region, u32::MAX)
    }

    /// Walk `region`, failing once more than `max_chunks` chunks are present.
    #[must_use]
    pub fn with_max_chunks(region: &'a [u8], max_chunks: u32) -> Self {
        Self {
            region,
            cursor: 0,
            seen: 0,
            max_chunks,
            done: false,
        }
    }

    /// Offset of the next chunk header.
    #[must_use]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor as usize >= self.region.len() {
            self.done = true;
            return None;
        }
        if self.seen >= self.max_chunks {
            self.done = true;
            warn!("chunk limit {} reached", self.max_chunks);
            return Some(Err(CodecError::LimitExceeded {
                limit: "chunks per container",
                max: u64::from(self.max_chunks),
            }));
        }
        match next_chunk(self.region, self.cursor) {
            Ok((chunk, next)) => {
                self.cursor = next;
                self.seen += 1;
                Some(Ok(chunk))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl core::iter::FusedIterator for ChunkReader<'_> {}

/// Append-only chunk emitter applying the even-padding rule.
#[derive(Debug, Clone, Default)]
pub struct ChunkWriter {
    buf: Vec<u8>,
}

impl ChunkWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk, padding odd payloads with a zero byte.
    pub fn push(&mut self, id: FourCc, payload: &[u8]) -> Result<&mut Self, CodecError> {
        let declared = u32::try_from(payload.len()).map_err(|_| CodecError::SizeOverflow {
            offset: self.buf.len() as u64,
            size: payload.len() as u64,
        })?;
        self.buf.reserve(padded_len(payload.len()) + CHUNK_HEADER_SIZE as usize);
        self.buf.extend_from_slice(&id.bytes());
        self.buf.extend_from_slice(&declared.to_le_bytes());
        self.buf.extend_from_slice(payload);
        if declared & 1 == 1 {
            self.buf.push(0);
        }
        Ok(self)
    }

    /// Append a chunk whose payload is itself a sequence of chunks.
    pub fn push_nested<F>(&mut self, id: FourCc, header: &[u8], build: F) -> Result<&mut Self, CodecError>
    where
        F: FnOnce(&mut ChunkWriter) -> Result<(), CodecError>,
    {
        let mut inner = ChunkWriter::new();
        inner.buf.extend_from_slice(header);
        build(&mut inner)?;
        self.push(id, &inner.buf)
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the raw chunk sequence.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Wrap the written chunks in a `RIFF` container of the given form type.
    pub fn into_container(self, form_type: FourCc) -> Result<Vec<u8>, CodecError> {
        let size = self
            .buf
            .len()
            .checked_add(4)
            .and_then(|size| u32::try_from(size).ok())
            .ok_or(CodecError::SizeOverflow {
                offset: 4,
                size: self.buf.len() as u64,
            })?;
        let mut out = Vec::with_capacity(self.buf.len() + crate::types::RIFF_HEADER_SIZE);
        out.extend_from_slice(&FourCc::RIFF.bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&form_type.bytes());
        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}

fn padded_len(len: usize) -> usize {
    len + (len & 1)
}
