// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Negotiate the remote integer width, pointer width and byte order.
// Author: Lukas Bower

//! `CNFG` chunk negotiation.
//!
//! Widths are checked here rather than at encode time: once a
//! [`Configuration`] exists, every field the encoder writes is at most eight
//! bytes wide.

use log::{debug, warn};

use crate::chunk::Chunk;
use crate::types::{CodecError, Configuration, Endianness, FourCc, CNFG_PAYLOAD_SIZE};

/// Validate a `CNFG` chunk and produce the configuration it describes.
///
/// The fourth payload byte is reserved and ignored; bytes past the fourth
/// are ignored as well.
pub fn negotiate(chunk: &Chunk<'_>) -> Result<Configuration, CodecError> {
    if chunk.id() != FourCc::CNFG {
        warn!("negotiate called on {} chunk", chunk.id());
        return Err(CodecError::InvalidFieldValue {
            field: "chunk id",
            value: u64::from(chunk.id().as_u32()),
        });
    }
    let payload = chunk.payload();
    let [int_size, ptr_size, endianness, _reserved] = match payload {
        [a, b, c, d, ..] => [*a, *b, *c, *d],
        _ => {
            warn!("CNFG payload too short: {} bytes", payload.len());
            return Err(CodecError::IncompletePayload {
                chunk: FourCc::CNFG,
                needed: CNFG_PAYLOAD_SIZE,
                actual: chunk.declared_size(),
            });
        }
    };

    let endianness = Endianness::try_from(endianness).inspect_err(|_| {
        warn!("CNFG: invalid endianness {endianness}");
    })?;
    let config = Configuration::new(int_size, ptr_size, endianness).inspect_err(|_| {
        warn!("CNFG: invalid int_size={int_size} or ptr_size={ptr_size}");
    })?;
    debug!(
        "negotiated int_size={} ptr_size={} endianness={:?}",
        config.int_size(),
        config.ptr_size(),
        config.endianness()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnfg(payload: &[u8]) -> Result<Configuration, CodecError> {
        negotiate(&Chunk::new(FourCc::CNFG, payload).expect("chunk"))
    }

    #[test]
    fn accepts_valid_configuration() {
        let config = cnfg(&[2, 4, 1, 0]).expect("config");
        assert_eq!(config.int_size(), 2);
        assert_eq!(config.ptr_size(), 4);
        assert_eq!(config.endianness(), Endianness::Big);
        assert_eq!(config.slot_width(), 4);
    }

    #[test]
    fn short_payload_is_incomplete() {
        for len in 0..4 {
            let payload = [4u8, 4, 0, 0];
            assert_eq!(
                cnfg(&payload[..len]),
                Err(CodecError::IncompletePayload {
                    chunk: FourCc::CNFG,
                    needed: 4,
                    actual: len as u32,
                })
            );
        }
    }

    #[test]
    fn reserved_byte_is_ignored() {
        assert_eq!(cnfg(&[4, 4, 0, 0xAA]), cnfg(&[4, 4, 0, 0]));
    }

    #[test]
    fn rejects_huge_int_size() {
        assert_eq!(
            cnfg(&[255, 4, 0, 0]),
            Err(CodecError::InvalidFieldValue {
                field: "int_size",
                value: 255
            })
        );
    }

    #[test]
    fn rejects_zero_ptr_size() {
        assert_eq!(
            cnfg(&[4, 0, 0, 0]),
            Err(CodecError::InvalidFieldValue {
                field: "ptr_size",
                value: 0
            })
        );
    }

    #[test]
    fn rejects_unknown_endianness() {
        assert_eq!(
            cnfg(&[4, 4, 2, 0]),
            Err(CodecError::InvalidFieldValue {
                field: "endianness",
                value: 2
            })
        );
    }

    #[test]
    fn rejects_foreign_chunk() {
        let chunk = Chunk::new(FourCc::CALL, &[4, 4, 0, 0]).expect("chunk");
        assert!(matches!(
            negotiate(&chunk),
            Err(CodecError::InvalidFieldValue { field: "chunk id", .. })
        ));
    }
}
