// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Sweep every CNFG byte value through negotiation.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use semihost_codec::{negotiate, Chunk, CodecError, Endianness, FourCc};

const VALID_WIDTHS: [u8; 4] = [1, 2, 4, 8];

fn negotiate_payload(payload: &[u8]) -> Result<semihost_codec::Configuration, CodecError> {
    let chunk = Chunk::new(FourCc::CNFG, payload).expect("chunk");
    negotiate(&chunk)
}

#[test]
fn int_size_sweep_accepts_only_power_of_two_widths() {
    for int_size in 0..=u8::MAX {
        let result = negotiate_payload(&[int_size, 4, 0, 0]);
        if VALID_WIDTHS.contains(&int_size) {
            let config = result.expect("valid int_size");
            assert_eq!(config.int_size(), int_size);
            assert_eq!(config.return_payload_size(), 2 * u32::from(int_size));
        } else {
            assert_eq!(
                result,
                Err(CodecError::InvalidFieldValue {
                    field: "int_size",
                    value: u64::from(int_size),
                }),
                "int_size {int_size}"
            );
        }
    }
}

#[test]
fn ptr_size_sweep_accepts_only_power_of_two_widths() {
    for ptr_size in 0..=u8::MAX {
        let result = negotiate_payload(&[4, ptr_size, 1, 0]);
        if VALID_WIDTHS.contains(&ptr_size) {
            let config = result.expect("valid ptr_size");
            assert_eq!(config.ptr_size(), ptr_size);
            assert_eq!(config.slot_width(), ptr_size.max(4));
        } else {
            assert_eq!(
                result,
                Err(CodecError::InvalidFieldValue {
                    field: "ptr_size",
                    value: u64::from(ptr_size),
                }),
                "ptr_size {ptr_size}"
            );
        }
    }
}

#[test]
fn endianness_sweep_accepts_two_values() {
    for endianness in 0..=u8::MAX {
        let result = negotiate_payload(&[8, 8, endianness, 0]);
        match endianness {
            0 => assert_eq!(result.expect("little").endianness(), Endianness::Little),
            1 => assert_eq!(result.expect("big").endianness(), Endianness::Big),
            other => assert_eq!(
                result,
                Err(CodecError::InvalidFieldValue {
                    field: "endianness",
                    value: u64::from(other),
                })
            ),
        }
    }
}

#[test]
fn reserved_byte_never_affects_acceptance() {
    let baseline = negotiate_payload(&[2, 8, 1, 0]).expect("baseline");
    for reserved in 0..=u8::MAX {
        assert_eq!(negotiate_payload(&[2, 8, 1, reserved]), Ok(baseline));
    }
}

#[test]
fn payload_shorter_than_four_bytes_is_incomplete() {
    let full = [4u8, 4, 0, 0];
    for len in 0..full.len() {
        assert!(matches!(
            negotiate_payload(&full[..len]),
            Err(CodecError::IncompletePayload { chunk, needed: 4, .. }) if chunk == FourCc::CNFG
        ));
    }
    assert!(negotiate_payload(&full).is_ok());
    assert!(negotiate_payload(&[4, 4, 0, 0, 0xEE, 0xEE]).is_ok());
}
