// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define RIFF semihosting wire types and constants shared across codec stages.
// Author: Lukas Bower
#![allow(clippy::module_name_repetitions)]

//! Data model for the RIFF semihosting envelope.

use core::fmt;

use alloc::vec::Vec;

/// Size of the container header: `RIFF`, declared size and form type.
pub const RIFF_HEADER_SIZE: usize = 12;

/// Size of a chunk header: FourCC identifier plus declared size.
pub const CHUNK_HEADER_SIZE: u32 = 8;

/// Smallest declared container size; just enough for the form type.
pub const MIN_CONTAINER_SIZE: u32 = 4;

/// Payload size of a `CNFG` chunk.
pub const CNFG_PAYLOAD_SIZE: u32 = 4;

/// Minimum width of the opcode header at the start of a `CALL` payload.
pub const CALL_HEADER_SIZE: u32 = 4;

/// Payload size of an `ERRO` chunk.
pub const ERRO_PAYLOAD_SIZE: u32 = 4;

/// Four-character code tagging a chunk kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Outer container magic.
    pub const RIFF: Self = Self(*b"RIFF");
    /// Form type of a semihosting container.
    pub const SEMI: Self = Self(*b"SEMI");
    /// Configuration negotiation chunk.
    pub const CNFG: Self = Self(*b"CNFG");
    /// Call invocation chunk.
    pub const CALL: Self = Self(*b"CALL");
    /// Parameter list sub-chunk.
    pub const PARM: Self = Self(*b"PARM");
    /// Opaque data sub-chunk.
    pub const DATA: Self = Self(*b"DATA");
    /// Successful return chunk.
    pub const RETN: Self = Self(*b"RETN");
    /// Error return chunk.
    pub const ERRO: Self = Self(*b"ERRO");

    /// Build a code from its four wire bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Borrow the four wire bytes.
    #[must_use]
    pub const fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Numeric little-endian view of the tag.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            for b in self.0 {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08x}", self.as_u32())
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// Byte order negotiated for payload-level integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Endianness {
    /// Least significant byte first.
    Little = 0,
    /// Most significant byte first.
    Big = 1,
}

impl TryFrom<u8> for Endianness {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Little),
            1 => Ok(Self::Big),
            other => Err(CodecError::InvalidFieldValue {
                field: "endianness",
                value: u64::from(other),
            }),
        }
    }
}

impl From<Endianness> for u8 {
    fn from(value: Endianness) -> Self {
        value as u8
    }
}

impl Endianness {
    /// Read an unsigned integer of `bytes.len()` bytes (at most eight).
    #[must_use]
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        match self {
            Self::Little => bytes.iter().rev().fold(0, fold),
            Self::Big => bytes.iter().fold(0, fold),
        }
    }

    /// Write the low `out.len()` bytes of `value` (at most eight).
    pub fn write_uint(self, value: u64, out: &mut [u8]) {
        let mut rest = value;
        match self {
            Self::Little => {
                for slot in out.iter_mut() {
                    *slot = (rest & 0xFF) as u8;
                    rest >>= 8;
                }
            }
            Self::Big => {
                for slot in out.iter_mut().rev() {
                    *slot = (rest & 0xFF) as u8;
                    rest >>= 8;
                }
            }
        }
    }
}

/// Mask selecting the low `width` bytes of a 64-bit value.
#[must_use]
pub(crate) fn width_mask(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (u32::from(width) * 8)) - 1
    }
}

/// Sign-extend the low `width` bytes of `raw`.
#[must_use]
pub(crate) fn sign_extend(raw: u64, width: u8) -> i64 {
    if width >= 8 {
        return raw as i64;
    }
    let shift = 64 - u32::from(width) * 8;
    ((raw << shift) as i64) >> shift
}

/// Remote execution environment negotiated through a `CNFG` chunk.
///
/// Construction validates every field, so a value of this type always
/// carries widths from `{1, 2, 4, 8}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawConfiguration"))]
pub struct Configuration {
    int_size: u8,
    ptr_size: u8,
    endianness: Endianness,
}

impl Configuration {
    /// Validate and build a configuration.
    pub fn new(int_size: u8, ptr_size: u8, endianness: Endianness) -> Result<Self, CodecError> {
        Ok(Self {
            int_size: checked_width("int_size", int_size)?,
            ptr_size: checked_width("ptr_size", ptr_size)?,
            endianness,
        })
    }

    /// Guest integer width in bytes.
    #[must_use]
    pub fn int_size(&self) -> u8 {
        self.int_size
    }

    /// Guest pointer width in bytes.
    #[must_use]
    pub fn ptr_size(&self) -> u8 {
        self.ptr_size
    }

    /// Byte order of payload integers.
    #[must_use]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Width of one `PARM` slot: wide enough for either a scalar or a pointer.
    #[must_use]
    pub fn slot_width(&self) -> u8 {
        self.int_size.max(self.ptr_size)
    }

    /// Width of the opcode header that opens a `CALL` payload.
    #[must_use]
    pub fn call_header_width(&self) -> u32 {
        CALL_HEADER_SIZE.max(u32::from(self.int_size))
    }

    /// Declared size of a `RETN` payload under this configuration.
    #[must_use]
    pub fn return_payload_size(&self) -> u32 {
        2 * u32::from(self.int_size)
    }

    /// Wire form of the `CNFG` payload; the reserved byte is always zero.
    #[must_use]
    pub fn to_payload(&self) -> [u8; 4] {
        [self.int_size, self.ptr_size, self.endianness.into(), 0]
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawConfiguration {
    int_size: u8,
    ptr_size: u8,
    endianness: Endianness,
}

#[cfg(feature = "serde")]
impl TryFrom<RawConfiguration> for Configuration {
    type Error = CodecError;

    fn try_from(raw: RawConfiguration) -> Result<Self, Self::Error> {
        Self::new(raw.int_size, raw.ptr_size, raw.endianness)
    }
}

fn checked_width(field: &'static str, value: u8) -> Result<u8, CodecError> {
    match value {
        1 | 2 | 4 | 8 => Ok(value),
        other => Err(CodecError::InvalidFieldValue {
            field,
            value: u64::from(other),
        }),
    }
}

/// Fixed-width parameter slot carried by a `PARM` sub-chunk.
///
/// Slots are positional; whether a slot holds a scalar or a guest pointer is
/// decided by the opcode, so the codec keeps only the raw bits and the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter {
    raw: u64,
    width: u8,
}

impl Parameter {
    /// Build a parameter of `width` bytes; bits above the width are dropped.
    #[must_use]
    pub fn new(raw: u64, width: u8) -> Self {
        let width = width.clamp(1, 8);
        Self {
            raw: raw & width_mask(width),
            width,
        }
    }

    /// Build a parameter from a signed value in two's complement.
    #[must_use]
    pub fn from_signed(value: i64, width: u8) -> Self {
        Self::new(value as u64, width)
    }

    /// Raw unsigned bits.
    #[must_use]
    pub fn raw(&self) -> u64 {
        self.raw
    }

    /// Slot width in bytes.
    #[must_use]
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Value reinterpreted as a signed integer of the slot width.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        sign_extend(self.raw, self.width)
    }
}

/// A decoded `CALL` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest<'a> {
    /// Semihosting operation number.
    pub opcode: u32,
    /// Parameter slots in wire order, concatenated across `PARM` sub-chunks.
    pub parameters: Vec<Parameter>,
    /// Payload of the `DATA` sub-chunk, borrowed from the message buffer.
    pub data: Option<&'a [u8]>,
}

impl<'a> CallRequest<'a> {
    /// Build a request with no parameters and no data.
    #[must_use]
    pub fn new(opcode: u32) -> Self {
        Self {
            opcode,
            parameters: Vec::new(),
            data: None,
        }
    }

    /// Look up the opcode in the semihosting operation catalogue.
    #[must_use]
    pub fn operation(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }
}

/// Outcome of a dispatched call, as carried back to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Response {
    /// `RETN`: the call completed with a value and a host errno.
    Return {
        /// Return value, encoded at the negotiated integer width.
        value: i64,
        /// Host errno, encoded at the negotiated integer width.
        errno: i64,
    },
    /// `ERRO`: the envelope itself could not be serviced.
    Error {
        /// Protocol-level error code.
        code: u32,
    },
}

/// Protocol error codes carried by `ERRO` chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProtocolErrorCode {
    /// A chunk was missing or had the wrong identifier.
    InvalidChunk = 0x01,
    /// The container framing was malformed.
    MalformedRiff = 0x02,
    /// A call arrived before configuration negotiation.
    MissingConfiguration = 0x03,
    /// The requested operation is not supported by the host.
    UnsupportedOperation = 0x04,
    /// The call parameters were malformed.
    InvalidParameters = 0x05,
}

impl From<ProtocolErrorCode> for u32 {
    fn from(value: ProtocolErrorCode) -> Self {
        value as u32
    }
}

impl TryFrom<u32> for ProtocolErrorCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::InvalidChunk,
            0x02 => Self::MalformedRiff,
            0x03 => Self::MissingConfiguration,
            0x04 => Self::UnsupportedOperation,
            0x05 => Self::InvalidParameters,
            other => return Err(other),
        })
    }
}

/// An opcode outside the semihosting operation catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised semihosting opcode {0:#x}")]
pub struct UnknownOpcode(pub u32);

/// ARM-compatible semihosting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// `SYS_OPEN`
    Open = 0x01,
    /// `SYS_CLOSE`
    Close = 0x02,
    /// `SYS_WRITEC`
    WriteC = 0x03,
    /// `SYS_WRITE0`
    Write0 = 0x04,
    /// `SYS_WRITE`
    Write = 0x05,
    /// `SYS_READ`
    Read = 0x06,
    /// `SYS_READC`
    ReadC = 0x07,
    /// `SYS_ISERROR`
    IsError = 0x08,
    /// `SYS_ISTTY`
    IsTty = 0x09,
    /// `SYS_SEEK`
    Seek = 0x0A,
    /// `SYS_FLEN`
    Flen = 0x0C,
    /// `SYS_TMPNAM`
    TmpNam = 0x0D,
    /// `SYS_REMOVE`
    Remove = 0x0E,
    /// `SYS_RENAME`
    Rename = 0x0F,
    /// `SYS_CLOCK`
    Clock = 0x10,
    /// `SYS_TIME`
    Time = 0x11,
    /// `SYS_SYSTEM`
    System = 0x12,
    /// `SYS_ERRNO`
    Errno = 0x13,
    /// `SYS_GET_CMDLINE`
    GetCmdline = 0x15,
    /// `SYS_HEAPINFO`
    HeapInfo = 0x16,
    /// `SYS_EXIT`
    Exit = 0x18,
    /// `SYS_EXIT_EXTENDED`
    ExitExtended = 0x20,
    /// `SYS_ELAPSED`
    Elapsed = 0x30,
    /// `SYS_TICKFREQ`
    TickFreq = 0x31,
}

impl TryFrom<u32> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            0x01 => Open,
            0x02 => Close,
            0x03 => WriteC,
            0x04 => Write0,
            0x05 => Write,
            0x06 => Read,
            0x07 => ReadC,
            0x08 => IsError,
            0x09 => IsTty,
            0x0A => Seek,
            0x0C => Flen,
            0x0D => TmpNam,
            0x0E => Remove,
            0x0F => Rename,
            0x10 => Clock,
            0x11 => Time,
            0x12 => System,
            0x13 => Errno,
            0x15 => GetCmdline,
            0x16 => HeapInfo,
            0x18 => Exit,
            0x20 => ExitExtended,
            0x30 => Elapsed,
            0x31 => TickFreq,
            other => return Err(UnknownOpcode(other)),
        })
    }
}

impl From<Opcode> for u32 {
    fn from(value: Opcode) -> Self {
        value as u32
    }
}

impl Opcode {
    /// Conventional `SYS_*` name of the operation.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "SYS_OPEN",
            Self::Close => "SYS_CLOSE",
            Self::WriteC => "SYS_WRITEC",
            Self::Write0 => "SYS_WRITE0",
            Self::Write => "SYS_WRITE",
            Self::Read => "SYS_READ",
            Self::ReadC => "SYS_READC",
            Self::IsError => "SYS_ISERROR",
            Self::IsTty => "SYS_ISTTY",
            Self::Seek => "SYS_SEEK",
            Self::Flen => "SYS_FLEN",
            Self::TmpNam => "SYS_TMPNAM",
            Self::Remove => "SYS_REMOVE",
            Self::Rename => "SYS_RENAME",
            Self::Clock => "SYS_CLOCK",
            Self::Time => "SYS_TIME",
            Self::System => "SYS_SYSTEM",
            Self::Errno => "SYS_ERRNO",
            Self::GetCmdline => "SYS_GET_CMDLINE",
            Self::HeapInfo => "SYS_HEAPINFO",
            Self::Exit => "SYS_EXIT",
            Self::ExitExtended => "SYS_EXIT_EXTENDED",
            Self::Elapsed => "SYS_ELAPSED",
            Self::TickFreq => "SYS_TICKFREQ",
        }
    }
}

/// Upper bounds applied while walking untrusted containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecodeLimits {
    /// Chunks accepted at one container level.
    pub max_chunks: u32,
    /// `CALL` chunks accepted in one message.
    pub max_calls: usize,
    /// Parameter slots accepted in one call.
    pub max_parameters: usize,
}

impl DecodeLimits {
    /// Limits that only the buffer length bounds.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_chunks: u32::MAX,
            max_calls: usize::MAX,
            max_parameters: usize::MAX,
        }
    }
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_chunks: 256,
            max_calls: 16,
            max_parameters: 64,
        }
    }
}

/// Errors produced while decoding or encoding semihosting messages.
///
/// Every error is terminal for the message being processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Not enough bytes for a structure the format requires.
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the structure requires.
        needed: u64,
        /// Bytes actually present.
        available: u64,
    },
    /// Offset plus declared size would wrap the 32-bit offset space.
    #[error("size overflow: {size} bytes at offset {offset}")]
    SizeOverflow {
        /// Offset of the structure inside its region.
        offset: u64,
        /// Declared size that caused the overflow.
        size: u64,
    },
    /// Declared size is a valid number but exceeds the bytes present.
    #[error("declared size {declared} exceeds {available} available bytes")]
    SizeExceedsBuffer {
        /// Size declared on the wire.
        declared: u32,
        /// Bytes actually present.
        available: u64,
    },
    /// A chunk is well framed but too short for its kind.
    #[error("{chunk} payload of {actual} bytes is shorter than {needed}")]
    IncompletePayload {
        /// Kind of the short chunk.
        chunk: FourCc,
        /// Minimum payload length for the kind.
        needed: u32,
        /// Declared payload length.
        actual: u32,
    },
    /// A field holds a value outside its allowed set.
    #[error("invalid {field} value {value}")]
    InvalidFieldValue {
        /// Name of the offending field.
        field: &'static str,
        /// Value found on the wire.
        value: u64,
    },
    /// A `PARM` payload is not a whole number of slots.
    #[error("PARM payload of {length} bytes is not a multiple of slot width {slot_width}")]
    MalformedParameterList {
        /// Declared `PARM` payload length.
        length: u32,
        /// Negotiated slot width.
        slot_width: u8,
    },
    /// A call or return arrived before configuration negotiation.
    #[error("configuration not negotiated")]
    ConfigurationMissing,
    /// The buffer does not start with `RIFF`.
    #[error("bad container magic {found}")]
    BadMagic {
        /// Identifier found in place of `RIFF`.
        found: FourCc,
    },
    /// The container form type is not `SEMI`.
    #[error("bad form type {found}")]
    BadFormType {
        /// Form type found in place of `SEMI`.
        found: FourCc,
    },
    /// A call carries more than one `DATA` sub-chunk.
    #[error("duplicate DATA sub-chunk")]
    DuplicateData,
    /// A configured decode limit was exceeded.
    #[error("{limit} limit of {max} exceeded")]
    LimitExceeded {
        /// Name of the limit.
        limit: &'static str,
        /// Configured maximum.
        max: u64,
    },
}

impl CodecError {
    /// Protocol code a host should place in its `ERRO` reply.
    #[must_use]
    pub fn protocol_code(&self) -> ProtocolErrorCode {
        match self {
            Self::Truncated { .. }
            | Self::SizeOverflow { .. }
            | Self::SizeExceedsBuffer { .. }
            | Self::BadMagic { .. }
            | Self::BadFormType { .. }
            | Self::LimitExceeded { .. } => ProtocolErrorCode::MalformedRiff,
            Self::IncompletePayload { .. } | Self::DuplicateData => {
                ProtocolErrorCode::InvalidChunk
            }
            Self::InvalidFieldValue { .. } | Self::MalformedParameterList { .. } => {
                ProtocolErrorCode::InvalidParameters
            }
            Self::ConfigurationMissing => ProtocolErrorCode::MissingConfiguration,
        }
    }

    /// Whether the error came from size validation in the chunk reader.
    #[must_use]
    pub fn is_size_violation(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::SizeOverflow { .. } | Self::SizeExceedsBuffer { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endianness_reads_and_writes_partial_widths() {
        let mut buf = [0u8; 3];
        Endianness::Big.write_uint(0x0A0B0C, &mut buf);
        assert_eq!(buf, [0x0A, 0x0B, 0x0C]);
        assert_eq!(Endianness::Big.read_uint(&buf), 0x0A0B0C);
        Endianness::Little.write_uint(0x0A0B0C, &mut buf);
        assert_eq!(buf, [0x0C, 0x0B, 0x0A]);
        assert_eq!(Endianness::Little.read_uint(&buf), 0x0A0B0C);
    }

    #[test]
    fn sign_extension_respects_width() {
        assert_eq!(sign_extend(0xFF, 1), -1);
        assert_eq!(sign_extend(0x7F, 1), 127);
        assert_eq!(sign_extend(0xFFFF_FFFE, 4), -2);
        assert_eq!(sign_extend(u64::MAX, 8), -1);
    }

    #[test]
    fn parameter_masks_to_width() {
        let param = Parameter::from_signed(-1, 2);
        assert_eq!(param.raw(), 0xFFFF);
        assert_eq!(param.as_i64(), -1);
        assert_eq!(Parameter::new(0x1_0000_0001, 4).raw(), 1);
    }

    #[test]
    fn fourcc_display_falls_back_to_hex() {
        assert_eq!(alloc::format!("{}", FourCc::CNFG), "CNFG");
        assert_eq!(
            alloc::format!("{}", FourCc::from_bytes([0, 1, 2, 3])),
            "0x03020100"
        );
    }

    #[test]
    fn opcode_catalogue_skips_unused_numbers() {
        assert_eq!(Opcode::try_from(0x13), Ok(Opcode::Errno));
        assert_eq!(Opcode::try_from(0x0B), Err(UnknownOpcode(0x0B)));
        assert_eq!(Opcode::Errno.name(), "SYS_ERRNO");
    }

    #[test]
    fn errors_map_to_protocol_codes() {
        assert_eq!(
            CodecError::ConfigurationMissing.protocol_code(),
            ProtocolErrorCode::MissingConfiguration
        );
        assert_eq!(
            CodecError::MalformedParameterList {
                length: 3,
                slot_width: 4
            }
            .protocol_code(),
            ProtocolErrorCode::InvalidParameters
        );
        assert!(CodecError::SizeOverflow { offset: 8, size: 1 }.is_size_violation());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialized_configuration_is_validated() {
        let bad = serde_json::from_str::<Configuration>(
            r#"{"int_size":255,"ptr_size":4,"endianness":"Little"}"#,
        );
        assert!(bad.is_err());

        let config = Configuration::new(2, 8, Endianness::Big).expect("config");
        let json = serde_json::to_string(&config).expect("serialize");
        let back: Configuration = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_limits_keep_defaults() {
        let limits: DecodeLimits = serde_json::from_str(r#"{"max_parameters":3}"#).expect("limits");
        assert_eq!(limits.max_parameters, 3);
        assert_eq!(limits.max_chunks, DecodeLimits::default().max_chunks);
        assert_eq!(limits.max_calls, DecodeLimits::default().max_calls);
    }
}
