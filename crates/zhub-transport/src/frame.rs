//! ZNP frame encoding
//!
//! ```text
//! ┌───────┬─────────┬────────┬────────┬───────────────────┬───────┐
//! │ SOF   │ Length  │ Cmd0   │ Cmd1   │ Payload           │ FCS   │
//! │ 0xFE  │ 1 byte  │ 1 byte │ 1 byte │ 0..=255 bytes     │ 1 byte│
//! └───────┴─────────┴────────┴────────┴───────────────────┴───────┘
//!
//! Cmd0: bits 7-4 command type, bits 3-0 subsystem
//! FCS:  XOR of Length, Cmd0, Cmd1 and every payload byte
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{Result, TransportError};

/// Start-of-frame marker
pub const SOF: u8 = 0xfe;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD: usize = 255;

/// SOF + length + cmd0 + cmd1 + FCS
pub const FRAME_OVERHEAD: usize = 5;

/// ZNP command type (upper nibble of Cmd0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    Poll = 0,
    /// Synchronous request, answered by exactly one SRSP
    Sreq = 2,
    /// Asynchronous request or indication
    Areq = 4,
    /// Synchronous response
    Srsp = 6,
}

impl CommandType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CommandType::Poll),
            2 => Some(CommandType::Sreq),
            4 => Some(CommandType::Areq),
            6 => Some(CommandType::Srsp),
            _ => None,
        }
    }
}

/// ZNP subsystem (lower nibble of Cmd0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subsystem {
    RpcError = 0,
    Sys = 1,
    Mac = 2,
    Nwk = 3,
    Af = 4,
    Zdo = 5,
    Sapi = 6,
    Util = 7,
    Debug = 8,
    App = 9,
}

impl Subsystem {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Subsystem::RpcError),
            1 => Some(Subsystem::Sys),
            2 => Some(Subsystem::Mac),
            3 => Some(Subsystem::Nwk),
            4 => Some(Subsystem::Af),
            5 => Some(Subsystem::Zdo),
            6 => Some(Subsystem::Sapi),
            7 => Some(Subsystem::Util),
            8 => Some(Subsystem::Debug),
            9 => Some(Subsystem::App),
            _ => None,
        }
    }
}

/// One ZNP command or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZnpFrame {
    pub kind: CommandType,
    pub subsystem: Subsystem,
    pub command: u8,
    pub payload: Bytes,
}

/// Correlation key of a frame
pub type FrameKey = (CommandType, Subsystem, u8);

impl ZnpFrame {
    pub fn new(kind: CommandType, subsystem: Subsystem, command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            subsystem,
            command,
            payload: payload.into(),
        }
    }

    pub fn key(&self) -> FrameKey {
        (self.kind, self.subsystem, self.command)
    }

    pub fn cmd0(&self) -> u8 {
        ((self.kind as u8) << 4) | (self.subsystem as u8 & 0x0f)
    }

    /// Encode to wire bytes including SOF and FCS
    pub fn encode(&self) -> Result<Bytes> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(TransportError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + self.payload.len());
        buf.put_u8(SOF);
        buf.put_u8(self.payload.len() as u8);
        buf.put_u8(self.cmd0());
        buf.put_u8(self.command);
        buf.extend_from_slice(&self.payload);
        let fcs = checksum(&buf[1..]);
        buf.put_u8(fcs);

        Ok(buf.freeze())
    }
}

impl fmt::Display for ZnpFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} 0x{:02x} ({} bytes)",
            self.kind,
            self.subsystem,
            self.command,
            self.payload.len()
        )
    }
}

/// XOR of all bytes
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Incremental decoder for a byte stream of ZNP frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the link
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes held back waiting for the rest of a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, if any
    ///
    /// Bytes before a start-of-frame marker are discarded. A frame with a bad
    /// checksum or unknown Cmd0 is consumed and reported as an error so the
    /// caller can log it and keep reading.
    pub fn next_frame(&mut self) -> Option<Result<ZnpFrame>> {
        match self.buf.iter().position(|b| *b == SOF) {
            Some(start) => self.buf.advance(start),
            None => {
                self.buf.clear();
                return None;
            }
        }

        if self.buf.len() < FRAME_OVERHEAD {
            return None;
        }
        let len = self.buf[1] as usize;
        let total = FRAME_OVERHEAD + len;
        if self.buf.len() < total {
            return None;
        }

        let raw = self.buf.split_to(total).freeze();
        let expected = checksum(&raw[1..total - 1]);
        let actual = raw[total - 1];
        if expected != actual {
            return Some(Err(TransportError::Checksum { expected, actual }));
        }

        let cmd0 = raw[2];
        let (Some(kind), Some(subsystem)) = (
            CommandType::from_u8(cmd0 >> 4),
            Subsystem::from_u8(cmd0 & 0x0f),
        ) else {
            return Some(Err(TransportError::Protocol(format!(
                "unknown cmd0 0x{:02x}",
                cmd0
            ))));
        };

        Some(Ok(ZnpFrame {
            kind,
            subsystem,
            command: raw[3],
            payload: raw.slice(4..total - 1),
        }))
    }
}
