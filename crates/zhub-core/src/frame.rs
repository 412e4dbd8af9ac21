//! ZCL frame header
//!
//! ```text
//! ┌──────────────┬────────────────────┬─────────┬─────────┬─────────────┐
//! │ Frame ctrl   │ Manufacturer code  │ TSN     │ Command │ Payload     │
//! │ 1 byte       │ 0 or 2 bytes (LE)  │ 1 byte  │ 1 byte  │ rest        │
//! └──────────────┴────────────────────┴─────────┴─────────┴─────────────┘
//!
//! Frame control:
//! ┌────────┬──────────────┬───────────┬─────────────────┬──────────────┐
//! │ 7 6 5  │ 4            │ 3         │ 2               │ 1 0          │
//! │reserved│ no default   │ direction │ manuf. specific │ frame type   │
//! │        │ response     │           │                 │              │
//! └────────┴──────────────┴───────────┴─────────────────┴──────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Whether the command is profile-wide or belongs to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameType {
    #[default]
    Global = 0,
    ClusterSpecific = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    ClientToServer = 0,
    ServerToClient = 1,
}

/// Decoded ZCL header
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ZclHeader {
    pub frame_type: FrameType,
    pub manufacturer_code: Option<u16>,
    pub direction: Direction,
    pub disable_default_response: bool,
    /// Bits 5-7 of the frame control byte, kept for re-encoding
    pub reserved: u8,
    pub transaction_sequence: u8,
    pub command_id: u8,
}

impl ZclHeader {
    pub fn new(frame_type: FrameType, transaction_sequence: u8, command_id: u8) -> Self {
        Self {
            frame_type,
            transaction_sequence,
            command_id,
            ..Default::default()
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_manufacturer(mut self, code: u16) -> Self {
        self.manufacturer_code = Some(code);
        self
    }

    pub fn frame_control(&self) -> u8 {
        let mut byte = self.frame_type as u8;
        if self.manufacturer_code.is_some() {
            byte |= 0x04;
        }
        byte |= (self.direction as u8) << 3;
        if self.disable_default_response {
            byte |= 0x10;
        }
        byte | ((self.reserved & 0x07) << 5)
    }

    /// Encoded header length
    pub fn size(&self) -> usize {
        if self.manufacturer_code.is_some() {
            5
        } else {
            3
        }
    }
}

/// ZCL frame: header plus raw command payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZclFrame {
    pub header: ZclHeader,
    pub payload: Bytes,
}

impl ZclFrame {
    pub fn new(header: ZclHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header.size() + self.payload.len());
        buf.put_u8(self.header.frame_control());
        if let Some(code) = self.header.manufacturer_code {
            buf.put_u16_le(code);
        }
        buf.put_u8(self.header.transaction_sequence);
        buf.put_u8(self.header.command_id);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(Error::BufferTooSmall { needed: 3, have: 0 });
        }
        let control = buf.get_u8();
        let frame_type = match control & 0x03 {
            0 => FrameType::Global,
            1 => FrameType::ClusterSpecific,
            other => return Err(Error::decode(format!("reserved ZCL frame type {}", other))),
        };
        let manufacturer_specific = control & 0x04 != 0;

        let needed = if manufacturer_specific { 4 } else { 2 };
        if buf.remaining() < needed {
            return Err(Error::BufferTooSmall {
                needed: needed + 1,
                have: buf.remaining() + 1,
            });
        }

        let manufacturer_code = manufacturer_specific.then(|| buf.get_u16_le());
        let header = ZclHeader {
            frame_type,
            manufacturer_code,
            direction: if control & 0x08 != 0 {
                Direction::ServerToClient
            } else {
                Direction::ClientToServer
            },
            disable_default_response: control & 0x10 != 0,
            reserved: control >> 5,
            transaction_sequence: buf.get_u8(),
            command_id: buf.get_u8(),
        };

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_frame() {
        // Attribute report from a switch: global, server to client, no default response
        let raw = [0x18, 0x2a, 0x0a, 0x00, 0x00, 0x10, 0x01];
        let frame = ZclFrame::decode(&raw).unwrap();

        assert_eq!(frame.header.frame_type, FrameType::Global);
        assert_eq!(frame.header.direction, Direction::ServerToClient);
        assert!(frame.header.disable_default_response);
        assert_eq!(frame.header.manufacturer_code, None);
        assert_eq!(frame.header.transaction_sequence, 0x2a);
        assert_eq!(frame.header.command_id, 0x0a);
        assert_eq!(&frame.payload[..], &[0x00, 0x00, 0x10, 0x01]);
        assert_eq!(&frame.encode()[..], &raw);
    }

    #[test]
    fn test_manufacturer_specific() {
        let header = ZclHeader::new(FrameType::ClusterSpecific, 7, 0x02).with_manufacturer(0x115f);
        let encoded = ZclFrame::new(header.clone(), Bytes::new()).encode();
        assert_eq!(&encoded[..], &[0x05, 0x5f, 0x11, 0x07, 0x02]);
        assert_eq!(ZclFrame::decode(&encoded).unwrap().header, header);
    }

    #[test]
    fn test_truncated_and_reserved() {
        assert!(ZclFrame::decode(&[]).is_err());
        assert!(ZclFrame::decode(&[0x04, 0x5f, 0x11, 0x07]).is_err());
        assert!(ZclFrame::decode(&[0x02, 0x00, 0x00]).is_err());
        assert!(ZclFrame::decode(&[0x00, 0x01]).is_err());
    }
}
