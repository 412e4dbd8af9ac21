//! Application Framework payloads and the address lookup request
//!
//! Only the commands the gateway needs to exchange ZCL traffic are covered:
//! endpoint registration, incoming messages, outgoing data requests, and
//! resolving a device's IEEE address from its network address.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// AF_REGISTER (SREQ)
pub const AF_REGISTER: u8 = 0x00;

/// AF_DATA_REQUEST (SREQ)
pub const AF_DATA_REQUEST: u8 = 0x01;

/// AF_INCOMING_MSG (AREQ)
pub const AF_INCOMING_MSG: u8 = 0x81;

/// UTIL_ADDRMGR_NWK_ADDR_LOOKUP (SREQ)
pub const UTIL_ADDRMGR_NWK_ADDR_LOOKUP: u8 = 0x41;

/// Default hop limit for data requests
pub const DEFAULT_RADIUS: u8 = 30;

/// Home Automation profile
pub const HA_PROFILE: u16 = 0x0104;

/// AF_REGISTER status when the endpoint is already registered
pub const STATUS_DUPLICATE_ENTRY: u8 = 0xb8;

/// Z-Stack accepts at most this many clusters per direction
pub const MAX_REGISTERED_CLUSTERS: usize = 16;

/// Some firmware revisions append up to this many bytes after the data field
const MAX_TRAILING_BYTES: usize = 3;

fn short(payload: &[u8], needed: usize, what: &str) -> TransportError {
    TransportError::Protocol(format!(
        "{} too short: need {} bytes, have {}",
        what,
        needed,
        payload.len()
    ))
}

/// Message received by a registered endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMsg {
    pub group_id: u16,
    pub cluster_id: u16,
    pub src_addr: u16,
    pub src_endpoint: u8,
    pub dst_endpoint: u8,
    pub was_broadcast: bool,
    pub link_quality: u8,
    pub security_use: bool,
    pub timestamp: u32,
    pub trans_seq: u8,
    pub data: Bytes,
}

impl IncomingMsg {
    const HEADER_SIZE: usize = 17;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::HEADER_SIZE {
            return Err(short(payload, Self::HEADER_SIZE, "AF_INCOMING_MSG"));
        }
        let mut buf = payload;
        let group_id = buf.get_u16_le();
        let cluster_id = buf.get_u16_le();
        let src_addr = buf.get_u16_le();
        let src_endpoint = buf.get_u8();
        let dst_endpoint = buf.get_u8();
        let was_broadcast = buf.get_u8() != 0;
        let link_quality = buf.get_u8();
        let security_use = buf.get_u8() != 0;
        let timestamp = buf.get_u32_le();
        let trans_seq = buf.get_u8();
        let len = buf.get_u8() as usize;

        if buf.remaining() < len {
            return Err(short(payload, Self::HEADER_SIZE + len, "AF_INCOMING_MSG"));
        }
        let data = Bytes::copy_from_slice(&buf[..len]);
        let trailing = buf.remaining() - len;
        if trailing > MAX_TRAILING_BYTES {
            return Err(TransportError::Protocol(format!(
                "AF_INCOMING_MSG has {} unexpected trailing bytes",
                trailing
            )));
        }

        Ok(Self {
            group_id,
            cluster_id,
            src_addr,
            src_endpoint,
            dst_endpoint,
            was_broadcast,
            link_quality,
            security_use,
            timestamp,
            trans_seq,
            data,
        })
    }
}

/// Outgoing message to a device endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub dst_addr: u16,
    pub dst_endpoint: u8,
    pub src_endpoint: u8,
    pub cluster_id: u16,
    pub trans_id: u8,
    pub options: u8,
    pub radius: u8,
    pub data: Bytes,
}

impl DataRequest {
    pub fn encode(&self) -> Result<Bytes> {
        if self.data.len() > u8::MAX as usize {
            return Err(TransportError::PayloadTooLarge(self.data.len()));
        }
        let mut buf = BytesMut::with_capacity(10 + self.data.len());
        buf.put_u16_le(self.dst_addr);
        buf.put_u8(self.dst_endpoint);
        buf.put_u8(self.src_endpoint);
        buf.put_u16_le(self.cluster_id);
        buf.put_u8(self.trans_id);
        buf.put_u8(self.options);
        buf.put_u8(self.radius);
        buf.put_u8(self.data.len() as u8);
        buf.extend_from_slice(&self.data);
        Ok(buf.freeze())
    }
}

/// Endpoint registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfRegister {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub latency: u8,
    pub input_clusters: Vec<u16>,
    pub output_clusters: Vec<u16>,
}

impl AfRegister {
    pub fn encode(&self) -> Result<Bytes> {
        for clusters in [&self.input_clusters, &self.output_clusters] {
            if clusters.len() > MAX_REGISTERED_CLUSTERS {
                return Err(TransportError::Protocol(format!(
                    "AF_REGISTER takes at most {} clusters per direction, got {}",
                    MAX_REGISTERED_CLUSTERS,
                    clusters.len()
                )));
            }
        }
        let mut buf = BytesMut::new();
        buf.put_u8(self.endpoint);
        buf.put_u16_le(self.profile_id);
        buf.put_u16_le(self.device_id);
        buf.put_u8(self.device_version);
        buf.put_u8(self.latency);
        for clusters in [&self.input_clusters, &self.output_clusters] {
            buf.put_u8(clusters.len() as u8);
            for cluster in clusters {
                buf.put_u16_le(*cluster);
            }
        }
        Ok(buf.freeze())
    }
}

/// Interpret a one-byte status SRSP
pub fn check_status(payload: &[u8], what: &str) -> Result<()> {
    match payload.first() {
        Some(0) => Ok(()),
        Some(status) => Err(TransportError::Protocol(format!(
            "{} failed with status 0x{:02x}",
            what, status
        ))),
        None => Err(short(payload, 1, what)),
    }
}

/// IEEE address from an ADDRMGR_NWK_ADDR_LOOKUP response
pub fn decode_ieee(payload: &[u8]) -> Result<u64> {
    if payload.len() < 8 {
        return Err(short(payload, 8, "ADDRMGR_NWK_ADDR_LOOKUP"));
    }
    let mut buf = payload;
    Ok(buf.get_u64_le())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming_bytes(data: &[u8], trailing: usize) -> Vec<u8> {
        let mut raw = vec![
            0x00, 0x00, // group
            0x06, 0x00, // cluster
            0x4f, 0x7a, // source
            0x01, 0x01, // endpoints
            0x00, 0x6e, 0x00, // broadcast, LQI, security
            0x10, 0x20, 0x30, 0x00, // timestamp
            0x05, // sequence
        ];
        raw.push(data.len() as u8);
        raw.extend_from_slice(data);
        raw.extend(std::iter::repeat(0xaa).take(trailing));
        raw
    }

    #[test]
    fn test_incoming_msg() {
        let msg = IncomingMsg::decode(&incoming_bytes(&[0x18, 0x01, 0x0a], 0)).unwrap();
        assert_eq!(msg.cluster_id, 0x0006);
        assert_eq!(msg.src_addr, 0x7a4f);
        assert_eq!(msg.link_quality, 0x6e);
        assert_eq!(msg.timestamp, 0x00302010);
        assert_eq!(msg.trans_seq, 5);
        assert_eq!(&msg.data[..], &[0x18, 0x01, 0x0a]);
    }

    #[test]
    fn test_incoming_msg_trailing_bytes() {
        assert!(IncomingMsg::decode(&incoming_bytes(&[0x01], 3)).is_ok());
        assert!(IncomingMsg::decode(&incoming_bytes(&[0x01], 4)).is_err());
        let mut truncated = incoming_bytes(&[0x01, 0x02], 0);
        truncated.pop();
        assert!(IncomingMsg::decode(&truncated).is_err());
    }

    #[test]
    fn test_data_request_layout() {
        let req = DataRequest {
            dst_addr: 0x7a4f,
            dst_endpoint: 1,
            src_endpoint: 1,
            cluster_id: 0x0006,
            trans_id: 9,
            options: 0,
            radius: DEFAULT_RADIUS,
            data: Bytes::from_static(&[0x01, 0x00, 0x02]),
        };
        assert_eq!(
            &req.encode().unwrap()[..],
            &[0x4f, 0x7a, 0x01, 0x01, 0x06, 0x00, 0x09, 0x00, 0x1e, 0x03, 0x01, 0x00, 0x02]
        );
    }

    #[test]
    fn test_register_layout() {
        let register = AfRegister {
            endpoint: 1,
            profile_id: HA_PROFILE,
            device_id: 0x0005,
            device_version: 0,
            latency: 0,
            input_clusters: vec![0x0000, 0x0006],
            output_clusters: vec![0x0006],
        };
        assert_eq!(
            &register.encode().unwrap()[..],
            &[0x01, 0x04, 0x01, 0x05, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x06, 0x00, 0x01, 0x06, 0x00]
        );

        let too_many = AfRegister {
            input_clusters: (0..17).collect(),
            ..register
        };
        assert!(too_many.encode().is_err());
    }

    #[test]
    fn test_status_and_ieee() {
        assert!(check_status(&[0x00], "AF_DATA_REQUEST").is_ok());
        assert!(check_status(&[0xc2], "AF_DATA_REQUEST").is_err());
        assert_eq!(
            decode_ieee(&[0x19, 0xf5, 0x83, 0x01, 0x00, 0x8d, 0x15, 0x00]).unwrap(),
            0x00158d000183f519
        );
    }
}
