//! PTP container framing.
//!
//! Every bulk exchange is a container: a 12-byte header (u32 length, u16
//! kind, u16 code, u32 transaction id, all little-endian) followed by a
//! payload of u32 parameters (command/response/event) or raw data bytes.

use crate::{PtpError, Result};

/// Container header size in bytes.
pub const CONTAINER_HEADER: usize = 12;

/// Maximum parameters in a command/response container.
pub const MAX_PARAMS: usize = 5;

/// PTP container kind, wire values per the PTP specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl ContainerKind {
    fn from_wire(value: u16) -> Option<ContainerKind> {
        match value {
            1 => Some(ContainerKind::Command),
            2 => Some(ContainerKind::Data),
            3 => Some(ContainerKind::Response),
            4 => Some(ContainerKind::Event),
            _ => None,
        }
    }
}

/// A parsed PTP container.
#[derive(Debug, Clone)]
pub struct Container {
    pub kind: ContainerKind,
    pub code: u16,
    pub transaction_id: u32,
    pub payload: Vec<u8>,
}

impl Container {
    /// Payload interpreted as little-endian u32 parameters.
    pub fn params(&self) -> Vec<u32> {
        parse_params(&self.payload)
    }
}

/// Build a command/response/event container with u32 parameters.
pub fn build_container(kind: ContainerKind, code: u16, transaction_id: u32, params: &[u32]) -> Vec<u8> {
    debug_assert!(params.len() <= MAX_PARAMS);
    let length = CONTAINER_HEADER + 4 * params.len();
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&(length as u32).to_le_bytes());
    buf.extend_from_slice(&(kind as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
    for param in params {
        buf.extend_from_slice(&param.to_le_bytes());
    }
    buf
}

/// Build a data container carrying a raw byte payload.
pub fn build_data_container(code: u16, transaction_id: u32, data: &[u8]) -> Vec<u8> {
    let length = CONTAINER_HEADER + data.len();
    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&(length as u32).to_le_bytes());
    buf.extend_from_slice(&(ContainerKind::Data as u16).to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Total container length announced by a (possibly partial) buffer.
pub fn announced_length(buf: &[u8]) -> Option<usize> {
    if buf.len() < 4 {
        return None;
    }
    Some(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize)
}

/// Parse one complete container from a buffer.
pub fn parse_container(buf: &[u8]) -> Result<Container> {
    if buf.len() < CONTAINER_HEADER {
        return Err(PtpError::Transport(format!(
            "short container: {} bytes",
            buf.len()
        )));
    }
    let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if length < CONTAINER_HEADER || length > buf.len() {
        return Err(PtpError::Transport(format!(
            "bad container length {} in {} bytes",
            length,
            buf.len()
        )));
    }
    let kind = u16::from_le_bytes([buf[4], buf[5]]);
    let kind = ContainerKind::from_wire(kind)
        .ok_or_else(|| PtpError::Transport(format!("unknown container kind {}", kind)))?;
    let code = u16::from_le_bytes([buf[6], buf[7]]);
    let transaction_id = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Ok(Container {
        kind,
        code,
        transaction_id,
        payload: buf[CONTAINER_HEADER..length].to_vec(),
    })
}

/// Decode a payload of little-endian u32 parameters, ignoring a ragged tail.
pub fn parse_params(payload: &[u8]) -> Vec<u32> {
    payload
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Encode a PTP string: u8 character count (terminator included), then
/// UTF-16LE code units, then a null terminator. An empty string is a single
/// zero byte.
pub fn encode_string(s: &str) -> Vec<u8> {
    if s.is_empty() {
        return vec![0];
    }
    let units: Vec<u16> = s.encode_utf16().collect();
    let mut buf = Vec::with_capacity(1 + 2 * (units.len() + 1));
    buf.push((units.len() + 1) as u8);
    for unit in units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf
}

/// Decode a PTP string from a payload slice.
pub fn decode_string(data: &[u8]) -> String {
    let Some(&count) = data.first() else {
        return String::new();
    };
    let units: Vec<u16> = data[1..]
        .chunks_exact(2)
        .take(count as usize)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::op;

    #[test]
    fn test_build_command_container() {
        let buf = build_container(ContainerKind::Command, op::OPEN_SESSION, 0, &[1]);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..4], &16u32.to_le_bytes());
        assert_eq!(&buf[4..6], &1u16.to_le_bytes());
        assert_eq!(&buf[6..8], &op::OPEN_SESSION.to_le_bytes());
        assert_eq!(&buf[12..16], &1u32.to_le_bytes());
    }

    #[test]
    fn test_parse_roundtrip() {
        let buf = build_container(ContainerKind::Response, 0x2001, 42, &[7, 9]);
        let container = parse_container(&buf).unwrap();
        assert_eq!(container.kind, ContainerKind::Response);
        assert_eq!(container.code, 0x2001);
        assert_eq!(container.transaction_id, 42);
        assert_eq!(container.params(), vec![7, 9]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_container(&[1, 2, 3]).is_err());
        // Announced length larger than the buffer.
        let mut buf = build_container(ContainerKind::Event, 0x4002, 1, &[]);
        buf[0] = 0xFF;
        assert!(parse_container(&buf).is_err());
        // Unknown kind.
        let mut buf = build_container(ContainerKind::Command, 0x1001, 1, &[]);
        buf[4] = 9;
        assert!(parse_container(&buf).is_err());
    }

    #[test]
    fn test_data_container_payload() {
        let buf = build_data_container(op::SET_DEVICE_PROP_VALUE, 3, b"abc");
        let container = parse_container(&buf).unwrap();
        assert_eq!(container.kind, ContainerKind::Data);
        assert_eq!(container.payload, b"abc");
    }

    #[test]
    fn test_string_roundtrip() {
        let encoded = encode_string("20260825T120000");
        assert_eq!(encoded[0] as usize, "20260825T120000".len() + 1);
        assert_eq!(decode_string(&encoded), "20260825T120000");
        assert_eq!(encode_string(""), vec![0]);
        assert_eq!(decode_string(&[0]), "");
    }
}
