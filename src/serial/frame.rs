//! Modbus-RTU framing helpers.
//!
//! Pure byte manipulation: CRC-16, payload embedding/extraction, and the
//! trimming of gateway noise (the line turnaround shows up as leading `0xFF`
//! bytes and zero padding around the actual frame).

use crate::error::{RpcError, RpcResult};

/// Function-code bit set on exception responses.
const EXCEPTION_BIT: u8 = 0x80;

/// Modbus CRC-16 (poly 0xA001, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Build an RTU frame: address, function code, payload, CRC (little-endian).
pub fn embed(slave_addr: u8, function: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(slave_addr);
    frame.push(function);
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Validate an RTU frame and return its payload.
pub fn extract(frame: &[u8], slave_addr: u8, function: u8) -> RpcResult<Vec<u8>> {
    if frame.len() < 4 {
        return Err(RpcError::invalid_response(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let computed = crc16(body);
    if received != computed {
        return Err(RpcError::invalid_response(format!(
            "CRC mismatch: got {received:#06x}, computed {computed:#06x}"
        )));
    }
    if body[0] != slave_addr {
        return Err(RpcError::invalid_response(format!(
            "wrong slave address: {:#04x}",
            body[0]
        )));
    }
    if body[1] == function | EXCEPTION_BIT {
        let code = body.get(2).copied().unwrap_or(0);
        return Err(RpcError::invalid_response(format!(
            "slave reported exception {code:#04x}"
        )));
    }
    if body[1] != function {
        return Err(RpcError::invalid_response(format!(
            "wrong function code: {:#04x}",
            body[1]
        )));
    }
    Ok(body[2..].to_vec())
}

/// Drop the idle-line noise the gateway returns around a frame: leading
/// `0xFF` bytes and trailing zero bytes.
pub fn trim_gateway_noise(data: &[u8]) -> &[u8] {
    let start = data.iter().take_while(|&&b| b == 0xFF).count();
    let trimmed = &data[start..];
    let end = trimmed.iter().rev().take_while(|&&b| b == 0x00).count();
    &trimmed[..trimmed.len() - end]
}
