//! Length-prefixed big-endian integer codec shared by the binary formats.

use crate::{StateError, StateResult};
use num_bigint::BigUint;

/// Append a 2-byte length prefix followed by the minimal big-endian bytes.
pub fn write_biguint(buf: &mut Vec<u8>, value: &BigUint) {
    let bytes = value.to_bytes_be();
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(&bytes);
}

/// Read a length-prefixed big-endian integer, advancing `offset`.
pub fn read_biguint(bytes: &[u8], offset: &mut usize) -> StateResult<BigUint> {
    if *offset + 2 > bytes.len() {
        return Err(StateError::Serialization(
            "Truncated integer length".to_string(),
        ));
    }
    let len = u16::from_be_bytes(bytes[*offset..*offset + 2].try_into().unwrap()) as usize;
    *offset += 2;
    if *offset + len > bytes.len() {
        return Err(StateError::Serialization("Truncated integer".to_string()));
    }
    let value = BigUint::from_bytes_be(&bytes[*offset..*offset + len]);
    *offset += len;
    Ok(value)
}

/// Append a 4-byte length prefix followed by the raw bytes.
pub fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

/// Read a 4-byte length-prefixed byte string, advancing `offset`.
pub fn read_bytes(bytes: &[u8], offset: &mut usize) -> StateResult<Vec<u8>> {
    if *offset + 4 > bytes.len() {
        return Err(StateError::Serialization(
            "Truncated byte string length".to_string(),
        ));
    }
    let len = u32::from_be_bytes(bytes[*offset..*offset + 4].try_into().unwrap()) as usize;
    *offset += 4;
    if *offset + len > bytes.len() {
        return Err(StateError::Serialization(
            "Truncated byte string".to_string(),
        ));
    }
    let data = bytes[*offset..*offset + len].to_vec();
    *offset += len;
    Ok(data)
}
