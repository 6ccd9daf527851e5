//! Payload sources and the typed proof payload
//!
//! Agora proofs travel as a one-field protobuf message:
//!
//! ```text
//! message Proof { string proof = 1; }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the bytes of the published message come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// Inline UTF-8 text, sent as-is
    Text(String),
    /// Raw bytes read from a file
    File(PathBuf),
    /// A proof string wrapped in the `Proof` protobuf message
    Proof(String),
}

impl Default for PayloadSource {
    fn default() -> Self {
        PayloadSource::Text("Hello World".to_string())
    }
}

impl PayloadSource {
    pub fn resolve(&self) -> std::io::Result<Vec<u8>> {
        match self {
            PayloadSource::Text(text) => Ok(text.as_bytes().to_vec()),
            PayloadSource::File(path) => std::fs::read(path),
            PayloadSource::Proof(proof) => Ok(ProofPayload::new(proof.clone()).encode()),
        }
    }
}

/// Decoding errors for [`ProofPayload`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("truncated protobuf input")]
    Truncated,

    #[error("unsupported wire type {0} for field {1}")]
    UnsupportedWireType(u8, u64),

    #[error("proof field is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofPayload {
    pub proof: String,
}

const PROOF_FIELD: u64 = 1;
const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;

impl ProofPayload {
    pub fn new(proof: impl Into<String>) -> Self {
        Self { proof: proof.into() }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.proof.len() + 6);
        // proto3 omits empty strings
        if !self.proof.is_empty() {
            put_varint(&mut out, (PROOF_FIELD << 3) | WIRE_LEN as u64);
            put_varint(&mut out, self.proof.len() as u64);
            out.extend_from_slice(self.proof.as_bytes());
        }
        out
    }

    /// Decode, skipping unknown varint and length-delimited fields
    pub fn decode(mut data: &[u8]) -> Result<Self, PayloadError> {
        let mut proof = String::new();
        while !data.is_empty() {
            let key = take_varint(&mut data)?;
            let field = key >> 3;
            match (key & 0x7) as u8 {
                WIRE_LEN => {
                    let len = take_varint(&mut data)? as usize;
                    if data.len() < len {
                        return Err(PayloadError::Truncated);
                    }
                    let (value, rest) = data.split_at(len);
                    data = rest;
                    if field == PROOF_FIELD {
                        proof = String::from_utf8(value.to_vec())
                            .map_err(|_| PayloadError::InvalidUtf8)?;
                    }
                }
                WIRE_VARINT => {
                    take_varint(&mut data)?;
                }
                other => return Err(PayloadError::UnsupportedWireType(other, field)),
            }
        }
        Ok(Self { proof })
    }
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn take_varint(data: &mut &[u8]) -> Result<u64, PayloadError> {
    let bytes = *data;
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            *data = &bytes[i + 1..];
            return Ok(value);
        }
    }
    Err(PayloadError::Truncated)
}
