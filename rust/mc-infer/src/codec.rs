//! Binary codec for protocol v1 (payload inside a length-delimited frame).
//!
//! Layout, all little-endian:
//! - header: u32 version, u8 kind, u8 flags, u16 reserved
//! - request: u64 request_id, u32 model_id, u32 schema_id, u32 batch, u32 n_vertices,
//!   u32 n_features, then `batch * n_vertices * n_features` f32
//! - response: u64 request_id, u32 batch, u32 n_vertices, then `batch * n_vertices` f32

use thiserror::Error;

use crate::protocol::{
    MsgKind, PredictRequestV1, PredictResponseV1, FEATURE_SCHEMA_ID_V1, PROTOCOL_VERSION,
};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload too short")]
    TooShort,
    #[error("{0} trailing bytes after payload")]
    Trailing(usize),
    #[error("unsupported protocol version: {0}")]
    BadVersion(u32),
    #[error("unexpected message kind: {0}")]
    BadKind(u8),
    #[error("unsupported feature_schema_id: {0}")]
    BadSchema(u32),
    #[error("unsupported feature count: got {got}, expected {expected}")]
    BadFeatureCount { got: u32, expected: u32 },
    #[error("tensor dims overflow: {0:?}")]
    DimsOverflow(Vec<u32>),
}

const HEADER_LEN: usize = 8;

fn put_header(out: &mut Vec<u8>, kind: MsgKind) {
    out.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    out.push(kind as u8);
    out.push(0); // flags
    out.extend_from_slice(&[0, 0]); // reserved
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for &f in values {
        out.extend_from_slice(&f.to_le_bytes());
    }
}

pub fn encode_request_v1(req: &PredictRequestV1) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 28 + req.observations.len() * 4);
    put_header(&mut out, MsgKind::Request);
    out.extend_from_slice(&req.request_id.to_le_bytes());
    out.extend_from_slice(&req.model_id.to_le_bytes());
    out.extend_from_slice(&req.feature_schema_id.to_le_bytes());
    out.extend_from_slice(&req.batch.to_le_bytes());
    out.extend_from_slice(&req.n_vertices.to_le_bytes());
    out.extend_from_slice(&req.n_features.to_le_bytes());
    put_f32s(&mut out, &req.observations);
    out
}

pub fn decode_request_v1(bytes: &[u8]) -> Result<PredictRequestV1, DecodeError> {
    let mut c = Cursor::new(bytes);
    c.read_header(MsgKind::Request)?;

    let request_id = c.read_u64()?;
    let model_id = c.read_u32()?;
    let feature_schema_id = c.read_u32()?;
    if feature_schema_id != FEATURE_SCHEMA_ID_V1 {
        return Err(DecodeError::BadSchema(feature_schema_id));
    }
    let batch = c.read_u32()?;
    let n_vertices = c.read_u32()?;
    let n_features = c.read_u32()?;
    if n_features as usize != mc_features::F {
        return Err(DecodeError::BadFeatureCount {
            got: n_features,
            expected: mc_features::F as u32,
        });
    }
    let len = element_count(&[batch, n_vertices, n_features])?;
    let observations = c.read_f32s(len)?;
    c.finish()?;

    Ok(PredictRequestV1 {
        request_id,
        model_id,
        feature_schema_id,
        batch,
        n_vertices,
        n_features,
        observations,
    })
}

pub fn encode_response_v1(resp: &PredictResponseV1) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + 16 + resp.q_values.len() * 4);
    put_header(&mut out, MsgKind::Response);
    out.extend_from_slice(&resp.request_id.to_le_bytes());
    out.extend_from_slice(&resp.batch.to_le_bytes());
    out.extend_from_slice(&resp.n_vertices.to_le_bytes());
    put_f32s(&mut out, &resp.q_values);
    out
}

pub fn decode_response_v1(bytes: &[u8]) -> Result<PredictResponseV1, DecodeError> {
    let mut c = Cursor::new(bytes);
    c.read_header(MsgKind::Response)?;

    let request_id = c.read_u64()?;
    let batch = c.read_u32()?;
    let n_vertices = c.read_u32()?;
    let len = element_count(&[batch, n_vertices])?;
    let q_values = c.read_f32s(len)?;
    c.finish()?;

    Ok(PredictResponseV1 {
        request_id,
        batch,
        n_vertices,
        q_values,
    })
}

fn element_count(dims: &[u32]) -> Result<usize, DecodeError> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
        .ok_or_else(|| DecodeError::DimsOverflow(dims.to_vec()))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, off: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.off.checked_add(n).ok_or(DecodeError::TooShort)?;
        if end > self.bytes.len() {
            return Err(DecodeError::TooShort);
        }
        let s = &self.bytes[self.off..end];
        self.off = end;
        Ok(s)
    }

    fn read_header(&mut self, expected: MsgKind) -> Result<(), DecodeError> {
        let version = self.read_u32()?;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::BadVersion(version));
        }
        let kind = self.read_u8()?;
        if kind != expected as u8 {
            return Err(DecodeError::BadKind(kind));
        }
        let _flags = self.read_u8()?;
        self.take(2).map(|_| ())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_f32s(&mut self, n: usize) -> Result<Vec<f32>, DecodeError> {
        let byte_len = n.checked_mul(4).ok_or(DecodeError::TooShort)?;
        let b = self.take(byte_len)?;
        Ok(b.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn finish(&self) -> Result<(), DecodeError> {
        match self.bytes.len() - self.off {
            0 => Ok(()),
            n => Err(DecodeError::Trailing(n)),
        }
    }
}
