//! Protocol v1 definitions for the remote value network.
//!
//! Every request carries a whole `(batch, vertices, F)` observation tensor; the response
//! carries the matching `(batch, vertices)` q-values.

/// Protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Feature schema id currently supported.
pub const FEATURE_SCHEMA_ID_V1: u32 = mc_features::FEATURE_SCHEMA_ID;

#[derive(Debug, Clone, PartialEq)]
pub struct PredictRequestV1 {
    pub request_id: u64,
    pub model_id: u32,
    pub feature_schema_id: u32,
    pub batch: u32,
    pub n_vertices: u32,
    pub n_features: u32,
    pub observations: Vec<f32>, // length = batch * n_vertices * n_features
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictResponseV1 {
    pub request_id: u64,
    pub batch: u32,
    pub n_vertices: u32,
    pub q_values: Vec<f32>, // length = batch * n_vertices
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    Request = 1,
    Response = 2,
}
