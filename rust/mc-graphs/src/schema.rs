//! On-disk naming for graph collections.

/// Tensor name prefix inside a safetensors collection.
pub const TENSOR_PREFIX: &str = "graph_";

/// Metadata key holding the number of graphs in a safetensors collection.
pub const META_COUNT: &str = "n_graphs";

/// Tensor name for the graph at `idx`. Zero-padded so lexical order is collection order.
pub fn tensor_name(idx: usize) -> String {
    format!("{TENSOR_PREFIX}{idx:06}")
}
