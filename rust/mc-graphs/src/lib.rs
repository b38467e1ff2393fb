//! mc-graphs: Graph collections on disk, normalized to dense adjacency matrices at load time.

pub mod instance;
pub mod schema;
pub mod store;

pub use instance::{list_instances, load_graph};
pub use store::{
    load_graph_set, save_graph_set_json, save_graph_set_safetensors, GraphCorpus,
    GraphLoadError, StoredEdge, StoredGraph,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
