//! Graph primitives shared by the asset graph, the bundle graph and the
//! intermediate graphs built while bundling.
//!
//! Nodes are stored in a [`petgraph::stable_graph::StableDiGraph`] and addressed by dense
//! integer ids that stay valid when other nodes are removed. [`ContentGraph`] adds a mapping
//! from a stable string key to a node id.

mod content_graph;
mod error;
mod graph;
mod traversal;

pub use self::content_graph::*;
pub use self::error::*;
pub use self::graph::*;
pub use self::traversal::*;

pub type NodeId = usize;
