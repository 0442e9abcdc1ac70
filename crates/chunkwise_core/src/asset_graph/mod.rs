mod asset_graph;

pub use self::asset_graph::*;
