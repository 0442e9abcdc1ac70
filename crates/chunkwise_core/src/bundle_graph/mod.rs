mod bundle_graph;
mod mutable_bundle_graph;
mod native_bundle_graph;

pub use self::bundle_graph::*;
pub use self::mutable_bundle_graph::*;
pub use self::native_bundle_graph::*;
