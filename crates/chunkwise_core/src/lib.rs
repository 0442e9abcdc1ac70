pub mod asset_graph;
pub mod bundle_graph;
pub mod config_loader;
pub mod diagnostic;
pub mod hash;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
