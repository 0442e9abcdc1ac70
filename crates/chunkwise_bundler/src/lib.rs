use std::fmt::Debug;

use chunkwise_core::bundle_graph::MutableBundleGraph;

pub mod config;
pub mod ideal_graph;

pub use self::config::*;
pub use self::ideal_graph::IdealGraphBundler;

/// Bundlers assign the assets of the asset graph to bundles.
///
/// Implementations read the asset graph through the bundle graph they are given and record
/// their decisions by mutating it. A failed call must be treated as a failed build, since the
/// bundle graph may have been partially written.
pub trait Bundler: Debug + Send + Sync {
  fn bundle(&self, bundle_graph: &mut dyn MutableBundleGraph) -> anyhow::Result<()>;

  /// Runs after every bundle has been created
  fn optimize(&self, _bundle_graph: &mut dyn MutableBundleGraph) -> anyhow::Result<()> {
    Ok(())
  }
}
