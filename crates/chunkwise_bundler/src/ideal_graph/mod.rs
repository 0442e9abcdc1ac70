//! Ideal graph code splitting.
//!
//! Bundles are computed in an intermediate [`IdealGraph`] before anything is written to the
//! bundle graph. The builder runs these phases in order:
//!
//! - bundle roots: entries, lazy imports, isolated imports and type changes start new bundles
//! - reachability: the assets each bundle root loads synchronously
//! - availability: the assets already loaded whenever an async bundle loads
//! - placement: each asset goes to the single bundle needing it or to a shared bundle
//! - consolidation: small shared bundles and siblings of entries are merged back, and bundle
//!   groups are kept under the parallel request limit
//!
//! [`decorate_bundle_graph`] then writes the result into a [`MutableBundleGraph`].

mod availability;
mod builder;
mod bundle_roots;
mod consolidation;
mod decorate;
mod placement;
mod reachability;
pub mod types;

use anyhow::Context;
use chunkwise_core::asset_graph::AssetGraph;
use chunkwise_core::bundle_graph::MutableBundleGraph;
use chunkwise_core::config_loader::ConfigLoader;
use tracing::info;

use crate::config::load_bundler_config;
use crate::config::BundlerConfig;
use crate::Bundler;

pub use self::builder::IdealGraphBuilder;
pub use self::decorate::decorate_bundle_graph;
use self::types::IdealGraph;
use self::types::IdealGraphBuildOptions;
use self::types::IdealGraphBuildStats;

/// The default bundler, splitting code along async imports and sharing assets needed by several
/// bundles
#[derive(Clone, Debug, Default)]
pub struct IdealGraphBundler {
  pub options: IdealGraphBuildOptions,
}

impl IdealGraphBundler {
  pub fn new(options: IdealGraphBuildOptions) -> Self {
    Self { options }
  }

  pub fn from_config(config: BundlerConfig) -> Self {
    Self::new(IdealGraphBuildOptions {
      config,
      ..IdealGraphBuildOptions::default()
    })
  }

  /// Creates a bundler using the options in the project's package.json
  pub fn load(config_loader: &ConfigLoader) -> anyhow::Result<Self> {
    Ok(Self::from_config(load_bundler_config(config_loader)?))
  }

  /// Builds the ideal graph without touching a bundle graph
  pub fn build_ideal_graph(
    &self,
    asset_graph: &AssetGraph,
  ) -> anyhow::Result<(IdealGraph, IdealGraphBuildStats)> {
    IdealGraphBuilder::new(asset_graph, self.options.clone())
      .build()
      .context("building ideal graph")
  }
}

impl Bundler for IdealGraphBundler {
  fn bundle(&self, bundle_graph: &mut dyn MutableBundleGraph) -> anyhow::Result<()> {
    let (ideal_graph, stats) = self.build_ideal_graph(bundle_graph.asset_graph())?;

    info!(
      assets = stats.assets,
      dependencies = stats.dependencies,
      bundles = stats.bundles,
      shared_bundles = stats.shared_bundles,
      "Bundled asset graph"
    );

    decorate_bundle_graph(&ideal_graph, bundle_graph).context("writing ideal graph to bundle graph")
  }
}
