use std::sync::Arc;

use chunkwise_core::asset_graph::AssetGraph;
use chunkwise_core::types::Asset;
use chunkwise_core::types::AssetId;
use chunkwise_core::types::Dependency;
use chunkwise_graph::ContentGraph;
use chunkwise_graph::NodeId;
use indexmap::IndexMap;
use tracing::debug;
use tracing::instrument;

use super::types::AvailableAssets;
use super::types::BundleRoot;
use super::types::DecisionKind;
use super::types::DecisionLog;
use super::types::IdealGraph;
use super::types::IdealGraphBuildOptions;
use super::types::IdealGraphBuildStats;

pub(super) const ROOT_CONTENT_KEY: &str = "@@root";

/// Nodes of the graph connecting bundle groups to the async bundles they load
#[derive(Clone, Debug, PartialEq)]
pub(super) enum AsyncRootNode {
  Root,
  BundleRoot(Arc<Asset>),
}

/// Builds an [`IdealGraph`] from an asset graph.
///
/// A builder is used for a single build. The phases live in their own modules and share the
/// state below.
pub struct IdealGraphBuilder<'a> {
  pub(super) asset_graph: &'a AssetGraph,
  pub(super) options: IdealGraphBuildOptions,
  pub(super) ideal: IdealGraph,

  /// Entry assets and the dependency that first reached them
  pub(super) entries: IndexMap<AssetId, Arc<Dependency>>,

  /// Every asset in the order the asset graph traversal entered it
  pub(super) assets: Vec<Arc<Asset>>,

  /// Shared bundles keyed by the sorted ids of the bundle roots they serve
  pub(super) shared_bundles: IndexMap<String, NodeId>,

  /// Edges from each bundle root to the assets it reaches synchronously
  pub(super) reachable_roots: ContentGraph<Arc<Asset>, ()>,

  /// Edges from each bundle group root to the async bundle roots it loads
  pub(super) async_root_graph: ContentGraph<AsyncRootNode, ()>,

  /// Assets already loaded whenever a bundle root's bundle loads
  pub(super) ancestor_assets: IndexMap<AssetId, AvailableAssets>,

  /// How many bundles of a bundle group contain each asset
  pub(super) asset_refs_in_bundle_group: IndexMap<AssetId, IndexMap<AssetId, u32>>,

  pub(super) decisions: DecisionLog,
}

impl<'a> IdealGraphBuilder<'a> {
  pub fn new(asset_graph: &'a AssetGraph, options: IdealGraphBuildOptions) -> Self {
    let mut async_root_graph = ContentGraph::new();
    let root_node_id =
      async_root_graph.add_node_by_content_key_if_needed(ROOT_CONTENT_KEY, AsyncRootNode::Root);
    async_root_graph.set_root_node_id(root_node_id);

    IdealGraphBuilder {
      asset_graph,
      options,
      ideal: IdealGraph::new(),
      entries: IndexMap::new(),
      assets: Vec::new(),
      shared_bundles: IndexMap::new(),
      reachable_roots: ContentGraph::new(),
      async_root_graph,
      ancestor_assets: IndexMap::new(),
      asset_refs_in_bundle_group: IndexMap::new(),
      decisions: DecisionLog::default(),
    }
  }

  #[instrument(level = "debug", skip_all)]
  pub fn build(mut self) -> anyhow::Result<(IdealGraph, IdealGraphBuildStats)> {
    let mut stats = IdealGraphBuildStats {
      assets: self.asset_graph.get_assets().count(),
      dependencies: self.asset_graph.get_dependencies().count(),
      ..IdealGraphBuildStats::default()
    };

    debug!(
      assets = stats.assets,
      dependencies = stats.dependencies,
      "ideal graph: input stats"
    );

    self.create_entry_bundles()?;
    self.create_bundle_roots()?;
    self.compute_reachability()?;
    self.propagate_availability()?;
    self.place_assets()?;
    self.remove_small_shared_bundles()?;
    self.merge_entry_siblings()?;
    self.enforce_max_parallel_requests()?;

    stats.bundles = self.ideal.bundle_count();
    stats.shared_bundles = self
      .ideal
      .bundles()
      .filter(|(_, bundle)| bundle.is_shared())
      .count();

    debug!(
      bundles = stats.bundles,
      shared_bundles = stats.shared_bundles,
      bundle_groups = self.ideal.bundle_group_bundle_ids.len(),
      "ideal graph: built"
    );

    if self.options.collect_debug {
      self.ideal.debug = Some(std::mem::take(&mut self.decisions));
    }

    Ok((self.ideal, stats))
  }

  pub(super) fn decision(&mut self, phase: &'static str, kind: DecisionKind) {
    if self.options.collect_debug {
      self.decisions.push(phase, kind);
    }
  }

  pub(super) fn bundle_root(&self, asset_id: &str) -> anyhow::Result<&BundleRoot> {
    self
      .ideal
      .bundle_roots
      .get(asset_id)
      .ok_or_else(|| anyhow::anyhow!("{asset_id} is not a bundle root"))
  }

  /// Bundle roots with an edge to the asset in the reachability graph
  pub(super) fn reachable_roots_of(&self, asset_id: &str) -> Vec<Arc<Asset>> {
    let Some(node_id) = self.reachable_roots.get_node_id_by_content_key(asset_id) else {
      return Vec::new();
    };

    self
      .reachable_roots
      .get_node_ids_connected_to(node_id)
      .into_iter()
      .filter_map(|node_id| self.reachable_roots.get_node(node_id).cloned())
      .collect()
  }

  /// Assets the bundle root reaches synchronously
  pub(super) fn reachable_assets_of(&self, root_id: &str) -> Vec<Arc<Asset>> {
    let Some(node_id) = self.reachable_roots.get_node_id_by_content_key(root_id) else {
      return Vec::new();
    };

    self
      .reachable_roots
      .get_node_ids_connected_from(node_id)
      .into_iter()
      .filter_map(|node_id| self.reachable_roots.get_node(node_id).cloned())
      .collect()
  }

  pub(super) fn is_reachable_from_root(&self, root_id: &str, asset_id: &str) -> bool {
    match (
      self.reachable_roots.get_node_id_by_content_key(root_id),
      self.reachable_roots.get_node_id_by_content_key(asset_id),
    ) {
      (Some(root), Some(asset)) => self.reachable_roots.has_edge(root, asset, ()),
      _ => false,
    }
  }
}
