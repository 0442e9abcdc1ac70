use std::sync::Arc;

use anyhow::anyhow;
use chunkwise_core::types::Asset;
use chunkwise_core::types::AssetId;
use chunkwise_core::types::BundleBehavior;
use chunkwise_core::types::Dependency;
use chunkwise_core::types::Environment;
use chunkwise_core::types::FileType;
use chunkwise_core::types::MaybeBundleBehavior;
use chunkwise_core::types::Priority;
use chunkwise_core::types::Target;
use chunkwise_graph::ContentGraph;
use chunkwise_graph::Graph;
use chunkwise_graph::NodeId;
use chunkwise_graph::TraversalAction;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::config::BundlerConfig;

/// Options for a single ideal graph build
#[derive(Clone, Debug, Default)]
pub struct IdealGraphBuildOptions {
  pub config: BundlerConfig,

  /// Record every decision the builder makes in [`IdealGraph::debug`]
  pub collect_debug: bool,
}

/// Summary stats from building an [`IdealGraph`]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdealGraphBuildStats {
  pub assets: usize,
  pub dependencies: usize,
  pub bundles: usize,
  pub shared_bundles: usize,
}

/// Why an asset anchors its own bundle
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BundleRootReason {
  Entry,
  Lazy,
  Isolated,
  TypeChange,
  Inline,
}

/// Why a shared bundle was dissolved
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SharedBundleRemovalReason {
  BelowMinBundleSize,
  MergedIntoEntry,
  MaxParallelRequests,
}

/// A typed record of a choice made by the builder.
///
/// Only collected when [`IdealGraphBuildOptions::collect_debug`] is set, and never consulted by
/// the algorithm itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecisionKind {
  BundleRootCreated {
    asset_id: AssetId,
    bundle_id: NodeId,
    reason: BundleRootReason,
  },
  AssetDeduplicated {
    asset_id: AssetId,
    bundle_root_id: AssetId,
  },
  AssetPlaced {
    asset_id: AssetId,
    bundle_ids: Vec<NodeId>,
  },
  SharedBundleCreated {
    bundle_id: NodeId,
    key: String,
  },
  AssetInternalized {
    asset_id: AssetId,
    bundle_id: NodeId,
  },
  SharedBundleRemoved {
    bundle_id: NodeId,
    reason: SharedBundleRemovalReason,
  },
  BundleMergedIntoEntry {
    bundle_id: NodeId,
    entry_bundle_id: NodeId,
  },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decision {
  /// Assigned in the order decisions were made
  pub seq: u64,
  pub phase: &'static str,
  pub kind: DecisionKind,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DecisionLog {
  next_seq: u64,
  pub decisions: Vec<Decision>,
}

impl DecisionLog {
  pub fn push(&mut self, phase: &'static str, kind: DecisionKind) {
    let seq = self.next_seq;
    self.next_seq += 1;

    self.decisions.push(Decision { seq, phase, kind });
  }

  pub fn is_empty(&self) -> bool {
    self.decisions.is_empty()
  }
}

/// A bundle in the ideal graph.
///
/// Bundles are owned by [`IdealGraph::bundle_graph`] and referred to by node id everywhere else.
#[derive(Clone, Debug, PartialEq)]
pub struct IdealBundle {
  pub assets: IndexMap<AssetId, Arc<Asset>>,

  /// Assets loaded by an async import that this bundle already contains or can rely on
  pub internalized_asset_ids: Vec<AssetId>,

  pub bundle_behavior: MaybeBundleBehavior,
  pub needs_stable_name: bool,

  /// Total size of the assets in bytes
  pub size: u64,

  /// The bundles a shared bundle was split out of. Empty for bundles with a root asset.
  pub source_bundles: Vec<NodeId>,

  pub target: Target,
  pub env: Arc<Environment>,
  pub bundle_type: FileType,

  /// The asset the bundle was created for, if any
  pub main_entry_asset: Option<Arc<Asset>>,
}

impl IdealBundle {
  pub fn for_root(
    asset: &Arc<Asset>,
    target: Target,
    needs_stable_name: bool,
    bundle_behavior: MaybeBundleBehavior,
  ) -> Self {
    let mut bundle = IdealBundle {
      assets: IndexMap::new(),
      internalized_asset_ids: Vec::new(),
      bundle_behavior,
      needs_stable_name,
      size: 0,
      source_bundles: Vec::new(),
      target,
      env: asset.env.clone(),
      bundle_type: asset.file_type.clone(),
      main_entry_asset: Some(asset.clone()),
    };

    bundle.add_asset(asset);
    bundle
  }

  /// A bundle holding assets split out of `source_bundles`, typed after the first source
  pub fn shared(first_source: &IdealBundle, source_bundles: Vec<NodeId>) -> Self {
    IdealBundle {
      assets: IndexMap::new(),
      internalized_asset_ids: Vec::new(),
      bundle_behavior: None,
      needs_stable_name: false,
      size: 0,
      source_bundles,
      target: first_source.target.clone(),
      env: first_source.env.clone(),
      bundle_type: first_source.bundle_type.clone(),
      main_entry_asset: None,
    }
  }

  /// Adds an asset, counting its size only the first time. Returns false if it was present.
  pub fn add_asset(&mut self, asset: &Arc<Asset>) -> bool {
    if self.assets.contains_key(&asset.id) {
      return false;
    }

    self.size += asset.stats.size;
    self.assets.insert(asset.id.clone(), asset.clone());
    true
  }

  pub fn contains(&self, asset_id: &str) -> bool {
    self.assets.contains_key(asset_id)
  }

  pub fn is_shared(&self) -> bool {
    !self.source_bundles.is_empty()
  }

  /// Inline and isolated bundles never share assets with the rest of their group
  pub fn is_inline_or_isolated(&self) -> bool {
    matches!(
      self.bundle_behavior,
      Some(BundleBehavior::Inline | BundleBehavior::Isolated)
    )
  }

  pub fn root_asset_id(&self) -> Option<&str> {
    self.main_entry_asset.as_ref().map(|asset| asset.id.as_str())
  }
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum IdealBundleNode {
  Root,
  Bundle(IdealBundle),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IdealBundleEdge {
  /// From the synthetic root to entry and async bundles
  BundleGroup,
  /// To a bundle that is loaded alongside the source bundle
  Sibling,
  /// From a source bundle to a shared bundle split out of it
  Shared,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DependencyBundleNode {
  Dependency(Arc<Dependency>),
  Bundle(NodeId),
}

impl DependencyBundleNode {
  pub fn bundle_content_key(bundle_id: NodeId) -> String {
    format!("bundle:{bundle_id}")
  }
}

/// The asset anchoring a bundle along with the bundle that loads it
#[derive(Clone, Debug, PartialEq)]
pub struct BundleRoot {
  pub asset: Arc<Asset>,
  pub bundle_id: NodeId,

  /// Equal to `bundle_id` for entries and async bundles. Bundles created for a type change or an
  /// inline import belong to the group of the bundle that imported them.
  pub bundle_group_id: NodeId,
}

impl BundleRoot {
  pub fn is_bundle_group(&self) -> bool {
    self.bundle_id == self.bundle_group_id
  }
}

/// How an asset is guaranteed to be loaded before a bundle runs
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Availability {
  /// Every path that loads the bundle has already loaded the asset
  Always,
  /// The asset is only available while each of these bundle roots' groups keep a copy of it
  Conditional(Vec<AssetId>),
}

impl Availability {
  /// Combines the availability of the same asset along two different paths
  pub fn merge(&mut self, other: &Availability) {
    match other {
      Availability::Always => {}
      Availability::Conditional(other_roots) => match self {
        Availability::Always => *self = Availability::Conditional(other_roots.clone()),
        Availability::Conditional(roots) => {
          for root in other_roots {
            if !roots.contains(root) {
              roots.push(root.clone());
            }
          }
        }
      },
    }
  }
}

pub type AvailableAssets = IndexMap<AssetId, Availability>;

/// Keeps only the assets available along both paths
pub fn intersect_available_assets(current: &mut AvailableAssets, incoming: &AvailableAssets) {
  current.retain(|asset_id, availability| match incoming.get(asset_id) {
    Some(other) => {
      availability.merge(other);
      true
    }
    None => false,
  });
}

/// The result of the ideal graph algorithm
#[derive(Clone, Debug)]
pub struct IdealGraph {
  pub bundle_graph: Graph<IdealBundleNode, IdealBundleEdge>,

  /// Connects dependencies to the bundles they resolve into, weighted by priority
  pub dependency_bundle_graph: ContentGraph<DependencyBundleNode, Priority>,

  /// Bundles that start their own bundle group: entries and async bundles
  pub bundle_group_bundle_ids: IndexSet<NodeId>,

  /// Dependencies that reach an asset placed in another bundle of the same group
  pub asset_reference: IndexMap<AssetId, Vec<(Arc<Dependency>, NodeId)>>,

  /// Async bundle roots lazily reachable from each bundle root without a type or context change
  pub reachable_bundles: IndexMap<AssetId, IndexSet<AssetId>>,

  pub bundle_roots: IndexMap<AssetId, BundleRoot>,

  pub debug: Option<DecisionLog>,
}

impl Default for IdealGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl IdealGraph {
  pub fn new() -> Self {
    let mut bundle_graph = Graph::new();
    let root_node_id = bundle_graph.add_node(IdealBundleNode::Root);
    bundle_graph.set_root_node_id(root_node_id);

    IdealGraph {
      bundle_graph,
      dependency_bundle_graph: ContentGraph::new(),
      bundle_group_bundle_ids: IndexSet::new(),
      asset_reference: IndexMap::new(),
      reachable_bundles: IndexMap::new(),
      bundle_roots: IndexMap::new(),
      debug: None,
    }
  }

  pub fn root_node_id(&self) -> NodeId {
    // Always set by `new`
    self.bundle_graph.root_node_id().unwrap_or_default()
  }

  pub fn add_bundle(&mut self, bundle: IdealBundle) -> NodeId {
    self.bundle_graph.add_node(IdealBundleNode::Bundle(bundle))
  }

  pub fn bundle(&self, bundle_id: NodeId) -> anyhow::Result<&IdealBundle> {
    match self.bundle_graph.get_node(bundle_id) {
      Some(IdealBundleNode::Bundle(bundle)) => Ok(bundle),
      _ => Err(anyhow!("bundle {bundle_id} is not in the ideal graph")),
    }
  }

  pub fn bundle_mut(&mut self, bundle_id: NodeId) -> anyhow::Result<&mut IdealBundle> {
    match self.bundle_graph.get_node_mut(bundle_id) {
      Some(IdealBundleNode::Bundle(bundle)) => Ok(bundle),
      _ => Err(anyhow!("bundle {bundle_id} is not in the ideal graph")),
    }
  }

  pub fn bundles(&self) -> impl Iterator<Item = (NodeId, &IdealBundle)> + '_ {
    self
      .bundle_graph
      .nodes()
      .filter_map(|(node_id, node)| match node {
        IdealBundleNode::Bundle(bundle) => Some((node_id, bundle)),
        IdealBundleNode::Root => None,
      })
  }

  pub fn bundle_count(&self) -> usize {
    self.bundles().count()
  }

  /// The bundle created for the given root asset
  pub fn bundle_for_root(&self, asset_id: &str) -> Option<&IdealBundle> {
    let bundle_root = self.bundle_roots.get(asset_id)?;
    self.bundle(bundle_root.bundle_id).ok()
  }

  /// Ids of every bundle that contains the asset
  pub fn bundles_containing(&self, asset_id: &str) -> Vec<NodeId> {
    self
      .bundles()
      .filter(|(_, bundle)| bundle.contains(asset_id))
      .map(|(bundle_id, _)| bundle_id)
      .collect()
  }

  /// A bundle group's bundle followed by every bundle reachable from it
  pub fn bundles_in_group(&self, bundle_group_id: NodeId) -> anyhow::Result<Vec<NodeId>> {
    let mut bundle_ids = Vec::new();
    self.bundle_graph.dfs(
      bundle_group_id,
      &mut |node_id: NodeId,
            _node: &IdealBundleNode,
            _parent: Option<NodeId>|
       -> anyhow::Result<TraversalAction> {
        bundle_ids.push(node_id);
        Ok(TraversalAction::Continue)
      },
    )?;

    Ok(bundle_ids)
  }

  pub fn connect(
    &mut self,
    from: NodeId,
    to: NodeId,
    edge_type: IdealBundleEdge,
  ) -> anyhow::Result<()> {
    if from != to {
      self.bundle_graph.add_edge(from, to, edge_type)?;
    }
    Ok(())
  }

  /// Removes edges of every type between two bundles
  pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
    for edge_type in [
      IdealBundleEdge::BundleGroup,
      IdealBundleEdge::Sibling,
      IdealBundleEdge::Shared,
    ] {
      self.bundle_graph.remove_edge(from, to, edge_type);
    }
  }

  /// Records that `dependency` resolves into `bundle_id`
  pub fn add_dependency_bundle_edge(
    &mut self,
    dependency: &Arc<Dependency>,
    bundle_id: NodeId,
    priority: Priority,
  ) -> anyhow::Result<()> {
    let dependency_node_id = self.dependency_bundle_graph.add_node_by_content_key_if_needed(
      dependency.id.clone(),
      DependencyBundleNode::Dependency(dependency.clone()),
    );
    let bundle_node_id = self.add_dependency_bundle_node(bundle_id);

    self
      .dependency_bundle_graph
      .add_edge(dependency_node_id, bundle_node_id, priority)?;
    Ok(())
  }

  pub fn add_dependency_bundle_node(&mut self, bundle_id: NodeId) -> NodeId {
    self.dependency_bundle_graph.add_node_by_content_key_if_needed(
      DependencyBundleNode::bundle_content_key(bundle_id),
      DependencyBundleNode::Bundle(bundle_id),
    )
  }

  /// Dependencies that resolve into the bundle
  pub fn get_bundle_dependencies(&self, bundle_id: NodeId) -> Vec<Arc<Dependency>> {
    let Some(bundle_node_id) = self
      .dependency_bundle_graph
      .get_node_id_by_content_key(&DependencyBundleNode::bundle_content_key(bundle_id))
    else {
      return Vec::new();
    };

    self
      .dependency_bundle_graph
      .get_node_ids_connected_to(bundle_node_id)
      .into_iter()
      .filter_map(
        |node_id| match self.dependency_bundle_graph.get_node(node_id) {
          Some(DependencyBundleNode::Dependency(dependency)) => Some(dependency.clone()),
          _ => None,
        },
      )
      .collect()
  }

  /// Removes a bundle and every edge and reference pointing at it
  pub fn remove_bundle(&mut self, bundle_id: NodeId) -> anyhow::Result<IdealBundle> {
    self.bundle(bundle_id)?;

    let Some(IdealBundleNode::Bundle(bundle)) = self.bundle_graph.remove_node(bundle_id) else {
      return Err(anyhow!("bundle {bundle_id} is not in the ideal graph"));
    };

    for references in self.asset_reference.values_mut() {
      references.retain(|(_, referenced_bundle_id)| *referenced_bundle_id != bundle_id);
    }

    self
      .dependency_bundle_graph
      .remove_node_by_content_key(&DependencyBundleNode::bundle_content_key(bundle_id));
    self.bundle_group_bundle_ids.shift_remove(&bundle_id);

    Ok(bundle)
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use pretty_assertions::assert_eq;

  use super::*;

  fn asset(id: &str, size: u64) -> Arc<Asset> {
    let mut asset = Asset::new(PathBuf::from(id), Arc::default(), size);
    asset.id = String::from(id);
    Arc::new(asset)
  }

  fn conditional(roots: &[&str]) -> Availability {
    Availability::Conditional(roots.iter().map(|root| String::from(*root)).collect())
  }

  #[test]
  fn add_asset_counts_each_asset_once() {
    let index = asset("index.js", 100);
    let util = asset("util.js", 20);
    let mut bundle = IdealBundle::for_root(&index, Target::default(), true, None);

    assert!(bundle.add_asset(&util));
    assert!(!bundle.add_asset(&util));
    assert!(!bundle.add_asset(&index));

    assert_eq!(bundle.size, 120);
    assert_eq!(
      bundle.assets.keys().cloned().collect::<Vec<_>>(),
      vec![String::from("index.js"), String::from("util.js")]
    );
  }

  #[test]
  fn intersection_keeps_assets_available_on_every_path() {
    let mut current = AvailableAssets::from([
      (String::from("always.js"), Availability::Always),
      (String::from("a.js"), conditional(&["a"])),
      (String::from("b.js"), Availability::Always),
      (String::from("only-current.js"), Availability::Always),
    ]);
    let incoming = AvailableAssets::from([
      (String::from("always.js"), Availability::Always),
      (String::from("a.js"), conditional(&["b", "a"])),
      (String::from("b.js"), conditional(&["b"])),
      (String::from("only-incoming.js"), Availability::Always),
    ]);

    intersect_available_assets(&mut current, &incoming);

    assert_eq!(
      current,
      AvailableAssets::from([
        (String::from("always.js"), Availability::Always),
        (String::from("a.js"), conditional(&["a", "b"])),
        (String::from("b.js"), conditional(&["b"])),
      ])
    );
  }

  #[test]
  fn removing_a_bundle_drops_references_to_it() {
    let index = asset("index.js", 10);
    let mut graph = IdealGraph::new();
    let bundle_id = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));
    let other_id = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));
    let dependency = Arc::new(Dependency::entry(String::from("index.js"), Target::default()));

    graph.add_dependency_bundle_edge(&dependency, bundle_id, Priority::Sync).unwrap();
    graph.bundle_group_bundle_ids.insert(bundle_id);
    graph.asset_reference.insert(
      index.id.clone(),
      vec![(dependency.clone(), bundle_id), (dependency, other_id)],
    );

    let removed = graph.remove_bundle(bundle_id).unwrap();

    assert_eq!(removed.root_asset_id(), Some("index.js"));
    assert_eq!(graph.bundle_count(), 1);
    assert!(graph.bundle_group_bundle_ids.is_empty());
    assert_eq!(graph.asset_reference[&index.id].len(), 1);
    assert!(graph.get_bundle_dependencies(bundle_id).is_empty());
    assert!(graph.remove_bundle(bundle_id).is_err());
  }

  #[test]
  fn bundles_in_group_follow_edges_from_the_group_bundle() {
    let index = asset("index.js", 10);
    let mut graph = IdealGraph::new();
    let root = graph.root_node_id();
    let entry = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));
    let styles = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));
    let shared = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));
    let other = graph.add_bundle(IdealBundle::for_root(&index, Target::default(), true, None));

    graph.connect(root, entry, IdealBundleEdge::BundleGroup).unwrap();
    graph.connect(root, other, IdealBundleEdge::BundleGroup).unwrap();
    graph.connect(entry, styles, IdealBundleEdge::Sibling).unwrap();
    graph.connect(styles, shared, IdealBundleEdge::Shared).unwrap();

    assert_eq!(
      graph.bundles_in_group(entry).unwrap(),
      vec![entry, styles, shared]
    );

    graph.disconnect(styles, shared);
    assert_eq!(graph.bundles_in_group(entry).unwrap(), vec![entry, styles]);
  }
}
