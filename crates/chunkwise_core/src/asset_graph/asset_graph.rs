use std::sync::Arc;

use anyhow::anyhow;
use chunkwise_graph::ContentGraph;
use chunkwise_graph::GraphVisitor;
use chunkwise_graph::NodeId;

use crate::types::Asset;
use crate::types::Dependency;

#[derive(Clone, Debug, PartialEq)]
pub enum AssetGraphNode {
  Root,
  Asset(Arc<Asset>),
  Dependency(Arc<Dependency>),
}

const ROOT_CONTENT_KEY: &str = "@@root";

/// The resolved module graph.
///
/// Edges run from the root to entry dependencies, from assets to the dependencies they declare
/// and from dependencies to the assets they resolved to.
#[derive(Clone, Debug)]
pub struct AssetGraph {
  graph: ContentGraph<AssetGraphNode, ()>,
  root_node_id: NodeId,
}

impl Default for AssetGraph {
  fn default() -> Self {
    Self::new()
  }
}

impl AssetGraph {
  pub fn new() -> Self {
    let mut graph = ContentGraph::new();
    let root_node_id = graph.add_node_by_content_key_if_needed(ROOT_CONTENT_KEY, AssetGraphNode::Root);
    graph.set_root_node_id(root_node_id);

    AssetGraph {
      graph,
      root_node_id,
    }
  }

  pub fn root_node(&self) -> NodeId {
    self.root_node_id
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &AssetGraphNode)> + '_ {
    self.graph.nodes()
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn get_node(&self, node_id: NodeId) -> Option<&AssetGraphNode> {
    self.graph.get_node(node_id)
  }

  pub fn get_node_id_by_content_key(&self, content_key: &str) -> Option<NodeId> {
    self.graph.get_node_id_by_content_key(content_key)
  }

  /// Adds an asset keyed by its id. Adding the same asset twice returns the existing node.
  pub fn add_asset(&mut self, asset: Arc<Asset>) -> NodeId {
    self
      .graph
      .add_node_by_content_key_if_needed(asset.id.clone(), AssetGraphNode::Asset(asset))
  }

  pub fn get_asset(&self, node_id: NodeId) -> Option<&Arc<Asset>> {
    match self.graph.get_node(node_id)? {
      AssetGraphNode::Asset(asset) => Some(asset),
      _ => None,
    }
  }

  pub fn get_asset_by_id(&self, asset_id: &str) -> Option<&Arc<Asset>> {
    self.get_asset(self.graph.get_node_id_by_content_key(asset_id)?)
  }

  pub fn get_assets(&self) -> impl Iterator<Item = &Arc<Asset>> + '_ {
    self.graph.nodes().filter_map(|(_, node)| match node {
      AssetGraphNode::Asset(asset) => Some(asset),
      _ => None,
    })
  }

  pub fn add_dependency(&mut self, dependency: Dependency) -> NodeId {
    self.graph.add_node_by_content_key_if_needed(
      dependency.id.clone(),
      AssetGraphNode::Dependency(Arc::new(dependency)),
    )
  }

  /// Adds a dependency and connects it to the root
  pub fn add_entry_dependency(&mut self, dependency: Dependency) -> anyhow::Result<NodeId> {
    let dependency_node_id = self.add_dependency(dependency);
    self
      .graph
      .add_edge(self.root_node_id, dependency_node_id, ())?;
    Ok(dependency_node_id)
  }

  pub fn get_dependency(&self, node_id: NodeId) -> Option<&Arc<Dependency>> {
    match self.graph.get_node(node_id)? {
      AssetGraphNode::Dependency(dependency) => Some(dependency),
      _ => None,
    }
  }

  pub fn get_dependencies(&self) -> impl Iterator<Item = &Arc<Dependency>> + '_ {
    self.graph.nodes().filter_map(|(_, node)| match node {
      AssetGraphNode::Dependency(dependency) => Some(dependency),
      _ => None,
    })
  }

  pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> anyhow::Result<()> {
    self.graph.add_edge(from, to, ())?;
    Ok(())
  }

  pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
    self.graph.has_edge(from, to, ())
  }

  pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
    self
      .graph
      .edges()
      .into_iter()
      .map(|(from, to, _)| (from, to))
      .collect()
  }

  /// The key a node is stored under: asset and dependency ids, or a fixed key for the root
  pub fn content_key(node: &AssetGraphNode) -> &str {
    match node {
      AssetGraphNode::Root => ROOT_CONTENT_KEY,
      AssetGraphNode::Asset(asset) => &asset.id,
      AssetGraphNode::Dependency(dependency) => &dependency.id,
    }
  }

  /// Entry dependencies connected to the root, in the order they were added
  pub fn get_entry_dependencies(&self) -> Vec<Arc<Dependency>> {
    self
      .graph
      .get_node_ids_connected_from(self.root_node_id)
      .into_iter()
      .filter_map(|node_id| self.get_dependency(node_id).cloned())
      .collect()
  }

  /// Assets a dependency resolved to
  pub fn get_dependency_assets(&self, dependency: &Dependency) -> Vec<Arc<Asset>> {
    let Some(node_id) = self.graph.get_node_id_by_content_key(&dependency.id) else {
      return Vec::new();
    };

    self
      .graph
      .get_node_ids_connected_from(node_id)
      .into_iter()
      .filter_map(|node_id| self.get_asset(node_id).cloned())
      .collect()
  }

  /// Dependencies that resolved to the given asset
  pub fn get_incoming_dependencies(&self, asset: &Asset) -> Vec<Arc<Dependency>> {
    let Some(node_id) = self.graph.get_node_id_by_content_key(&asset.id) else {
      return Vec::new();
    };

    self
      .graph
      .get_node_ids_connected_to(node_id)
      .into_iter()
      .filter_map(|node_id| self.get_dependency(node_id).cloned())
      .collect()
  }

  /// Dependencies declared by the given asset
  pub fn get_outgoing_dependencies(&self, asset: &Asset) -> Vec<Arc<Dependency>> {
    let Some(node_id) = self.graph.get_node_id_by_content_key(&asset.id) else {
      return Vec::new();
    };

    self
      .graph
      .get_node_ids_connected_from(node_id)
      .into_iter()
      .filter_map(|node_id| self.get_dependency(node_id).cloned())
      .collect()
  }

  /// Depth-first traversal from the root
  pub fn traverse<V>(&self, visitor: &mut V) -> anyhow::Result<()>
  where
    V: GraphVisitor<AssetGraphNode> + ?Sized,
  {
    self.graph.dfs(self.root_node_id, visitor)
  }

  /// Depth-first traversal starting at the node with the given content key
  pub fn traverse_from<V>(&self, content_key: &str, visitor: &mut V) -> anyhow::Result<()>
  where
    V: GraphVisitor<AssetGraphNode> + ?Sized,
  {
    let start = self
      .graph
      .get_node_id_by_content_key(content_key)
      .ok_or_else(|| anyhow!("{content_key} is not in the asset graph"))?;

    self.graph.dfs(start, visitor)
  }
}
