use petgraph::algo::has_path_connecting;
use petgraph::algo::toposort;
use petgraph::stable_graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use petgraph::Direction;

use crate::GraphError;
use crate::NodeId;

/// A directed graph with typed edges.
///
/// At most one edge of each type exists between two nodes. Neighbour queries return nodes in
/// the order their edges were added.
#[derive(Clone, Debug)]
pub struct Graph<N, E> {
  graph: StableDiGraph<N, E>,
  root_node_id: Option<NodeId>,
}

impl<N, E> Default for Graph<N, E> {
  fn default() -> Self {
    Self {
      graph: StableDiGraph::default(),
      root_node_id: None,
    }
  }
}

impl<N, E> Graph<N, E>
where
  E: Copy + PartialEq,
{
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node(&mut self, node: N) -> NodeId {
    self.graph.add_node(node).index()
  }

  pub fn has_node(&self, node_id: NodeId) -> bool {
    self.graph.contains_node(NodeIndex::new(node_id))
  }

  pub fn get_node(&self, node_id: NodeId) -> Option<&N> {
    self.graph.node_weight(NodeIndex::new(node_id))
  }

  pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut N> {
    self.graph.node_weight_mut(NodeIndex::new(node_id))
  }

  /// Removes a node along with every edge touching it
  pub fn remove_node(&mut self, node_id: NodeId) -> Option<N> {
    if self.root_node_id == Some(node_id) {
      self.root_node_id = None;
    }

    self.graph.remove_node(NodeIndex::new(node_id))
  }

  pub fn root_node_id(&self) -> Option<NodeId> {
    self.root_node_id
  }

  pub fn set_root_node_id(&mut self, node_id: NodeId) {
    self.root_node_id = Some(node_id);
  }

  pub fn node_count(&self) -> usize {
    self.graph.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
    self
      .graph
      .node_indices()
      .filter_map(|index| Some((index.index(), self.graph.node_weight(index)?)))
  }

  pub fn node_ids(&self) -> Vec<NodeId> {
    self.graph.node_indices().map(|index| index.index()).collect()
  }

  /// Adds an edge, returning false when an edge of the same type already connects the nodes
  pub fn add_edge(&mut self, from: NodeId, to: NodeId, edge_type: E) -> Result<bool, GraphError> {
    for node_id in [from, to] {
      if !self.has_node(node_id) {
        return Err(GraphError::MissingNode(node_id));
      }
    }

    if self.has_edge(from, to, edge_type) {
      return Ok(false);
    }

    self
      .graph
      .add_edge(NodeIndex::new(from), NodeIndex::new(to), edge_type);

    Ok(true)
  }

  pub fn has_edge(&self, from: NodeId, to: NodeId, edge_type: E) -> bool {
    if !self.has_node(from) || !self.has_node(to) {
      return false;
    }

    self
      .graph
      .edges_connecting(NodeIndex::new(from), NodeIndex::new(to))
      .any(|edge| *edge.weight() == edge_type)
  }

  pub fn remove_edge(&mut self, from: NodeId, to: NodeId, edge_type: E) -> bool {
    if !self.has_node(from) || !self.has_node(to) {
      return false;
    }

    let edge = self
      .graph
      .edges_connecting(NodeIndex::new(from), NodeIndex::new(to))
      .find(|edge| *edge.weight() == edge_type)
      .map(|edge| edge.id());

    match edge {
      Some(edge) => self.graph.remove_edge(edge).is_some(),
      None => false,
    }
  }

  /// Every edge in the graph as `(from, to, type)`
  pub fn edges(&self) -> Vec<(NodeId, NodeId, E)> {
    self
      .graph
      .edge_references()
      .map(|edge| (edge.source().index(), edge.target().index(), *edge.weight()))
      .collect()
  }

  pub fn get_node_ids_connected_from(&self, node_id: NodeId) -> Vec<NodeId> {
    self.neighbors(node_id, Direction::Outgoing, None)
  }

  pub fn get_node_ids_connected_from_by_type(&self, node_id: NodeId, edge_type: E) -> Vec<NodeId> {
    self.neighbors(node_id, Direction::Outgoing, Some(edge_type))
  }

  pub fn get_node_ids_connected_to(&self, node_id: NodeId) -> Vec<NodeId> {
    self.neighbors(node_id, Direction::Incoming, None)
  }

  pub fn get_node_ids_connected_to_by_type(&self, node_id: NodeId, edge_type: E) -> Vec<NodeId> {
    self.neighbors(node_id, Direction::Incoming, Some(edge_type))
  }

  fn neighbors(&self, node_id: NodeId, direction: Direction, edge_type: Option<E>) -> Vec<NodeId> {
    if !self.has_node(node_id) {
      return Vec::new();
    }

    let mut node_ids = Vec::new();
    for edge in self
      .graph
      .edges_directed(NodeIndex::new(node_id), direction)
    {
      if edge_type.is_some_and(|edge_type| *edge.weight() != edge_type) {
        continue;
      }

      let other = match direction {
        Direction::Outgoing => edge.target(),
        Direction::Incoming => edge.source(),
      };

      if !node_ids.contains(&other.index()) {
        node_ids.push(other.index());
      }
    }

    // Edges are stored newest first
    node_ids.reverse();
    node_ids
  }

  /// True when `to` can be reached from `from` by following outgoing edges
  pub fn is_reachable(&self, from: NodeId, to: NodeId) -> bool {
    if !self.has_node(from) || !self.has_node(to) {
      return false;
    }

    has_path_connecting(&self.graph, NodeIndex::new(from), NodeIndex::new(to), None)
  }

  /// Orders all nodes so that every node comes before the nodes it points to
  pub fn topo_sort(&self) -> Result<Vec<NodeId>, GraphError> {
    toposort(&self.graph, None)
      .map(|order| order.into_iter().map(|index| index.index()).collect())
      .map_err(|cycle| GraphError::Cycle(cycle.node_id().index()))
  }
}
