use std::collections::HashMap;
use std::ops::Deref;
use std::ops::DerefMut;

use crate::Graph;
use crate::GraphError;
use crate::NodeId;

/// A [`Graph`] whose nodes can also be looked up by a unique string key
#[derive(Clone, Debug)]
pub struct ContentGraph<N, E> {
  graph: Graph<N, E>,
  content_key_to_node_id: HashMap<String, NodeId>,
  node_id_to_content_key: HashMap<NodeId, String>,
}

impl<N, E> Default for ContentGraph<N, E> {
  fn default() -> Self {
    Self {
      graph: Graph::default(),
      content_key_to_node_id: HashMap::new(),
      node_id_to_content_key: HashMap::new(),
    }
  }
}

impl<N, E> Deref for ContentGraph<N, E> {
  type Target = Graph<N, E>;

  fn deref(&self) -> &Self::Target {
    &self.graph
  }
}

impl<N, E> DerefMut for ContentGraph<N, E> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    &mut self.graph
  }
}

impl<N, E> ContentGraph<N, E>
where
  E: Copy + PartialEq,
{
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_node_by_content_key(
    &mut self,
    content_key: impl Into<String>,
    node: N,
  ) -> Result<NodeId, GraphError> {
    let content_key = content_key.into();
    if self.content_key_to_node_id.contains_key(&content_key) {
      return Err(GraphError::DuplicateContentKey(content_key));
    }

    let node_id = self.graph.add_node(node);
    self
      .content_key_to_node_id
      .insert(content_key.clone(), node_id);
    self.node_id_to_content_key.insert(node_id, content_key);

    Ok(node_id)
  }

  /// Returns the node already stored under `content_key`, adding `node` when there is none
  pub fn add_node_by_content_key_if_needed(
    &mut self,
    content_key: impl Into<String>,
    node: N,
  ) -> NodeId {
    let content_key = content_key.into();
    if let Some(node_id) = self.content_key_to_node_id.get(&content_key) {
      return *node_id;
    }

    let node_id = self.graph.add_node(node);
    self
      .content_key_to_node_id
      .insert(content_key.clone(), node_id);
    self.node_id_to_content_key.insert(node_id, content_key);

    node_id
  }

  pub fn has_content_key(&self, content_key: &str) -> bool {
    self.content_key_to_node_id.contains_key(content_key)
  }

  pub fn get_node_id_by_content_key(&self, content_key: &str) -> Option<NodeId> {
    self.content_key_to_node_id.get(content_key).copied()
  }

  pub fn get_node_by_content_key(&self, content_key: &str) -> Option<&N> {
    self
      .get_node_id_by_content_key(content_key)
      .and_then(|node_id| self.graph.get_node(node_id))
  }

  pub fn get_content_key(&self, node_id: NodeId) -> Option<&str> {
    self.node_id_to_content_key.get(&node_id).map(String::as_str)
  }

  /// Removes a node, its edges and its content key
  pub fn remove_node(&mut self, node_id: NodeId) -> Option<N> {
    if let Some(content_key) = self.node_id_to_content_key.remove(&node_id) {
      self.content_key_to_node_id.remove(&content_key);
    }

    self.graph.remove_node(node_id)
  }

  pub fn remove_node_by_content_key(&mut self, content_key: &str) -> Option<N> {
    let node_id = self.get_node_id_by_content_key(content_key)?;
    self.remove_node(node_id)
  }
}
