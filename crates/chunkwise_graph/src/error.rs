use thiserror::Error;

use crate::NodeId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("Node {0} does not exist in the graph")]
  MissingNode(NodeId),

  #[error("Graph contains a cycle through node {0}")]
  Cycle(NodeId),

  #[error("Content key {0} already exists in the graph")]
  DuplicateContentKey(String),
}
