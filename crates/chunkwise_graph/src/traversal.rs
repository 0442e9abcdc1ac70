use crate::Graph;
use crate::GraphError;
use crate::NodeId;

/// Returned by a visitor to control how a traversal continues
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalAction {
  #[default]
  Continue,
  /// Do not descend into the children of the node just entered
  SkipChildren,
  /// Abort the whole traversal
  Stop,
}

/// Receives enter and exit events from a depth-first traversal.
///
/// `parent` is the node the traversal came from, which is `None` for the start node.
pub trait GraphVisitor<N> {
  fn enter(
    &mut self,
    node_id: NodeId,
    node: &N,
    parent: Option<NodeId>,
  ) -> anyhow::Result<TraversalAction>;

  fn exit(&mut self, _node_id: NodeId, _node: &N) -> anyhow::Result<()> {
    Ok(())
  }
}

impl<N, F> GraphVisitor<N> for F
where
  F: FnMut(NodeId, &N, Option<NodeId>) -> anyhow::Result<TraversalAction>,
{
  fn enter(
    &mut self,
    node_id: NodeId,
    node: &N,
    parent: Option<NodeId>,
  ) -> anyhow::Result<TraversalAction> {
    self(node_id, node, parent)
  }
}

enum Step {
  Enter {
    node_id: NodeId,
    parent: Option<NodeId>,
  },
  Exit(NodeId),
}

impl<N, E> Graph<N, E>
where
  E: Copy + PartialEq,
{
  /// Depth-first traversal over outgoing edges starting at `start`.
  ///
  /// Every node is entered at most once. Children are visited in the order their edges were
  /// added, and a node is exited once all of its descendants have been exited.
  pub fn dfs<V>(&self, start: NodeId, visitor: &mut V) -> anyhow::Result<()>
  where
    V: GraphVisitor<N> + ?Sized,
  {
    if !self.has_node(start) {
      return Err(GraphError::MissingNode(start).into());
    }

    let mut visited = vec![false; self.node_ids().into_iter().max().map_or(0, |max| max + 1)];
    let mut stack = vec![Step::Enter {
      node_id: start,
      parent: None,
    }];

    while let Some(step) = stack.pop() {
      match step {
        Step::Enter { node_id, parent } => {
          if visited[node_id] {
            continue;
          }
          visited[node_id] = true;

          let Some(node) = self.get_node(node_id) else {
            continue;
          };

          let action = visitor.enter(node_id, node, parent)?;
          if action == TraversalAction::Stop {
            return Ok(());
          }

          stack.push(Step::Exit(node_id));

          if action == TraversalAction::Continue {
            for child in self.get_node_ids_connected_from(node_id).into_iter().rev() {
              if !visited[child] {
                stack.push(Step::Enter {
                  node_id: child,
                  parent: Some(node_id),
                });
              }
            }
          }
        }
        Step::Exit(node_id) => {
          if let Some(node) = self.get_node(node_id) {
            visitor.exit(node_id, node)?;
          }
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[derive(Default)]
  struct Recorder {
    events: Vec<String>,
    skip: Option<&'static str>,
  }

  impl GraphVisitor<&'static str> for Recorder {
    fn enter(
      &mut self,
      _node_id: NodeId,
      node: &&'static str,
      _parent: Option<NodeId>,
    ) -> anyhow::Result<TraversalAction> {
      self.events.push(format!("enter {node}"));
      if self.skip == Some(*node) {
        return Ok(TraversalAction::SkipChildren);
      }
      Ok(TraversalAction::Continue)
    }

    fn exit(&mut self, _node_id: NodeId, node: &&'static str) -> anyhow::Result<()> {
      self.events.push(format!("exit {node}"));
      Ok(())
    }
  }

  fn diamond() -> (Graph<&'static str, ()>, NodeId) {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    let b = graph.add_node("b");
    let c = graph.add_node("c");
    let d = graph.add_node("d");
    graph.add_edge(a, b, ()).unwrap();
    graph.add_edge(a, c, ()).unwrap();
    graph.add_edge(b, d, ()).unwrap();
    graph.add_edge(c, d, ()).unwrap();
    (graph, a)
  }

  #[test]
  fn dfs_enters_each_node_once_and_exits_after_descendants() {
    let (graph, a) = diamond();
    let mut recorder = Recorder::default();

    graph.dfs(a, &mut recorder).unwrap();

    assert_eq!(
      recorder.events,
      vec![
        "enter a", "enter b", "enter d", "exit d", "exit b", "enter c", "exit c", "exit a"
      ]
    );
  }

  #[test]
  fn dfs_skip_children_still_exits_the_node() {
    let (graph, a) = diamond();
    let mut recorder = Recorder {
      skip: Some("b"),
      ..Recorder::default()
    };

    graph.dfs(a, &mut recorder).unwrap();

    assert_eq!(
      recorder.events,
      vec![
        "enter a", "enter b", "exit b", "enter c", "enter d", "exit d", "exit c", "exit a"
      ]
    );
  }

  #[test]
  fn dfs_reports_parents_and_stops() {
    let (graph, a) = diamond();
    let mut entered = Vec::new();

    graph
      .dfs(a, &mut |node_id, node: &&'static str, parent| {
        entered.push((*node, parent));
        if node_id == 3 {
          return Ok(TraversalAction::Stop);
        }
        Ok(TraversalAction::Continue)
      })
      .unwrap();

    assert_eq!(entered, vec![("a", None), ("b", Some(0)), ("d", Some(1))]);
  }

  #[test]
  fn dfs_propagates_visitor_errors() {
    let (graph, a) = diamond();

    let result = graph.dfs(a, &mut |_node_id, node: &&str, _parent| {
      anyhow::ensure!(*node != "c", "unexpected node {node}");
      Ok(TraversalAction::Continue)
    });

    assert_eq!(result.unwrap_err().to_string(), "unexpected node c");
  }
}
