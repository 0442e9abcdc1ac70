use std::sync::Arc;

use anyhow::Context;
use chunkwise_core::asset_graph::AssetGraphNode;
use chunkwise_core::types::Asset;
use chunkwise_core::types::SpecifierType;
use chunkwise_graph::NodeId;
use chunkwise_graph::TraversalAction;
use tracing::debug;
use tracing::instrument;

use super::builder::AsyncRootNode;
use super::builder::IdealGraphBuilder;
use super::builder::ROOT_CONTENT_KEY;
use super::types::BundleRoot;

impl IdealGraphBuilder<'_> {
  /// Finds the assets each bundle root reaches synchronously and connects bundle groups to the
  /// async bundles they load
  #[instrument(level = "debug", skip_all)]
  pub(super) fn compute_reachability(&mut self) -> anyhow::Result<()> {
    for (asset_id, bundle_root) in &self.ideal.bundle_roots {
      if bundle_root.is_bundle_group() {
        self.async_root_graph.add_node_by_content_key_if_needed(
          asset_id.clone(),
          AsyncRootNode::BundleRoot(bundle_root.asset.clone()),
        );
      }
    }

    let bundle_roots = self.ideal.bundle_roots.values().cloned().collect::<Vec<_>>();
    for bundle_root in bundle_roots {
      self.compute_reachability_from(&bundle_root)?;
    }

    let async_root = self.async_root_node_id()?;
    for asset_id in self.entries.keys() {
      let entry_node_id = self
        .async_root_graph
        .get_node_id_by_content_key(asset_id)
        .with_context(|| format!("entry {asset_id} is missing from the async bundle graph"))?;

      self
        .async_root_graph
        .add_edge(async_root, entry_node_id, ())?;
    }

    debug!(
      reachable_edges = self.reachable_roots.edge_count(),
      async_edges = self.async_root_graph.edge_count(),
      "ideal graph: computed reachability"
    );
    Ok(())
  }

  fn compute_reachability_from(&mut self, bundle_root: &BundleRoot) -> anyhow::Result<()> {
    let root_id = &bundle_root.asset.id;
    let root_node_id = self
      .reachable_roots
      .add_node_by_content_key_if_needed(root_id.clone(), bundle_root.asset.clone());

    // Async bundles loaded from a sibling bundle are loaded on behalf of its bundle group
    let group_root_id = if bundle_root.is_bundle_group() {
      root_id.clone()
    } else {
      self
        .ideal
        .bundle(bundle_root.bundle_group_id)?
        .root_asset_id()
        .map(String::from)
        .with_context(|| format!("bundle group of {root_id} has no root asset"))?
    };

    let mut reached: Vec<Arc<Asset>> = Vec::new();
    let mut async_children: Vec<(bool, Arc<Asset>)> = Vec::new();
    let asset_graph = self.asset_graph;
    let ideal = &self.ideal;

    asset_graph.traverse_from(
      root_id,
      &mut |_node_id: NodeId,
            node: &AssetGraphNode,
            _parent: Option<NodeId>|
       -> anyhow::Result<TraversalAction> {
        match node {
          AssetGraphNode::Root => Ok(TraversalAction::Continue),
          AssetGraphNode::Dependency(dependency) => {
            // Dependencies resolving into another bundle
            if !ideal
              .dependency_bundle_graph
              .has_content_key(&dependency.id)
            {
              return Ok(TraversalAction::Continue);
            }

            if dependency.is_async() {
              for child in asset_graph.get_dependency_assets(dependency) {
                let Some(child_root) = ideal.bundle_roots.get(&child.id) else {
                  continue;
                };

                if !child_root.is_bundle_group()
                  || ideal.bundle(child_root.bundle_id)?.is_inline_or_isolated()
                {
                  continue;
                }

                async_children.push((dependency.specifier_type == SpecifierType::Url, child));
              }
            }

            Ok(TraversalAction::SkipChildren)
          }
          AssetGraphNode::Asset(asset) => {
            if asset.id == *root_id {
              return Ok(TraversalAction::Continue);
            }

            reached.push(asset.clone());

            // Other bundle roots are recorded so placement can load them with this bundle, but
            // their assets belong to them
            if ideal.bundle_roots.contains_key(&asset.id) {
              Ok(TraversalAction::SkipChildren)
            } else {
              Ok(TraversalAction::Continue)
            }
          }
        }
      },
    )?;

    for asset in reached {
      let asset_node_id = self
        .reachable_roots
        .add_node_by_content_key_if_needed(asset.id.clone(), asset);
      self
        .reachable_roots
        .add_edge(root_node_id, asset_node_id, ())?;
    }

    let async_root = self.async_root_node_id()?;
    let parent_node_id = self
      .async_root_graph
      .get_node_id_by_content_key(&group_root_id)
      .with_context(|| format!("{group_root_id} is missing from the async bundle graph"))?;

    for (is_url, child) in async_children {
      let child_node_id = self
        .async_root_graph
        .get_node_id_by_content_key(&child.id)
        .with_context(|| format!("{} is missing from the async bundle graph", child.id))?;

      // Bundles referenced by url are loaded independently of the bundle referencing them
      let from = if is_url { async_root } else { parent_node_id };
      if from != child_node_id {
        self.async_root_graph.add_edge(from, child_node_id, ())?;
      }
    }

    Ok(())
  }

  pub(super) fn async_root_node_id(&self) -> anyhow::Result<NodeId> {
    self
      .async_root_graph
      .get_node_id_by_content_key(ROOT_CONTENT_KEY)
      .context("async bundle graph has no root")
  }
}
