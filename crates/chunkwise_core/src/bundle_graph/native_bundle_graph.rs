use std::sync::Arc;

use anyhow::anyhow;
use anyhow::Context;
use chunkwise_graph::ContentGraph;
use chunkwise_graph::NodeId;
use tracing::trace;

use crate::asset_graph::AssetGraph;
use crate::asset_graph::AssetGraphNode;
use crate::hash::hash_string;
use crate::types::Asset;
use crate::types::Bundle;
use crate::types::BundleGroup;
use crate::types::BundleGroupId;
use crate::types::BundleId;
use crate::types::Dependency;
use crate::types::Priority;
use crate::types::Target;

use super::BundleGraph;
use super::CreateBundleOptions;
use super::MutableBundleGraph;

/// Edge types in the native bundle graph
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum NativeBundleGraphEdgeType {
  /// Edges copied from the asset graph
  #[default]
  Null = 1,
  /// Bundle to the assets and dependencies it holds
  Contains = 2,
  /// Root or bundle group to the bundles it loads
  Bundle = 3,
  /// Runtime references between bundles, and from dependencies to what they reference
  References = 4,
  /// Bundle to async dependencies that resolve within the bundle
  InternalAsync = 5,
}

#[derive(Clone, Debug, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum NativeBundleGraphNode {
  Root,
  Asset(Arc<Asset>),
  Dependency(Arc<Dependency>),
  BundleGroup(BundleGroup),
  Bundle(Bundle),
}

/// Bundle graph backed by a copy of the asset graph.
///
/// Assets and dependencies keep their ids as content keys; bundles and bundle groups are keyed by
/// their generated ids.
#[derive(Clone, Debug)]
pub struct NativeBundleGraph {
  asset_graph: AssetGraph,
  graph: ContentGraph<NativeBundleGraphNode, NativeBundleGraphEdgeType>,
  root_node_id: NodeId,
}

impl NativeBundleGraph {
  pub fn from_asset_graph(asset_graph: AssetGraph) -> anyhow::Result<Self> {
    let mut graph = ContentGraph::new();
    let mut root_node_id = 0;

    for (_, node) in asset_graph.nodes() {
      let content_key = AssetGraph::content_key(node);
      let node_id = graph.add_node_by_content_key(
        content_key,
        match node {
          AssetGraphNode::Root => NativeBundleGraphNode::Root,
          AssetGraphNode::Asset(asset) => NativeBundleGraphNode::Asset(asset.clone()),
          AssetGraphNode::Dependency(dependency) => {
            NativeBundleGraphNode::Dependency(dependency.clone())
          }
        },
      )?;

      if matches!(node, AssetGraphNode::Root) {
        root_node_id = node_id;
      }
    }

    for (from, to) in asset_graph.edges() {
      let (Some(from), Some(to)) = (asset_graph.get_node(from), asset_graph.get_node(to)) else {
        continue;
      };

      let from = graph
        .get_node_id_by_content_key(AssetGraph::content_key(from))
        .context("Asset graph node was not copied")?;
      let to = graph
        .get_node_id_by_content_key(AssetGraph::content_key(to))
        .context("Asset graph node was not copied")?;

      graph.add_edge(from, to, NativeBundleGraphEdgeType::Null)?;
    }

    Ok(NativeBundleGraph {
      asset_graph,
      graph,
      root_node_id,
    })
  }

  fn node_id(&self, content_key: &str) -> anyhow::Result<NodeId> {
    self
      .graph
      .get_node_id_by_content_key(content_key)
      .ok_or_else(|| anyhow!("{content_key} not found in bundle graph"))
  }

  fn add_edge(
    &mut self,
    from: &str,
    to: &str,
    edge_type: NativeBundleGraphEdgeType,
  ) -> anyhow::Result<()> {
    let from = self.node_id(from)?;
    let to = self.node_id(to)?;
    self.graph.add_edge(from, to, edge_type)?;
    Ok(())
  }

  fn bundles_connected_from(
    &self,
    node_id: NodeId,
    edge_type: NativeBundleGraphEdgeType,
  ) -> Vec<&Bundle> {
    self
      .graph
      .get_node_ids_connected_from_by_type(node_id, edge_type)
      .into_iter()
      .filter_map(|node_id| match self.graph.get_node(node_id) {
        Some(NativeBundleGraphNode::Bundle(bundle)) => Some(bundle),
        _ => None,
      })
      .collect()
  }
}

impl BundleGraph for NativeBundleGraph {
  fn get_bundles(&self) -> Vec<&Bundle> {
    self
      .graph
      .nodes()
      .filter_map(|(_, node)| match node {
        NativeBundleGraphNode::Bundle(bundle) => Some(bundle),
        _ => None,
      })
      .collect()
  }

  fn get_bundle_by_id(&self, id: &str) -> Option<&Bundle> {
    match self.graph.get_node_by_content_key(id)? {
      NativeBundleGraphNode::Bundle(bundle) => Some(bundle),
      _ => None,
    }
  }

  fn get_bundle_assets(&self, bundle: &Bundle) -> anyhow::Result<Vec<&Arc<Asset>>> {
    let bundle_node_id = self.node_id(&bundle.id)?;

    Ok(
      self
        .graph
        .get_node_ids_connected_from_by_type(bundle_node_id, NativeBundleGraphEdgeType::Contains)
        .into_iter()
        .filter_map(|node_id| match self.graph.get_node(node_id) {
          Some(NativeBundleGraphNode::Asset(asset)) => Some(asset),
          _ => None,
        })
        .collect(),
    )
  }

  fn get_bundle_groups(&self) -> Vec<&BundleGroup> {
    self
      .graph
      .nodes()
      .filter_map(|(_, node)| match node {
        NativeBundleGraphNode::BundleGroup(bundle_group) => Some(bundle_group),
        _ => None,
      })
      .collect()
  }

  fn get_bundles_in_bundle_group(&self, bundle_group: &BundleGroup) -> anyhow::Result<Vec<&Bundle>> {
    let bundle_group_node_id = self.node_id(&bundle_group.id)?;
    Ok(self.bundles_connected_from(bundle_group_node_id, NativeBundleGraphEdgeType::Bundle))
  }

  fn get_referenced_bundles(&self, bundle: &Bundle) -> anyhow::Result<Vec<&Bundle>> {
    let bundle_node_id = self.node_id(&bundle.id)?;
    Ok(self.bundles_connected_from(bundle_node_id, NativeBundleGraphEdgeType::References))
  }

  fn is_dependency_internalized(&self, bundle: &Bundle, dependency: &Dependency) -> bool {
    match (self.node_id(&bundle.id), self.node_id(&dependency.id)) {
      (Ok(bundle_node_id), Ok(dependency_node_id)) => self.graph.has_edge(
        bundle_node_id,
        dependency_node_id,
        NativeBundleGraphEdgeType::InternalAsync,
      ),
      _ => false,
    }
  }

  fn get_asset_reference_bundles(&self, dependency: &Dependency) -> Vec<&Bundle> {
    match self.node_id(&dependency.id) {
      Ok(dependency_node_id) => {
        self.bundles_connected_from(dependency_node_id, NativeBundleGraphEdgeType::References)
      }
      Err(_) => Vec::new(),
    }
  }
}

impl MutableBundleGraph for NativeBundleGraph {
  fn asset_graph(&self) -> &AssetGraph {
    &self.asset_graph
  }

  fn create_bundle(&mut self, options: CreateBundleOptions) -> anyhow::Result<BundleId> {
    let bundle = match options {
      CreateBundleOptions::Entry {
        entry_asset,
        target,
        needs_stable_name,
        bundle_behavior,
      } => Bundle {
        id: hash_string(format!(
          "bundle:{}{}",
          entry_asset.id,
          target.dist_dir.display()
        )),
        bundle_behavior,
        bundle_type: entry_asset.file_type.clone(),
        env: entry_asset.env.clone(),
        entry_asset_ids: vec![entry_asset.id.clone()],
        main_entry_id: Some(entry_asset.id.clone()),
        needs_stable_name,
        target,
        unique_key: None,
      },
      CreateBundleOptions::Shared {
        unique_key,
        bundle_type,
        env,
        target,
        needs_stable_name,
        bundle_behavior,
      } => Bundle {
        id: hash_string(format!("bundle:{}{}", unique_key, target.dist_dir.display())),
        bundle_behavior,
        bundle_type,
        env,
        entry_asset_ids: Vec::new(),
        main_entry_id: None,
        needs_stable_name,
        target,
        unique_key: Some(unique_key),
      },
    };

    let bundle_id = bundle.id.clone();
    if !self.graph.has_content_key(&bundle_id) {
      trace!(%bundle_id, "Creating bundle");
      self
        .graph
        .add_node_by_content_key(bundle_id.clone(), NativeBundleGraphNode::Bundle(bundle))?;
    }

    Ok(bundle_id)
  }

  fn create_bundle_group(
    &mut self,
    dependency: &Dependency,
    target: &Target,
  ) -> anyhow::Result<BundleGroupId> {
    let resolved = self
      .asset_graph
      .get_dependency_assets(dependency)
      .into_iter()
      .next()
      .ok_or_else(|| {
        anyhow!(
          "Dependency {} did not resolve to an asset",
          dependency.specifier
        )
      })?;

    let bundle_group_id = format!("bundle_group:{}{}", target.name, resolved.id);
    let bundle_group_node_id = self.graph.add_node_by_content_key_if_needed(
      bundle_group_id.clone(),
      NativeBundleGraphNode::BundleGroup(BundleGroup {
        id: bundle_group_id.clone(),
        entry_asset_id: resolved.id.clone(),
        target: target.clone(),
      }),
    );

    let dependency_node_id = self.node_id(&dependency.id)?;
    self.graph.add_edge(
      dependency_node_id,
      bundle_group_node_id,
      NativeBundleGraphEdgeType::Null,
    )?;

    if dependency.is_entry {
      self.graph.add_edge(
        self.root_node_id,
        bundle_group_node_id,
        NativeBundleGraphEdgeType::Bundle,
      )?;
    }

    Ok(bundle_group_id)
  }

  fn add_asset_to_bundle(&mut self, asset: &Asset, bundle_id: &BundleId) -> anyhow::Result<()> {
    self.add_edge(bundle_id, &asset.id, NativeBundleGraphEdgeType::Contains)?;

    for dependency in self.asset_graph.get_outgoing_dependencies(asset) {
      self.add_edge(
        bundle_id,
        &dependency.id,
        NativeBundleGraphEdgeType::Contains,
      )?;
    }

    Ok(())
  }

  fn add_bundle_to_bundle_group(
    &mut self,
    bundle_id: &BundleId,
    bundle_group_id: &BundleGroupId,
  ) -> anyhow::Result<()> {
    self.add_edge(
      bundle_group_id,
      bundle_id,
      NativeBundleGraphEdgeType::Bundle,
    )
  }

  fn internalize_async_dependency(
    &mut self,
    bundle_id: &BundleId,
    dependency: &Dependency,
  ) -> anyhow::Result<()> {
    anyhow::ensure!(
      dependency.priority != Priority::Sync,
      "Expected an async dependency, got a sync import of {}",
      dependency.specifier
    );

    self.add_edge(
      bundle_id,
      &dependency.id,
      NativeBundleGraphEdgeType::InternalAsync,
    )
  }

  fn create_asset_reference(
    &mut self,
    dependency: &Dependency,
    asset: &Asset,
    bundle_id: &BundleId,
  ) -> anyhow::Result<()> {
    self.add_edge(
      &dependency.id,
      &asset.id,
      NativeBundleGraphEdgeType::References,
    )?;
    self.add_edge(
      &dependency.id,
      bundle_id,
      NativeBundleGraphEdgeType::References,
    )
  }

  fn create_bundle_reference(&mut self, from: &BundleId, to: &BundleId) -> anyhow::Result<()> {
    self.add_edge(from, to, NativeBundleGraphEdgeType::References)
  }

  fn has_dependency(&self, bundle_id: &BundleId, dependency: &Dependency) -> bool {
    match (self.node_id(bundle_id), self.node_id(&dependency.id)) {
      (Ok(bundle_node_id), Ok(dependency_node_id)) => self.graph.has_edge(
        bundle_node_id,
        dependency_node_id,
        NativeBundleGraphEdgeType::Contains,
      ),
      _ => false,
    }
  }
}
