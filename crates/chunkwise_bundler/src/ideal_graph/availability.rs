use anyhow::Context;
use chunkwise_core::types::AssetId;
use chunkwise_graph::NodeId;
use indexmap::IndexMap;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::builder::AsyncRootNode;
use super::builder::IdealGraphBuilder;
use super::types::intersect_available_assets;
use super::types::Availability;
use super::types::AvailableAssets;

impl IdealGraphBuilder<'_> {
  /// Computes the assets each async bundle can rely on being loaded, walking bundle groups
  /// parents first
  #[instrument(level = "debug", skip_all)]
  pub(super) fn propagate_availability(&mut self) -> anyhow::Result<()> {
    let order = self
      .async_root_graph
      .topo_sort()
      .context("async bundle roots form a cycle")?;

    for node_id in order {
      let Some(AsyncRootNode::BundleRoot(asset)) = self.async_root_graph.get_node(node_id) else {
        continue;
      };

      let asset_id = asset.id.clone();
      self.propagate_from_bundle_group(node_id, &asset_id)?;
    }

    debug!(
      bundle_roots_with_ancestors = self.ancestor_assets.len(),
      "ideal graph: propagated availability"
    );
    Ok(())
  }

  fn propagate_from_bundle_group(
    &mut self,
    node_id: NodeId,
    group_root_id: &str,
  ) -> anyhow::Result<()> {
    let bundle_group_id = self.bundle_root(group_root_id)?.bundle_group_id;
    let group_bundle_ids = self.ideal.bundles_in_group(bundle_group_id)?;

    // Count how many bundles of the group load each asset
    let mut refs: IndexMap<AssetId, u32> = IndexMap::new();
    for bundle_id in &group_bundle_ids {
      let bundle = self.ideal.bundle(*bundle_id)?;
      if bundle.is_inline_or_isolated() {
        continue;
      }

      let Some(root_id) = bundle.root_asset_id() else {
        continue;
      };

      *refs.entry(root_id.to_string()).or_default() += 1;
      for asset in self.reachable_assets_of(root_id) {
        *refs.entry(asset.id.clone()).or_default() += 1;
      }
    }

    let ancestry = self
      .ancestor_assets
      .get(group_root_id)
      .cloned()
      .unwrap_or_default();

    // Everything loaded by the group is available to the bundles it loads asynchronously
    let mut combined = ancestry.clone();
    for asset_id in refs.keys() {
      combined.insert(asset_id.clone(), Availability::Always);
    }

    // Assets loaded by several bundles of the group can be left to one of them
    let mut siblings = ancestry;
    for (asset_id, count) in &refs {
      if *count > 1 {
        siblings
          .entry(asset_id.clone())
          .or_insert_with(|| Availability::Conditional(vec![group_root_id.to_string()]));
      }
    }

    for bundle_id in &group_bundle_ids {
      let bundle = self.ideal.bundle(*bundle_id)?;
      if bundle.is_inline_or_isolated() {
        continue;
      }

      let Some(root_id) = bundle.root_asset_id() else {
        continue;
      };

      let Some(bundle_root) = self.ideal.bundle_roots.get(root_id) else {
        continue;
      };

      if bundle_root.is_bundle_group() || bundle_root.bundle_group_id != bundle_group_id {
        continue;
      }

      let root_id = root_id.to_string();
      merge_ancestry(&mut self.ancestor_assets, &root_id, &siblings);
    }

    let group_bundle = self.ideal.bundle(bundle_group_id)?;
    let group_context = group_bundle.env.context;

    for child_node_id in self.async_root_graph.get_node_ids_connected_from(node_id) {
      let Some(AsyncRootNode::BundleRoot(child)) = self.async_root_graph.get_node(child_node_id)
      else {
        continue;
      };

      // Entries always load on their own
      if self.entries.contains_key(&child.id) {
        continue;
      }

      let incoming = if child.env.context == group_context && !child.env.context.is_isolated() {
        combined.clone()
      } else {
        AvailableAssets::new()
      };

      trace!(
        parent = %group_root_id,
        child = %child.id,
        available = incoming.len(),
        "Propagating available assets"
      );
      merge_ancestry(&mut self.ancestor_assets, &child.id, &incoming);
    }

    self
      .asset_refs_in_bundle_group
      .insert(group_root_id.to_string(), refs);

    Ok(())
  }
}

/// Sets the ancestry of a bundle root the first time, and intersects it with every later path
fn merge_ancestry(
  ancestor_assets: &mut IndexMap<AssetId, AvailableAssets>,
  root_id: &str,
  incoming: &AvailableAssets,
) {
  match ancestor_assets.get_mut(root_id) {
    Some(current) => intersect_available_assets(current, incoming),
    None => {
      ancestor_assets.insert(root_id.to_string(), incoming.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use chunkwise_core::asset_graph::AssetGraph;
  use chunkwise_core::test_utils::TestAssetGraph;
  use chunkwise_core::types::BundleBehavior;
  use chunkwise_core::types::DependencyBuilder;
  use pretty_assertions::assert_eq;

  use crate::ideal_graph::types::IdealGraphBuildOptions;

  use super::*;

  fn availability(asset_graph: &AssetGraph) -> anyhow::Result<IdealGraphBuilder<'_>> {
    let mut builder = IdealGraphBuilder::new(asset_graph, IdealGraphBuildOptions::default());
    builder.create_entry_bundles()?;
    builder.create_bundle_roots()?;
    builder.compute_reachability()?;
    builder.propagate_availability()?;
    Ok(builder)
  }

  fn available(builder: &IdealGraphBuilder<'_>, root_id: &str) -> Vec<(String, Availability)> {
    builder
      .ancestor_assets
      .get(root_id)
      .map(|assets| {
        assets
          .iter()
          .map(|(asset_id, availability)| (asset_id.clone(), availability.clone()))
          .collect()
      })
      .unwrap_or_default()
  }

  #[test]
  fn async_bundles_inherit_assets_of_their_parent_group() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let react = graph.add_asset(TestAssetGraph::asset("react.js", 10));
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    let nested = graph.add_asset(TestAssetGraph::asset("nested.js", 10));
    graph.sync(&index, &react);
    graph.lazy(&index, &page);
    graph.lazy(&page, &nested);
    let asset_graph = graph.build();

    let builder = availability(&asset_graph).unwrap();

    assert!(available(&builder, "index.js").is_empty());
    assert_eq!(
      available(&builder, "page.js"),
      vec![
        (String::from("index.js"), Availability::Always),
        (String::from("react.js"), Availability::Always),
      ]
    );
    assert_eq!(
      available(&builder, "nested.js"),
      vec![
        (String::from("index.js"), Availability::Always),
        (String::from("react.js"), Availability::Always),
        (String::from("page.js"), Availability::Always),
      ]
    );
  }

  #[test]
  fn availability_is_intersected_across_parents() {
    let mut graph = TestAssetGraph::new();
    let a = graph.entry("a.js", 10);
    let b = graph.entry("b.js", 10);
    let common = graph.add_asset(TestAssetGraph::asset("common.js", 10));
    let only_a = graph.add_asset(TestAssetGraph::asset("only-a.js", 10));
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    graph.sync(&a, &common);
    graph.sync(&a, &only_a);
    graph.sync(&b, &common);
    graph.lazy(&a, &page);
    graph.lazy(&b, &page);
    let asset_graph = graph.build();

    let builder = availability(&asset_graph).unwrap();

    assert_eq!(
      available(&builder, "page.js"),
      vec![(String::from("common.js"), Availability::Always)]
    );
  }

  #[test]
  fn assets_shared_by_sibling_bundles_are_conditionally_available() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let a = graph.add_asset(TestAssetGraph::asset("a.css", 10));
    let b = graph.add_asset(TestAssetGraph::asset("b.css", 10));
    let common = graph.add_asset(TestAssetGraph::asset("common.css", 10));
    graph.sync(&index, &a);
    graph.sync(&index, &b);
    graph.sync(&a, &common);
    graph.sync(&b, &common);
    let asset_graph = graph.build();

    let builder = availability(&asset_graph).unwrap();
    let conditional = Availability::Conditional(vec![String::from("index.js")]);

    assert_eq!(builder.asset_refs_in_bundle_group["index.js"]["common.css"], 2);
    assert_eq!(
      available(&builder, "a.css"),
      vec![(String::from("common.css"), conditional.clone())]
    );
    assert_eq!(
      available(&builder, "b.css"),
      vec![(String::from("common.css"), conditional)]
    );
    assert!(available(&builder, "index.js").is_empty());
  }

  #[test]
  fn inline_bundles_do_not_count_as_group_references() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let inline = graph.add_asset(TestAssetGraph::asset("inline.js", 10));
    let util = graph.add_asset(TestAssetGraph::asset("util.js", 10));
    graph.sync(&index, &util);
    graph.dependency(
      &index,
      &inline,
      DependencyBuilder::default().bundle_behavior(BundleBehavior::Inline),
    );
    graph.sync(&inline, &util);
    let asset_graph = graph.build();

    let builder = availability(&asset_graph).unwrap();
    let refs = &builder.asset_refs_in_bundle_group["index.js"];

    assert_eq!(refs["util.js"], 1);
    assert!(!refs.contains_key("inline.js"));
    assert!(available(&builder, "inline.js").is_empty());
  }

  #[test]
  fn workers_do_not_inherit_assets_from_the_page() {
    use std::sync::Arc;

    use chunkwise_core::types::Environment;
    use chunkwise_core::types::EnvironmentContext;

    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let util = graph.add_asset(TestAssetGraph::asset("util.js", 10));
    let mut worker = TestAssetGraph::asset("worker.js", 10);
    worker.env = Arc::new(Environment {
      context: EnvironmentContext::WebWorker,
      ..Environment::default()
    });
    let worker = graph.add_asset(worker);
    graph.sync(&index, &util);
    graph.lazy(&index, &worker);
    let asset_graph = graph.build();

    let builder = availability(&asset_graph).unwrap();

    assert!(available(&builder, "worker.js").is_empty());
  }

  #[test]
  fn cyclic_async_imports_are_rejected() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let a = graph.add_asset(TestAssetGraph::asset("a.js", 10));
    let b = graph.add_asset(TestAssetGraph::asset("b.js", 10));
    graph.lazy(&index, &a);
    graph.lazy(&a, &b);
    graph.lazy(&b, &a);
    let asset_graph = graph.build();

    let error = availability(&asset_graph).err().unwrap();

    assert_eq!(error.to_string(), "async bundle roots form a cycle");
  }
}
