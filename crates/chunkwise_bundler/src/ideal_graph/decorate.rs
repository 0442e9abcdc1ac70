use anyhow::Context;
use chunkwise_core::bundle_graph::CreateBundleOptions;
use chunkwise_core::bundle_graph::MutableBundleGraph;
use chunkwise_core::types::BundleGroupId;
use chunkwise_core::types::BundleId;
use chunkwise_core::types::Priority;
use chunkwise_core::types::SpecifierType;
use chunkwise_graph::NodeId;
use indexmap::IndexMap;
use tracing::debug;
use tracing::instrument;

use super::types::IdealGraph;

/// Writes the bundles of an ideal graph into a bundle graph.
///
/// The ideal graph is complete before the first call, so an error here leaves the bundle graph
/// partially written and the build must be abandoned.
#[instrument(level = "debug", skip_all)]
pub fn decorate_bundle_graph(
  ideal: &IdealGraph,
  bundle_graph: &mut dyn MutableBundleGraph,
) -> anyhow::Result<()> {
  let mut bundle_ids: IndexMap<NodeId, BundleId> = IndexMap::new();
  let mut bundle_group_ids: IndexMap<NodeId, Vec<BundleGroupId>> = IndexMap::new();

  for (node_id, bundle) in ideal.bundles() {
    let bundle_id = if ideal.bundle_group_bundle_ids.contains(&node_id) {
      let entry_asset = bundle
        .main_entry_asset
        .clone()
        .with_context(|| format!("bundle group {node_id} has no entry asset"))?;

      let dependencies = ideal.get_bundle_dependencies(node_id);
      anyhow::ensure!(
        !dependencies.is_empty(),
        "no dependency loads the bundle group of {}",
        entry_asset.id
      );

      let bundle_id = bundle_graph.create_bundle(CreateBundleOptions::Entry {
        entry_asset,
        target: bundle.target.clone(),
        needs_stable_name: bundle.needs_stable_name,
        bundle_behavior: bundle.bundle_behavior,
      })?;

      for dependency in dependencies {
        let bundle_group_id = bundle_graph.create_bundle_group(&dependency, &bundle.target)?;
        bundle_graph.add_bundle_to_bundle_group(&bundle_id, &bundle_group_id)?;
        bundle_group_ids
          .entry(node_id)
          .or_default()
          .push(bundle_group_id);
      }

      bundle_id
    } else if bundle.is_shared() {
      bundle_graph.create_bundle(CreateBundleOptions::Shared {
        unique_key: bundle
          .assets
          .keys()
          .map(|asset_id| asset_id.as_str())
          .collect::<Vec<_>>()
          .join(","),
        bundle_type: bundle.bundle_type.clone(),
        env: bundle.env.clone(),
        target: bundle.target.clone(),
        needs_stable_name: bundle.needs_stable_name,
        bundle_behavior: bundle.bundle_behavior,
      })?
    } else {
      let entry_asset = bundle
        .main_entry_asset
        .clone()
        .with_context(|| format!("bundle {node_id} has no entry asset"))?;

      bundle_graph.create_bundle(CreateBundleOptions::Entry {
        entry_asset,
        target: bundle.target.clone(),
        needs_stable_name: bundle.needs_stable_name,
        bundle_behavior: bundle.bundle_behavior,
      })?
    };

    for asset in bundle.assets.values() {
      bundle_graph.add_asset_to_bundle(asset, &bundle_id)?;
    }

    bundle_ids.insert(node_id, bundle_id);
  }

  let bundle_id_of = |node_id: &NodeId| {
    bundle_ids
      .get(node_id)
      .with_context(|| format!("bundle {node_id} was not created"))
  };

  for (node_id, bundle) in ideal.bundles() {
    let bundle_id = bundle_id_of(&node_id)?;

    for asset_id in &bundle.internalized_asset_ids {
      let asset = bundle_graph
        .get_asset_by_id(asset_id)
        .with_context(|| format!("internalized asset {asset_id} is not in the asset graph"))?;

      for dependency in bundle_graph.get_incoming_dependencies(&asset) {
        if dependency.priority == Priority::Lazy
          && dependency.specifier_type != SpecifierType::Url
          && bundle_graph.has_dependency(bundle_id, &dependency)
        {
          bundle_graph.internalize_async_dependency(bundle_id, &dependency)?;
        }
      }
    }
  }

  // Bundles loaded alongside a group bundle belong to each of its groups
  for (node_id, group_ids) in &bundle_group_ids {
    for member_id in ideal.bundles_in_group(*node_id)? {
      if member_id == *node_id {
        continue;
      }

      let member_bundle_id = bundle_id_of(&member_id)?;
      for bundle_group_id in group_ids {
        bundle_graph.add_bundle_to_bundle_group(member_bundle_id, bundle_group_id)?;
      }
    }
  }

  let root_node_id = ideal.root_node_id();
  for (from, to, _) in ideal.bundle_graph.edges() {
    if from == root_node_id {
      continue;
    }

    bundle_graph.create_bundle_reference(bundle_id_of(&from)?, bundle_id_of(&to)?)?;
  }

  for (asset_id, references) in &ideal.asset_reference {
    let asset = bundle_graph
      .get_asset_by_id(asset_id)
      .with_context(|| format!("referenced asset {asset_id} is not in the asset graph"))?;

    for (dependency, node_id) in references {
      bundle_graph.create_asset_reference(dependency, &asset, bundle_id_of(node_id)?)?;
    }
  }

  debug!(
    bundles = bundle_ids.len(),
    bundle_groups = bundle_group_ids.values().map(Vec::len).sum::<usize>(),
    "ideal graph: decorated bundle graph"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use chunkwise_core::bundle_graph::BundleGraph;
  use chunkwise_core::bundle_graph::NativeBundleGraph;
  use chunkwise_core::test_utils::TestAssetGraph;
  use chunkwise_core::types::Bundle;
  use pretty_assertions::assert_eq;

  use crate::config::BundlerConfig;
  use crate::ideal_graph::types::IdealGraphBuildOptions;
  use crate::ideal_graph::IdealGraphBuilder;

  use super::*;

  fn decorate(graph: TestAssetGraph, config: BundlerConfig) -> NativeBundleGraph {
    let mut bundle_graph = NativeBundleGraph::from_asset_graph(graph.build()).unwrap();
    let (ideal, _) = IdealGraphBuilder::new(
      bundle_graph.asset_graph(),
      IdealGraphBuildOptions {
        config,
        collect_debug: false,
      },
    )
    .build()
    .unwrap();

    decorate_bundle_graph(&ideal, &mut bundle_graph).unwrap();
    bundle_graph
  }

  fn bundle_for<'a>(bundle_graph: &'a NativeBundleGraph, asset_id: &str) -> &'a Bundle {
    bundle_graph
      .get_bundles()
      .into_iter()
      .find(|bundle| bundle.main_entry_id.as_deref() == Some(asset_id))
      .unwrap()
  }

  fn asset_ids(bundle_graph: &NativeBundleGraph, bundle: &Bundle) -> Vec<String> {
    bundle_graph
      .get_bundle_assets(bundle)
      .unwrap()
      .into_iter()
      .map(|asset| asset.id.clone())
      .collect()
  }

  #[test]
  fn type_changes_load_in_the_group_of_the_importer() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let styles = graph.add_asset(TestAssetGraph::asset("header.css", 10));
    let dependency = graph.sync(&index, &styles);

    let bundle_graph = decorate(graph, BundlerConfig::default());
    let index_bundle = bundle_for(&bundle_graph, "index.js");
    let styles_bundle = bundle_for(&bundle_graph, "header.css");

    assert_eq!(bundle_graph.get_bundles().len(), 2);
    assert!(index_bundle.needs_stable_name);

    let bundle_groups = bundle_graph.get_bundle_groups();
    assert_eq!(bundle_groups.len(), 1);
    assert_eq!(
      bundle_graph
        .get_bundles_in_bundle_group(bundle_groups[0])
        .unwrap(),
      vec![index_bundle, styles_bundle]
    );
    assert_eq!(
      bundle_graph.get_asset_reference_bundles(&dependency),
      vec![styles_bundle]
    );
    assert_eq!(
      bundle_graph.get_referenced_bundles(index_bundle).unwrap(),
      vec![styles_bundle]
    );
  }

  #[test]
  fn lazy_imports_create_bundle_groups() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    let dependency = graph.lazy(&index, &page);

    let bundle_graph = decorate(graph, BundlerConfig::default());
    let index_bundle = bundle_for(&bundle_graph, "index.js");
    let page_bundle = bundle_for(&bundle_graph, "page.js");

    assert_eq!(bundle_graph.get_bundle_groups().len(), 2);
    assert!(!page_bundle.needs_stable_name);
    assert_eq!(asset_ids(&bundle_graph, page_bundle), vec!["page.js"]);
    assert!(!bundle_graph.is_dependency_internalized(index_bundle, &dependency));
  }

  #[test]
  fn lazy_imports_of_loaded_bundles_are_internalized() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    let dependency = graph.lazy(&index, &page);
    graph.sync(&index, &page);

    let bundle_graph = decorate(graph, BundlerConfig::default());
    let index_bundle = bundle_for(&bundle_graph, "index.js");

    assert!(bundle_graph.is_dependency_internalized(index_bundle, &dependency));
    assert_eq!(
      asset_ids(&bundle_graph, index_bundle),
      vec!["index.js", "page.js"]
    );
  }

  #[test]
  fn shared_bundles_are_keyed_by_their_assets() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let a = graph.add_asset(TestAssetGraph::asset("a.js", 10));
    let b = graph.add_asset(TestAssetGraph::asset("b.js", 10));
    let common = graph.add_asset(TestAssetGraph::asset("common.js", 30000));
    graph.lazy(&index, &a);
    graph.lazy(&index, &b);
    graph.sync(&a, &common);
    graph.sync(&b, &common);

    let bundle_graph = decorate(graph, BundlerConfig::default());
    let shared_bundle = bundle_graph
      .get_bundles()
      .into_iter()
      .find(|bundle| bundle.main_entry_id.is_none())
      .unwrap();

    assert_eq!(shared_bundle.unique_key.as_deref(), Some("common.js"));
    assert_eq!(asset_ids(&bundle_graph, shared_bundle), vec!["common.js"]);
    assert_eq!(
      bundle_graph
        .get_referenced_bundles(bundle_for(&bundle_graph, "a.js"))
        .unwrap(),
      vec![shared_bundle]
    );

    let a_group = bundle_graph
      .get_bundle_groups()
      .into_iter()
      .find(|bundle_group| bundle_group.entry_asset_id == "a.js")
      .unwrap();
    assert_eq!(
      bundle_graph.get_bundles_in_bundle_group(a_group).unwrap(),
      vec![bundle_for(&bundle_graph, "a.js"), shared_bundle]
    );
  }
}
