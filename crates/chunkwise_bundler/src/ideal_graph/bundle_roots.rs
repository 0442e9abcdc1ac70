use std::sync::Arc;

use anyhow::Context;
use chunkwise_core::asset_graph::AssetGraph;
use chunkwise_core::asset_graph::AssetGraphNode;
use chunkwise_core::types::Asset;
use chunkwise_core::types::BundleBehavior;
use chunkwise_core::types::Dependency;
use chunkwise_core::types::Priority;
use chunkwise_graph::GraphVisitor;
use chunkwise_graph::NodeId;
use chunkwise_graph::TraversalAction;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::builder::IdealGraphBuilder;
use super::types::BundleRoot;
use super::types::BundleRootReason;
use super::types::DecisionKind;
use super::types::IdealBundle;
use super::types::IdealBundleEdge;

const PHASE: &str = "bundle_roots";

impl IdealGraphBuilder<'_> {
  /// Creates a bundle and bundle group for every asset an entry dependency resolves to
  #[instrument(level = "debug", skip_all)]
  pub(super) fn create_entry_bundles(&mut self) -> anyhow::Result<()> {
    for dependency in self.asset_graph.get_entry_dependencies() {
      for asset in self.asset_graph.get_dependency_assets(&dependency) {
        self
          .entries
          .entry(asset.id.clone())
          .or_insert_with(|| dependency.clone());
      }
    }

    let root_node_id = self.ideal.root_node_id();
    for (asset_id, dependency) in self.entries.clone() {
      let asset = self
        .asset_graph
        .get_asset_by_id(&asset_id)
        .cloned()
        .with_context(|| format!("entry asset {asset_id} is not in the asset graph"))?;

      let target = dependency
        .target
        .as_deref()
        .cloned()
        .with_context(|| format!("entry dependency {} has no target", dependency.specifier))?;

      let bundle_id = self.ideal.add_bundle(IdealBundle::for_root(
        &asset,
        target,
        dependency.is_entry,
        asset.bundle_behavior,
      ));

      self.ideal.bundle_roots.insert(
        asset_id.clone(),
        BundleRoot {
          asset,
          bundle_id,
          bundle_group_id: bundle_id,
        },
      );
      self.ideal.bundle_group_bundle_ids.insert(bundle_id);
      self
        .ideal
        .connect(root_node_id, bundle_id, IdealBundleEdge::BundleGroup)?;
      self
        .ideal
        .add_dependency_bundle_edge(&dependency, bundle_id, dependency.priority)?;

      self.decision(
        PHASE,
        DecisionKind::BundleRootCreated {
          asset_id,
          bundle_id,
          reason: BundleRootReason::Entry,
        },
      );
    }

    debug!(entries = self.entries.len(), "ideal graph: created entry bundles");
    Ok(())
  }

  /// Walks the asset graph and creates a bundle for every asset that cannot live in the bundle
  /// of the asset importing it
  #[instrument(level = "debug", skip_all)]
  pub(super) fn create_bundle_roots(&mut self) -> anyhow::Result<()> {
    let asset_graph = self.asset_graph;
    let mut visitor = BundleRootVisitor {
      asset_graph,
      builder: self,
      stack: Vec::new(),
    };

    asset_graph.traverse(&mut visitor)?;

    debug!(
      bundle_roots = self.ideal.bundle_roots.len(),
      bundle_groups = self.ideal.bundle_group_bundle_ids.len(),
      assets = self.assets.len(),
      "ideal graph: created bundle roots"
    );
    Ok(())
  }

  /// Creates a bundle that starts its own bundle group, or reuses the one already created for
  /// the asset
  fn create_async_bundle(
    &mut self,
    dependency: &Arc<Dependency>,
    child: &Arc<Asset>,
    bundle_group_id: NodeId,
  ) -> anyhow::Result<NodeId> {
    let dependency_isolated = dependency.bundle_behavior == Some(BundleBehavior::Isolated);

    if let Some(bundle_root) = self.ideal.bundle_roots.get(&child.id) {
      let bundle_id = bundle_root.bundle_id;
      let bundle = self.ideal.bundle_mut(bundle_id)?;
      if dependency_isolated && bundle.bundle_behavior.is_none() {
        bundle.bundle_behavior = Some(BundleBehavior::Isolated);
      }

      return Ok(bundle_id);
    }

    let bundle_behavior = dependency.bundle_behavior.or(child.bundle_behavior);
    let needs_stable_name =
      !is_inline(dependency, child) && (dependency.is_entry || dependency.needs_stable_name);
    let target = self.ideal.bundle(bundle_group_id)?.target.clone();

    let bundle_id = self.ideal.add_bundle(IdealBundle::for_root(
      child,
      target,
      needs_stable_name,
      bundle_behavior,
    ));

    self.ideal.bundle_roots.insert(
      child.id.clone(),
      BundleRoot {
        asset: child.clone(),
        bundle_id,
        bundle_group_id: bundle_id,
      },
    );
    self.ideal.bundle_group_bundle_ids.insert(bundle_id);

    let root_node_id = self.ideal.root_node_id();
    self
      .ideal
      .connect(root_node_id, bundle_id, IdealBundleEdge::BundleGroup)?;

    let reason = if dependency.priority == Priority::Lazy {
      BundleRootReason::Lazy
    } else {
      BundleRootReason::Isolated
    };

    trace!(asset_id = %child.id, bundle_id, ?reason, "Creating async bundle");
    self.decision(
      PHASE,
      DecisionKind::BundleRootCreated {
        asset_id: child.id.clone(),
        bundle_id,
        reason,
      },
    );

    Ok(bundle_id)
  }

  /// Creates a bundle that loads together with the current bundle group
  fn create_sync_bundle(
    &mut self,
    dependency: &Arc<Dependency>,
    child: &Arc<Asset>,
    bundle_group_id: NodeId,
  ) -> anyhow::Result<NodeId> {
    if let Some(bundle_root) = self.ideal.bundle_roots.get(&child.id) {
      return Ok(bundle_root.bundle_id);
    }

    let bundle_group = self.ideal.bundle(bundle_group_id)?;
    let target = bundle_group.target.clone();
    let needs_stable_name = if is_inline(dependency, child)
      || (dependency.priority == Priority::Parallel && !dependency.needs_stable_name)
    {
      false
    } else {
      bundle_group.needs_stable_name
    };

    let bundle_id = self.ideal.add_bundle(IdealBundle::for_root(
      child,
      target,
      needs_stable_name,
      dependency.bundle_behavior.or(child.bundle_behavior),
    ));

    self.ideal.bundle_roots.insert(
      child.id.clone(),
      BundleRoot {
        asset: child.clone(),
        bundle_id,
        bundle_group_id,
      },
    );

    let reason = if is_inline(dependency, child) {
      BundleRootReason::Inline
    } else {
      BundleRootReason::TypeChange
    };

    trace!(asset_id = %child.id, bundle_id, ?reason, "Creating sibling bundle");
    self.decision(
      PHASE,
      DecisionKind::BundleRootCreated {
        asset_id: child.id.clone(),
        bundle_id,
        reason,
      },
    );

    Ok(bundle_id)
  }

  /// Marks `child` as reachable from every bundle root on the stack, walking up from the
  /// innermost one until a bundle of another type or context
  fn mark_reachable_bundle(&mut self, stack: &[(Arc<Asset>, NodeId)], child: &Asset) {
    for (stack_asset, _) in stack.iter().rev() {
      if stack_asset.file_type != child.file_type
        || stack_asset.env.context != child.env.context
        || stack_asset.env.context.is_isolated()
      {
        break;
      }

      self
        .ideal
        .reachable_bundles
        .entry(stack_asset.id.clone())
        .or_default()
        .insert(child.id.clone());
    }
  }
}

fn is_inline(dependency: &Dependency, asset: &Asset) -> bool {
  dependency.bundle_behavior == Some(BundleBehavior::Inline)
    || asset.bundle_behavior == Some(BundleBehavior::Inline)
}

fn is_isolated(dependency: &Dependency, asset: &Asset) -> bool {
  dependency.bundle_behavior == Some(BundleBehavior::Isolated)
    || asset.bundle_behavior == Some(BundleBehavior::Isolated)
}

/// Tracks the bundle the traversal is currently in.
///
/// The stack holds a bundle root asset with the bundle group it loads in, pushed when the root
/// is entered and popped when it is exited.
struct BundleRootVisitor<'b, 'a> {
  asset_graph: &'a AssetGraph,
  builder: &'b mut IdealGraphBuilder<'a>,
  stack: Vec<(Arc<Asset>, NodeId)>,
}

impl BundleRootVisitor<'_, '_> {
  fn enter_asset(
    &mut self,
    asset: &Arc<Asset>,
    parent: Option<NodeId>,
  ) -> anyhow::Result<TraversalAction> {
    let parent_dependency = parent.and_then(|parent| self.asset_graph.get_dependency(parent));
    if parent_dependency.is_some_and(|dependency| dependency.is_entry)
      && !self.builder.entries.contains_key(&asset.id)
    {
      return Ok(TraversalAction::SkipChildren);
    }

    self.builder.assets.push(asset.clone());

    if let Some(bundle_root) = self.builder.ideal.bundle_roots.get(&asset.id) {
      self
        .stack
        .push((asset.clone(), bundle_root.bundle_group_id));
    }

    Ok(TraversalAction::Continue)
  }

  fn enter_dependency(
    &mut self,
    dependency: &Arc<Dependency>,
    parent: Option<NodeId>,
  ) -> anyhow::Result<TraversalAction> {
    let Some(parent_asset) = parent.and_then(|parent| self.asset_graph.get_asset(parent)) else {
      return Ok(TraversalAction::Continue);
    };

    let assets = self.asset_graph.get_dependency_assets(dependency);
    let child = match assets.as_slice() {
      [] => return Ok(TraversalAction::Continue),
      [child] => child,
      _ => anyhow::bail!(
        "dependency {} from {} resolved to {} assets, expected one",
        dependency.specifier,
        parent_asset.file_path.display(),
        assets.len()
      ),
    };

    let (referencing_root, bundle_group_id) = self
      .stack
      .last()
      .cloned()
      .with_context(|| format!("dependency {} is not inside a bundle", dependency.specifier))?;

    if dependency.priority == Priority::Lazy || is_isolated(dependency, child) {
      let bundle_id = self
        .builder
        .create_async_bundle(dependency, child, bundle_group_id)?;

      self
        .builder
        .ideal
        .add_dependency_bundle_edge(dependency, bundle_id, Priority::Lazy)?;
      self.builder.mark_reachable_bundle(&self.stack, child);

      return Ok(TraversalAction::Continue);
    }

    if parent_asset.file_type != child.file_type || is_inline(dependency, child) {
      let bundle_id = self
        .builder
        .create_sync_bundle(dependency, child, bundle_group_id)?;

      self
        .builder
        .ideal
        .asset_reference
        .entry(child.id.clone())
        .or_default()
        .push((dependency.clone(), bundle_id));

      let referencing_bundle_id = self.builder.bundle_root(&referencing_root.id)?.bundle_id;
      self
        .builder
        .ideal
        .connect(referencing_bundle_id, bundle_id, IdealBundleEdge::Sibling)?;
      self
        .builder
        .ideal
        .connect(bundle_group_id, bundle_id, IdealBundleEdge::Sibling)?;
      self
        .builder
        .ideal
        .add_dependency_bundle_edge(dependency, bundle_id, Priority::Parallel)?;
    }

    Ok(TraversalAction::Continue)
  }
}

impl GraphVisitor<AssetGraphNode> for BundleRootVisitor<'_, '_> {
  fn enter(
    &mut self,
    _node_id: NodeId,
    node: &AssetGraphNode,
    parent: Option<NodeId>,
  ) -> anyhow::Result<TraversalAction> {
    match node {
      AssetGraphNode::Root => Ok(TraversalAction::Continue),
      AssetGraphNode::Asset(asset) => self.enter_asset(asset, parent),
      AssetGraphNode::Dependency(dependency) => self.enter_dependency(dependency, parent),
    }
  }

  fn exit(&mut self, _node_id: NodeId, node: &AssetGraphNode) -> anyhow::Result<()> {
    if let AssetGraphNode::Asset(asset) = node {
      if self
        .stack
        .last()
        .is_some_and(|(stack_asset, _)| stack_asset.id == asset.id)
      {
        self.stack.pop();
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use chunkwise_core::test_utils::TestAssetGraph;
  use chunkwise_core::types::DependencyBuilder;
  use chunkwise_core::types::Environment;
  use chunkwise_core::types::EnvironmentContext;
  use pretty_assertions::assert_eq;

  use crate::ideal_graph::types::IdealGraphBuildOptions;

  use super::*;

  fn discover(asset_graph: &AssetGraph) -> IdealGraphBuilder<'_> {
    let mut builder = IdealGraphBuilder::new(asset_graph, IdealGraphBuildOptions::default());
    builder.create_entry_bundles().unwrap();
    builder.create_bundle_roots().unwrap();
    builder
  }

  fn root_ids<'a>(builder: &'a IdealGraphBuilder<'a>) -> Vec<&'a str> {
    builder
      .ideal
      .bundle_roots
      .keys()
      .map(|asset_id| asset_id.as_str())
      .collect()
  }

  #[test]
  fn entries_become_stable_bundle_groups() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let bundle_root = builder.bundle_root(&index.id).unwrap();
    let bundle = builder.ideal.bundle(bundle_root.bundle_id).unwrap();

    assert!(bundle_root.is_bundle_group());
    assert!(bundle.needs_stable_name);
    assert_eq!(bundle.main_entry_asset, Some(index));
    assert_eq!(
      builder
        .ideal
        .get_bundle_dependencies(bundle_root.bundle_id)
        .len(),
      1
    );
  }

  #[test]
  fn lazy_imports_create_async_bundles() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    let util = graph.add_asset(TestAssetGraph::asset("util.js", 10));
    let dependency = graph.lazy(&index, &page);
    graph.sync(&page, &util);
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let page_root = builder.bundle_root(&page.id).unwrap();

    assert_eq!(root_ids(&builder), vec!["index.js", "page.js"]);
    assert!(page_root.is_bundle_group());
    assert!(builder
      .ideal
      .bundle_group_bundle_ids
      .contains(&page_root.bundle_id));
    assert_eq!(
      builder.ideal.get_bundle_dependencies(page_root.bundle_id),
      vec![dependency]
    );
    assert_eq!(
      builder
        .assets
        .iter()
        .map(|asset| asset.id.as_str())
        .collect::<Vec<_>>(),
      vec!["index.js", "page.js", "util.js"]
    );
  }

  #[test]
  fn type_changes_create_sibling_bundles_in_the_same_group() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let styles = graph.add_asset(TestAssetGraph::asset("header.css", 10));
    let dependency = graph.sync(&index, &styles);
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let index_root = builder.bundle_root(&index.id).unwrap();
    let styles_root = builder.bundle_root(&styles.id).unwrap();

    assert_eq!(styles_root.bundle_group_id, index_root.bundle_id);
    assert!(!styles_root.is_bundle_group());
    assert!(builder.ideal.bundle_graph.has_edge(
      index_root.bundle_id,
      styles_root.bundle_id,
      IdealBundleEdge::Sibling
    ));
    assert_eq!(
      builder.ideal.asset_reference[&styles.id],
      vec![(dependency, styles_root.bundle_id)]
    );
  }

  #[test]
  fn inline_imports_create_unnamed_sibling_bundles() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let inline = graph.add_asset(TestAssetGraph::asset("inline.js", 10));
    let dependency = graph.dependency(
      &index,
      &inline,
      DependencyBuilder::default().bundle_behavior(BundleBehavior::Inline),
    );
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let index_root = builder.bundle_root(&index.id).unwrap();
    let inline_root = builder.bundle_root(&inline.id).unwrap();
    let bundle = builder.ideal.bundle(inline_root.bundle_id).unwrap();

    assert_eq!(root_ids(&builder), vec!["index.js", "inline.js"]);
    assert_eq!(inline_root.bundle_group_id, index_root.bundle_id);
    assert!(!inline_root.is_bundle_group());
    assert_eq!(bundle.bundle_behavior, Some(BundleBehavior::Inline));
    assert!(!bundle.needs_stable_name);
    assert!(builder.ideal.bundle_graph.has_edge(
      index_root.bundle_id,
      inline_root.bundle_id,
      IdealBundleEdge::Sibling
    ));
    assert_eq!(
      builder.ideal.asset_reference[&inline.id],
      vec![(dependency, inline_root.bundle_id)]
    );
  }

  #[test]
  fn isolated_dependencies_upgrade_existing_bundles() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let worker = graph.add_asset(TestAssetGraph::asset("worker.js", 10));
    graph.lazy(&index, &worker);
    graph.dependency(
      &index,
      &worker,
      DependencyBuilder::default()
        .priority(Priority::Sync)
        .bundle_behavior(BundleBehavior::Isolated),
    );
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let bundle_root = builder.bundle_root(&worker.id).unwrap();

    assert_eq!(
      builder
        .ideal
        .bundle(bundle_root.bundle_id)
        .unwrap()
        .bundle_behavior,
      Some(BundleBehavior::Isolated)
    );
  }

  #[test]
  fn reachable_bundles_stop_at_context_changes() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let page = graph.add_asset(TestAssetGraph::asset("page.js", 10));
    let mut worker = TestAssetGraph::asset("worker.js", 10);
    worker.env = Arc::new(Environment {
      context: EnvironmentContext::WebWorker,
      ..Environment::default()
    });
    let worker = graph.add_asset(worker);
    let chunk = graph.add_asset(TestAssetGraph::asset("chunk.js", 10));
    let nested = graph.add_asset(TestAssetGraph::asset("nested.js", 10));

    graph.lazy(&index, &page);
    graph.lazy(&page, &nested);
    graph.lazy(&index, &worker);
    graph.lazy(&worker, &chunk);
    let asset_graph = graph.build();

    let builder = discover(&asset_graph);
    let reachable = |asset_id: &str| {
      builder
        .ideal
        .reachable_bundles
        .get(asset_id)
        .map(|roots| roots.iter().cloned().collect::<Vec<_>>())
        .unwrap_or_default()
    };

    assert_eq!(reachable("index.js"), vec!["page.js", "nested.js"]);
    assert_eq!(reachable("page.js"), vec!["nested.js"]);
    assert!(reachable("worker.js").is_empty());
  }

  #[test]
  fn dependencies_resolving_to_several_assets_are_rejected() {
    let mut graph = TestAssetGraph::new();
    let index = graph.entry("index.js", 10);
    let a = graph.add_asset(TestAssetGraph::asset("a.js", 10));
    let b = graph.add_asset(TestAssetGraph::asset("b.js", 10));
    let dependency = graph.sync(&index, &a);

    let dependency_node_id = graph
      .graph
      .get_node_id_by_content_key(&dependency.id)
      .unwrap();
    let b_node_id = graph.graph.get_node_id_by_content_key(&b.id).unwrap();
    graph.graph.add_edge(dependency_node_id, b_node_id).unwrap();
    let asset_graph = graph.build();

    let mut builder = IdealGraphBuilder::new(&asset_graph, IdealGraphBuildOptions::default());
    builder.create_entry_bundles().unwrap();
    let error = builder.create_bundle_roots().unwrap_err();

    assert!(error.to_string().contains("resolved to 2 assets"));
  }

  #[test]
  fn entries_without_a_target_are_rejected() {
    let mut graph = TestAssetGraph::new();
    let index = graph.add_asset(TestAssetGraph::asset("index.js", 10));
    let dependency = DependencyBuilder::default()
      .specifier(String::from("index.js"))
      .is_entry(true)
      .build();
    let dependency_node_id = graph.graph.add_entry_dependency(dependency).unwrap();
    let index_node_id = graph.graph.get_node_id_by_content_key(&index.id).unwrap();
    graph
      .graph
      .add_edge(dependency_node_id, index_node_id)
      .unwrap();
    let asset_graph = graph.build();

    let mut builder = IdealGraphBuilder::new(&asset_graph, IdealGraphBuildOptions::default());
    let error = builder.create_entry_bundles().unwrap_err();

    assert_eq!(error.to_string(), "entry dependency index.js has no target");
  }
}
