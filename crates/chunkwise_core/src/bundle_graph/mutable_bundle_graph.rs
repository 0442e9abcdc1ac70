use std::sync::Arc;

use chunkwise_graph::GraphVisitor;

use crate::asset_graph::AssetGraph;
use crate::asset_graph::AssetGraphNode;
use crate::types::Asset;
use crate::types::BundleGroupId;
use crate::types::BundleId;
use crate::types::Dependency;
use crate::types::Environment;
use crate::types::FileType;
use crate::types::MaybeBundleBehavior;
use crate::types::Target;

/// How a bundle should be created
#[derive(Clone, Debug, PartialEq)]
pub enum CreateBundleOptions {
  /// A bundle created for an entry, async or type-changing asset
  Entry {
    entry_asset: Arc<Asset>,
    target: Target,
    needs_stable_name: bool,
    bundle_behavior: MaybeBundleBehavior,
  },
  /// A bundle without an entry asset, identified by a unique key
  Shared {
    unique_key: String,
    bundle_type: FileType,
    env: Arc<Environment>,
    target: Target,
    needs_stable_name: bool,
    bundle_behavior: MaybeBundleBehavior,
  },
}

/// The bundle graph a bundler writes its decisions into.
///
/// Read access to the asset graph is provided alongside the mutations so a bundler only ever
/// needs this trait.
pub trait MutableBundleGraph {
  fn asset_graph(&self) -> &AssetGraph;

  /// Creates a bundle, returning the existing bundle when one with the same identity exists
  fn create_bundle(&mut self, options: CreateBundleOptions) -> anyhow::Result<BundleId>;

  /// Creates the group loaded by `dependency`, or returns the existing one
  fn create_bundle_group(
    &mut self,
    dependency: &Dependency,
    target: &Target,
  ) -> anyhow::Result<BundleGroupId>;

  fn add_asset_to_bundle(&mut self, asset: &Asset, bundle_id: &BundleId) -> anyhow::Result<()>;

  fn add_bundle_to_bundle_group(
    &mut self,
    bundle_id: &BundleId,
    bundle_group_id: &BundleGroupId,
  ) -> anyhow::Result<()>;

  /// Marks an async dependency as resolved within the bundle, so no runtime load is needed
  fn internalize_async_dependency(
    &mut self,
    bundle_id: &BundleId,
    dependency: &Dependency,
  ) -> anyhow::Result<()>;

  /// Records that `dependency` reaches `asset` in another bundle
  fn create_asset_reference(
    &mut self,
    dependency: &Dependency,
    asset: &Asset,
    bundle_id: &BundleId,
  ) -> anyhow::Result<()>;

  fn create_bundle_reference(&mut self, from: &BundleId, to: &BundleId) -> anyhow::Result<()>;

  /// True when the bundle contains an asset that declares `dependency`
  fn has_dependency(&self, bundle_id: &BundleId, dependency: &Dependency) -> bool;

  fn get_asset_by_id(&self, asset_id: &str) -> Option<Arc<Asset>> {
    self.asset_graph().get_asset_by_id(asset_id).cloned()
  }

  fn get_dependency_assets(&self, dependency: &Dependency) -> Vec<Arc<Asset>> {
    self.asset_graph().get_dependency_assets(dependency)
  }

  fn get_incoming_dependencies(&self, asset: &Asset) -> Vec<Arc<Dependency>> {
    self.asset_graph().get_incoming_dependencies(asset)
  }

  fn traverse(&self, visitor: &mut dyn GraphVisitor<AssetGraphNode>) -> anyhow::Result<()> {
    self.asset_graph().traverse(visitor)
  }
}
