use std::sync::Arc;

use crate::types::Asset;
use crate::types::Bundle;
use crate::types::BundleGroup;
use crate::types::Dependency;

/// Read access to bundles produced by a bundler
pub trait BundleGraph {
  /// Bundles in the order they were created
  fn get_bundles(&self) -> Vec<&Bundle>;

  fn get_bundle_by_id(&self, id: &str) -> Option<&Bundle>;

  fn get_bundle_assets(&self, bundle: &Bundle) -> anyhow::Result<Vec<&Arc<Asset>>>;

  fn get_bundle_groups(&self) -> Vec<&BundleGroup>;

  fn get_bundles_in_bundle_group(&self, bundle_group: &BundleGroup) -> anyhow::Result<Vec<&Bundle>>;

  /// Bundles the given bundle loads or otherwise depends on at runtime
  fn get_referenced_bundles(&self, bundle: &Bundle) -> anyhow::Result<Vec<&Bundle>>;

  /// True when the async dependency resolves to something the bundle already contains
  fn is_dependency_internalized(&self, bundle: &Bundle, dependency: &Dependency) -> bool;

  /// Bundles holding the asset an async or type-changing dependency points at
  fn get_asset_reference_bundles(&self, dependency: &Dependency) -> Vec<&Bundle>;
}
