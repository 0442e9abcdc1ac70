use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::asset::AssetId;
use super::environment::Environment;
use super::file_type::FileType;
use super::target::Target;

pub type BundleId = String;

pub type BundleGroupId = String;

/// Controls how a bundle is loaded relative to the bundle that references it
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleBehavior {
  /// The bundle is placed inline into the parent bundle rather than written to its own file
  Inline,
  /// The bundle is loaded independently and shares no assets with its parent
  Isolated,
}

pub type MaybeBundleBehavior = Option<BundleBehavior>;

/// A bundle as recorded in the output bundle graph
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
  pub id: BundleId,

  pub bundle_behavior: MaybeBundleBehavior,

  #[serde(rename = "type")]
  pub bundle_type: FileType,

  pub env: Arc<Environment>,

  /// Ids of the assets the bundle was created for
  pub entry_asset_ids: Vec<AssetId>,

  pub main_entry_id: Option<AssetId>,

  /// Whether the bundle name must stay the same across builds
  pub needs_stable_name: bool,

  pub target: Target,

  /// Identifies bundles created without an entry asset
  pub unique_key: Option<String>,
}

/// A group of bundles that load together when a dependency is loaded
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleGroup {
  pub id: BundleGroupId,
  pub entry_asset_id: AssetId,
  pub target: Target,
}
