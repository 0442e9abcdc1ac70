use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

use super::bundle::MaybeBundleBehavior;
use super::environment::Environment;
use super::file_type::FileType;

pub type AssetId = String;

pub fn create_asset_id(
  environment_id: &str,
  file_path: &str,
  file_type: &FileType,
  unique_key: Option<&str>,
) -> AssetId {
  let mut hasher = IdentifierHasher::default();

  environment_id.hash(&mut hasher);
  file_path.hash(&mut hasher);
  file_type.hash(&mut hasher);
  unique_key.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// An asset is a file or part of a file that may represent any data type including source code, binary data, etc.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
  /// The main identify hash for the asset. It is consistent for the entire
  /// build and between builds.
  pub id: AssetId,

  /// Controls which bundle the asset is placed into
  pub bundle_behavior: MaybeBundleBehavior,

  /// The environment of the asset
  pub env: Arc<Environment>,

  /// The file path to the asset
  pub file_path: PathBuf,

  /// The file type of the asset, which may change during transformation
  #[serde(rename = "type")]
  pub file_type: FileType,

  /// Statistics about the asset
  pub stats: AssetStats,

  /// Whether this asset can be omitted if none of its exports are being used
  pub side_effects: bool,

  /// Whether the bundle created for this asset may be split into multiple bundles
  pub is_bundle_splittable: bool,

  /// Set when a transformer returns several assets from one file
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unique_key: Option<String>,
}

impl Default for Asset {
  fn default() -> Self {
    Self {
      id: AssetId::default(),
      bundle_behavior: None,
      env: Arc::default(),
      file_path: PathBuf::default(),
      file_type: FileType::default(),
      stats: AssetStats::default(),
      side_effects: true,
      is_bundle_splittable: true,
      unique_key: None,
    }
  }
}

impl Asset {
  /// Creates an asset and derives its id from its environment, path and type
  pub fn new(file_path: PathBuf, env: Arc<Environment>, size: u64) -> Self {
    let file_type = file_path
      .extension()
      .and_then(|extension| extension.to_str())
      .map(FileType::from_extension)
      .unwrap_or_default();

    let id = create_asset_id(
      &env.id(),
      &file_path.to_string_lossy(),
      &file_type,
      None,
    );

    Self {
      id,
      env,
      file_path,
      file_type,
      stats: AssetStats { size, time: 0 },
      ..Self::default()
    }
  }
}

/// Statistics that pertain to an asset
#[derive(PartialEq, Eq, Clone, Debug, Default, Deserialize, Serialize)]
pub struct AssetStats {
  /// Size of the transformed asset in bytes
  pub size: u64,
  pub time: u32,
}
