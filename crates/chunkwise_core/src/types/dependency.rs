use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;

use crate::hash::IdentifierHasher;

use super::asset::AssetId;
use super::bundle::BundleBehavior;
use super::bundle::MaybeBundleBehavior;
use super::environment::Environment;
use super::target::Target;

pub type DependencyId = String;

pub fn create_dependency_id(
  source_asset_id: Option<&AssetId>,
  specifier: &str,
  environment_id: &str,
  target: Option<&Target>,
  specifier_type: &SpecifierType,
  bundle_behavior: &MaybeBundleBehavior,
  priority: &Priority,
) -> DependencyId {
  let mut hasher = IdentifierHasher::new();

  source_asset_id.hash(&mut hasher);
  specifier.hash(&mut hasher);
  environment_id.hash(&mut hasher);
  target.hash(&mut hasher);
  specifier_type.hash(&mut hasher);
  bundle_behavior.hash(&mut hasher);
  priority.hash(&mut hasher);

  format!("{:016x}", hasher.finish())
}

/// A dependency denotes a connection between two assets
#[derive(Hash, PartialEq, Eq, Clone, Debug, Default, Builder, Serialize, Deserialize)]
#[builder(build_fn(skip), pattern = "owned", setter(strip_option))]
#[serde(rename_all = "camelCase")]
// Dependencies should not be created directly, so we can ensure that an ID
// exists. DependencyBuilder::build() should be used instead.
#[non_exhaustive]
pub struct Dependency {
  /// Controls the behavior of the bundle the resolved asset is placed into
  ///
  /// This option is used in combination with priority to determine when the bundle is loaded.
  ///
  pub bundle_behavior: Option<BundleBehavior>,

  /// The environment of the dependency
  pub env: Arc<Environment>,

  #[builder(setter(skip))]
  pub id: DependencyId,

  /// Determines when the dependency should be loaded
  pub priority: Priority,

  /// The id of the asset with this dependency
  pub source_asset_id: Option<AssetId>,

  /// The file path of the asset with this dependency
  pub source_path: Option<PathBuf>,

  /// The import or export specifier that connects two assets together
  pub specifier: String,

  /// How the specifier should be interpreted
  pub specifier_type: SpecifierType,

  /// The target associated with an entry, if any
  pub target: Option<Box<Target>>,

  /// Whether the dependency is an entry
  pub is_entry: bool,

  /// Whether the dependency is optional
  pub is_optional: bool,

  /// Indicates that the name should be stable over time, even when the content of the bundle changes
  ///
  /// When the dependency is a bundle entry (priority is "parallel" or "lazy"), this controls the
  /// naming of that bundle.
  pub needs_stable_name: bool,
}

impl DependencyBuilder {
  /// Builds the dependency and derives its id. Unset fields take their default value.
  pub fn build(self) -> Dependency {
    let specifier = self.specifier.unwrap_or_default();
    let env = self.env.unwrap_or_default();
    let specifier_type = self.specifier_type.unwrap_or_default();
    let priority = self.priority.unwrap_or_default();
    let source_asset_id = self.source_asset_id.flatten();
    let target = self.target.flatten();
    let bundle_behavior = self.bundle_behavior.flatten();

    let id = create_dependency_id(
      source_asset_id.as_ref(),
      &specifier,
      &env.id(),
      target.as_deref(),
      &specifier_type,
      &bundle_behavior,
      &priority,
    );

    Dependency {
      id,
      bundle_behavior,
      env,
      priority,
      source_asset_id,
      source_path: self.source_path.flatten(),
      specifier,
      specifier_type,
      target,
      is_entry: self.is_entry.unwrap_or_default(),
      is_optional: self.is_optional.unwrap_or_default(),
      needs_stable_name: self.needs_stable_name.unwrap_or_default(),
    }
  }
}

impl Dependency {
  pub fn id(&self) -> String {
    self.id.clone()
  }

  pub fn entry(entry: String, target: Target) -> Dependency {
    DependencyBuilder::default()
      .env(target.env.clone())
      .is_entry(true)
      .needs_stable_name(true)
      .specifier(entry)
      .specifier_type(SpecifierType::Url)
      .target(Box::new(target))
      .priority(Priority::default())
      .build()
  }

  pub fn is_async(&self) -> bool {
    self.priority != Priority::Sync
  }
}

/// Determines when a dependency should load
#[derive(
  Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize_repr,
)]
#[repr(u8)]
pub enum Priority {
  /// Resolves the dependency synchronously, placing the resolved asset in the same bundle as the parent or another bundle that is already on the page
  #[default]
  Sync = 0,
  /// Places the dependency in a separate bundle loaded in parallel with the current bundle
  Parallel = 1,
  /// The dependency should be placed in a separate bundle that is loaded later
  Lazy = 2,
}

/// The type of the import specifier
#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, Hash, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum SpecifierType {
  /// An ES Module specifier
  #[default]
  Esm = 0,

  /// A CommonJS specifier
  CommonJS = 1,

  /// A URL that works as in a browser
  ///
  /// Bundles referenced by URL are not loaded by the referencing bundle, so nothing they
  /// contain can be assumed to be available to it.
  Url = 2,

  /// A custom specifier that must be handled by a custom resolver plugin
  Custom = 3,
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn dependency_ids_depend_on_priority() {
    let sync = DependencyBuilder::default()
      .specifier(String::from("./a.js"))
      .source_asset_id(String::from("index"))
      .build();
    let lazy = DependencyBuilder::default()
      .specifier(String::from("./a.js"))
      .source_asset_id(String::from("index"))
      .priority(Priority::Lazy)
      .build();

    assert_eq!(sync.id.len(), 16);
    assert_ne!(sync.id, lazy.id);
    assert!(lazy.is_async());
  }

  #[test]
  fn entry_dependencies_carry_their_target() {
    let target = Target {
      name: String::from("modern"),
      ..Target::default()
    };

    let dependency = Dependency::entry(String::from("src/index.js"), target.clone());

    assert!(dependency.is_entry);
    assert!(dependency.needs_stable_name);
    assert_eq!(dependency.specifier_type, SpecifierType::Url);
    assert_eq!(dependency.target, Some(Box::new(target)));
  }
}
