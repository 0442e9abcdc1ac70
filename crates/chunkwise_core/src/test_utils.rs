//! Helpers for building asset graphs in tests

use std::path::PathBuf;
use std::sync::Arc;

use crate::asset_graph::AssetGraph;
use crate::types::Asset;
use crate::types::Dependency;
use crate::types::DependencyBuilder;
use crate::types::FileType;
use crate::types::Priority;
use crate::types::Target;

/// Builds an [`AssetGraph`] where asset ids are their file paths
#[derive(Default)]
pub struct TestAssetGraph {
  pub graph: AssetGraph,
}

impl TestAssetGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// An asset whose id is its path and whose type comes from its extension
  pub fn asset(path: &str, size: u64) -> Asset {
    let file_path = PathBuf::from(path);
    let file_type = file_path
      .extension()
      .and_then(|extension| extension.to_str())
      .map(FileType::from_extension)
      .unwrap_or_default();

    let mut asset = Asset::new(file_path, Arc::default(), size);
    asset.id = String::from(path);
    asset.file_type = file_type;
    asset
  }

  pub fn add_asset(&mut self, asset: Asset) -> Arc<Asset> {
    let asset = Arc::new(asset);
    self.graph.add_asset(asset.clone());
    asset
  }

  /// Adds an entry asset using the default target
  pub fn entry(&mut self, path: &str, size: u64) -> Arc<Asset> {
    self.entry_with_target(Self::asset(path, size), Target::default())
  }

  pub fn entry_with_target(&mut self, asset: Asset, target: Target) -> Arc<Asset> {
    let asset = self.add_asset(asset);
    let dependency = Dependency::entry(asset.file_path.to_string_lossy().into_owned(), target);
    let dependency_node_id = self
      .graph
      .add_entry_dependency(dependency)
      .expect("entry dependency should connect to the root");

    self.connect(dependency_node_id, &asset);
    asset
  }

  pub fn sync(&mut self, from: &Asset, to: &Asset) -> Arc<Dependency> {
    self.import(from, to, Priority::Sync)
  }

  pub fn parallel(&mut self, from: &Asset, to: &Asset) -> Arc<Dependency> {
    self.import(from, to, Priority::Parallel)
  }

  pub fn lazy(&mut self, from: &Asset, to: &Asset) -> Arc<Dependency> {
    self.import(from, to, Priority::Lazy)
  }

  pub fn import(&mut self, from: &Asset, to: &Asset, priority: Priority) -> Arc<Dependency> {
    self.dependency(
      from,
      to,
      DependencyBuilder::default().priority(priority),
    )
  }

  /// Adds a dependency from `from` to `to` using the given builder for any extra fields
  pub fn dependency(
    &mut self,
    from: &Asset,
    to: &Asset,
    builder: DependencyBuilder,
  ) -> Arc<Dependency> {
    let dependency = builder
      .env(from.env.clone())
      .source_asset_id(from.id.clone())
      .source_path(from.file_path.clone())
      .specifier(format!("./{}", to.file_path.display()))
      .build();

    let from_node_id = self.graph.add_asset(Arc::new(from.clone()));
    let dependency_node_id = self.graph.add_dependency(dependency.clone());

    self
      .graph
      .add_edge(from_node_id, dependency_node_id)
      .expect("dependency should connect to its source asset");
    self.connect(dependency_node_id, to);

    Arc::new(dependency)
  }

  fn connect(&mut self, dependency_node_id: usize, to: &Asset) {
    let to_node_id = self.graph.add_asset(Arc::new(to.clone()));
    self
      .graph
      .add_edge(dependency_node_id, to_node_id)
      .expect("dependency should connect to its resolved asset");
  }

  pub fn build(self) -> AssetGraph {
    self.graph
  }
}
