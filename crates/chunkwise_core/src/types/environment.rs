use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

use crate::hash::IdentifierHasher;

/// The environment the built code will run in
///
/// Bundles never mix environments. A change of environment context is what makes an isolated
/// bundle, such as a web worker, load independently of its parent.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
  /// The environment the output should run in
  pub context: EnvironmentContext,

  /// Whether this is a library build
  pub is_library: bool,

  /// Determines what type of module to output
  pub output_format: OutputFormat,

  /// Determines whether scope hoisting should be enabled
  pub should_scope_hoist: bool,

  /// Determines whether the output should be optimised
  pub should_optimize: bool,
}

impl Environment {
  pub fn id(&self) -> String {
    let mut hasher = IdentifierHasher::new();
    self.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }
}

/// The environment the output should run in
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvironmentContext {
  #[default]
  Browser,
  ElectronMain,
  ElectronRenderer,
  Node,
  ServiceWorker,
  WebWorker,
  Worklet,
}

impl EnvironmentContext {
  pub fn is_worker(&self) -> bool {
    use EnvironmentContext::*;
    matches!(self, WebWorker | ServiceWorker)
  }

  pub fn is_worklet(&self) -> bool {
    matches!(self, EnvironmentContext::Worklet)
  }

  /// Code in an isolated context cannot share modules with the page that loaded it
  pub fn is_isolated(&self) -> bool {
    self.is_worker() || self.is_worklet()
  }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  #[default]
  Global,
  CommonJS,
  EsModule,
}
