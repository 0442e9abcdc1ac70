use std::fmt::Display;
use std::fmt::Formatter;

use derive_builder::Builder;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use super::CodeFrame;

/// Errors raised while bundling, carried as [`anyhow::Error`] so callers can add context.
///
/// A [`Diagnostic`] can be recovered with `error.downcast_ref::<Diagnostic>()`.
pub type DiagnosticError = anyhow::Error;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
  NotFound,
  ParseError,
  InvalidConfig,
  #[default]
  Unknown,
}

/// This is a user facing error.
///
/// Usually but not always this is linked to a source-code location.
#[derive(Builder, Error, Debug, Deserialize, PartialEq, Serialize, Clone, Default)]
#[builder(
  default,
  setter(into),
  build_fn(private, name = "fallible_build")
)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  /// What kind of failure this diagnostic describes
  pub kind: ErrorKind,

  /// A summary user-facing message
  pub message: String,

  /// Indicates where this diagnostic was emitted from
  pub origin: Option<String>,

  /// A list of files with source-code highlights
  pub code_frames: Option<Vec<CodeFrame>>,

  /// Hints for the user
  pub hints: Option<Vec<String>>,

  /// URL for the user to refer to documentation
  #[serde(rename = "documentationURL")]
  pub documentation_url: Option<String>,
}

impl DiagnosticBuilder {
  pub fn build(&self) -> Diagnostic {
    // Every field has a default
    self.fallible_build().unwrap_or_default()
  }
}

impl Display for Diagnostic {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.message)
  }
}
