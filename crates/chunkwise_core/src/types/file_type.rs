use std::hash::Hash;

use serde::Deserialize;
use serde::Serialize;

/// Represents a file type by its extension
///
/// Bundles hold assets of a single type, so a dependency between assets of different types always
/// crosses a bundle boundary.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileType {
  Css,
  Html,
  #[default]
  Js,
  Json,
  Jpeg,
  Png,
  Svg,
  Wasm,
  Other(String),
}

impl Serialize for FileType {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    self.extension().serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for FileType {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: serde::Deserializer<'de>,
  {
    let ext: String = Deserialize::deserialize(deserializer)?;
    Ok(Self::from_extension(&ext))
  }
}

impl FileType {
  pub fn extension(&self) -> &str {
    match self {
      FileType::Css => "css",
      FileType::Html => "html",
      FileType::Js => "js",
      FileType::Json => "json",
      FileType::Jpeg => "jpeg",
      FileType::Png => "png",
      FileType::Svg => "svg",
      FileType::Wasm => "wasm",
      FileType::Other(s) => s.as_str(),
    }
  }

  /// Transformed scripts are emitted as `js`, so every script extension maps to [`FileType::Js`]
  pub fn from_extension(ext: &str) -> Self {
    match ext {
      "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => FileType::Js,
      "css" => FileType::Css,
      "html" | "htm" => FileType::Html,
      "json" => FileType::Json,
      "jpg" | "jpeg" => FileType::Jpeg,
      "png" => FileType::Png,
      "svg" => FileType::Svg,
      "wasm" => FileType::Wasm,
      ext => FileType::Other(ext.to_string()),
    }
  }
}
