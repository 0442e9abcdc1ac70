use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::config_loader::ConfigFile;

use super::CodeHighlight;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  /// Source-code of the file at the time of error
  pub code: Option<String>,

  /// Path to the source file if applicable.
  pub file_path: Option<PathBuf>,

  /// List of source-code highlight messages
  pub code_highlights: Vec<CodeHighlight>,
}

/// A frame over the whole config file, highlighting the key the options were read from
impl<T> From<&ConfigFile<T>> for CodeFrame {
  fn from(file: &ConfigFile<T>) -> Self {
    CodeFrame {
      code: Some(file.raw.clone()),
      file_path: Some(file.path.clone()),
      code_highlights: file.key_location().map(CodeHighlight::from).into_iter().collect(),
    }
  }
}

impl From<PathBuf> for CodeFrame {
  fn from(path: PathBuf) -> Self {
    CodeFrame {
      code: None,
      file_path: Some(path),
      code_highlights: Vec::new(),
    }
  }
}
