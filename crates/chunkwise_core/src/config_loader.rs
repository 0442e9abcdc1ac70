use std::path::PathBuf;

use chunkwise_filesystem::search::find_ancestor_file;
use chunkwise_filesystem::FileSystemRef;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::diagnostic_error;
use crate::types::CodeFrame;
use crate::types::CodeHighlight;
use crate::types::DiagnosticBuilder;
use crate::types::DiagnosticError;
use crate::types::ErrorKind;

const PACKAGE_JSON: &str = "package.json";

/// Reads tool options stored under a top-level key of the closest package.json
#[derive(Debug)]
pub struct ConfigLoader {
  pub fs: FileSystemRef,
  /// The search never walks above this directory
  pub project_root: PathBuf,
  pub search_path: PathBuf,
}

/// The options found under `key`, along with the file they came from
#[derive(Debug, PartialEq)]
pub struct ConfigFile<T> {
  pub contents: T,
  pub key: String,
  pub path: PathBuf,
  pub raw: String,
}

impl<T> ConfigFile<T> {
  /// One-based line and column of the key in the raw file
  pub fn key_location(&self) -> Option<[usize; 2]> {
    location_of(&self.raw, &format!("\"{}\"", self.key))
  }
}

impl ConfigLoader {
  /// Deserializes the value under `key` in the closest package.json.
  ///
  /// Returns `None` when there is no package.json up to the project root, or when it has no
  /// such key. Malformed json is a `ParseError` and a value that does not fit `T` is an
  /// `InvalidConfig`, both with a code frame into the file.
  pub fn load_package_json_key<T: DeserializeOwned>(
    &self,
    key: &str,
  ) -> Result<Option<ConfigFile<T>>, DiagnosticError> {
    let Some(path) = find_ancestor_file(
      &*self.fs,
      &[PACKAGE_JSON],
      &self.search_path,
      &self.project_root,
    ) else {
      trace!(search_path = %self.search_path.display(), "No package.json found");
      return Ok(None);
    };

    let raw = self.fs.read_to_string(&path)?;
    let mut json = serde_json::from_str::<serde_json::Value>(&raw).map_err(|error| {
      diagnostic_error!(DiagnosticBuilder::default()
        .kind(ErrorKind::ParseError)
        .code_frames(vec![CodeFrame {
          code: Some(raw.clone()),
          file_path: Some(path.clone()),
          code_highlights: vec![CodeHighlight::from([error.line(), error.column()])],
        }])
        .message(format!("Error parsing {}: {error}", path.display())))
    })?;

    let Some(value) = json.get_mut(key).map(serde_json::Value::take) else {
      trace!(key, path = %path.display(), "package.json has no options for key");
      return Ok(None);
    };

    match serde_json::from_value::<T>(value) {
      Ok(contents) => Ok(Some(ConfigFile {
        contents,
        key: String::from(key),
        path,
        raw,
      })),
      Err(error) => {
        let file = ConfigFile {
          contents: (),
          key: String::from(key),
          path,
          raw,
        };

        Err(diagnostic_error!(DiagnosticBuilder::default()
          .kind(ErrorKind::InvalidConfig)
          .code_frames(vec![CodeFrame::from(&file)])
          .message(format!(
            "Invalid {key} config in {}: {error}",
            file.path.display()
          ))))
      }
    }
  }
}

fn location_of(raw: &str, needle: &str) -> Option<[usize; 2]> {
  let offset = raw.find(needle)?;
  let before = &raw[..offset];
  let line_start = before.rfind('\n').map_or(0, |index| index + 1);

  Some([before.matches('\n').count() + 1, offset - line_start + 1])
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use chunkwise_filesystem::in_memory_file_system::InMemoryFileSystem;
  use chunkwise_filesystem::MockFileSystem;
  use pretty_assertions::assert_eq;
  use serde::Deserialize;

  use crate::types::Diagnostic;

  use super::*;

  #[derive(Debug, Deserialize, PartialEq)]
  #[serde(deny_unknown_fields)]
  struct Options {
    http: u8,
  }

  fn loader(fs: FileSystemRef) -> ConfigLoader {
    let project_root = PathBuf::from("/project-root");

    ConfigLoader {
      fs,
      search_path: project_root.join("packages/app"),
      project_root,
    }
  }

  fn load(fs: Arc<InMemoryFileSystem>) -> Result<Option<ConfigFile<Options>>, DiagnosticError> {
    loader(fs).load_package_json_key::<Options>("@chunkwise/bundler-default")
  }

  #[test]
  fn missing_package_json_has_no_options() {
    assert_eq!(load(Arc::new(InMemoryFileSystem::default())).unwrap(), None);
  }

  #[test]
  fn package_json_outside_the_project_root_is_ignored() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      &PathBuf::from("/package.json"),
      String::from(r#"{ "@chunkwise/bundler-default": { "http": 1 } }"#),
    );

    assert_eq!(load(fs).unwrap(), None);
  }

  #[test]
  fn reads_the_key_from_the_closest_package_json() {
    let fs = Arc::new(InMemoryFileSystem::default());
    let raw = String::from("{\n  \"name\": \"app\",\n  \"@chunkwise/bundler-default\": { \"http\": 1 }\n}");
    fs.write_file(
      &PathBuf::from("/project-root/package.json"),
      String::from(r#"{ "@chunkwise/bundler-default": { "http": 2 } }"#),
    );
    fs.write_file(
      &PathBuf::from("/project-root/packages/app/package.json"),
      raw.clone(),
    );

    let file = load(fs).unwrap().unwrap();

    assert_eq!(file.key_location(), Some([3, 3]));
    assert_eq!(
      file,
      ConfigFile {
        contents: Options { http: 1 },
        key: String::from("@chunkwise/bundler-default"),
        path: PathBuf::from("/project-root/packages/app/package.json"),
        raw,
      }
    );
  }

  #[test]
  fn package_json_without_the_key_has_no_options() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      &PathBuf::from("/project-root/package.json"),
      String::from(r#"{ "name": "app" }"#),
    );

    assert_eq!(load(fs).unwrap(), None);
  }

  #[test]
  fn malformed_json_is_a_parse_error_at_the_failing_line() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      &PathBuf::from("/project-root/package.json"),
      String::from("{\n  \"name\": \n}"),
    );

    let error = load(fs).unwrap_err();
    let diagnostic = error.downcast_ref::<Diagnostic>().unwrap();

    assert_eq!(diagnostic.kind, ErrorKind::ParseError);
    assert!(diagnostic
      .message
      .starts_with("Error parsing /project-root/package.json"));

    let code_frames = diagnostic.code_frames.clone().unwrap_or_default();
    assert_eq!(code_frames[0].code_highlights[0].start.line, 3);
  }

  #[test]
  fn options_of_the_wrong_shape_point_at_the_key() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      &PathBuf::from("/project-root/package.json"),
      String::from("{\n  \"@chunkwise/bundler-default\": { \"http\": \"fast\" }\n}"),
    );

    let error = load(fs).unwrap_err();
    let diagnostic = error.downcast_ref::<Diagnostic>().unwrap();

    assert_eq!(diagnostic.kind, ErrorKind::InvalidConfig);
    assert!(diagnostic
      .message
      .starts_with("Invalid @chunkwise/bundler-default config in /project-root/package.json"));

    let code_frames = diagnostic.code_frames.clone().unwrap_or_default();
    assert_eq!(
      code_frames[0].file_path,
      Some(PathBuf::from("/project-root/package.json"))
    );
    assert_eq!(code_frames[0].code_highlights[0].start.line, 2);
    assert_eq!(code_frames[0].code_highlights[0].start.column, 3);
  }

  #[test]
  fn propagates_read_errors() {
    let mut fs = MockFileSystem::new();
    fs.expect_is_file().returning(|_| true);
    fs.expect_read_to_string()
      .returning(|_| Err(std::io::Error::other("disk unavailable")));

    let error = loader(Arc::new(fs))
      .load_package_json_key::<Options>("@chunkwise/bundler-default")
      .unwrap_err();

    assert_eq!(error.to_string(), "disk unavailable");
  }
}
