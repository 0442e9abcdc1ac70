use std::path::Path;
use std::path::PathBuf;

use crate::FileSystem;

#[derive(Default, Debug)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn cwd(&self) -> std::io::Result<PathBuf> {
    std::env::current_dir()
  }

  fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
    std::fs::read(path)
  }

  fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
  }

  fn is_file(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }
}

#[cfg(test)]
mod tests {
  use assert_fs::prelude::*;

  use super::*;

  #[test]
  fn reads_files_from_disk() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let package_json = temp_dir.child("package.json");
    package_json.write_str("{}").unwrap();

    let fs = OsFileSystem;

    assert!(fs.is_file(package_json.path()));
    assert!(fs.is_dir(temp_dir.path()));
    assert!(!fs.is_file(temp_dir.path()));
    assert_eq!(fs.read_to_string(package_json.path()).unwrap(), "{}");
  }

  #[test]
  fn missing_files_are_not_found() {
    let temp_dir = assert_fs::TempDir::new().unwrap();
    let missing = temp_dir.child("missing.json");

    let error = OsFileSystem.read(missing.path()).unwrap_err();

    assert_eq!(error.kind(), std::io::ErrorKind::NotFound);
  }
}
