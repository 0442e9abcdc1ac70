use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::FileSystem;

#[cfg(not(target_os = "windows"))]
fn root_dir() -> PathBuf {
  PathBuf::from("/")
}

#[cfg(target_os = "windows")]
fn root_dir() -> PathBuf {
  PathBuf::from("C:/")
}

#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File { contents: Vec<u8> },
  Directory,
}

/// In memory implementation of the `FileSystem` trait, for testing purposes.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
  current_working_directory: RwLock<PathBuf>,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: Default::default(),
      current_working_directory: RwLock::new(root_dir()),
    }
  }
}

impl InMemoryFileSystem {
  /// Change the current working directory. Used for resolving relative paths.
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = self.canonicalize(cwd);
    *self.current_working_directory.write() = cwd;
  }

  /// Writes a file and creates every missing parent directory
  pub fn write_file(&self, path: &Path, contents: String) {
    let path = self.canonicalize(path);
    let mut files = self.files.write();

    let mut dir = path.parent();
    while let Some(parent) = dir {
      files.insert(parent.to_path_buf(), InMemoryFileSystemEntry::Directory);
      dir = parent.parent();
    }

    files.insert(
      path,
      InMemoryFileSystemEntry::File {
        contents: contents.into_bytes(),
      },
    );
  }

  pub fn create_directory(&self, path: &Path) {
    let path = self.canonicalize(path);
    self
      .files
      .write()
      .insert(path, InMemoryFileSystemEntry::Directory);
  }

  fn canonicalize(&self, path: &Path) -> PathBuf {
    let cwd = self.current_working_directory.read();
    let mut result: Vec<Component<'_>> = if path.is_absolute() {
      Vec::new()
    } else {
      cwd.components().collect()
    };

    for component in path.components() {
      match component {
        Component::Prefix(prefix) => result = vec![Component::Prefix(prefix)],
        Component::RootDir => result.push(Component::RootDir),
        Component::CurDir => {}
        Component::ParentDir => {
          result.pop();
        }
        Component::Normal(name) => result.push(Component::Normal(name)),
      }
    }

    PathBuf::from_iter(result)
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.current_working_directory.read().clone())
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let path = self.canonicalize(path);
    let files = self.files.read();

    match files.get(&path) {
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
      Some(InMemoryFileSystemEntry::File { contents }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
    }
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes).map_err(|_| io::Error::other("Unable to read file as string"))
  }

  fn is_file(&self, path: &Path) -> bool {
    let path = self.canonicalize(path);
    matches!(
      self.files.read().get(&path),
      Some(InMemoryFileSystemEntry::File { .. })
    )
  }

  fn is_dir(&self, path: &Path) -> bool {
    let path = self.canonicalize(path);
    matches!(
      self.files.read().get(&path),
      Some(InMemoryFileSystemEntry::Directory)
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_written_files() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(&root_dir().join("foo/bar"), String::from("contents"));

    assert_eq!(
      fs.read_to_string(&root_dir().join("foo/bar")).unwrap(),
      "contents"
    );
    assert!(fs.is_file(&root_dir().join("foo/bar")));
    assert!(fs.is_dir(&root_dir().join("foo")));
  }

  #[test]
  fn read_fails_for_missing_files_and_directories() {
    let fs = InMemoryFileSystem::default();
    fs.create_directory(&root_dir().join("foo"));

    assert_eq!(
      fs.read(&root_dir().join("foo/bar")).unwrap_err().kind(),
      io::ErrorKind::NotFound
    );
    assert_eq!(
      fs.read(&root_dir().join("foo")).unwrap_err().kind(),
      io::ErrorKind::InvalidInput
    );
  }

  #[test]
  fn relative_paths_resolve_against_the_working_directory() {
    let fs = InMemoryFileSystem::default();
    fs.set_current_working_directory(Path::new("/other"));
    fs.write_file(Path::new("./foo/./bar/../baz"), String::from("baz"));

    assert!(fs.is_file(&root_dir().join("other/foo/baz")));
    assert_eq!(fs.cwd().unwrap(), root_dir().join("other"));
  }
}
