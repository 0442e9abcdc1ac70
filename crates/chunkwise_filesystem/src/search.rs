use std::path::Path;
use std::path::PathBuf;

use crate::FileSystem;

/// Walks from `from` up to `root` (inclusive) and returns the first matching file
pub fn find_ancestor_file<P: AsRef<Path>>(
  fs: &dyn FileSystem,
  filenames: &[P],
  from: &Path,
  root: &Path,
) -> Option<PathBuf> {
  for dir in from.ancestors() {
    for filename in filenames {
      let path = dir.join(filename);
      if fs.is_file(&path) {
        return Some(path);
      }
    }

    if dir == root {
      break;
    }
  }

  None
}
