//! Path canonicalization.

use crate::fs::FileSystem;
use std::path::{Component, Path, PathBuf};

/// Lexically canonicalize a path, removing redundant components.
/// Does not access the disk, but only simplifies things like
/// "foo/./bar" => "foo/bar" and "foo/../bar" => "bar".
/// Leading ".." components of a relative path are kept; ".." at the root
/// stays at the root.
pub fn canon_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            c => out.push(c),
        }
    }
    out.iter().collect()
}

/// Make a path absolute against the process working directory.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// The canonical absolute form of a path, used as the identity of a file
/// within a build session and as its cache key.
/// Existing files are resolved through the file system, so symlinks
/// collapse; paths that can't be resolved (e.g. a missing header) fall back
/// to lexical canonicalization so they still get a stable identity.
pub fn canon_file(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    let path = canon_path(&absolute(path));
    fs.canonicalize(&path).unwrap_or(path)
}
