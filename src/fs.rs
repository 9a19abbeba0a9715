//! File system access.  Sessions go through this trait rather than std::fs
//! so that whole builds can run against an in-memory tree in tests.

use crate::canon::canon_path;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// MTime info gathered for a file.  This also models "file is absent".
/// It's not using an Option<> just because it makes the code using it easier
/// to follow.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MTime {
    Missing,
    Stamp(SystemTime),
}

pub trait FileSystem: Sync {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>>;
    /// stat() an on-disk path, producing its MTime.
    fn stat(&self, path: &Path) -> std::io::Result<MTime>;
    /// Resolve an existing path to its canonical absolute form, following
    /// symlinks.
    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf>;
    /// Write a whole file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> std::io::Result<()>;
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Default)]
pub struct RealFileSystem {}
impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem {}
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &Path) -> std::io::Result<MTime> {
        Ok(match std::fs::metadata(path) {
            Ok(meta) => MTime::Stamp(meta.modified()?),
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    MTime::Missing
                } else {
                    return Err(err);
                }
            }
        })
    }

    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::remove_file(path) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            r => r,
        }
    }
}

struct MemFile {
    content: Vec<u8>,
    mtime: SystemTime,
}

/// A memory-backed file system.  Paths are compared after lexical
/// canonicalization; there are no directories or symlinks.  Every write
/// bumps a clock so that rewritten files get a newer mtime.
#[derive(Default)]
pub struct MemFileSystem {
    files: Mutex<FxHashMap<PathBuf, MemFile>>,
    clock: Mutex<u64>,
}

fn not_found() -> std::io::Error {
    std::io::Error::from(std::io::ErrorKind::NotFound)
}

impl MemFileSystem {
    pub fn new() -> Self {
        MemFileSystem::default()
    }

    fn tick(&self) -> SystemTime {
        let mut clock = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        *clock += 1;
        SystemTime::UNIX_EPOCH + Duration::from_secs(*clock)
    }

    /// Add or replace a file.
    pub fn add(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mtime = self.tick();
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(
            canon_path(path.as_ref()),
            MemFile {
                content: content.into(),
                mtime,
            },
        );
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(&canon_path(path.as_ref()))
    }
}

impl FileSystem for MemFileSystem {
    fn read(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(&canon_path(path)) {
            Some(file) => Ok(file.content.clone()),
            None => Err(not_found()),
        }
    }

    fn stat(&self, path: &Path) -> std::io::Result<MTime> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match files.get(&canon_path(path)) {
            Some(file) => MTime::Stamp(file.mtime),
            None => MTime::Missing,
        })
    }

    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        let path = canon_path(path);
        if self.exists(&path) {
            Ok(path)
        } else {
            Err(not_found())
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> std::io::Result<()> {
        self.add(path, contents);
        Ok(())
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.remove(&canon_path(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_round_trip() -> std::io::Result<()> {
        let fs = MemFileSystem::new();
        fs.add("/s/a.hlsl", "x");
        assert_eq!(fs.read(Path::new("/s/./a.hlsl"))?, b"x");
        assert_eq!(fs.canonicalize(Path::new("/s/sub/../a.hlsl"))?, Path::new("/s/a.hlsl"));
        assert!(fs.canonicalize(Path::new("/s/b.hlsl")).is_err());

        let before = fs.stat(Path::new("/s/a.hlsl"))?;
        fs.write(Path::new("/s/a.hlsl"), b"y")?;
        let after = fs.stat(Path::new("/s/a.hlsl"))?;
        assert_ne!(before, after);

        fs.remove(Path::new("/s/a.hlsl"))?;
        assert_eq!(fs.stat(Path::new("/s/a.hlsl"))?, MTime::Missing);
        Ok(())
    }
}
