//! The shader cache stores information about previous builds for determining
//! which files are up to date.  It is the only state that outlives a session.
//!
//! The cache directory holds one small text record per source file that has
//! been visited, named by a digest of the file's canonical absolute path (so
//! that headers with the same name in different directories don't collide):
//!
//! ```text
//! hsbcache 1
//! <content signature, 16 hex digits>
//! <canonical path>
//! ```
//!
//! The path is stored so a digest collision reads as "no entry" rather than
//! as another file's signature.  A separate `settings` record holds the
//! fingerprint of the build settings the outputs were produced with.
//!
//! All writes are best-effort: a record that can't be written only means the
//! file is considered stale again next session.

use crate::fs::FileSystem;
use crate::graph::Node;
use crate::hash::{content_hash, Hash};
use log::{debug, warn};
use std::path::{Path, PathBuf};

const HEADER: &str = "hsbcache 1";
const SETTINGS_RECORD: &str = "settings";

pub struct Cache {
    dir: PathBuf,
}

fn parse_record(text: &str, key: &str) -> Option<Hash> {
    let mut lines = text.lines();
    if lines.next()? != HEADER {
        return None;
    }
    let hash = lines.next()?.parse::<Hash>().ok()?;
    if lines.next()? != key {
        return None;
    }
    Some(hash)
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Cache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(content_hash(key.as_bytes()).to_string())
    }

    fn read_record(&self, fs: &dyn FileSystem, record: &Path, key: &str) -> Option<Hash> {
        let bytes = match fs.read(record) {
            Ok(bytes) => bytes,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("read cache record {}: {}", record.display(), err);
                }
                return None;
            }
        };
        let hash = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|text| parse_record(text, key));
        if hash.is_none() {
            debug!("ignoring invalid cache record {}", record.display());
        }
        hash
    }

    fn write_record(&self, fs: &dyn FileSystem, record: &Path, key: &str, hash: Hash) -> bool {
        let text = format!("{}\n{}\n{}\n", HEADER, hash, key);
        match fs.write(record, text.as_bytes()) {
            Ok(()) => true,
            Err(err) => {
                warn!("write cache record {}: {}", record.display(), err);
                false
            }
        }
    }

    /// The signature recorded for `path` by a previous session, if any.
    pub fn lookup(&self, fs: &dyn FileSystem, path: &Path) -> Option<Hash> {
        let key = path.to_string_lossy();
        self.read_record(fs, &self.record_path(&key), &key)
    }

    /// Persist a visited node's fresh signature, if it differs from what was
    /// recorded.  Unreadable nodes have nothing to record.
    /// Returns whether a record was written.
    pub fn commit(&self, fs: &dyn FileSystem, node: &Node) -> bool {
        let hash = match node.signature.digest() {
            None => return false,
            Some(hash) => hash,
        };
        if node.cached == Some(hash) {
            return false;
        }
        let key = node.path.to_string_lossy();
        self.write_record(fs, &self.record_path(&key), &key, hash)
    }

    pub fn settings(&self, fs: &dyn FileSystem) -> Option<Hash> {
        self.read_record(fs, &self.dir.join(SETTINGS_RECORD), SETTINGS_RECORD)
    }

    pub fn commit_settings(&self, fs: &dyn FileSystem, fingerprint: Hash) -> bool {
        if self.settings(fs) == Some(fingerprint) {
            return false;
        }
        self.write_record(
            fs,
            &self.dir.join(SETTINGS_RECORD),
            SETTINGS_RECORD,
            fingerprint,
        )
    }
}
