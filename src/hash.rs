//! Staleness signatures.  A file's signature is a digest of its content; a
//! file is up to date when its signature matches the one recorded by the
//! previous session.  Content digests (rather than mtimes) are used for every
//! file so that touching a file without changing it does not cause a rebuild,
//! and so that one policy applies uniformly within a build.

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// A 64-bit content digest.  Stable across processes and platforms, since it
/// is persisted between sessions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Hash(pub u64);

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for Hash {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Hash)
    }
}

/// The staleness state computed for one file in the current session.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Signature {
    Digest(Hash),
    /// The file could not be read.  Never matches a cache entry, so anything
    /// depending on it is always rebuilt.
    Unreadable,
}

impl Signature {
    pub fn digest(&self) -> Option<Hash> {
        match self {
            Signature::Digest(hash) => Some(*hash),
            Signature::Unreadable => None,
        }
    }
}

pub fn content_hash(content: &[u8]) -> Hash {
    Hash(xxh3_64(content))
}

/// Compute the signature of a file from the result of reading it.
pub fn signature<E>(content: &Result<Vec<u8>, E>) -> Signature {
    match content {
        Ok(bytes) => Signature::Digest(content_hash(bytes)),
        Err(_) => Signature::Unreadable,
    }
}

const UNIT_SEPARATOR: u8 = 0x1F;

/// Incremental hash over a sequence of strings, used to fingerprint values
/// that are built up from several parts (e.g. the settings that affect
/// compiler output).  Parts are separated so that ("ab", "c") and ("a", "bc")
/// hash differently.
pub struct Fingerprint(Xxh3);

impl Default for Fingerprint {
    fn default() -> Self {
        Fingerprint::new()
    }
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint(Xxh3::new())
    }

    pub fn write_str(&mut self, s: &str) {
        self.0.update(s.as_bytes());
        self.0.update(&[UNIT_SEPARATOR]);
    }

    pub fn finish(&self) -> Hash {
        Hash(self.0.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_identical_content() {
        assert_eq!(content_hash(b"float4 c;"), content_hash(b"float4 c;"));
        assert_ne!(content_hash(b"float4 c;"), content_hash(b"float3 c;"));
    }

    #[test]
    fn unreadable() {
        let err: std::io::Result<Vec<u8>> =
            Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(signature(&err), Signature::Unreadable);
        assert_eq!(signature(&err).digest(), None);
    }

    #[test]
    fn hex_round_trip() {
        let hash = content_hash(b"x");
        assert_eq!(hash.to_string().len(), 16);
        assert_eq!(hash.to_string().parse::<Hash>(), Ok(hash));
        assert!("zz".parse::<Hash>().is_err());
    }

    #[test]
    fn fingerprint_separates_parts() {
        let mut a = Fingerprint::new();
        a.write_str("ab");
        a.write_str("c");
        let mut b = Fingerprint::new();
        b.write_str("a");
        b.write_str("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
