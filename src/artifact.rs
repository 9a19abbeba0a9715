//! Compiled shader artifacts on disk: a fixed header followed by the
//! compiler's bytecode, untouched.
//!
//! ```text
//! offset  size  field
//! 0       4     magic "hsb1" (the last byte is the format version)
//! 4       4     payload size, u32 little-endian
//! 8       4     payload offset from start of file, u32 little-endian
//! 12      ...   payload
//! ```

use crate::fs::FileSystem;
use anyhow::{anyhow, bail};
use std::path::Path;

pub const MAGIC: [u8; 4] = *b"hsb1";
pub const HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub payload_size: u32,
    pub payload_offset: u32,
}

impl Header {
    pub fn for_payload(payload: &[u8]) -> anyhow::Result<Header> {
        let payload_size = u32::try_from(payload.len())
            .map_err(|_| anyhow!("bytecode too large: {} bytes", payload.len()))?;
        Ok(Header {
            payload_size,
            payload_offset: HEADER_SIZE as u32,
        })
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_offset.to_le_bytes());
        buf
    }

    pub fn parse(buf: &[u8]) -> anyhow::Result<Header> {
        if buf.len() < HEADER_SIZE {
            bail!("truncated header: {} bytes", buf.len());
        }
        if buf[0..4] != MAGIC {
            bail!("bad magic {:?}", &buf[0..4]);
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Ok(Header {
            payload_size: word(4),
            payload_offset: word(8),
        })
    }
}

/// Serialize an artifact.
pub fn encode(payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let header = Header::for_payload(payload)?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// The payload of a serialized artifact, after validating its header.
pub fn decode(buf: &[u8]) -> anyhow::Result<&[u8]> {
    let header = Header::parse(buf)?;
    let start = header.payload_offset as usize;
    let end = start
        .checked_add(header.payload_size as usize)
        .ok_or_else(|| anyhow!("payload size overflows"))?;
    if start < HEADER_SIZE || end > buf.len() {
        bail!(
            "payload {}..{} out of bounds for {} byte artifact",
            start,
            end,
            buf.len()
        );
    }
    Ok(&buf[start..end])
}

pub fn write(fs: &dyn FileSystem, path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    let bytes = encode(payload)?;
    fs.write(path, &bytes)
        .map_err(|err| anyhow!("write {}: {}", path.display(), err))
}

pub fn read(fs: &dyn FileSystem, path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = fs
        .read(path)
        .map_err(|err| anyhow!("read {}: {}", path.display(), err))?;
    let payload = decode(&bytes).map_err(|err| anyhow!("{}: {}", path.display(), err))?;
    Ok(payload.to_vec())
}
