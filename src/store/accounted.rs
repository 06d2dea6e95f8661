//! Accounted bitset (`<region>.pixa`).
//!
//! One bit per pixel-file slot, recording which slots have already been
//! counted against the region's weekly aggregate. Keeps stats idempotent
//! under replayed tracks and GPS bouncing. Little-endian bit order within
//! each byte; the on-disk form is the raw byte array.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Grow-on-demand bitset with a dirty flag.
#[derive(Debug, Default)]
pub struct AccountedBits {
    bytes: Vec<u8>,
    dirty: bool,
}

impl AccountedBits {
    /// Empty, clean bitset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether bit `idx` is set.
    pub fn get(&self, idx: usize) -> bool {
        let byte = idx / 8;
        byte < self.bytes.len() && self.bytes[byte] & (1 << (idx % 8)) != 0
    }

    /// Set bit `idx`, growing by whole bytes. The caller bounds `idx` by the
    /// pixel-file length so the bitset never outgrows it.
    pub fn set(&mut self, idx: usize) {
        let byte = idx / 8;
        if byte >= self.bytes.len() {
            self.bytes.resize(byte + 1, 0);
        }
        self.bytes[byte] |= 1 << (idx % 8);
        self.dirty = true;
    }

    /// Length in bits of the backing storage.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Whether there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drop all bits and the dirty flag (region change).
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.dirty = false;
    }

    /// Load from disk; a missing file leaves the bitset empty.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        self.dirty = false;
        log::info!("Loaded {} bytes of accounted bits from {}", self.bytes.len(), path.display());
        Ok(())
    }

    /// Persist to disk if dirty.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        fs::write(path, &self.bytes)?;
        self.dirty = false;
        log::info!("Saved {} bytes of accounted bits to {}", self.bytes.len(), path.display());
        Ok(())
    }
}
