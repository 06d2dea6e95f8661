//! Memory-mapped road pixel file (`<region>.pix`).
//!
//! Format: packed little-endian 64-bit records, sorted strictly ascending by
//! the low 63 bits (the HEALPix pixel id). The high bit is the explored flag
//! and the only part mutated after derivation. Mutation happens in place on
//! the mapping, followed by an asynchronous flush of the 8 bytes touched.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::{ExploreError, Result};

/// Bit 63 marks a pixel as explored; the rest is the pixel id.
const EXPLORED_BIT: u64 = 1 << 63;

/// One road pixel record: explored flag plus HEALPix pixel id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoadPixel(u64);

impl RoadPixel {
    /// Build an unexplored record for a pixel id.
    pub fn unexplored(pixel_id: i64) -> Self {
        Self(pixel_id as u64 & !EXPLORED_BIT)
    }

    /// Build a record from its on-disk representation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw record value as stored on disk.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// HEALPix pixel id (low 63 bits).
    pub fn pixel_id(self) -> i64 {
        (self.0 & !EXPLORED_BIT) as i64
    }

    /// Whether the pixel has been explored.
    pub fn is_explored(self) -> bool {
        self.0 & EXPLORED_BIT != 0
    }
}

/// Read-write mapping over a region's pixel file.
pub struct PixelFile {
    mmap: MmapMut,
    len: usize,
}

impl PixelFile {
    /// Memory-map an existing pixel file read-write.
    ///
    /// Fails on empty or truncated files so the caller can fall back to the
    /// derivation path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let bytes = file.metadata()?.len();
        if bytes == 0 {
            return Err(ExploreError::PixelFile(format!("{} is empty", path.display())));
        }
        if bytes % 8 != 0 {
            return Err(ExploreError::PixelFile(format!(
                "{} is truncated ({bytes} bytes)",
                path.display()
            )));
        }
        // The file stays private to this handle while mapped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Sequential)?;

        Ok(Self { mmap, len: (bytes / 8) as usize })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the file holds no records.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record at slot `idx`.
    pub fn get(&self, idx: usize) -> RoadPixel {
        let off = idx * 8;
        let raw = u64::from_le_bytes(self.mmap[off..off + 8].try_into().unwrap_or([0; 8]));
        RoadPixel(raw)
    }

    /// Binary search by pixel id over the low 63 bits.
    pub fn find(&self, pixel_id: i64) -> Option<usize> {
        let mut lo = 0usize;
        let mut hi = self.len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.get(mid).pixel_id() < pixel_id {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo < self.len && self.get(lo).pixel_id() == pixel_id).then_some(lo)
    }

    /// Set the explored bit on slot `idx`, scheduling an async flush of the
    /// 8 bytes mutated. Returns whether the bit transitioned.
    pub fn set_explored(&mut self, idx: usize) -> bool {
        let off = idx * 8;
        let mut raw = u64::from_le_bytes(self.mmap[off..off + 8].try_into().unwrap_or([0; 8]));
        if raw & EXPLORED_BIT != 0 {
            return false;
        }
        raw |= EXPLORED_BIT;
        self.mmap[off..off + 8].copy_from_slice(&raw.to_le_bytes());
        self.mmap.flush_async_range(off, 8).ok();
        true
    }

    /// Iterate all records.
    pub fn iter(&self) -> impl Iterator<Item = RoadPixel> + '_ {
        (0..self.len).map(|i| self.get(i))
    }

    /// Number of records with the explored bit set.
    pub fn explored_count(&self) -> usize {
        self.iter().filter(|p| p.is_explored()).count()
    }

    /// Copy of all records, for publishing to a renderer.
    pub fn snapshot(&self) -> Vec<RoadPixel> {
        self.iter().collect()
    }
}

/// Write a sorted, deduplicated pixel file with all explored bits clear,
/// truncating any previous content.
pub fn write_sorted(path: &Path, pixel_ids: impl IntoIterator<Item = i64>) -> Result<usize> {
    let mut ids: Vec<i64> = pixel_ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();

    let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for &id in &ids {
        writer.write_all(&RoadPixel::unexplored(id).raw().to_le_bytes())?;
    }
    writer.flush()?;
    Ok(ids.len())
}
