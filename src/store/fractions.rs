//! Per-track explored fractions (`<region>.pixf`).
//!
//! Text format, one processed track per line: `<trackId> <fraction>`.
//! A track listed here has already been replayed into the pixel file and is
//! skipped on the next pass.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Load the fraction map; a missing file yields an empty map, malformed
/// lines are skipped.
pub fn load(path: &Path) -> Result<HashMap<u64, f64>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No explored fractions file at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut fractions = HashMap::new();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match (parts.next().and_then(|s| s.parse::<u64>().ok()), parts.next().and_then(|s| s.parse::<f64>().ok())) {
            (Some(id), Some(frac)) => {
                fractions.insert(id, frac);
            }
            _ => log::warn!("Skipping malformed fraction line: {line:?}"),
        }
    }
    Ok(fractions)
}

/// Persist the fraction map, truncating any previous content.
pub fn save(path: &Path, fractions: &HashMap<u64, f64>) -> Result<()> {
    let mut out = String::new();
    for (id, frac) in fractions {
        out.push_str(&format!("{id} {frac}\n"));
    }
    let mut file = fs::File::create(path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}
