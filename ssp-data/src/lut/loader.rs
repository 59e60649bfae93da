//! Lookup table text parsing and length validation

use crate::lut::LookupEntry;
use crate::types::DepthGrid;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Setup-time failures while loading the lookup table.
#[derive(Debug, Error)]
pub enum TableLoadError {
    #[error("Lookup table asset {path} could not be read: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Lookup table has {actual} entries but the depth grid has {expected} pixels")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Result of tokenising a lookup table source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLut {
    /// Well-formed entries, in source order.
    pub entries: Vec<LookupEntry>,
    /// Tokens skipped because they were not an `x,y` pair of floats.
    pub skipped: usize,
}

/// Parse whitespace-separated `"<float>,<float>"` tokens.
///
/// Malformed tokens are counted and skipped, never fatal. Components past the
/// second are ignored.
pub fn parse_lookup_entries(source: &str) -> ParsedLut {
    let mut parsed = ParsedLut::default();

    for token in source.split_whitespace() {
        let mut parts = token.split(',');
        let entry = match (parts.next(), parts.next()) {
            (Some(x), Some(y)) => x
                .parse::<f32>()
                .ok()
                .zip(y.parse::<f32>().ok())
                .map(|(x, y)| LookupEntry::new(x, y)),
            _ => None,
        };

        match entry {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.skipped += 1,
        }
    }

    parsed
}

/// Immutable per-pixel projection table, length-checked against the depth grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    grid: DepthGrid,
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    /// Build a table from already parsed entries, enforcing one entry per pixel.
    pub fn new(grid: DepthGrid, entries: Vec<LookupEntry>) -> Result<Self, TableLoadError> {
        if entries.len() != grid.pixel_count() {
            return Err(TableLoadError::LengthMismatch {
                expected: grid.pixel_count(),
                actual: entries.len(),
            });
        }
        Ok(Self { grid, entries })
    }

    /// Parse `source` and validate its length.
    #[tracing::instrument(skip_all, fields(width = grid.width, height = grid.height))]
    pub fn load(source: &str, grid: DepthGrid) -> Result<Self, TableLoadError> {
        let ParsedLut { entries, skipped } = parse_lookup_entries(source);
        if skipped > 0 {
            warn!(skipped, "Skipped malformed lookup table tokens");
        }
        debug!("Added {} entries into the lookup table", entries.len());
        Self::new(grid, entries)
    }

    /// Read and parse a lookup table text asset.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path<P: AsRef<Path>>(path: P, grid: DepthGrid) -> Result<Self, TableLoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TableLoadError::Missing {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded lookup table asset {}", path.display());
        Self::load(&source, grid)
    }

    pub fn grid(&self) -> DepthGrid {
        self.grid
    }

    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
