//! 2D to 3D lookup table loading and parsing

mod entry;
mod loader;

pub use entry::LookupEntry;
pub use loader::{LookupTable, ParsedLut, TableLoadError, parse_lookup_entries};
