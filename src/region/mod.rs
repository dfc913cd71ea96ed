//! Administrative region lookup
//!
//! - `table`: the `kode_wilayah` CSV and its code hierarchy
//! - `text`: name folding and similarity
//! - `resolver`: free-text queries to region candidates

pub mod resolver;
pub mod table;
pub mod text;

pub use resolver::{Candidate, MatchKind, MatchStrategy, RegionQuery, RegionResolver, Resolution};
pub use table::RegionTable;
