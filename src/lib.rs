//! Search protein/nucleotide FASTA records for a query, map hits onto the
//! antibody CDR/FR subsections annotated in each description, and hand off
//! to pairwise alignment or BLAST+ when an exact substring is not enough.

pub mod about;
pub mod alignment;
pub mod blast;
pub mod config;
pub mod error;
pub mod matcher;
pub mod report;
pub mod sequence_record;
pub mod subsections;
pub mod tool_overrides;

pub use cdrseek_protocol as protocol;
pub use error::SearchError;
pub use matcher::{MatchOptions, SearchResults, find_matches, find_matches_with};
pub use sequence_record::SequenceRecord;
