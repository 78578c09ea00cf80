//! Machine-readable contracts shared by the cdrseek library, its CLI and any
//! downstream consumer of its JSON reports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const REPORT_SCHEMA_VERSION: &str = "v1";

/// Which records qualify for a search report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionPolicy {
    /// A record is reported only when the query occurs in its full sequence.
    #[default]
    WholeSequence,
    /// A subsection hit alone is enough to report a record.
    SequenceOrSubsection,
}

impl InclusionPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::WholeSequence => "whole_sequence",
            Self::SequenceOrSubsection => "sequence_or_subsection",
        }
    }
}

/// A subsection (e.g. `CDR1`) whose sequence contains the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsectionMatch {
    pub name: String,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMatch {
    pub id: String,
    pub description: String,
    /// Zero-based position to residue, for every position covered by an occurrence.
    pub matches: BTreeMap<usize, char>,
    /// Start position of every non-overlapping occurrence, ascending.
    pub occurrences: Vec<usize>,
    /// Keyed by name in first-seen description order; a repeated name holds
    /// the last matching sequence.
    pub subsections_matches: Vec<SubsectionMatch>,
}

impl RecordMatch {
    pub fn has_sequence_match(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn subsection(&self, name: &str) -> Option<&str> {
        self.subsections_matches
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.sequence.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub schema_version: String,
    pub query: String,
    pub inclusion: InclusionPolicy,
    pub records_scanned: usize,
    pub record_count: usize,
    pub records: Vec<RecordMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub record_id: String,
    pub score: i32,
    pub query_start: usize,
    pub query_end: usize,
    pub target_start: usize,
    pub target_end: usize,
    pub aligned_length: usize,
    pub identities: usize,
    pub identity: f64,
    pub cigar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastHsp {
    pub bit_score: f64,
    pub score: f64,
    pub evalue: f64,
    pub query_from: usize,
    pub query_to: usize,
    pub hit_from: usize,
    pub hit_to: usize,
    pub identity: usize,
    pub positive: usize,
    pub gaps: usize,
    pub align_len: usize,
    pub qseq: String,
    pub hseq: String,
    pub midline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastHit {
    pub id: String,
    pub definition: String,
    pub accession: String,
    pub length: usize,
    pub hsps: Vec<BlastHsp>,
}

impl BlastHit {
    pub fn best_evalue(&self) -> Option<f64> {
        self.hsps.iter().map(|h| h.evalue).reduce(f64::min)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastQueryResult {
    pub query_id: String,
    pub query_def: String,
    pub query_len: usize,
    pub hits: Vec<BlastHit>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusion_policy_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&InclusionPolicy::SequenceOrSubsection).unwrap();
        assert_eq!(json, "\"sequence_or_subsection\"");
        let back: InclusionPolicy = serde_json::from_str("\"whole_sequence\"").unwrap();
        assert_eq!(back, InclusionPolicy::WholeSequence);
    }

    #[test]
    fn record_match_positions_serialize_as_object_keys() {
        let record = RecordMatch {
            id: "A1".to_string(),
            description: "A1|x|y|z|CDR1=DYY".to_string(),
            matches: [(3, 'D'), (4, 'Y')].into_iter().collect(),
            occurrences: vec![3],
            subsections_matches: vec![SubsectionMatch {
                name: "CDR1".to_string(),
                sequence: "DYY".to_string(),
            }],
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["matches"]["3"], "D");
        assert_eq!(record.subsection("CDR1"), Some("DYY"));
        assert_eq!(record.subsection("FR2"), None);
    }

    #[test]
    fn best_evalue_picks_smallest() {
        let hsp = |evalue| BlastHsp {
            bit_score: 1.0,
            score: 1.0,
            evalue,
            query_from: 1,
            query_to: 1,
            hit_from: 1,
            hit_to: 1,
            identity: 1,
            positive: 1,
            gaps: 0,
            align_len: 1,
            qseq: "A".to_string(),
            hseq: "A".to_string(),
            midline: "A".to_string(),
        };
        let hit = BlastHit {
            id: "h".to_string(),
            definition: String::new(),
            accession: String::new(),
            length: 1,
            hsps: vec![hsp(0.5), hsp(1e-9), hsp(2.0)],
        };
        assert_eq!(hit.best_evalue(), Some(1e-9));
    }
}
