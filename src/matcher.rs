use crate::{
    error::SearchError,
    sequence_record::SequenceRecord,
    subsections::{MalformedPolicy, SubsectionLayout, parse_subsections},
};
use cdrseek_protocol::{InclusionPolicy, RecordMatch, SubsectionMatch};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    pub inclusion: InclusionPolicy,
    pub malformed: MalformedPolicy,
    pub layout: SubsectionLayout,
}

/// Matches for one search, in input record order.
#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    query: String,
    inclusion: InclusionPolicy,
    records_scanned: usize,
    records: Vec<RecordMatch>,
}

impl SearchResults {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn inclusion(&self) -> InclusionPolicy {
        self.inclusion
    }

    pub fn records_scanned(&self) -> usize {
        self.records_scanned
    }

    pub fn get(&self, id: &str) -> Option<&RecordMatch> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordMatch> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<RecordMatch> {
        self.records
    }
}

/// Trims and upper-cases a query typed by a user.
pub fn normalize_query(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Start positions (in characters) of every non-overlapping occurrence of
/// `query` in `sequence`, scanning left to right.
pub fn occurrence_starts(sequence: &str, query: &str) -> Vec<usize> {
    if query.is_empty() {
        return vec![];
    }
    if sequence.is_ascii() {
        return sequence.match_indices(query).map(|(i, _)| i).collect();
    }
    let mut ret = Vec::new();
    let (mut last_byte, mut last_char) = (0, 0);
    for (byte_start, _) in sequence.match_indices(query) {
        last_char += sequence[last_byte..byte_start].chars().count();
        last_byte = byte_start;
        ret.push(last_char);
    }
    ret
}

pub fn find_matches(
    query: &str,
    records: &[SequenceRecord],
) -> Result<SearchResults, SearchError> {
    find_matches_with(query, records, &MatchOptions::default())
}

pub fn find_matches_with(
    query: &str,
    records: &[SequenceRecord],
    options: &MatchOptions,
) -> Result<SearchResults, SearchError> {
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let mut seen = HashSet::new();
    let mut ret = SearchResults {
        query: query.to_string(),
        inclusion: options.inclusion,
        records_scanned: records.len(),
        records: vec![],
    };
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(SearchError::input_format(
                &record.id,
                "record id occurs more than once in this batch",
            ));
        }
        if let Some(found) = match_record(query, record, options)? {
            ret.records.push(found);
        }
    }
    debug!(
        "Query '{query}' matched {} of {} record(s)",
        ret.records.len(),
        ret.records_scanned
    );
    Ok(ret)
}

/// `None` if the record does not qualify under `options.inclusion`.
pub fn match_record(
    query: &str,
    record: &SequenceRecord,
    options: &MatchOptions,
) -> Result<Option<RecordMatch>, SearchError> {
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let query_len = query.chars().count();
    let chars: Vec<char> = record.sequence.chars().collect();
    let occurrences = occurrence_starts(&record.sequence, query);
    let matches: BTreeMap<usize, char> = occurrences
        .iter()
        .flat_map(|start| *start..start + query_len)
        .map(|pos| (pos, chars[pos]))
        .collect();

    let mut subsections_matches: Vec<SubsectionMatch> = vec![];
    for sub in parse_subsections(record, &options.layout, options.malformed)? {
        if !sub.contains_query(query) {
            continue;
        }
        // A repeated name keeps its first slot and takes the later sequence.
        match subsections_matches.iter_mut().find(|m| m.name == sub.name) {
            Some(existing) => existing.sequence = sub.sequence,
            None => subsections_matches.push(SubsectionMatch {
                name: sub.name,
                sequence: sub.sequence,
            }),
        }
    }

    let include = match options.inclusion {
        InclusionPolicy::WholeSequence => !matches.is_empty(),
        InclusionPolicy::SequenceOrSubsection => {
            !matches.is_empty() || !subsections_matches.is_empty()
        }
    };
    if !include {
        return Ok(None);
    }
    Ok(Some(RecordMatch {
        id: record.id.clone(),
        description: record.description.clone(),
        matches,
        occurrences,
        subsections_matches,
    }))
}
