//! Antibody subsection (CDR/FR) annotations carried in FASTA descriptions,
//! e.g. `id|v_gene|j_gene|species|CDR1=GYTFTGYY, FR2=MHWVRQ, ...`.

use crate::{error::SearchError, sequence_record::SequenceRecord};
use log::warn;
use serde::{Deserialize, Serialize};

/// Canonical order of the annotated regions of a variable domain.
pub const CANONICAL_REGIONS: [&str; 6] = ["CDR1", "FR2", "CDR2", "FR3", "CDR3", "FR4"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Cdr,
    Framework,
    Other,
}

impl RegionKind {
    pub fn of(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if upper.starts_with("CDR") {
            Self::Cdr
        } else if upper.starts_with("FR") {
            Self::Framework
        } else {
            Self::Other
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subsection {
    pub name: String,
    pub sequence: String,
}

impl Subsection {
    pub fn kind(&self) -> RegionKind {
        RegionKind::of(&self.name)
    }

    pub fn contains_query(&self, query: &str) -> bool {
        self.sequence.to_uppercase().contains(query)
    }
}

/// Where the subsection list lives inside a description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsectionLayout {
    pub field_index: usize,
    pub field_separator: char,
    pub part_separator: String,
}

impl Default for SubsectionLayout {
    fn default() -> Self {
        Self {
            field_index: 4,
            field_separator: '|',
            part_separator: ", ".to_string(),
        }
    }
}

/// What to do with a `Name=Sequence` part that does not have exactly one `=`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    #[default]
    Fail,
    Skip,
}

pub fn parse_subsections(
    record: &SequenceRecord,
    layout: &SubsectionLayout,
    policy: MalformedPolicy,
) -> Result<Vec<Subsection>, SearchError> {
    let fields: Vec<&str> = record.description.split(layout.field_separator).collect();
    let field = fields.get(layout.field_index).ok_or_else(|| {
        SearchError::input_format(
            &record.id,
            format!(
                "description has {} '{}'-delimited field(s), subsections expected in field {}",
                fields.len(),
                layout.field_separator,
                layout.field_index
            ),
        )
    })?;

    let mut ret = Vec::new();
    for part in field.split(layout.part_separator.as_str()) {
        let mut pieces = part.split('=');
        match (pieces.next(), pieces.next(), pieces.next()) {
            (Some(name), Some(sequence), None) => ret.push(Subsection {
                name: name.to_string(),
                sequence: sequence.to_string(),
            }),
            _ => match policy {
                MalformedPolicy::Fail => {
                    return Err(SearchError::input_format(
                        &record.id,
                        format!("subsection entry '{part}' is not of the form Name=Sequence"),
                    ));
                }
                MalformedPolicy::Skip => {
                    warn!(
                        "Skipping malformed subsection entry '{part}' in record '{}'",
                        record.id
                    );
                }
            },
        }
    }
    Ok(ret)
}
