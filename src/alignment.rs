use crate::{error::SearchError, sequence_record::SequenceRecord};
use bio::alignment::{
    Alignment, AlignmentOperation,
    pairwise::{Aligner, MatchFunc},
};
use bio::scores::blosum62;
use cdrseek_protocol::AlignmentSummary;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    #[default]
    Local,
    /// Query aligned end to end, free end gaps in the target.
    Semiglobal,
    Global,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringScheme {
    /// BLOSUM62
    #[default]
    Protein,
    Nucleotide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentOptions {
    pub mode: AlignmentMode,
    pub scoring: ScoringScheme,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub match_score: i32,
    pub mismatch_score: i32,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            mode: AlignmentMode::Local,
            scoring: ScoringScheme::Protein,
            gap_open: -10,
            gap_extend: -1,
            match_score: 1,
            mismatch_score: -1,
        }
    }
}

fn residues(id: &str, text: &str, scoring: ScoringScheme) -> Result<Vec<u8>, SearchError> {
    let bytes: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if scoring == ScoringScheme::Protein {
        if let Some(bad) = bytes.iter().find(|b| !(b.is_ascii_uppercase() || **b == b'*')) {
            return Err(SearchError::input_format(
                id,
                format!("'{}' is not an amino acid code", *bad as char),
            ));
        }
    }
    Ok(bytes)
}

fn align_with<F: MatchFunc>(
    score: F,
    options: &AlignmentOptions,
    x: &[u8],
    y: &[u8],
) -> Alignment {
    let mut aligner = Aligner::with_capacity(
        x.len(),
        y.len(),
        options.gap_open,
        options.gap_extend,
        score,
    );
    match options.mode {
        AlignmentMode::Local => aligner.local(x, y),
        AlignmentMode::Semiglobal => aligner.semiglobal(x, y),
        AlignmentMode::Global => aligner.global(x, y),
    }
}

/// Extended CIGAR (`=`, `X`, `I`, `D`, `S`) relative to the query. Unaligned
/// target flanks are left out; bio's own `cigar` only handles semiglobal mode.
fn cigar(operations: &[AlignmentOperation]) -> String {
    let mut ret = String::new();
    let mut run: Option<(char, usize)> = None;
    for op in operations {
        let (code, len) = match op {
            AlignmentOperation::Match => ('=', 1),
            AlignmentOperation::Subst => ('X', 1),
            AlignmentOperation::Ins => ('I', 1),
            AlignmentOperation::Del => ('D', 1),
            AlignmentOperation::Xclip(n) => ('S', *n),
            AlignmentOperation::Yclip(_) => continue,
        };
        if len == 0 {
            continue;
        }
        run = match run {
            Some((c, n)) if c == code => Some((c, n + len)),
            Some((c, n)) => {
                ret.push_str(&format!("{n}{c}"));
                Some((code, len))
            }
            None => Some((code, len)),
        };
    }
    if let Some((c, n)) = run {
        ret.push_str(&format!("{n}{c}"));
    }
    ret
}

fn summarize(record_id: &str, alignment: &Alignment) -> AlignmentSummary {
    let aligned_length = alignment
        .operations
        .iter()
        .filter(|op| {
            !matches!(
                op,
                AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_)
            )
        })
        .count();
    let identities = alignment
        .operations
        .iter()
        .filter(|op| matches!(op, AlignmentOperation::Match))
        .count();
    let identity = if aligned_length == 0 {
        0.0
    } else {
        identities as f64 / aligned_length as f64
    };
    AlignmentSummary {
        record_id: record_id.to_string(),
        score: alignment.score,
        query_start: alignment.xstart,
        query_end: alignment.xend,
        target_start: alignment.ystart,
        target_end: alignment.yend,
        aligned_length,
        identities,
        identity,
        cigar: cigar(&alignment.operations),
    }
}

/// Pairwise alignment of `query` (x) against the record sequence (y).
pub fn align_query(
    query: &str,
    record: &SequenceRecord,
    options: &AlignmentOptions,
) -> Result<AlignmentSummary, SearchError> {
    let x = residues("<query>", query, options.scoring)?;
    if x.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let y = residues(&record.id, &record.sequence, options.scoring)?;
    if y.is_empty() {
        return Err(SearchError::input_format(&record.id, "sequence is empty"));
    }
    let alignment = match options.scoring {
        ScoringScheme::Protein => align_with(blosum62, options, &x, &y),
        ScoringScheme::Nucleotide => {
            let (m, mm) = (options.match_score, options.mismatch_score);
            align_with(move |a: u8, b: u8| if a == b { m } else { mm }, options, &x, &y)
        }
    };
    Ok(summarize(&record.id, &alignment))
}

/// Aligns the query against every record, best score first.
pub fn align_records(
    query: &str,
    records: &[SequenceRecord],
    options: &AlignmentOptions,
) -> Result<Vec<AlignmentSummary>, SearchError> {
    let mut ret = records
        .iter()
        .map(|record| align_query(query, record, options))
        .collect::<Result<Vec<_>, _>>()?;
    ret.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, seq: &str) -> SequenceRecord {
        SequenceRecord::new(id, seq, id)
    }

    #[test]
    fn test_exact_local_protein_hit() {
        let summary = align_query(
            "ARDYY",
            &rec("A1", "QVQLYYCARDYYGSG"),
            &AlignmentOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.target_start, 7);
        assert_eq!(summary.target_end, 12);
        assert_eq!(summary.identities, 5);
        assert_eq!(summary.identity, 1.0);
        assert_eq!(summary.cigar, "5=");
        assert!(summary.score > 0);
    }

    #[test]
    fn test_every_mode_reports_cigar() {
        let record = rec("A1", "CARDYYG");
        let summary_for = |mode| {
            let options = AlignmentOptions {
                mode,
                ..Default::default()
            };
            align_query("ARDYY", &record, &options).unwrap()
        };

        let local = summary_for(AlignmentMode::Local);
        assert_eq!(local.cigar, "5=");
        assert_eq!((local.target_start, local.target_end), (1, 6));
        assert_eq!(local.aligned_length, 5);

        let semiglobal = summary_for(AlignmentMode::Semiglobal);
        assert_eq!(semiglobal.cigar, "5=");
        assert_eq!(semiglobal.identities, 5);

        // Both flanking target residues become gaps in the query.
        let global = summary_for(AlignmentMode::Global);
        assert_eq!(global.cigar, "1D5=1D");
        assert_eq!(global.score, 7);
        assert_eq!(global.aligned_length, 7);
        assert_eq!((global.target_start, global.target_end), (0, 7));
    }

    #[test]
    fn test_cigar_runs() {
        use AlignmentOperation::*;
        let ops = [Xclip(2), Match, Match, Subst, Ins, Ins, Match, Del, Yclip(4)];
        assert_eq!(cigar(&ops), "2S2=1X2I1=1D");
        assert_eq!(cigar(&[]), "");
    }

    #[test]
    fn test_semiglobal_nucleotide() {
        let options = AlignmentOptions {
            mode: AlignmentMode::Semiglobal,
            scoring: ScoringScheme::Nucleotide,
            gap_open: -5,
            ..Default::default()
        };
        let summary = align_query("GATTACA", &rec("N1", "CCCGATTACACCC"), &options).unwrap();
        assert_eq!(summary.score, 7);
        assert_eq!(summary.query_start, 0);
        assert_eq!(summary.query_end, 7);
        assert_eq!(summary.target_start, 3);
    }

    #[test]
    fn test_records_sorted_by_score() {
        let records = vec![rec("weak", "GGGGGGG"), rec("strong", "CARDYYGSG")];
        let res = align_records("ARDYYG", &records, &AlignmentOptions::default()).unwrap();
        assert_eq!(res[0].record_id, "strong");
        assert_eq!(res.len(), 2);
    }

    #[test]
    fn test_lowercase_query_is_normalized() {
        let summary =
            align_query("ardyy", &rec("A1", "CARDYYG"), &AlignmentOptions::default()).unwrap();
        assert_eq!(summary.identities, 5);
    }

    #[test]
    fn test_rejects_non_residue_characters() {
        let err = align_query("AR-DYY", &rec("A1", "CARDYYG"), &AlignmentOptions::default());
        assert!(matches!(err, Err(SearchError::InputFormat { .. })));
    }

    #[test]
    fn test_empty_query() {
        let err = align_query("  ", &rec("A1", "CARDYYG"), &AlignmentOptions::default());
        assert!(matches!(err, Err(SearchError::EmptyQuery)));
    }
}
