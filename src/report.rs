use crate::matcher::SearchResults;
use anyhow::Result;
use cdrseek_protocol::{
    AlignmentSummary, BlastQueryResult, REPORT_SCHEMA_VERSION, RecordMatch, SearchReport,
};
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Tsv,
}

pub fn search_report(results: &SearchResults) -> SearchReport {
    SearchReport {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        query: results.query().to_string(),
        inclusion: results.inclusion(),
        records_scanned: results.records_scanned(),
        record_count: results.len(),
        records: results.iter().cloned().collect(),
    }
}

fn write_text_record<W: Write>(record: &RecordMatch, out: &mut W) -> Result<()> {
    writeln!(out, "Sequence ID: {}", record.id)?;
    writeln!(out, "Description: {}", record.description)?;
    writeln!(out, "Matches:")?;
    for (index, residue) in &record.matches {
        writeln!(out, "  Index: {index}, Character: {residue}")?;
    }
    writeln!(out)?;
    for sub in &record.subsections_matches {
        writeln!(out, "  {}: {}", sub.name, sub.sequence)?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_tsv<W: Write>(results: &SearchResults, out: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    wtr.write_record(["record_id", "kind", "key", "value"])?;
    for record in results.iter() {
        for (index, residue) in &record.matches {
            wtr.write_record([
                record.id.as_str(),
                "position",
                index.to_string().as_str(),
                residue.to_string().as_str(),
            ])?;
        }
        for sub in &record.subsections_matches {
            wtr.write_record([
                record.id.as_str(),
                "subsection",
                sub.name.as_str(),
                sub.sequence.as_str(),
            ])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Renders a finished search. Callers only get here once every record was
/// processed, so nothing partial is ever written.
pub fn write_search_report<W: Write>(
    results: &SearchResults,
    format: ReportFormat,
    mut out: W,
) -> Result<()> {
    match format {
        ReportFormat::Text => {
            for record in results.iter() {
                write_text_record(record, &mut out)?;
            }
        }
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &search_report(results))?;
            writeln!(out)?;
        }
        ReportFormat::Tsv => write_tsv(results, &mut out)?,
    }
    Ok(())
}

pub fn write_alignment_report<W: Write>(
    summaries: &[AlignmentSummary],
    format: ReportFormat,
    mut out: W,
) -> Result<()> {
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, summaries)?;
            writeln!(out)?;
        }
        ReportFormat::Text | ReportFormat::Tsv => {
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(b'\t')
                .from_writer(&mut out);
            for summary in summaries {
                wtr.serialize(summary)?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

pub fn write_blast_report<W: Write>(
    results: &[BlastQueryResult],
    format: ReportFormat,
    mut out: W,
) -> Result<()> {
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, results)?;
            writeln!(out)?;
        }
        ReportFormat::Text => {
            for query in results {
                writeln!(out, "Query: {} ({} residues)", query.query_def, query.query_len)?;
                if let Some(message) = &query.message {
                    writeln!(out, "  {message}")?;
                }
                for hit in &query.hits {
                    let evalue = hit.best_evalue().unwrap_or(f64::NAN);
                    writeln!(out, "  {}\t{}\tevalue={evalue:e}", hit.id, hit.definition)?;
                }
                writeln!(out)?;
            }
        }
        ReportFormat::Tsv => {
            let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(&mut out);
            wtr.write_record([
                "query_id", "hit_id", "evalue", "bit_score", "identity", "align_len", "hit_from",
                "hit_to",
            ])?;
            for query in results {
                for hit in &query.hits {
                    for hsp in &hit.hsps {
                        wtr.write_record([
                            query.query_id.clone(),
                            hit.id.clone(),
                            hsp.evalue.to_string(),
                            hsp.bit_score.to_string(),
                            hsp.identity.to_string(),
                            hsp.align_len.to_string(),
                            hsp.hit_from.to_string(),
                            hsp.hit_to.to_string(),
                        ])?;
                    }
                }
            }
            wtr.flush()?;
        }
    }
    Ok(())
}
