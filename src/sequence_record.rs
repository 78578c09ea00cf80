use anyhow::{Result, anyhow};
use bio::io::fasta;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{Read, Write},
};

/// One FASTA entry. `description` is the whole header line without the
/// leading `>`, so it starts with the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub id: String,
    pub sequence: String,
    pub description: String,
}

impl SequenceRecord {
    pub fn new(id: &str, sequence: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            sequence: sequence.to_string(),
            description: description.to_string(),
        }
    }

    pub fn from_fasta_record(record: &fasta::Record) -> Self {
        let id = record.id().to_string();
        let description = match record.desc() {
            Some(desc) if !desc.is_empty() => format!("{id} {desc}"),
            _ => id.clone(),
        };
        Self {
            sequence: String::from_utf8_lossy(record.seq()).to_string(),
            description,
            id,
        }
    }

    pub fn from_fasta_reader<R: Read>(reader: R) -> Result<Vec<SequenceRecord>> {
        fasta::Reader::new(reader)
            .records()
            .enumerate()
            .map(|(idx, record)| {
                record
                    .map(|r| Self::from_fasta_record(&r))
                    .map_err(|e| anyhow!("Malformed FASTA record #{}: {e}", idx + 1))
            })
            .collect()
    }

    pub fn from_fasta_file(filename: &str) -> Result<Vec<SequenceRecord>> {
        let file =
            File::open(filename).map_err(|e| anyhow!("Could not open FASTA file '{filename}': {e}"))?;
        Self::from_fasta_reader(file)
            .map_err(|e| anyhow!("Could not parse FASTA file '{filename}': {e}"))
    }

    /// Free text after the id, as it would appear in a FASTA header.
    pub fn header_desc(&self) -> Option<&str> {
        let rest = self
            .description
            .strip_prefix(self.id.as_str())
            .unwrap_or(&self.description)
            .trim();
        if rest.is_empty() { None } else { Some(rest) }
    }

    pub fn write_fasta<W: Write>(records: &[SequenceRecord], writer: W) -> Result<()> {
        let mut writer = fasta::Writer::new(writer);
        for record in records {
            writer.write(&record.id, record.header_desc(), record.sequence.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_fasta_file(records: &[SequenceRecord], filename: &str) -> Result<()> {
        let file = File::create(filename)
            .map_err(|e| anyhow!("Could not create FASTA file '{filename}': {e}"))?;
        Self::write_fasta(records, file)
    }

    pub fn len(&self) -> usize {
        self.sequence.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FASTA: &str = ">A1 heavy|IGHV1|IGHJ4|human|CDR1=GYTFTDYY, FR2=IHWVRQ\nQVQLGYTF\nTDYYIHWVRQ\n>A2\nAAAAA\n";

    #[test]
    fn test_description_keeps_id_in_first_field() {
        let records = SequenceRecord::from_fasta_reader(FASTA.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "A1");
        assert_eq!(records[0].sequence, "QVQLGYTFTDYYIHWVRQ");
        assert_eq!(
            records[0].description,
            "A1 heavy|IGHV1|IGHJ4|human|CDR1=GYTFTDYY, FR2=IHWVRQ"
        );
        assert_eq!(records[1].description, "A2");
        assert_eq!(records[1].header_desc(), None);
    }

    #[test]
    fn test_write_fasta_roundtrips_header() {
        let records = SequenceRecord::from_fasta_reader(FASTA.as_bytes()).unwrap();
        let mut out = Vec::new();
        SequenceRecord::write_fasta(&records, &mut out).unwrap();
        let again = SequenceRecord::from_fasta_reader(out.as_slice()).unwrap();
        assert_eq!(records, again);
    }

    #[test]
    fn test_fixture_file() {
        let records = SequenceRecord::from_fasta_file("test_files/antibodies.fasta").unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| !r.is_empty()));
    }

    #[test]
    fn test_nonexistent_file() {
        let result = SequenceRecord::from_fasta_file("nonexistent_file.fasta");
        assert!(result.is_err(), "Expected an error for a nonexistent file");
    }
}
