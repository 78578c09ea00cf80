use cdrseek::{
    MatchOptions, SearchError, SequenceRecord, find_matches, find_matches_with,
    protocol::InclusionPolicy,
    report::{ReportFormat, write_search_report},
    subsections::{MalformedPolicy, RegionKind, SubsectionLayout, parse_subsections},
};

fn fixture() -> Vec<SequenceRecord> {
    SequenceRecord::from_fasta_file("test_files/antibodies.fasta").unwrap()
}

#[test]
fn cdr3_motif_found_in_two_heavy_chains() {
    let results = find_matches("DYY", &fixture()).unwrap();
    assert_eq!(results.ids(), vec!["AB001", "AB002"]);

    let ab001 = results.get("AB001").unwrap();
    assert_eq!(ab001.occurrences, vec![97]);
    assert_eq!(ab001.matches.keys().copied().collect::<Vec<_>>(), vec![97, 98, 99]);
    assert_eq!(ab001.subsection("CDR3"), Some("ARDYYGSGSYFDY"));
    assert_eq!(ab001.subsections_matches.len(), 1);

    let ab002 = results.get("AB002").unwrap();
    assert_eq!(ab002.occurrences, vec![100]);
    assert_eq!(ab002.subsection("CDR3"), Some("AKGGDYYFDY"));
}

#[test]
fn subsection_only_record_needs_explicit_policy() {
    let records = fixture();
    assert!(!find_matches("DYY", &records).unwrap().contains("AB004"));

    let options = MatchOptions {
        inclusion: InclusionPolicy::SequenceOrSubsection,
        ..Default::default()
    };
    let results = find_matches_with("DYY", &records, &options).unwrap();
    assert_eq!(results.ids(), vec!["AB001", "AB002", "AB004"]);
    let ab004 = results.get("AB004").unwrap();
    assert!(ab004.matches.is_empty());
    assert_eq!(ab004.subsection("CDR3"), Some("ardyyw"));
}

#[test]
fn every_fixture_record_has_canonical_regions() {
    for record in fixture() {
        let subs =
            parse_subsections(&record, &SubsectionLayout::default(), MalformedPolicy::Fail)
                .unwrap();
        let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, cdrseek::subsections::CANONICAL_REGIONS.to_vec());
        assert_eq!(
            subs.iter().filter(|s| s.kind() == RegionKind::Cdr).count(),
            3
        );
    }
}

#[test]
fn malformed_record_reports_id_and_prints_nothing() {
    let mut records = fixture();
    records.push(SequenceRecord::new("BROKEN", "ARDYY", "BROKEN|IGHV1|human"));
    let err = find_matches("DYY", &records).unwrap_err();
    assert!(err.to_string().contains("BROKEN"));
    assert!(matches!(err, SearchError::InputFormat { .. }));
}

#[test]
fn json_report_for_fixture() {
    let results = find_matches("QVQL", &fixture()).unwrap();
    let mut out = Vec::new();
    write_search_report(&results, ReportFormat::Json, &mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["record_count"], 2);
    assert_eq!(value["records"][0]["id"], "AB001");
    assert_eq!(value["records"][1]["id"], "AB004");
    assert_eq!(value["records"][0]["occurrences"], serde_json::json!([0]));
}

#[test]
fn malformed_fasta_file_names_file_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sequence_first.fasta");
    std::fs::write(&path, "QVQLVQSGAEVKKPGAS\n>AB011 heavy|v|j|human|CDR1=DYY\nDYY\n").unwrap();
    let err = SequenceRecord::from_fasta_file(&path.to_string_lossy()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("sequence_first.fasta"));
    assert!(message.contains("record #1"));
}

#[test]
fn skipped_malformed_entries_keep_fixture_matches() {
    let mut records = fixture();
    records.push(SequenceRecord::new(
        "AB005",
        "QVQLDYYK",
        "AB005 heavy|IGHV1|IGHJ4|human|CDR1=GYT, FR2 MHWV, CDR3=ARDYY",
    ));
    assert!(find_matches("DYY", &records).is_err());

    let options = MatchOptions {
        malformed: MalformedPolicy::Skip,
        ..Default::default()
    };
    let results = find_matches_with("DYY", &records, &options).unwrap();
    assert_eq!(results.ids(), vec!["AB001", "AB002", "AB005"]);
    let ab005 = results.get("AB005").unwrap();
    assert_eq!(ab005.occurrences, vec![4]);
    assert_eq!(ab005.subsection("CDR3"), Some("ARDYY"));
}
