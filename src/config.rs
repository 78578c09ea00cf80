use crate::{
    alignment::AlignmentOptions,
    blast::BlastSettings,
    matcher::MatchOptions,
    report::ReportFormat,
    tool_overrides::{ExternalTool, set_tool_override},
};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_FASTA_PATH: &str = "sequences.fasta";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Upper-case the query before matching.
    pub uppercase_query: bool,
    pub fasta_path: String,
    #[serde(flatten)]
    pub options: MatchOptions,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            uppercase_query: true,
            fasta_path: DEFAULT_FASTA_PATH.to_string(),
            options: MatchOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchSection,
    pub report: ReportSection,
    pub alignment: AlignmentOptions,
    pub blast: BlastSettings,
    /// Executable paths, applied as tool overrides.
    pub tools: HashMap<ExternalTool, String>,
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow!("Could not parse config JSON: {e}"))
    }

    pub fn load_from_path(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Could not read config file '{path}': {e}"))?;
        Self::from_json_str(&text).map_err(|e| anyhow!("{e} ('{path}')"))
    }

    pub fn save_to_path(&self, path: &str) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| anyhow!("Could not write config file '{path}': {e}"))
    }

    pub fn apply_tool_overrides(&self) {
        for (tool, path) in &self.tools {
            set_tool_override(*tool, path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alignment::AlignmentMode, blast::BlastProgram, subsections::MalformedPolicy};
    use cdrseek_protocol::InclusionPolicy;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::from_json_str("{}").unwrap();
        assert!(config.search.uppercase_query);
        assert_eq!(config.search.fasta_path, DEFAULT_FASTA_PATH);
        assert_eq!(config.search.options, MatchOptions::default());
        assert_eq!(config.search.options.layout.field_index, 4);
        assert_eq!(config.report.format, ReportFormat::Text);
        assert_eq!(config.blast.timeout_secs, Some(600));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_json_str(
            r#"{
                "search": {"inclusion": "sequence_or_subsection", "malformed": "skip"},
                "report": {"format": "tsv"},
                "alignment": {"mode": "semiglobal"},
                "blast": {"program": "blastn", "timeout_secs": null},
                "tools": {"blastn": "/opt/blast/bin/blastn"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.search.options.inclusion,
            InclusionPolicy::SequenceOrSubsection
        );
        assert_eq!(config.search.options.malformed, MalformedPolicy::Skip);
        assert_eq!(config.report.format, ReportFormat::Tsv);
        assert_eq!(config.alignment.mode, AlignmentMode::Semiglobal);
        assert_eq!(config.alignment.gap_open, -10);
        assert_eq!(config.blast.program, BlastProgram::Blastn);
        assert_eq!(config.blast.timeout_secs, None);
        assert_eq!(
            config.tools.get(&ExternalTool::Blastn).map(String::as_str),
            Some("/opt/blast/bin/blastn")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cdrseek.json");
        let path = path.to_string_lossy();
        let mut config = Config::default();
        config.search.uppercase_query = false;
        config.save_to_path(&path).unwrap();
        let loaded = Config::load_from_path(&path).unwrap();
        assert!(!loaded.search.uppercase_query);
    }

    #[test]
    fn test_invalid_json_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Config::load_from_path(&path.to_string_lossy()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
