use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{LazyLock, RwLock},
};

static TOOL_OVERRIDES: LazyLock<RwLock<HashMap<ExternalTool, String>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// External executables cdrseek knows how to locate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalTool {
    MakeBlastDb,
    Blastp,
    Blastn,
}

impl ExternalTool {
    pub fn env_var(self) -> &'static str {
        match self {
            Self::MakeBlastDb => "CDRSEEK_MAKEBLASTDB_BIN",
            Self::Blastp => "CDRSEEK_BLASTP_BIN",
            Self::Blastn => "CDRSEEK_BLASTN_BIN",
        }
    }

    pub fn default_bin(self) -> &'static str {
        match self {
            Self::MakeBlastDb => "makeblastdb",
            Self::Blastp => "blastp",
            Self::Blastn => "blastn",
        }
    }
}

fn normalized_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// An empty `configured` value clears the override.
pub fn set_tool_override(tool: ExternalTool, configured: &str) {
    let mut guard = TOOL_OVERRIDES
        .write()
        .expect("Tool override lock poisoned for write");
    if let Some(value) = normalized_non_empty(configured) {
        guard.insert(tool, value);
    } else {
        guard.remove(&tool);
    }
}

pub fn get_tool_override(tool: ExternalTool) -> Option<String> {
    TOOL_OVERRIDES
        .read()
        .expect("Tool override lock poisoned for read")
        .get(&tool)
        .cloned()
}

fn configured(tool: ExternalTool) -> Option<String> {
    get_tool_override(tool).or_else(|| {
        std::env::var(tool.env_var())
            .ok()
            .and_then(|v| normalized_non_empty(&v))
    })
}

/// Override, then environment variable, then the bare name for PATH lookup.
pub fn resolve_tool_executable(tool: ExternalTool) -> String {
    configured(tool).unwrap_or_else(|| tool.default_bin().to_string())
}

pub fn active_resolution_label(tool: ExternalTool) -> String {
    configured(tool).unwrap_or_else(|| format!("PATH lookup: {}", tool.default_bin()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_and_clears() {
        set_tool_override(ExternalTool::Blastn, "  /opt/blast/bin/blastn ");
        assert_eq!(
            resolve_tool_executable(ExternalTool::Blastn),
            "/opt/blast/bin/blastn"
        );
        set_tool_override(ExternalTool::Blastn, "");
        assert_eq!(get_tool_override(ExternalTool::Blastn), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ExternalTool::MakeBlastDb.env_var(), "CDRSEEK_MAKEBLASTDB_BIN");
        if std::env::var(ExternalTool::MakeBlastDb.env_var()).is_err() {
            assert_eq!(
                active_resolution_label(ExternalTool::MakeBlastDb),
                "PATH lookup: makeblastdb"
            );
        }
    }
}
