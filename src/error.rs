use crate::blast::ToolError;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum SearchError {
    EmptyQuery,
    InputFormat { record_id: String, message: String },
    ExternalTool(ToolError),
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl SearchError {
    pub fn input_format(record_id: &str, message: impl Into<String>) -> Self {
        SearchError::InputFormat {
            record_id: record_id.to_string(),
            message: message.into(),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SearchError::ExternalTool(e) => Some(e),
            SearchError::Io(e) => Some(e),
            SearchError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SearchError::EmptyQuery => write!(f, "Query is empty"),
            SearchError::InputFormat { record_id, message } => {
                write!(f, "Malformed record '{record_id}': {message}")
            }
            SearchError::ExternalTool(e) => write!(f, "External tool failed: {e}"),
            SearchError::Io(e) => write!(f, "I/O error: {e}"),
            SearchError::Serde(e) => write!(f, "Serialization error: {e}"),
        }
    }
}

impl From<ToolError> for SearchError {
    fn from(err: ToolError) -> Self {
        SearchError::ExternalTool(err)
    }
}

impl From<std::io::Error> for SearchError {
    fn from(err: std::io::Error) -> Self {
        SearchError::Io(err)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serde(err)
    }
}
