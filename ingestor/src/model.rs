use serde::{Deserialize, Serialize};
use wire::Reading;

/// Error body returned by every HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    pub fn route_not_found(path: impl Into<String>) -> Self {
        Self {
            message: "Route not found".to_string(),
            path: Some(path.into()),
        }
    }
}

/// Body of a window query: the readings on success, an error otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryBody {
    Readings(Vec<Reading>),
    Error(ErrorBody),
}

/// Rule-engine style ingest event: the enveloped payload under `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestEvent {
    pub data: String,
}
