use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Marker file suffix
pub const REQUEST_EXT: &str = "request";

/// Request identity: the creation timestamp encoded in the marker's file name.
///
/// Timestamps sort lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of a marker file, if `path` is one
    pub fn from_marker(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some(REQUEST_EXT) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }
        Some(Self(stem.to_string()))
    }

    pub fn marker_name(&self) -> String {
        format!("{}.{}", self.0, REQUEST_EXT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Queue directory holding a marker; the location is the request's only state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueState {
    pub const ALL: [QueueState; 4] = [
        QueueState::Pending,
        QueueState::Processing,
        QueueState::Completed,
        QueueState::Failed,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            QueueState::Pending => "pending",
            QueueState::Processing => "processing",
            QueueState::Completed => "completed",
            QueueState::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
