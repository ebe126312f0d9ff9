use std::fmt;

use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, ViewerError>;

/// Which persisted resource a failed write belonged to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Stroke,
    Note,
    Progress,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Stroke => "stroke",
            Resource::Note => "note",
            Resource::Progress => "progress",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ViewerError {
    #[error("document {document_id} is not available from the network or the offline cache")]
    DocumentUnavailable { document_id: String },

    #[error("document load was cancelled")]
    LoadCancelled,

    #[error("render was superseded by a newer page request")]
    RenderCancelled,

    #[error("page render failed: {0}")]
    RenderFailed(String),

    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("{resource} persistence failed: {reason}")]
    PersistenceFailed { resource: Resource, reason: String },

    #[error("invalid mount options: {0}")]
    InvalidOptions(String),
}

/// Failure of a single request against the network or a host-provided store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("server answered {0}")]
    Status(u16),

    #[error("unreadable response: {0}")]
    Decode(String),
}

impl ViewerError {
    pub fn persistence(resource: Resource, reason: impl fmt::Display) -> Self {
        ViewerError::PersistenceFailed {
            resource,
            reason: reason.to_string(),
        }
    }

    /// Cancellations are expected during navigation and teardown and never reach the user.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ViewerError::RenderCancelled | ViewerError::LoadCancelled)
    }

    /// Stable identifier handed to the host for its fallback UI.
    pub fn kind(&self) -> &'static str {
        match self {
            ViewerError::DocumentUnavailable { .. } => "document_unavailable",
            ViewerError::LoadCancelled => "load_cancelled",
            ViewerError::RenderCancelled => "render_cancelled",
            ViewerError::RenderFailed(_) => "render_failed",
            ViewerError::PageOutOfRange { .. } => "page_out_of_range",
            ViewerError::PersistenceFailed { .. } => "persistence_failed",
            ViewerError::InvalidOptions(_) => "invalid_options",
        }
    }
}

impl From<ViewerError> for JsValue {
    fn from(error: ViewerError) -> Self {
        JsValue::from_str(&error.to_string())
    }
}
