use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Community not found: {0}")]
    CommunityNotFound(String),

    #[error("Community hierarchy contains a cycle through {0}")]
    CyclicHierarchy(String),

    #[error("Graph integrity violation: {0}")]
    Integrity(String),

    #[error("Fragment error for {path}: {reason}")]
    Fragment { path: String, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CodeReportError>;
