use thiserror::Error;

#[derive(Debug, Error)]
pub enum WamiError {
    #[error("flow store failure: {0}")]
    Persistence(String),

    #[error("flow engine failure: {0}")]
    Engine(String),

    #[error("transfer read failure: {0}")]
    TransferRead(String),

    #[error("cannot acquire writable resource for '{name}': {reason}")]
    ResourceAcquisition { name: String, reason: String },

    #[error("flow not found: {0}")]
    FlowNotFound(String),

    #[error("invalid step at position {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WamiError {
    pub fn persistence(reason: impl std::fmt::Display) -> Self {
        Self::Persistence(reason.to_string())
    }

    pub fn engine(reason: impl std::fmt::Display) -> Self {
        Self::Engine(reason.to_string())
    }

    pub fn transfer(reason: impl std::fmt::Display) -> Self {
        Self::TransferRead(reason.to_string())
    }

    pub fn acquisition(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ResourceAcquisition {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WamiError>;
