use std::path::PathBuf;

use thiserror::Error;

use llm_session_engine::EngineError;

use crate::session::SessionKind;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Model directory not found: {}", .0.display())]
    ModelDirectoryNotFound(PathBuf),

    #[error("Failed to create engine for {}", .0.display())]
    EngineConstructionFailed(PathBuf),

    #[error("Model load failed: {0}")]
    ModelLoadFailed(#[source] EngineError),

    #[error("Session is not ready")]
    SessionNotReady,

    #[error("Session has already been released")]
    SessionReleased,

    #[error("Session is busy with another submission")]
    SessionBusy,

    #[error("Expected a {expected} session, found a {actual} session")]
    WrongSessionKind {
        expected: SessionKind,
        actual: SessionKind,
    },

    #[error("Engine runtime failure: {0}")]
    EngineRuntime(#[from] EngineError),

    #[error("Failed to provision temp directory {}: {source}", .path.display())]
    TempDirProvisioningFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
