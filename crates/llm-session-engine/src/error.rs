use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
