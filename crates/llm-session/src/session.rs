use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use llm_session_engine::EngineFactory;
use llm_session_metrics::MetricsCollector;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::image::ImageSession;
use crate::text::TextSession;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Text,
    Image,
}

impl SessionKind {
    pub fn from_image_flag(is_image: bool) -> Self {
        if is_image {
            Self::Image
        } else {
            Self::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub model_dir: PathBuf,
    /// Falls back to [`SessionConfig::use_tmp_path`] when unset.
    pub use_tmp_path: Option<bool>,
    /// Prior messages, alternating user and assistant starting with user.
    pub history: Vec<String>,
    pub kind: SessionKind,
}

impl SessionOptions {
    pub fn text(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            use_tmp_path: None,
            history: Vec::new(),
            kind: SessionKind::Text,
        }
    }

    pub fn image(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            kind: SessionKind::Image,
            ..Self::text(model_dir)
        }
    }

    pub fn with_tmp_path(mut self, use_tmp_path: bool) -> Self {
        self.use_tmp_path = Some(use_tmp_path);
        self
    }

    pub fn with_history<S: Into<String>>(mut self, history: impl IntoIterator<Item = S>) -> Self {
        self.history = history.into_iter().map(Into::into).collect();
        self
    }
}

/// A live session of either kind.
pub enum Session {
    Text(TextSession),
    Image(ImageSession),
}

impl Session {
    /// Validates the model path, then builds the session for `options.kind`.
    /// No engine constructor runs when the path is missing.
    pub fn create(
        factory: &dyn EngineFactory,
        options: SessionOptions,
        config: &SessionConfig,
        metrics: Option<MetricsCollector>,
    ) -> Result<Self> {
        ensure_model_path(&options.model_dir)?;

        match options.kind {
            SessionKind::Image => Ok(Self::Image(ImageSession::create(
                factory,
                &options.model_dir,
            )?)),
            SessionKind::Text => Ok(Self::Text(TextSession::create(
                factory, options, config, metrics,
            )?)),
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Text(_) => SessionKind::Text,
            Self::Image(_) => SessionKind::Image,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Text(session) => session.id(),
            Self::Image(session) => session.id(),
        }
    }

    pub fn as_text_mut(&mut self) -> Result<&mut TextSession> {
        match self {
            Self::Text(session) => Ok(session),
            Self::Image(_) => Err(SessionError::WrongSessionKind {
                expected: SessionKind::Text,
                actual: SessionKind::Image,
            }),
        }
    }

    pub fn as_image_mut(&mut self) -> Result<&mut ImageSession> {
        match self {
            Self::Image(session) => Ok(session),
            Self::Text(_) => Err(SessionError::WrongSessionKind {
                expected: SessionKind::Image,
                actual: SessionKind::Text,
            }),
        }
    }
}

pub fn ensure_model_path(model_dir: &Path) -> Result<()> {
    if model_dir.exists() {
        Ok(())
    } else {
        log::error!("Model directory not found: {}", model_dir.display());
        Err(SessionError::ModelDirectoryNotFound(model_dir.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_image_flag() {
        assert_eq!(SessionKind::from_image_flag(true), SessionKind::Image);
        assert_eq!(SessionKind::from_image_flag(false), SessionKind::Text);
        assert_eq!(SessionKind::Image.to_string(), "image");
    }

    #[test]
    fn options_builders() {
        let options = SessionOptions::image("/models/sd")
            .with_tmp_path(false)
            .with_history(["a", "b"]);
        assert_eq!(options.kind, SessionKind::Image);
        assert_eq!(options.use_tmp_path, Some(false));
        assert_eq!(options.history, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_model_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_model_path(dir.path()).is_ok());
        assert!(matches!(
            ensure_model_path(&dir.path().join("absent")),
            Err(SessionError::ModelDirectoryNotFound(_))
        ));
    }
}
