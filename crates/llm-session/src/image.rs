use std::path::Path;
use std::time::Instant;

use uuid::Uuid;

use llm_session_core::ProgressSink;
use llm_session_engine::{EngineFactory, ImageEngine};
use llm_session_metrics::ImageMetrics;

use crate::error::{Result, SessionError};

/// An image generation engine. It holds no conversation state and is ready
/// as soon as it is constructed.
pub struct ImageSession {
    id: String,
    engine: Box<dyn ImageEngine>,
}

impl std::fmt::Debug for ImageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSession")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ImageSession {
    pub fn create(factory: &dyn EngineFactory, model_dir: &Path) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        log::info!("[{}] Creating image session for {}", id, model_dir.display());
        let engine = factory.create_image_engine(model_dir).map_err(|error| {
            log::error!("[{}] Image engine construction failed: {}", id, error);
            SessionError::EngineConstructionFailed(model_dir.to_path_buf())
        })?;
        Ok(Self { id, engine })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generates an image for `prompt` into `output_path`, forwarding progress
    /// percentages to `sink`. Returns the wall-clock duration.
    pub fn run(
        &mut self,
        prompt: &str,
        output_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<ImageMetrics> {
        log::debug!(
            "[{}] Generating image into {}",
            self.id,
            output_path.display()
        );
        let started = Instant::now();
        let mut on_progress = |percent: u32| sink.on_percent(percent);
        self.engine.run(prompt, output_path, &mut on_progress)?;

        let metrics = ImageMetrics {
            total_timeus: i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX),
        };
        log::info!(
            "[{}] Image generated in {} us",
            self.id,
            metrics.total_timeus
        );
        Ok(metrics)
    }
}

impl Drop for ImageSession {
    fn drop(&mut self) {
        log::debug!("[{}] Releasing image engine", self.id);
    }
}

#[cfg(test)]
mod tests {
    use llm_session_engine::ReplayEngineFactory;

    use super::*;

    #[test]
    fn run_reports_progress_and_duration() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ReplayEngineFactory::new();
        let mut session = ImageSession::create(&factory, dir.path()).unwrap();

        let mut percents = Vec::new();
        let mut sink = |unit: Option<&str>| {
            if let Some(text) = unit {
                percents.push(text.parse::<u32>().unwrap());
            }
            false
        };
        let output = dir.path().join("out.png");
        let metrics = session.run("a red bicycle", &output, &mut sink).unwrap();

        assert!(metrics.total_timeus >= 0);
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(output.exists());
    }
}
