use std::path::{Path, PathBuf};

use serde::Serialize;

use llm_session_engine::LlmEngine;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

#[derive(Debug, Serialize)]
struct EngineTmpConfig<'a> {
    tmp_path: &'a str,
    reuse_kv: bool,
    backend_type: &'a str,
}

/// Scratch directory placed next to the model path.
pub fn tmp_dir_for(model_dir: &Path, dir_name: &str) -> PathBuf {
    model_dir
        .parent()
        .unwrap_or(model_dir)
        .join(dir_name)
}

pub fn provision_tmp_dir(model_dir: &Path, dir_name: &str) -> Result<PathBuf> {
    let path = tmp_dir_for(model_dir, dir_name);
    if !path.exists() {
        log::debug!("Creating temporary directory: {}", path.display());
        std::fs::create_dir_all(&path).map_err(|source| {
            SessionError::TempDirProvisioningFailed {
                path: path.clone(),
                source,
            }
        })?;
    }
    Ok(path)
}

pub fn engine_tmp_config(tmp_path: &Path, config: &SessionConfig) -> String {
    let tmp_path = tmp_path.to_string_lossy();
    let engine_config = EngineTmpConfig {
        tmp_path: &tmp_path,
        reuse_kv: config.reuse_kv,
        backend_type: &config.backend_type,
    };
    serde_json::to_string(&engine_config).unwrap_or_default()
}

/// Provisions the scratch directory and hands it to the engine. Failures are
/// logged and otherwise ignored; the engine keeps its defaults.
pub fn configure_tmp_path(
    session_id: &str,
    engine: &mut dyn LlmEngine,
    model_dir: &Path,
    config: &SessionConfig,
) {
    let tmp_path = match provision_tmp_dir(model_dir, &config.tmp_dir_name) {
        Ok(path) => path,
        Err(error) => {
            log::warn!("[{}] {}", session_id, error);
            return;
        }
    };

    let engine_config = engine_tmp_config(&tmp_path, config);
    log::debug!("[{}] Setting extra configuration: {}", session_id, engine_config);
    if let Err(error) = engine.set_config(&engine_config) {
        log::warn!("[{}] Error setting configuration: {}", session_id, error);
    }
}
