use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, Secret};
use crate::worker::Worker;

/// Shared, read-only state handed to every request
#[derive(Debug)]
pub struct AppState {
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    pub worker: Worker,
    pub hyperbolic_api_key: Secret,
    pub openrouter_api_key: Secret,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            uploads_dir: config.uploads_dir.clone(),
            static_dir: config.static_dir.clone(),
            worker: Worker::new(config.worker_program.clone(), config.worker_args.clone()),
            hyperbolic_api_key: config.hyperbolic_api_key.clone(),
            openrouter_api_key: config.openrouter_api_key.clone(),
        }
    }
}

/// An upload in the uploads directory, removed when dropped unless discarded first
#[derive(Debug)]
pub struct StoredFile {
    pub path: PathBuf,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    armed: bool,
}

impl StoredFile {
    /// Reserve a unique path in `dir`; nothing is written yet
    pub fn create(dir: &Path, original_name: &str, mime_type: &str) -> Self {
        Self {
            path: Self::unique_path(dir, original_name),
            original_name: original_name.to_string(),
            mime_type: mime_type.to_string(),
            size: 0,
            armed: true,
        }
    }

    /// `<uuid-v4><original extension>` inside `dir`
    pub fn unique_path(dir: &Path, original_name: &str) -> PathBuf {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        dir.join(format!("{}{}", Uuid::new_v4(), extension))
    }

    /// Remove the file in the background. Failures are logged, never surfaced
    pub fn discard(mut self) -> JoinHandle<()> {
        self.armed = false;
        let path = std::mem::take(&mut self.path);
        let original_name = std::mem::take(&mut self.original_name);

        tokio::spawn(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(
                    path = %path.display(),
                    original = %original_name,
                    "Removed upload"
                ),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    original = %original_name,
                    error = %e,
                    "Failed to remove upload"
                ),
            }
        })
    }
}

impl Drop for StoredFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed abandoned upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove abandoned upload"
            ),
        }
    }
}
