//! Counting request orchestration
//!
//! One request: store the upload, build the right-side sprite on a blocking
//! worker, upload photo and sprite, make exactly one generation call, then
//! normalize the reply. Remote files and scratch files are released on every
//! path.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::counts::{parse_reply, CountsMap};
use crate::error::{CountError, ModelError};
use crate::image_processing::SpriteBuilder;
use crate::prompt::ANALYZER_PROMPT;
use crate::vision::{mime_type_for, RemoteFile, VisionModel};
use crate::workspace::RequestWorkspace;

const SPRITE_MIME_TYPE: &str = "image/jpeg";

/// Result of one successful counting request
#[derive(Debug, Clone)]
pub struct CountOutcome {
    pub counts: CountsMap,
    pub model: String,
    pub raw_debug: Value,
    /// Rows were sliced over the full height because the trimmed region was too short
    pub geometry_fallback: bool,
    /// The reply held no JSON object, counts are all zero
    pub parse_degraded: bool,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Model names, or the single listing error
    pub available_models: Vec<String>,
    pub model: String,
}

/// What the blocking sprite stage hands back
struct PreparedImages {
    original: PathBuf,
    original_mime: String,
    sprite: PathBuf,
    geometry_fallback: bool,
}

/// Remote files uploaded for one request
///
/// Dropping the guard with files still held (the request future was
/// cancelled) schedules their deletion on the current runtime.
struct UploadedFiles {
    model: Arc<dyn VisionModel>,
    files: Vec<RemoteFile>,
}

impl UploadedFiles {
    fn new(model: Arc<dyn VisionModel>) -> Self {
        Self {
            model,
            files: Vec::with_capacity(2),
        }
    }

    fn push(&mut self, file: RemoteFile) {
        self.files.push(file);
    }

    fn as_slice(&self) -> &[RemoteFile] {
        &self.files
    }

    /// Delete every held file now; whatever is left if this is cancelled
    /// midway goes to `Drop`
    async fn release(mut self) {
        while let Some(file) = self.files.first().cloned() {
            delete_all(self.model.as_ref(), std::slice::from_ref(&file)).await;
            self.files.remove(0);
        }
    }
}

impl Drop for UploadedFiles {
    fn drop(&mut self) {
        if self.files.is_empty() {
            return;
        }

        let files = std::mem::take(&mut self.files);
        let model = Arc::clone(&self.model);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Request cancelled, releasing {} remote file(s)", files.len());
                handle.spawn(async move { delete_all(model.as_ref(), &files).await });
            }
            Err(_) => warn!(
                "No runtime to release {} remote file(s): {:?}",
                files.len(),
                files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>()
            ),
        }
    }
}

/// Delete remote files; failures are logged and otherwise ignored
async fn delete_all(model: &dyn VisionModel, files: &[RemoteFile]) {
    for file in files {
        if let Err(e) = model.delete_file(file).await {
            warn!("Failed to delete remote file {}: {}", file.name, e);
        }
    }
}

pub struct CountingService {
    config: Arc<AppConfig>,
    model: Arc<dyn VisionModel>,
    builder: Arc<SpriteBuilder>,
}

impl CountingService {
    pub fn new(config: Arc<AppConfig>, model: Arc<dyn VisionModel>, builder: SpriteBuilder) -> Self {
        Self {
            config,
            model,
            builder: Arc::new(builder),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Count the beads on one uploaded abacus photo
    pub async fn count(&self, filename: &str, bytes: Vec<u8>) -> Result<CountOutcome, CountError> {
        if filename.is_empty() {
            return Err(CountError::Upload("Nenhuma imagem selecionada".to_string()));
        }

        let started = Instant::now();
        info!("Counting request for '{}' ({} bytes)", filename, bytes.len());

        let workspace = RequestWorkspace::create(&self.config.upload_dir)?;
        let result = self.run(&workspace, filename, bytes).await;
        workspace.close();

        match &result {
            Ok(outcome) => info!(
                "Counting request for '{}' done in {}ms (total {}, degraded: {}, geometry fallback: {})",
                filename,
                started.elapsed().as_millis(),
                outcome.counts.total(),
                outcome.parse_degraded,
                outcome.geometry_fallback
            ),
            Err(e) => warn!("Counting request for '{}' failed: {}", filename, e),
        }

        result
    }

    async fn run(
        &self,
        workspace: &RequestWorkspace,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<CountOutcome, CountError> {
        let original = workspace.save_original(filename, &bytes)?;
        let files = workspace.sprite_files();
        let builder = Arc::clone(&self.builder);

        let prepared = tokio::task::spawn_blocking(move || -> Result<PreparedImages, CountError> {
            let original_mime = image::guess_format(&bytes)
                .map(|format| format.to_mime_type().to_string())
                .unwrap_or_else(|_| mime_type_for(&original).to_string());

            let img = image::load_from_memory(&bytes)?.to_rgb8();
            debug!("Decoded {}x{} upload", img.width(), img.height());

            let sprite = builder.build(&img).map_err(CountError::Sprite)?;
            files.write(&sprite)?;

            Ok(PreparedImages {
                original,
                original_mime,
                sprite: files.sprite,
                geometry_fallback: sprite.geometry.margins_discarded,
            })
        })
        .await
        .map_err(|e| CountError::Worker(e.to_string()))??;

        info!("Sprite ready, calling model {}", self.model.model_name());

        let mut uploaded = UploadedFiles::new(Arc::clone(&self.model));
        let reply = self.ask_model(&prepared, &mut uploaded).await;
        uploaded.release().await;
        let reply = parse_reply(&reply?);

        Ok(CountOutcome {
            counts: reply.counts(),
            model: self.model.model_name().to_string(),
            raw_debug: reply.raw_debug(),
            geometry_fallback: prepared.geometry_fallback,
            parse_degraded: reply.is_degraded(),
        })
    }

    /// Upload both images and make the single generation call.
    /// Every handle that was created ends up in `uploaded`, even on failure.
    async fn ask_model(
        &self,
        prepared: &PreparedImages,
        uploaded: &mut UploadedFiles,
    ) -> Result<String, ModelError> {
        uploaded.push(
            self.model
                .upload_file(&prepared.original, &prepared.original_mime)
                .await?,
        );
        uploaded.push(
            self.model
                .upload_file(&prepared.sprite, SPRITE_MIME_TYPE)
                .await?,
        );

        let timeout = self.config.model_timeout;
        let call = self.model.generate(ANALYZER_PROMPT, uploaded.as_slice(), timeout);
        let text = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ModelError::Timeout(timeout))??;

        debug!("Model replied with {} chars", text.len());
        Ok(text)
    }

    /// List the models visible to the configured key
    pub async fn health(&self) -> HealthReport {
        let available_models = match self.model.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("Listing models failed: {}", e);
                vec![e.to_string()]
            }
        };

        HealthReport {
            available_models,
            model: self.model.model_name().to_string(),
        }
    }
}
