use crate::codec;
use crate::config::Config;
use crate::error::ScanError;
use crate::pipeline::{Pipeline, StepTiming};
use crate::storage::OutputStore;
use serde::Serialize;

/// Outcome of processing one upload
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub request_id: String,
    pub final_images: Vec<String>,
    pub processing_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Stages uploads, runs the pipeline and persists its outputs
pub struct ScanProcessor {
    pipeline: Pipeline,
    store: OutputStore,
}

impl ScanProcessor {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        Ok(Self {
            pipeline: Pipeline::new(),
            store: OutputStore::new(config)?,
        })
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Save `data`, decode it and run every stage.
    ///
    /// Blocks for the duration of the pipeline. The staged upload is removed
    /// once decoding has finished, whatever the outcome. On failure, outputs
    /// already written for this request are removed too.
    pub fn process_upload(&self, original_name: &str, data: &[u8]) -> Result<ScanResult, ScanError> {
        let request_id = OutputStore::new_request_id();

        let upload_path = self.store.save_upload(&request_id, original_name, data)?;
        tracing::info!(
            "Saved upload {} ({} bytes) to {}",
            original_name,
            data.len(),
            upload_path.display()
        );

        let decoded = codec::decode_file(&upload_path);
        if let Err(e) = std::fs::remove_file(&upload_path) {
            tracing::warn!("Failed to remove staged upload {}: {}", upload_path.display(), e);
        }
        let source = decoded?;

        let mut writer = self.store.writer(&request_id);
        let output = match self.pipeline.run(&source, &mut writer) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Pipeline failed for request {}: {}", request_id, e);
                writer.discard();
                return Err(e);
            }
        };

        Ok(ScanResult {
            request_id,
            final_images: output.manifest,
            processing_time_ms: output.total_time_ms,
            steps: output.steps,
        })
    }
}
