use crate::error::ScanError;
use image::{ColorType, DynamicImage, GenericImageView};
use serde::Serialize;
use std::time::Instant;

use super::stages;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Gray,
    Equalized,
    Blurred,
    AdaptiveThreshold,
    Enhanced,
    Result,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Gray,
        Stage::Equalized,
        Stage::Blurred,
        Stage::AdaptiveThreshold,
        Stage::Enhanced,
        Stage::Result,
    ];

    /// Base name the stage output is persisted under
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gray => "gray_image",
            Self::Equalized => "equalized_image",
            Self::Blurred => "blurred_image",
            Self::AdaptiveThreshold => "adaptive_threshold_image",
            Self::Enhanced => "enhanced_image",
            Self::Result => "result",
        }
    }
}

/// Destination for stage outputs.
///
/// `persist` is called once per stage, in order, before the next stage
/// starts. It returns the filename the output is reachable under.
pub trait StageSink {
    fn persist(&mut self, stage: Stage, image: &DynamicImage) -> Result<String, ScanError>;
}

/// Timing information for a single stage
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Persisted filenames in stage order
    pub manifest: Vec<String>,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// The fixed scan enhancement pipeline
#[derive(Debug, Default)]
pub struct Pipeline;

struct RunState<'a, S: StageSink> {
    sink: &'a mut S,
    manifest: Vec<String>,
    timings: Vec<StepTiming>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self
    }

    /// Run every stage over `source`, persisting each output through `sink`.
    ///
    /// Stops at the first failing stage or sink write.
    pub fn run<S: StageSink>(
        &self,
        source: &DynamicImage,
        sink: &mut S,
    ) -> Result<PipelineOutput, ScanError> {
        let start = Instant::now();
        validate_source(source)?;

        let mut state = RunState {
            sink,
            manifest: Vec::with_capacity(Stage::ALL.len()),
            timings: Vec::with_capacity(Stage::ALL.len()),
        };

        let gray = self.run_step(Stage::Gray, source, &mut state, stages::grayscale::apply)?;
        let equalized =
            self.run_step(Stage::Equalized, &gray, &mut state, stages::equalize::apply)?;
        drop(gray);
        let blurred = self.run_step(Stage::Blurred, &equalized, &mut state, stages::blur::apply)?;
        drop(equalized);
        self.run_step(
            Stage::AdaptiveThreshold,
            &blurred,
            &mut state,
            stages::threshold::apply,
        )?;
        drop(blurred);

        // Enhancement works from the untouched source, not the binarized image
        let enhanced = self.run_step(Stage::Enhanced, source, &mut state, stages::enhance::apply)?;
        self.run_step(Stage::Result, &enhanced, &mut state, |img| Ok(img.clone()))?;

        Ok(PipelineOutput {
            manifest: state.manifest,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: state.timings,
        })
    }

    fn run_step<S, F>(
        &self,
        stage: Stage,
        input: &DynamicImage,
        state: &mut RunState<'_, S>,
        step_fn: F,
    ) -> Result<DynamicImage, ScanError>
    where
        S: StageSink,
        F: FnOnce(&DynamicImage) -> Result<DynamicImage, ScanError>,
    {
        let step_start = Instant::now();
        let output = step_fn(input)?;
        let filename = state.sink.persist(stage, &output)?;
        let time_ms = step_start.elapsed().as_millis() as u64;

        tracing::debug!("Stage {} finished in {}ms -> {}", stage.name(), time_ms, filename);

        state.manifest.push(filename);
        state.timings.push(StepTiming {
            name: stage.name().to_string(),
            time_ms,
        });
        Ok(output)
    }
}

fn validate_source(source: &DynamicImage) -> Result<(), ScanError> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(ScanError::DecodeError("image has no pixels".to_string()));
    }
    if source.color() != ColorType::Rgb8 {
        return Err(ScanError::InvalidChannelLayout {
            expected: 3,
            found: source.color().channel_count(),
        });
    }
    Ok(())
}
