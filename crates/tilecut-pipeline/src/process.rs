//! Per-slice processing: matting, then filter, then stroke.
//!
//! The order is fixed. Matting runs first so the filter can skip the
//! removed background and the stroke can follow the matted silhouette.

use crate::diagnostics::StageMetrics;
use crate::filter::{Filter, apply_filter_in_place};
use crate::matting::remove_background_in_place;
use crate::stroke::{add_stroke, effective_width, padding};
use crate::types::{PipelineError, ProcessConfig, RgbaImage};

/// Run the configured transforms over a copy of `original`.
///
/// `original` is never modified; on error no partial buffer escapes.
/// When stroking is disabled the output has the input's dimensions;
/// otherwise it is padded as described in [`crate::stroke`].
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the config fails
/// [`ProcessConfig::validate`], [`PipelineError::EmptySlice`] for a
/// zero-area buffer, and [`PipelineError::RenderContext`] if the stroke
/// canvas cannot be allocated.
pub fn process_slice(
    original: &RgbaImage,
    config: &ProcessConfig,
) -> Result<RgbaImage, PipelineError> {
    run_stages(original, config, &mut Unrecorded)
}

/// Observer of each enabled stage, wrapped around its execution.
pub(crate) trait StageRecorder {
    /// Run `stage` and keep whatever is needed from the metrics it returns.
    fn record<F>(&mut self, stage: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<StageMetrics, PipelineError>;
}

/// Recorder that only runs the stages.
struct Unrecorded;

impl StageRecorder for Unrecorded {
    fn record<F>(&mut self, stage: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<StageMetrics, PipelineError>,
    {
        stage().map(drop)
    }
}

/// The stage sequence shared by [`process_slice`] and
/// [`process_slice_with_diagnostics`](crate::diagnostics::process_slice_with_diagnostics).
pub(crate) fn run_stages<R: StageRecorder>(
    original: &RgbaImage,
    config: &ProcessConfig,
    recorder: &mut R,
) -> Result<RgbaImage, PipelineError> {
    check_input(original, config)?;

    let mut buffer = original.clone();
    if config.remove_white {
        recorder.record(|| {
            let removed = remove_background_in_place(&mut buffer);
            Ok(StageMetrics::Matting {
                removed_pixels: removed as u64,
                total_pixels: u64::from(buffer.width()) * u64::from(buffer.height()),
            })
        })?;
    }
    if config.filter != Filter::None {
        recorder.record(|| {
            apply_filter_in_place(&mut buffer, config.filter);
            Ok(StageMetrics::Filter {
                filter: config.filter,
            })
        })?;
    }
    if config.add_stroke {
        recorder.record(|| {
            buffer = add_stroke(&buffer, config.stroke_width, config.stroke_color)?;
            Ok(StageMetrics::Stroke {
                width: config.stroke_width,
                effective_width: effective_width(config.stroke_width),
                padding: padding(config.stroke_width),
            })
        })?;
    }
    Ok(buffer)
}

fn check_input(original: &RgbaImage, config: &ProcessConfig) -> Result<(), PipelineError> {
    config.validate()?;
    if original.width() == 0 || original.height() == 0 {
        return Err(PipelineError::EmptySlice {
            width: original.width(),
            height: original.height(),
        });
    }
    Ok(())
}
