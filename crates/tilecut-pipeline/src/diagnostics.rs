//! Slice processing diagnostics: per-stage timing and counts.
//!
//! Intended for tuning and for the CLI's `--timings` report. The
//! pipeline itself stays sans-IO: callers supply a [`Clock`], so native
//! builds can use `std::time::Instant` and tests can use a fake clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::process::{StageRecorder, run_stages};
use crate::types::{Dimensions, PipelineError, ProcessConfig, RgbaImage};

/// Source of timestamps for diagnostics.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Capture the current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from processing one slice.
///
/// Stages that the config disables are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceDiagnostics {
    /// Background removal.
    pub matting: Option<StageDiagnostics>,
    /// Color filter.
    pub filter: Option<StageDiagnostics>,
    /// Outline synthesis.
    pub stroke: Option<StageDiagnostics>,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Input buffer size.
    pub input: Dimensions,
    /// Output buffer size.
    pub output: Dimensions,
}

/// Diagnostics for a single processing stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Background removal metrics.
    Matting {
        /// Pixels reached by the fill (now transparent).
        removed_pixels: u64,
        /// Total pixels in the buffer.
        total_pixels: u64,
    },
    /// Color filter metrics.
    Filter {
        /// Applied filter.
        filter: Filter,
    },
    /// Outline metrics.
    Stroke {
        /// Configured width.
        width: u32,
        /// Width after the stroke multiplier.
        effective_width: u32,
        /// Padding added on each side.
        padding: u32,
    },
}

/// Process a slice exactly like [`process_slice`](crate::process_slice),
/// recording per-stage diagnostics.
///
/// # Errors
///
/// Same as [`process_slice`](crate::process_slice).
pub fn process_slice_with_diagnostics<C: Clock>(
    original: &RgbaImage,
    config: &ProcessConfig,
    clock: &C,
) -> Result<(RgbaImage, SliceDiagnostics), PipelineError> {
    let total_start = clock.now();
    let mut recorder = ClockRecorder {
        clock,
        matting: None,
        filter: None,
        stroke: None,
    };
    let buffer = run_stages(original, config, &mut recorder)?;

    let diagnostics = SliceDiagnostics {
        matting: recorder.matting,
        filter: recorder.filter,
        stroke: recorder.stroke,
        total_duration: clock.elapsed(&total_start),
        input: Dimensions::of(original),
        output: Dimensions::of(&buffer),
    };
    Ok((buffer, diagnostics))
}

/// Times each stage with a [`Clock`] and files it under its kind.
struct ClockRecorder<'a, C: Clock> {
    clock: &'a C,
    matting: Option<StageDiagnostics>,
    filter: Option<StageDiagnostics>,
    stroke: Option<StageDiagnostics>,
}

impl<C: Clock> StageRecorder for ClockRecorder<'_, C> {
    fn record<F>(&mut self, stage: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<StageMetrics, PipelineError>,
    {
        let start = self.clock.now();
        let metrics = stage()?;
        let duration = self.clock.elapsed(&start);
        let slot = match metrics {
            StageMetrics::Matting { .. } => &mut self.matting,
            StageMetrics::Filter { .. } => &mut self.filter,
            StageMetrics::Stroke { .. } => &mut self.stroke,
        };
        *slot = Some(StageDiagnostics { duration, metrics });
        Ok(())
    }
}

impl SliceDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{}x{} -> {}x{} in {:.3}ms",
            self.input.width,
            self.input.height,
            self.output.width,
            self.output.height,
            duration_ms(self.total_duration),
        ));

        let stages = [
            ("Matting", &self.matting),
            ("Filter", &self.filter),
            ("Stroke", &self.stroke),
        ];
        for (name, diag) in stages {
            let Some(diag) = diag else { continue };
            lines.push(format!(
                "  {name:<10} {:>8.3}ms  {}",
                duration_ms(diag.duration),
                format_metrics(&diag.metrics),
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Matting {
            removed_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let pct = if *total_pixels > 0 {
                *removed_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!("removed={removed_pixels}/{total_pixels} ({pct:.1}%)")
        }
        StageMetrics::Filter { filter } => format!("filter={filter}"),
        StageMetrics::Stroke {
            width,
            effective_width,
            padding,
        } => format!("width={width} effective={effective_width} padding={padding}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use image::Rgba;

    use super::*;
    use crate::process_slice;

    /// Clock that advances one millisecond per `now()` call.
    struct StepClock(Cell<u64>);

    impl Clock for StepClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.0.get() - since)
        }
    }

    fn sample() -> RgbaImage {
        RgbaImage::from_fn(12, 12, |x, y| {
            if (3..9).contains(&x) && (3..9).contains(&y) {
                Rgba([30, 120, 60, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    fn full_config() -> ProcessConfig {
        ProcessConfig {
            remove_white: true,
            add_stroke: true,
            stroke_width: 2,
            filter: Filter::Warm,
            ..ProcessConfig::default()
        }
    }

    #[test]
    fn output_matches_process_slice() {
        let img = sample();
        let configs = [
            ProcessConfig::default(),
            ProcessConfig {
                remove_white: true,
                ..ProcessConfig::default()
            },
            ProcessConfig {
                filter: Filter::Sepia,
                ..ProcessConfig::default()
            },
            ProcessConfig {
                add_stroke: true,
                stroke_width: 1,
                ..ProcessConfig::default()
            },
            full_config(),
        ];
        for config in configs {
            let (out, _) = process_slice_with_diagnostics(&img, &config, &StdClock).unwrap();
            assert_eq!(out, process_slice(&img, &config).unwrap(), "{config:?}");
        }
    }

    #[test]
    fn failures_match_process_slice() {
        let config = ProcessConfig {
            add_stroke: true,
            stroke_width: 0,
            ..ProcessConfig::default()
        };
        assert!(matches!(
            process_slice_with_diagnostics(&sample(), &config, &StdClock),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(matches!(
            process_slice_with_diagnostics(&RgbaImage::new(0, 3), &full_config(), &StdClock),
            Err(PipelineError::EmptySlice { .. })
        ));
    }

    #[test]
    fn disabled_stages_are_absent() {
        let (_, diag) =
            process_slice_with_diagnostics(&sample(), &ProcessConfig::default(), &StdClock)
                .unwrap();
        assert!(diag.matting.is_none());
        assert!(diag.filter.is_none());
        assert!(diag.stroke.is_none());
        assert_eq!(diag.input, diag.output);
    }

    #[test]
    fn matting_counts_removed_pixels() {
        let (_, diag) =
            process_slice_with_diagnostics(&sample(), &full_config(), &StdClock).unwrap();
        let metrics = diag.matting.as_ref().unwrap().metrics.clone();
        assert!(
            matches!(
                metrics,
                StageMetrics::Matting {
                    removed_pixels: 108,
                    total_pixels: 144,
                }
            ),
            "unexpected matting metrics: {metrics:?}"
        );
        assert_eq!(diag.output, Dimensions::new(12 + 16, 12 + 16));
    }

    #[test]
    fn durations_come_from_the_supplied_clock() {
        let clock = StepClock(Cell::new(0));
        let (_, diag) = process_slice_with_diagnostics(&sample(), &full_config(), &clock).unwrap();
        assert_eq!(diag.matting.unwrap().duration, Duration::from_millis(1));
        assert!(diag.total_duration >= Duration::from_millis(3));
    }

    #[test]
    fn report_mentions_enabled_stages() {
        let (_, diag) =
            process_slice_with_diagnostics(&sample(), &full_config(), &StdClock).unwrap();
        let report = diag.report();
        assert!(report.contains("Matting"));
        assert!(report.contains("filter=warm"));
        assert!(report.contains("padding=8"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let (_, diag) =
            process_slice_with_diagnostics(&sample(), &full_config(), &StdClock).unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!(json["total_duration"].is_f64());
        let back: SliceDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.output, diag.output);
    }
}
