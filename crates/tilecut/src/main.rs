//! tilecut: slice an image into a grid of stickers.
//!
//! Decodes an image, cuts the crop box into grid cells, runs every cell
//! through the configured matting/filter/stroke pipeline on a background
//! queue, and writes one PNG per cell.
//!
//! # Usage
//!
//! ```text
//! tilecut [OPTIONS] --output <DIR> <IMAGE>
//! tilecut sheet.png -o out --columns 4 --rows 3 --remove-white --stroke
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tilecut_pipeline::diagnostics::StdClock;
use tilecut_pipeline::{
    Dimensions, Filter, GridLines, PercentRect, ProcessConfig, QueueWorker, Rgb, Slice,
    SliceQueue, SliceStatus, decode_image, slice_image,
};

/// Slice a raster image into a grid of processed stickers.
#[derive(Parser, Debug)]
#[command(name = "tilecut", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image: PathBuf,

    /// Directory to write slices into (created if missing).
    #[arg(short, long)]
    output: PathBuf,

    /// File name prefix. Defaults to the input file's stem.
    #[arg(long)]
    stem: Option<String>,

    /// Crop box as `X,Y,W,H` percentages of the image.
    #[arg(long, value_parser = parse_crop, default_value = "0,0,100,100")]
    crop: PercentRect,

    /// Number of evenly spaced columns.
    #[arg(long, default_value_t = 1)]
    columns: u32,

    /// Number of evenly spaced rows.
    #[arg(long, default_value_t = 1)]
    rows: u32,

    /// Explicit vertical grid lines, percent of crop width (comma separated).
    #[arg(long, value_delimiter = ',', conflicts_with = "columns")]
    vertical: Option<Vec<f64>>,

    /// Explicit horizontal grid lines, percent of crop height (comma separated).
    #[arg(long, value_delimiter = ',', conflicts_with = "rows")]
    horizontal: Option<Vec<f64>>,

    /// Remove the white background connected to the slice border.
    #[arg(long)]
    remove_white: bool,

    /// Draw an outline around each sticker.
    #[arg(long)]
    stroke: bool,

    /// Outline width (rendered at roughly twice this many pixels).
    #[arg(
        long,
        default_value_t = ProcessConfig::DEFAULT_STROKE_WIDTH,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    stroke_width: u32,

    /// Outline color as `#rrggbb`.
    #[arg(long, default_value_t = ProcessConfig::DEFAULT_STROKE_COLOR)]
    stroke_color: Rgb,

    /// Color filter (none, grayscale, sepia, brightness, vibrant,
    /// cinematic, japanese, warm).
    #[arg(long, default_value_t = ProcessConfig::DEFAULT_FILTER)]
    filter: Filter,

    /// Full processing config as a JSON string.
    ///
    /// When provided, all other processing flags are ignored. The JSON
    /// must be a valid `ProcessConfig` serialization; missing fields
    /// take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Also write `<stem>.json` describing the exported slices.
    #[arg(long)]
    manifest: bool,

    /// Process on the calling thread and print per-stage timings for every slice.
    #[arg(long)]
    timings: bool,

    /// Seconds to wait for processing to finish.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Log debug output (`RUST_LOG` overrides).
    #[arg(short, long)]
    verbose: bool,
}

/// Parse `X,Y,W,H` into a [`PercentRect`].
fn parse_crop(s: &str) -> Result<PercentRect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid crop '{s}': {e}"))?;
    let [x, y, w, h] = parts[..] else {
        return Err(format!("crop must have 4 values (X,Y,W,H), got '{s}'"));
    };
    let crop = PercentRect::new(x, y, w, h);
    if !crop.is_finite() {
        return Err(format!("crop values must be finite, got '{s}'"));
    }
    Ok(crop)
}

/// Build a [`ProcessConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual processing flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<ProcessConfig, String> {
    let config: ProcessConfig = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        ProcessConfig {
            remove_white: cli.remove_white,
            add_stroke: cli.stroke,
            stroke_width: cli.stroke_width,
            stroke_color: cli.stroke_color,
            filter: cli.filter,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Grid lines from explicit positions when given, else a uniform grid.
fn grid_from_cli(cli: &Cli) -> GridLines {
    let uniform = GridLines::uniform(cli.columns, cli.rows);
    GridLines::new(
        cli.vertical.clone().unwrap_or(uniform.vertical),
        cli.horizontal.clone().unwrap_or(uniform.horizontal),
    )
}

fn file_stem(cli: &Cli) -> String {
    cli.stem.clone().unwrap_or_else(|| {
        cli.image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("slice")
            .to_owned()
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = config_from_cli(cli)?;
    let grid = grid_from_cli(cli);
    let stem = file_stem(cli);

    let image_bytes = std::fs::read(&cli.image)
        .map_err(|e| format!("Error reading {}: {e}", cli.image.display()))?;
    let source = decode_image(&image_bytes)?;
    let dimensions = Dimensions::of(&source);
    eprintln!(
        "Image: {} ({}x{})",
        cli.image.display(),
        dimensions.width,
        dimensions.height,
    );

    let slices = slice_image(&source, cli.crop, &grid, 1);
    if slices.is_empty() {
        return Err("crop and grid produce no slices".into());
    }
    eprintln!("Slices: {}", slices.len());

    let settled = if cli.timings {
        process_with_timings(slices, config.clone())
    } else {
        let worker = QueueWorker::spawn(config.clone())?;
        worker.regenerate(slices)?;
        let settled = worker
            .wait_until_settled(Duration::from_secs(cli.timeout))
            .ok_or("timed out waiting for slice processing")?;
        worker.shutdown();
        settled
    };

    for slice in settled.iter() {
        if let Some(ref error) = slice.error {
            eprintln!(
                "Warning: slice r{} c{} failed, exporting unprocessed: {error}",
                slice.row + 1,
                slice.column + 1,
            );
        }
    }

    write_outputs(cli, &stem, &settled, dimensions, grid, config)
}

fn write_outputs(
    cli: &Cli,
    stem: &str,
    slices: &[Slice],
    source: Dimensions,
    grid: GridLines,
    config: ProcessConfig,
) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&cli.output)
        .map_err(|e| format!("Error creating {}: {e}", cli.output.display()))?;

    let files = tilecut_export::export_slices(stem, slices)?;
    for file in &files {
        write_file(&cli.output.join(&file.name), &file.bytes)?;
    }
    eprintln!("Wrote {} slices to {}", files.len(), cli.output.display());

    if cli.manifest {
        let manifest =
            tilecut_export::Manifest::new(stem, source, cli.crop, grid, config, slices);
        let path = cli.output.join(format!("{stem}.json"));
        write_file(&path, manifest.to_json()?.as_bytes())?;
        eprintln!("Manifest written to {}", path.display());
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    std::fs::write(path, bytes).map_err(|e| format!("Error writing {}: {e}", path.display()))
}

/// Drain the queue on this thread, printing a timing report per job.
fn process_with_timings(slices: Vec<Slice>, config: ProcessConfig) -> Arc<[Slice]> {
    let mut queue = SliceQueue::new(config);
    queue.regenerate(slices);
    if queue.count(SliceStatus::Pending) == 0 {
        eprintln!("No processing enabled, nothing to time");
    }

    while let Some(job) = queue.next_job() {
        if let Some(slice) = queue.snapshot().get(job.ticket.id.index) {
            println!("--- r{} c{} ---", slice.row + 1, slice.column + 1);
        }
        let result = job.run_with_diagnostics(&StdClock).map(|(buffer, diagnostics)| {
            println!("{}", diagnostics.report());
            buffer
        });
        if let Err(ref e) = result {
            println!("failed: {e}");
        }
        queue.complete(job.ticket, result);
    }
    queue.snapshot()
}
