mod raster;

use anyhow::Context as _;
use clap::Parser;
use grid_convolution::core_modules::cell::CellValue;
use grid_convolution::core_modules::grid_manager::GridConfig;
use grid_convolution::core_modules::utils::image_helper::image_helper;
use grid_convolution::engine::{ConvolutionPipeline, EngineConfig, KernelSpec};
use raster::RasterCanvas;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Animates a 3x3 kernel across a grid and writes every redraw as a PNG frame.
#[derive(Parser, Debug)]
#[command(name = "visual_tester", version)]
struct Cli {
    /// Engine configuration JSON. Overrides the grid flags below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bitmap to sample into the grid. Without it a gradient is used.
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long, default_value_t = 8)]
    rows: usize,

    #[arg(long, default_value_t = 8)]
    cols: usize,

    /// Cell edge length in pixels.
    #[arg(long, default_value_t = 48)]
    cell_size: u32,

    /// Kernel preset name.
    #[arg(long)]
    kernel: Option<String>,

    /// Milliseconds between animation steps.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Frames to capture. Defaults to one full sweep of the grid.
    #[arg(long)]
    frames: Option<u64>,

    /// Output directory for frames.
    #[arg(long, default_value = "frames")]
    out: PathBuf,
}

fn engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::new(GridConfig::new(cli.rows, cli.cols, cli.cell_size)),
    };
    if let Some(name) = &cli.kernel {
        config.kernel = KernelSpec::Preset(name.clone());
    }
    if let Some(ms) = cli.interval_ms {
        config.animation.interval_ms = ms;
    }
    Ok(config)
}

/// A diagonal ramp from 0 to 255.
fn gradient(rows: usize, cols: usize) -> Vec<Vec<CellValue>> {
    let span = (rows + cols).saturating_sub(2).max(1) as f64;
    (0..rows)
        .map(|r| {
            (0..cols)
                .map(|c| CellValue::Scalar(((r + c) as f64 / span * 255.0).round()))
                .collect()
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = engine_config(&cli)?;
    let grid = config.grid;

    let mut pipeline = match &cli.image {
        Some(path) => {
            let image = image_helper::load(path).with_context(|| format!("loading {}", path.display()))?;
            ConvolutionPipeline::from_image(config, &image)?
        }
        None => ConvolutionPipeline::from_values(config, gradient(grid.rows, grid.cols))?,
    };

    std::fs::create_dir_all(&cli.out).with_context(|| format!("creating {}", cli.out.display()))?;
    let sweep = (grid.rows.saturating_sub(2) * grid.cols.saturating_sub(2)).max(1) as u64;
    let total = cli.frames.unwrap_or(sweep);

    let mut frames = pipeline.frames();
    pipeline.toggle()?;
    info!(total, rows = grid.rows, cols = grid.cols, "capturing frames");

    for _ in 0..total {
        frames.changed().await.context("animation driver went away")?;
        let frame = *frames.borrow_and_update();

        let mut canvas = RasterCanvas::new(grid.pixel_width(), grid.pixel_height());
        pipeline.render(&mut canvas);

        let stem = format!("frame_{:04}", frame.tick);
        image_helper::save(cli.out.join(format!("{stem}.png")), &canvas.image)?;
        std::fs::write(
            cli.out.join(format!("{stem}.json")),
            serde_json::to_vec_pretty(&canvas.labels)?,
        )?;

        let center = frame.anchor.window_center();
        let result = pipeline.with_engine(|e| e.result_at(center.row, center.col).cloned());
        info!(
            tick = frame.tick,
            row = frame.anchor.row,
            col = frame.anchor.col,
            result = %result.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            "frame written"
        );
    }

    pipeline.toggle()?;
    println!("Processing complete. Frames saved to {}", cli.out.display());
    Ok(())
}
