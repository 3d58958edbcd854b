// THEORY:
// The `engine` module is the top-level API of the crate. It bundles a grid, its
// convolution engine and an animation driver behind one `ConvolutionPipeline`,
// configured by a single serde-friendly `EngineConfig`. Hosts that only need
// the numeric layer can use `core_modules` directly; hosts that want the
// animated visualisation build a pipeline, subscribe to frames and render.

use crate::core_modules::animation::{
    AnimationConfig, AnimationDriver, AnimationState, Frame, SharedEngine, with_engine_locked,
};
use crate::core_modules::cell::CellValue;
use crate::core_modules::convolution::{Anchor, GridConvolutionManager};
use crate::core_modules::grid_manager::{GridConfig, GridManager};
use crate::core_modules::kernel::Kernel;
use crate::core_modules::pixel::pixel::SampleMode;
use crate::core_modules::render::DrawContext;
use crate::error::{GridError, GridResult};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

// Re-export key data structures for the public API.
pub use crate::core_modules::observer::Subscription;

/// A kernel given either by preset name or by its nine weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KernelSpec {
    Preset(String),
    Weights(Kernel),
}

impl Default for KernelSpec {
    fn default() -> Self {
        KernelSpec::Preset("identity".to_string())
    }
}

impl KernelSpec {
    pub fn resolve(&self) -> GridResult<Kernel> {
        match self {
            KernelSpec::Weights(kernel) => Ok(*kernel),
            KernelSpec::Preset(name) => Kernel::preset(name)
                .ok_or_else(|| GridError::invalid_config(format!("unknown kernel preset `{name}`"))),
        }
    }
}

/// Everything needed to stand up a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub grid: GridConfig,
    #[serde(default)]
    pub kernel: KernelSpec,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub initial_anchor: Anchor,
    #[serde(default)]
    pub sample_mode: SampleMode,
}

impl EngineConfig {
    pub fn new(grid: GridConfig) -> Self {
        Self {
            grid,
            kernel: KernelSpec::default(),
            animation: AnimationConfig::default(),
            initial_anchor: Anchor::ORIGIN,
            sample_mode: SampleMode::default(),
        }
    }

    pub fn from_json_str(json: &str) -> GridResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.grid.validate()?;
        config.kernel.resolve()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> GridResult<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GridError::invalid_config(format!("reading {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&json)
    }
}

/// A grid, its convolution engine and the driver animating it.
pub struct ConvolutionPipeline {
    driver: AnimationDriver,
    config: EngineConfig,
}

impl ConvolutionPipeline {
    /// A pipeline over an unoccupied grid.
    pub fn new(config: EngineConfig) -> GridResult<Self> {
        let grid = GridManager::new(config.grid)?;
        Self::from_grid(config, grid)
    }

    /// A pipeline over an explicit value matrix.
    pub fn from_values(config: EngineConfig, matrix: Vec<Vec<CellValue>>) -> GridResult<Self> {
        let grid = GridManager::with_values(config.grid, matrix)?;
        Self::from_grid(config, grid)
    }

    /// A pipeline whose cells are sampled from `image`.
    pub fn from_image(config: EngineConfig, image: &DynamicImage) -> GridResult<Self> {
        let mut grid = GridManager::new(config.grid)?;
        grid.draw_image_to_grids(image, config.sample_mode)?;
        Self::from_grid(config, grid)
    }

    fn from_grid(config: EngineConfig, grid: GridManager) -> GridResult<Self> {
        let kernel = config.kernel.resolve()?;
        let engine = GridConvolutionManager::with_anchor(grid, config.initial_anchor);
        let driver = AnimationDriver::new(Arc::new(Mutex::new(engine)), kernel, config.animation);
        Ok(Self { driver, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> SharedEngine {
        self.driver.engine()
    }

    pub fn driver(&self) -> &AnimationDriver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut AnimationDriver {
        &mut self.driver
    }

    pub fn kernel(&self) -> &Kernel {
        self.driver.kernel()
    }

    pub fn frames(&self) -> watch::Receiver<Frame> {
        self.driver.frames()
    }

    pub fn toggle(&mut self) -> GridResult<AnimationState> {
        self.driver.toggle()
    }

    /// Registers a callback fired after grid mutations. Mutations made under
    /// the engine lock (by the driver or `with_engine`) are reported once, after
    /// the lock is released, so the callback may call `with_engine` or
    /// `render` itself.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        self.with_engine(|engine| engine.grid().add_observer(callback))
    }

    /// Convolves the whole grid with the configured kernel.
    pub fn convolve_all(&self) -> GridResult<()> {
        let kernel = *self.kernel();
        self.with_engine(|engine| engine.compute_all(Some(&kernel)))
    }

    /// Paints the current grid state.
    pub fn render<C: DrawContext + ?Sized>(&self, ctx: &mut C) {
        self.with_engine(|engine| engine.grid().render_grid(ctx));
    }

    /// Runs `f` with the engine locked. Subscribers hear about any mutation
    /// once `f` has returned and the lock is free.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut GridConvolutionManager) -> T) -> T {
        with_engine_locked(&self.driver.engine(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::render::CommandRecorder;

    #[test]
    fn config_parses_with_defaults() {
        let config = EngineConfig::from_json_str(r#"{"grid": {"rows": 8, "cols": 8, "cell_size": 40}}"#).unwrap();
        assert!(config.grid.grid_lines);
        assert_eq!(config.kernel.resolve().unwrap(), Kernel::IDENTITY);
        assert_eq!(config.animation, AnimationConfig::default());
        assert_eq!(config.sample_mode, SampleMode::Grayscale);
    }

    #[test]
    fn config_accepts_preset_or_weights() {
        let preset = EngineConfig::from_json_str(
            r#"{"grid": {"rows": 4, "cols": 4, "cell_size": 10}, "kernel": "sharpen", "sample_mode": "rgb"}"#,
        )
        .unwrap();
        assert_eq!(preset.kernel.resolve().unwrap(), Kernel::sharpen());
        assert_eq!(preset.sample_mode, SampleMode::Rgb);

        let weights = EngineConfig::from_json_str(
            r#"{"grid": {"rows": 4, "cols": 4, "cell_size": 10},
                "kernel": [[1, 1, 1], [1, 1, 1], [1, 1, 1]],
                "initial_anchor": {"row": 1, "col": 0}}"#,
        )
        .unwrap();
        assert_eq!(weights.kernel.resolve().unwrap(), Kernel::box_sum());
        assert_eq!(weights.initial_anchor, Anchor::new(1, 0));
    }

    #[test]
    fn config_rejects_bad_input() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"grid": {"rows": 0, "cols": 4, "cell_size": 10}}"#),
            Err(GridError::InvalidConfig(_))
        ));
        assert!(EngineConfig::from_json_str(
            r#"{"grid": {"rows": 4, "cols": 4, "cell_size": 10}, "kernel": "emboss"}"#
        )
        .is_err());
        assert!(matches!(EngineConfig::from_json_str("{"), Err(GridError::Config(_))));
    }

    #[test]
    fn pipeline_convolves_and_renders() {
        let mut config = EngineConfig::new(GridConfig::new(8, 8, 10));
        config.kernel = KernelSpec::Preset("box_sum".into());
        let matrix = vec![vec![CellValue::Scalar(2.0); 8]; 8];
        let pipeline = ConvolutionPipeline::from_values(config, matrix).unwrap();

        pipeline.convolve_all().unwrap();
        let corner = pipeline.with_engine(|e| e.result_at(0, 0).cloned());
        assert_eq!(corner, Some(CellValue::Scalar(8.0)));

        let mut rec = CommandRecorder::new();
        pipeline.render(&mut rec);
        assert_eq!(rec.commands.len(), 128);
    }

    #[test]
    fn pipeline_from_image_samples_cells() {
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            16,
            16,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut config = EngineConfig::new(GridConfig::new(2, 2, 8));
        config.sample_mode = SampleMode::Rgb;
        let pipeline = ConvolutionPipeline::from_image(config, &image).unwrap();
        let value = pipeline.with_engine(|e| e.grid().value(1, 1).cloned());
        assert_eq!(value, Some(CellValue::Vector(vec![10.0, 20.0, 30.0])));
    }

    #[test]
    fn subscribers_see_overlay_changes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let pipeline = ConvolutionPipeline::new(EngineConfig::new(GridConfig::new(4, 4, 10))).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let _sub = pipeline.subscribe(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        pipeline.with_engine(|e| e.update_kernel(0, 0, &Kernel::IDENTITY));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        pipeline.with_engine(|e| {
            e.reset_grids();
            e.update_kernel(1, 1, &Kernel::IDENTITY);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribers_can_render_from_the_callback() {
        let pipeline = Arc::new(
            ConvolutionPipeline::new(EngineConfig::new(GridConfig::new(4, 4, 10))).unwrap(),
        );
        let labels = Arc::new(Mutex::new(Vec::new()));
        let (weak, record) = (Arc::downgrade(&pipeline), Arc::clone(&labels));
        let _sub = pipeline.subscribe(move || {
            let Some(pipeline) = weak.upgrade() else { return };
            let mut rec = CommandRecorder::new();
            pipeline.render(&mut rec);
            record.lock().unwrap().push(rec.texts().count());
        });

        pipeline.with_engine(|e| e.update_kernel(0, 0, &Kernel::box_sum()));
        pipeline.driver().step_once().unwrap();
        assert_eq!(*labels.lock().unwrap(), vec![9, 9]);
    }
}
