// THEORY:
// The `GridManager` is the Grid Cell Store: the canonical owner of a rows x cols
// matrix of cell values and a parallel matrix of overlay annotations. Every
// other layer (the convolution engine, the animation driver, the renderer)
// reads or writes the grid through it.
//
// Key architectural principles:
// 1.  **Pixel Addressing**: Hosts think in canvas pixels, the grid thinks in
//     cells. `cell_at_position` converts between the two by integer division by
//     the cell pitch and answers `None` off the grid. That `None` is not an
//     error: the padding policy (`value_or_zero`) turns it into a zero of the
//     grid's shape.
// 2.  **Homogeneous Cells**: The first value written fixes the grid's `Arity`;
//     later writes of another shape are rejected. Convolution sums therefore
//     always have one well-defined shape.
// 3.  **Change Notification**: Every structural mutation bumps a version stamp
//     (published on a `watch` channel) and runs the observer callbacks
//     synchronously, so redraw scheduling lives with the host, not here.
//     Between `hold_notifications` and `release_notifications` callbacks are
//     coalesced into one `PendingNotification` the caller delivers itself.
// 4.  **Immutable Geometry**: Dimensions and pitch live in `GridConfig`. The
//     only way to change them is `resize`, which reallocates and notifies.

use crate::core_modules::cell::{Arity, CellValue, Rgb};
use crate::core_modules::chunk::chunk::Chunk;
use crate::core_modules::observer::{ObserverId, ObserverSet, PendingNotification, Subscription};
use crate::core_modules::overlay::Overlay;
use crate::core_modules::pixel::pixel::SampleMode;
use crate::core_modules::render::{DrawContext, Rect, contrasting_text};
use crate::error::{GridError, GridResult};
use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

pub const EMPTY_CELL_COLOR: Rgb = [255, 255, 255];
pub const GRID_LINE_COLOR: Rgb = [204, 204, 204];

/// The fixed geometry of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// The edge length of one cell in pixels.
    pub cell_size: u32,
    /// Whether `render_grid` outlines each cell.
    #[serde(default = "default_grid_lines")]
    pub grid_lines: bool,
}

fn default_grid_lines() -> bool {
    true
}

impl GridConfig {
    pub fn new(rows: usize, cols: usize, cell_size: u32) -> Self {
        Self {
            rows,
            cols,
            cell_size,
            grid_lines: true,
        }
    }

    pub fn validate(&self) -> GridResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(GridError::invalid_config(format!(
                "grid must have at least one cell, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.cell_size == 0 {
            return Err(GridError::invalid_config("cell_size must be positive"));
        }
        if self.rows.checked_mul(self.cols).is_none() || self.canvas_size().is_none() {
            return Err(GridError::invalid_config(format!(
                "a {}x{} grid of {}px cells does not fit a u32 canvas",
                self.rows, self.cols, self.cell_size
            )));
        }
        Ok(())
    }

    /// Canvas `(width, height)` in pixels, or `None` if either overflows.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        let span = |cells: usize| -> Option<u32> { u32::try_from(cells).ok()?.checked_mul(self.cell_size) };
        Some((span(self.cols)?, span(self.rows)?))
    }

    /// Canvas width in pixels. Saturates for configs `validate` rejects.
    pub fn pixel_width(&self) -> u32 {
        self.canvas_size().map_or(u32::MAX, |(width, _)| width)
    }

    /// Canvas height in pixels. Saturates for configs `validate` rejects.
    pub fn pixel_height(&self) -> u32 {
        self.canvas_size().map_or(u32::MAX, |(_, height)| height)
    }
}

pub struct GridManager {
    config: GridConfig,
    /// Row-major cell values; `None` is an unoccupied cell.
    values: Vec<Option<CellValue>>,
    /// Row-major overlays, parallel to `values`.
    overlays: Vec<Option<Overlay>>,
    /// Shape shared by every occupied cell, fixed by the first write.
    arity: Option<Arity>,
    observers: ObserverSet,
    version: watch::Sender<u64>,
    /// Nesting depth of `hold_notifications`.
    held: usize,
    /// A notification was raised while held.
    pending: bool,
}

impl GridManager {
    /// Creates a grid with every cell unoccupied.
    pub fn new(config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let len = config.rows * config.cols;
        let (version, _) = watch::channel(0);
        Ok(Self {
            config,
            values: vec![None; len],
            overlays: vec![None; len],
            arity: None,
            observers: ObserverSet::new(),
            version,
            held: 0,
            pending: false,
        })
    }

    /// Creates a grid from a full `rows x cols` matrix of values.
    pub fn with_values(config: GridConfig, matrix: Vec<Vec<CellValue>>) -> GridResult<Self> {
        let mut grid = Self::new(config)?;
        let got_cols = matrix.first().map_or(0, Vec::len);
        if matrix.len() != config.rows || matrix.iter().any(|row| row.len() != config.cols) {
            return Err(GridError::ShapeMismatch {
                got_rows: matrix.len(),
                got_cols,
                rows: config.rows,
                cols: config.cols,
            });
        }
        for (row, cells) in matrix.into_iter().enumerate() {
            for (col, value) in cells.into_iter().enumerate() {
                grid.check_arity(&value)?;
                grid.arity = Some(value.arity());
                grid.values[row * config.cols + col] = Some(value);
            }
        }
        Ok(grid)
    }

    /// Creates a grid with every cell set to `value`.
    pub fn filled(config: GridConfig, value: CellValue) -> GridResult<Self> {
        let mut grid = Self::new(config)?;
        grid.arity = Some(value.arity());
        grid.values.iter_mut().for_each(|cell| *cell = Some(value.clone()));
        Ok(grid)
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn rows(&self) -> usize {
        self.config.rows
    }

    pub fn cols(&self) -> usize {
        self.config.cols
    }

    pub fn cell_size(&self) -> u32 {
        self.config.cell_size
    }

    /// The shape of occupied cells, or `None` while the grid is empty.
    pub fn arity(&self) -> Option<Arity> {
        self.arity
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.config.rows && col < self.config.cols
    }

    /// Signed variant of [`in_bounds`](Self::in_bounds) for window arithmetic.
    pub fn index_of(&self, row: isize, col: isize) -> Option<(usize, usize)> {
        let (row, col) = (usize::try_from(row).ok()?, usize::try_from(col).ok()?);
        self.in_bounds(row, col).then_some((row, col))
    }

    fn flat(&self, row: usize, col: usize) -> usize {
        row * self.config.cols + col
    }

    /// Converts canvas pixel coordinates to `(row, col)`.
    pub fn cell_at_position(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let size = f64::from(self.config.cell_size);
        let row = (y / size).floor() as usize;
        let col = (x / size).floor() as usize;
        self.in_bounds(row, col).then_some((row, col))
    }

    /// The value under a canvas pixel, if the pixel is on an occupied cell.
    pub fn value_at_position(&self, x: f64, y: f64) -> Option<&CellValue> {
        let (row, col) = self.cell_at_position(x, y)?;
        self.value(row, col)
    }

    pub fn value(&self, row: usize, col: usize) -> Option<&CellValue> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.values[self.flat(row, col)].as_ref()
    }

    /// The padding policy: the value at `(row, col)`, or a zero of `arity` when
    /// the index is off the grid or the cell is unoccupied.
    pub fn value_or_zero(&self, row: isize, col: isize, arity: Arity) -> CellValue {
        self.index_of(row, col)
            .and_then(|(r, c)| self.value(r, c))
            .cloned()
            .unwrap_or_else(|| CellValue::zero(arity))
    }

    fn check_arity(&self, value: &CellValue) -> GridResult<()> {
        match self.arity {
            Some(expected) if expected != value.arity() => Err(GridError::ArityMismatch {
                expected: expected.to_string(),
                found: value.arity().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn check_bounds(&self, row: usize, col: usize) -> GridResult<()> {
        if self.in_bounds(row, col) {
            Ok(())
        } else {
            Err(GridError::OutOfBounds {
                row,
                col,
                rows: self.config.rows,
                cols: self.config.cols,
            })
        }
    }

    /// Writes one cell value. The first write fixes the grid's arity.
    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) -> GridResult<()> {
        self.check_bounds(row, col)?;
        self.check_arity(&value)?;
        self.arity = Some(value.arity());
        let index = self.flat(row, col);
        self.values[index] = Some(value);
        self.notify();
        Ok(())
    }

    pub fn overlay(&self, row: usize, col: usize) -> Option<&Overlay> {
        if !self.in_bounds(row, col) {
            return None;
        }
        self.overlays[self.flat(row, col)].as_ref()
    }

    /// Pins `overlay` to the cell under a canvas pixel. Pixels off the grid are
    /// ignored and `false` is returned without notifying.
    pub fn update_grid_by_position(&mut self, x: f64, y: f64, overlay: Overlay) -> bool {
        match self.cell_at_position(x, y) {
            Some((row, col)) => {
                let index = self.flat(row, col);
                self.overlays[index] = Some(overlay);
                self.notify();
                true
            }
            None => false,
        }
    }

    /// Pins `overlay` to a cell by index.
    pub fn set_overlay(&mut self, row: usize, col: usize, overlay: Overlay) -> GridResult<()> {
        self.check_bounds(row, col)?;
        let index = self.flat(row, col);
        self.overlays[index] = Some(overlay);
        self.notify();
        Ok(())
    }

    /// Clears every overlay. Cell values are untouched.
    pub fn reset_grids(&mut self) {
        self.overlays.iter_mut().for_each(|overlay| *overlay = None);
        self.notify();
    }

    pub fn has_overlays(&self) -> bool {
        self.overlays.iter().any(Option::is_some)
    }

    /// Reallocates the grid with new dimensions. Values, overlays and the
    /// recorded arity are discarded.
    pub fn resize(&mut self, rows: usize, cols: usize) -> GridResult<()> {
        let config = GridConfig {
            rows,
            cols,
            ..self.config
        };
        config.validate()?;
        debug!(rows, cols, "resizing grid");
        self.config = config;
        self.values = vec![None; rows * cols];
        self.overlays = vec![None; rows * cols];
        self.arity = None;
        self.notify();
        Ok(())
    }

    /// Registers a mutation callback. Keep the returned handle alive for as
    /// long as the callback should fire.
    pub fn add_observer<F>(&self, callback: F) -> Subscription
    where
        F: FnMut() + Send + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// The number of mutations applied so far.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// A receiver that changes whenever the grid does.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Defers observer callbacks until the matching `release_notifications`.
    /// Calls nest; the version stamp still moves on every mutation.
    pub fn hold_notifications(&mut self) {
        self.held += 1;
    }

    /// Ends one `hold_notifications`. When the outermost hold ends and anything
    /// changed meanwhile, returns the single notification owed to observers.
    pub fn release_notifications(&mut self) -> Option<PendingNotification> {
        self.held = self.held.saturating_sub(1);
        if self.held > 0 || !self.pending {
            return None;
        }
        self.pending = false;
        Some(self.observers.pending())
    }

    fn notify(&mut self) {
        self.version.send_modify(|v| *v += 1);
        if self.held > 0 {
            self.pending = true;
        } else {
            self.observers.notify();
        }
    }

    /// Paints every cell: background (overlay colour first, then the value's
    /// colour), optional grid line, then the overlay label.
    pub fn render_grid<C: DrawContext + ?Sized>(&self, ctx: &mut C) {
        let size = self.config.cell_size as f32;
        for row in 0..self.config.rows {
            for col in 0..self.config.cols {
                let index = self.flat(row, col);
                let rect = Rect::new(col as f32 * size, row as f32 * size, size, size);
                let overlay = self.overlays[index].as_ref();
                let background = overlay
                    .and_then(|o| o.fill_color)
                    .or_else(|| self.values[index].as_ref().map(CellValue::background_rgb))
                    .unwrap_or(EMPTY_CELL_COLOR);

                ctx.fill_rect(rect, background);
                if self.config.grid_lines {
                    ctx.stroke_rect(rect, GRID_LINE_COLOR);
                }
                if let Some(overlay) = overlay.filter(|o| !o.text.is_empty()) {
                    let (x, y) = rect.center();
                    ctx.fill_text(&overlay.text, x, y, contrasting_text(background), &overlay.font);
                }
            }
        }
    }

    /// Samples `image` down to one value per cell. The image is scaled to the
    /// grid's canvas size and each cell receives the mean of its pixel block.
    pub fn draw_image_to_grids(&mut self, image: &DynamicImage, mode: SampleMode) -> GridResult<()> {
        if image.width() == 0 || image.height() == 0 {
            return Err(GridError::invalid_config("cannot sample an empty image"));
        }
        let (width, height) = self.config.canvas_size().ok_or_else(|| {
            GridError::invalid_config("grid canvas does not fit in u32 pixels")
        })?;
        let rgba = image.to_rgba8();
        let scaled = if rgba.dimensions() == (width, height) {
            rgba
        } else {
            image::imageops::resize(&rgba, width, height, FilterType::Triangle)
        };
        let size = self.config.cell_size;
        debug!(width, height, ?mode, "sampling image into grid");

        let mut values = Vec::with_capacity(self.values.len());
        for row in 0..self.config.rows as u32 {
            for col in 0..self.config.cols as u32 {
                let chunk = Chunk::from_region(&scaled, col * size, row * size, size, size);
                values.push(Some(chunk.average_pixel().to_cell(mode)));
            }
        }
        self.arity = values.first().and_then(|v| v.as_ref()).map(CellValue::arity);
        self.values = values;
        self.notify();
        Ok(())
    }
}
