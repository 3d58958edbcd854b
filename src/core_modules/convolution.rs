// THEORY:
// The `GridConvolutionManager` is the Convolution Engine. It owns a
// `GridManager` plus a same-shaped Result Grid and is a passive calculator:
// nothing happens until a caller (usually the animation driver) asks.
//
// Key architectural principles:
// 1.  **Centred Sums**: `compute_convolution(r, c)` centres the 3x3 window on
//     `(r, c)`: tap `(i, j)` reads `(r + i - 1, c + j - 1)`. With the identity
//     kernel the result is the cell's own value.
// 2.  **Zero Padding**: A tap that falls off the grid, or lands on an
//     unoccupied cell, contributes a zero of the sum's shape. Nothing is
//     reflected or clamped.
// 3.  **Explicit Shape**: The sum takes the shape of the anchor cell. If the
//     anchor is off the grid or unoccupied, it falls back to the grid's
//     recorded arity, and to `Scalar` for an empty grid. Mixed shapes surface
//     as `GridError::ArityMismatch` instead of silently skipping channels.
// 4.  **Overlay Independence**: `update_kernel` only paints "weight×value"
//     labels over the window whose top-left cell is `(r, c)`. It never touches
//     the Result Grid; callers that want both call `compute_convolution` at the
//     window centre `(r + 1, c + 1)` as well (the animation driver does).
// 5.  **Owned Shape**: Grid edits go through the engine, never a bare
//     `&mut GridManager`, so the Result Grid is reallocated whenever the grid
//     is. Anchors are any `usize`; window arithmetic is checked and a tap
//     past `usize::MAX` is simply off the grid.

use crate::core_modules::cell::{Arity, CellValue, Rgb, compact};
use crate::core_modules::grid_manager::GridManager;
use crate::core_modules::kernel::{KERNEL_SIZE, Kernel};
use crate::core_modules::observer::PendingNotification;
use crate::core_modules::overlay::{Font, Overlay};
use crate::core_modules::pixel::pixel::SampleMode;
use crate::error::GridResult;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Fill colour for cells under the active kernel window.
pub const KERNEL_HIGHLIGHT: Rgb = [255, 215, 0];

/// A grid index naming a kernel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub row: usize,
    pub col: usize,
}

impl Anchor {
    pub const ORIGIN: Anchor = Anchor { row: 0, col: 0 };

    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// The centre cell of the window whose top-left cell is this anchor.
    /// Saturates at `usize::MAX`, which no grid contains.
    pub fn window_center(&self) -> Anchor {
        Anchor::new(
            self.row.saturating_add(KERNEL_SIZE / 2),
            self.col.saturating_add(KERNEL_SIZE / 2),
        )
    }
}

/// `base + tap - 1`, the index tap `tap` of a centred window reads.
fn centred(base: usize, tap: usize) -> Option<usize> {
    base.checked_add(tap)?.checked_sub(1)
}

pub struct GridConvolutionManager {
    grid: GridManager,
    /// Row-major convolution outputs, parallel to the grid.
    results: Vec<Option<CellValue>>,
    kernel_position: Anchor,
    highlight: Rgb,
}

impl GridConvolutionManager {
    pub fn new(grid: GridManager) -> Self {
        Self::with_anchor(grid, Anchor::ORIGIN)
    }

    pub fn with_anchor(grid: GridManager, anchor: Anchor) -> Self {
        let len = grid.rows() * grid.cols();
        Self {
            grid,
            results: vec![None; len],
            kernel_position: anchor,
            highlight: KERNEL_HIGHLIGHT,
        }
    }

    pub fn with_highlight(mut self, color: Rgb) -> Self {
        self.highlight = color;
        self
    }

    pub fn grid(&self) -> &GridManager {
        &self.grid
    }

    /// Writes one cell value. See [`GridManager::set_value`].
    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) -> GridResult<()> {
        self.grid.set_value(row, col, value)
    }

    pub fn set_overlay(&mut self, row: usize, col: usize, overlay: Overlay) -> GridResult<()> {
        self.grid.set_overlay(row, col, overlay)
    }

    pub fn update_grid_by_position(&mut self, x: f64, y: f64, overlay: Overlay) -> bool {
        self.grid.update_grid_by_position(x, y, overlay)
    }

    pub fn reset_grids(&mut self) {
        self.grid.reset_grids();
    }

    /// Resamples the grid from `image`. Cached sums describe the old values,
    /// so the Result Grid is cleared.
    pub fn draw_image_to_grids(&mut self, image: &DynamicImage, mode: SampleMode) -> GridResult<()> {
        self.grid.draw_image_to_grids(image, mode)?;
        self.clear_results();
        Ok(())
    }

    /// See [`GridManager::hold_notifications`].
    pub fn hold_notifications(&mut self) {
        self.grid.hold_notifications();
    }

    pub fn release_notifications(&mut self) -> Option<PendingNotification> {
        self.grid.release_notifications()
    }

    /// The shape a sum at `(row, col)` takes.
    fn sum_arity(&self, row: usize, col: usize) -> Arity {
        self.grid
            .value(row, col)
            .map(CellValue::arity)
            .or(self.grid.arity())
            .unwrap_or(Arity::Scalar)
    }

    /// Convolves the 3x3 window centred on `(row, col)` with `kernel` (the
    /// identity when `None`), caches the sum in the Result Grid when the anchor
    /// is on the grid, and returns it.
    pub fn compute_convolution(
        &mut self,
        row: usize,
        col: usize,
        kernel: Option<&Kernel>,
    ) -> GridResult<CellValue> {
        let kernel = kernel.unwrap_or(&Kernel::IDENTITY);
        let mut sum = CellValue::zero(self.sum_arity(row, col));

        let zero = CellValue::zero(sum.arity());
        for (i, j, weight) in kernel.taps() {
            let neighbor = match (centred(row, i), centred(col, j)) {
                (Some(r), Some(c)) => self.grid.value(r, c).unwrap_or(&zero),
                _ => &zero,
            };
            sum.accumulate(weight, neighbor)?;
        }

        if self.grid.in_bounds(row, col) {
            let index = row * self.grid.cols() + col;
            self.results[index] = Some(sum.clone());
        }
        trace!(row, col, %sum, "convolution computed");
        Ok(sum)
    }

    /// Fills the whole Result Grid.
    pub fn compute_all(&mut self, kernel: Option<&Kernel>) -> GridResult<()> {
        debug!(rows = self.grid.rows(), cols = self.grid.cols(), "convolving full grid");
        for row in 0..self.grid.rows() {
            for col in 0..self.grid.cols() {
                self.compute_convolution(row, col, kernel)?;
            }
        }
        Ok(())
    }

    /// The cached sum at `(row, col)`, if one was computed.
    pub fn result_at(&self, row: usize, col: usize) -> Option<&CellValue> {
        if !self.grid.in_bounds(row, col) {
            return None;
        }
        self.results[row * self.grid.cols() + col].as_ref()
    }

    /// The Result Grid, row-major.
    pub fn results(&self) -> &[Option<CellValue>] {
        &self.results
    }

    pub fn clear_results(&mut self) {
        self.results.iter_mut().for_each(|r| *r = None);
    }

    /// Replaces all overlays with "weight×value" labels for the window whose
    /// top-left cell is `(row, col)`. Taps off the grid are skipped. The Result
    /// Grid is not refreshed.
    /// Observers hear about the whole window once, not per label.
    pub fn update_kernel(&mut self, row: usize, col: usize, kernel: &Kernel) {
        self.grid.hold_notifications();
        self.grid.reset_grids();
        let zero = CellValue::zero(self.grid.arity().unwrap_or(Arity::Scalar));
        let font = Font::relative_to(self.grid.cell_size());

        for (i, j, weight) in kernel.taps() {
            let (Some(r), Some(c)) = (row.checked_add(i), col.checked_add(j)) else {
                continue;
            };
            if !self.grid.in_bounds(r, c) {
                continue;
            }
            let value = self.grid.value(r, c).unwrap_or(&zero);
            let overlay = Overlay::new(
                format!("{}×{}", compact(weight), value),
                Some(self.highlight),
                font.clone(),
            );
            // In bounds was checked above, so this cannot fail.
            let _ = self.grid.set_overlay(r, c, overlay);
        }
        if let Some(pending) = self.grid.release_notifications() {
            pending.deliver();
        }
    }

    /// Records where the kernel currently sits. No grid mutation, no
    /// notification.
    pub fn set_kernel_position(&mut self, row: usize, col: usize) {
        self.kernel_position = Anchor::new(row, col);
    }

    pub fn kernel_position(&self) -> Anchor {
        self.kernel_position
    }

    /// Resizes the grid and the Result Grid together and moves the kernel back
    /// to the origin.
    pub fn resize(&mut self, rows: usize, cols: usize) -> GridResult<()> {
        self.grid.resize(rows, cols)?;
        self.results = vec![None; rows * cols];
        self.kernel_position = Anchor::ORIGIN;
        Ok(())
    }
}
