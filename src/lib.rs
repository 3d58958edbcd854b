// THEORY:
// This file is the main entry point for the `grid_convolution` library crate.
// It exposes the `engine` facade (a shared convolution engine plus the driver
// that animates it) and the `core_modules` the facade is built from.
//
// The layers, leaves first:
// 1.  `cell`, `kernel`, `overlay`: plain data. A cell holds a scalar or a
//     fixed-length vector, a kernel is a 3x3 weight matrix, an overlay is a
//     transient text/colour annotation.
// 2.  `grid_manager`: the Grid Cell Store. Owns the cells and overlays,
//     answers pixel lookups, notifies observers on every mutation and knows
//     how to paint itself onto any `DrawContext`.
// 3.  `convolution`: the Convolution Engine. Reads 3x3 windows with
//     zero padding, caches sums in a Result Grid and paints kernel overlays.
// 4.  `animation`: the Animation Driver. Owns one cancellable tokio ticker
//     that walks the kernel anchor across the grid in row-major order.

pub mod core_modules;
pub mod engine;
pub mod error;

pub use error::{GridError, GridResult};
