// THEORY:
// A `Kernel` is the fixed 3x3 weight window slid across the grid. The window
// size never changes, so the weights live in a plain array and every tap is
// addressed by `(i, j)` with `i, j` in `0..3`.
//
// Two framings of the same window exist in the engine:
// - a convolution at cell `(r, c)` centres the window on that cell, so tap
//   `(i, j)` reads `(r + i - 1, c + j - 1)`;
// - the animated overlay names the window by its top-left cell `(r, c)`, so
//   tap `(i, j)` sits on `(r + i, c + j)` and the window centre is `(r+1, c+1)`.
//
// The default kernel is the identity: centre weight 1, everything else 0.

use serde::{Deserialize, Serialize};

pub const KERNEL_SIZE: usize = 3;

pub type Weight = f64;

/// A 3x3 matrix of convolution weights, stored row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kernel(pub [[Weight; KERNEL_SIZE]; KERNEL_SIZE]);

impl Kernel {
    /// Pass-through filter.
    pub const IDENTITY: Kernel = Kernel([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);

    pub fn new(weights: [[Weight; KERNEL_SIZE]; KERNEL_SIZE]) -> Self {
        Kernel(weights)
    }

    /// Every weight 1: sums the window.
    pub fn box_sum() -> Self {
        Kernel([[1.0; KERNEL_SIZE]; KERNEL_SIZE])
    }

    /// Every weight 1/9: averages the window.
    pub fn box_blur() -> Self {
        Kernel([[1.0 / 9.0; KERNEL_SIZE]; KERNEL_SIZE])
    }

    /// The 1-2-1 binomial approximation of a gaussian, normalised to 1.
    pub fn gaussian_blur() -> Self {
        Kernel([
            [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
            [2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0],
            [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
        ])
    }

    pub fn sharpen() -> Self {
        Kernel([[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]])
    }

    /// 8-neighbour Laplacian.
    pub fn edge_detect() -> Self {
        Kernel([[-1.0, -1.0, -1.0], [-1.0, 8.0, -1.0], [-1.0, -1.0, -1.0]])
    }

    /// Looks up a preset by its lowercase name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "identity" => Some(Self::IDENTITY),
            "box_sum" => Some(Self::box_sum()),
            "box_blur" => Some(Self::box_blur()),
            "gaussian_blur" => Some(Self::gaussian_blur()),
            "sharpen" => Some(Self::sharpen()),
            "edge_detect" => Some(Self::edge_detect()),
            _ => None,
        }
    }

    pub fn weight(&self, i: usize, j: usize) -> Weight {
        self.0[i][j]
    }

    /// All nine taps as `(i, j, weight)`, row-major.
    pub fn taps(&self) -> impl Iterator<Item = (usize, usize, Weight)> + '_ {
        self.0
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().enumerate().map(move |(j, w)| (i, j, *w)))
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity() {
        let k = Kernel::default();
        assert_eq!(k.weight(1, 1), 1.0);
        assert_eq!(k.taps().filter(|(_, _, w)| *w != 0.0).count(), 1);
    }

    #[test]
    fn taps_are_row_major() {
        let k = Kernel::new([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let taps: Vec<_> = k.taps().collect();
        assert_eq!(taps.len(), 9);
        assert_eq!(taps[0], (0, 0, 1.0));
        assert_eq!(taps[5], (1, 2, 6.0));
        assert_eq!(taps[8], (2, 2, 9.0));
    }

    #[test]
    fn normalised_presets_sum_to_one() {
        for k in [Kernel::box_blur(), Kernel::gaussian_blur(), Kernel::sharpen()] {
            let total: f64 = k.taps().map(|(_, _, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
        let edges: f64 = Kernel::edge_detect().taps().map(|(_, _, w)| w).sum();
        assert_eq!(edges, 0.0);
    }

    #[test]
    fn presets_resolve_by_name() {
        assert_eq!(Kernel::preset("box_sum"), Some(Kernel::box_sum()));
        assert_eq!(Kernel::preset("identity"), Some(Kernel::IDENTITY));
        assert_eq!(Kernel::preset("emboss"), None);
    }

    #[test]
    fn serializes_as_nested_arrays() {
        let json = serde_json::to_string(&Kernel::IDENTITY).unwrap();
        assert_eq!(json, "[[0.0,0.0,0.0],[0.0,1.0,0.0],[0.0,0.0,0.0]]");
        let back: Kernel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Kernel::IDENTITY);
    }
}
