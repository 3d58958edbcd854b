// THEORY:
// The `cell` module defines the value held by one grid cell. A cell is either a
// single intensity (`Scalar`) or a fixed-length channel list (`Vector`, e.g. RGB).
//
// Key architectural principles:
// 1.  **Tagged Union**: The shape of a value is carried by its variant, never
//     inferred at arithmetic time. All per-channel math lives here, so callers
//     never branch on "is this a number or an array".
// 2.  **Arity**: `Arity` names the shape alone. A grid records the arity of its
//     first write and rejects anything else, which keeps the Result Grid and
//     the visible overlay in the same shape.
// 3.  **Zero Padding Support**: `CellValue::zero` builds the neutral element for
//     any arity. The convolution engine uses it for every tap that falls off
//     the grid.

use crate::error::{GridError, GridResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Channel = f64;
pub type Rgb = [u8; 3];

/// The shape of a cell value, independent of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    Scalar,
    Vector(usize),
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Scalar => write!(f, "scalar"),
            Arity::Vector(n) => write!(f, "vector[{n}]"),
        }
    }
}

/// The numeric content of one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// A single intensity, e.g. a grayscale pixel.
    Scalar(Channel),
    /// A fixed-length channel list, e.g. `[r, g, b]`.
    Vector(Vec<Channel>),
}

impl CellValue {
    /// The zero value of the given shape.
    pub fn zero(arity: Arity) -> Self {
        match arity {
            Arity::Scalar => CellValue::Scalar(0.0),
            Arity::Vector(n) => CellValue::Vector(vec![0.0; n]),
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            CellValue::Scalar(_) => Arity::Scalar,
            CellValue::Vector(channels) => Arity::Vector(channels.len()),
        }
    }

    /// Channels as a slice; a scalar is a one-element slice.
    pub fn channels(&self) -> &[Channel] {
        match self {
            CellValue::Scalar(v) => std::slice::from_ref(v),
            CellValue::Vector(channels) => channels,
        }
    }

    /// `self += weight * other`, channel by channel.
    pub fn accumulate(&mut self, weight: f64, other: &CellValue) -> GridResult<()> {
        match (self, other) {
            (CellValue::Scalar(sum), CellValue::Scalar(v)) => {
                *sum += weight * v;
                Ok(())
            }
            (CellValue::Vector(sums), CellValue::Vector(vs)) if sums.len() == vs.len() => {
                for (sum, v) in sums.iter_mut().zip(vs) {
                    *sum += weight * v;
                }
                Ok(())
            }
            (sum, v) => Err(GridError::ArityMismatch {
                expected: sum.arity().to_string(),
                found: v.arity().to_string(),
            }),
        }
    }

    /// The colour a renderer should paint behind this value.
    ///
    /// Scalars and single-channel vectors are gray, two channels map to red and
    /// green, three or more use the first three as RGB. Channels are clamped to
    /// `0..=255`.
    pub fn background_rgb(&self) -> Rgb {
        let byte = |v: Channel| v.round().clamp(0.0, 255.0) as u8;
        match self.channels() {
            [] => [0, 0, 0],
            [v] => [byte(*v); 3],
            [r, g] => [byte(*r), byte(*g), 0],
            [r, g, b, ..] => [byte(*r), byte(*g), byte(*b)],
        }
    }
}

impl From<Channel> for CellValue {
    fn from(v: Channel) -> Self {
        CellValue::Scalar(v)
    }
}

impl From<Vec<Channel>> for CellValue {
    fn from(channels: Vec<Channel>) -> Self {
        CellValue::Vector(channels)
    }
}

/// Formats a channel for on-canvas labels: integers print bare, anything else
/// is rounded to two decimals with trailing zeros dropped.
pub fn compact(v: Channel) -> String {
    if v.fract() == 0.0 || !v.is_finite() {
        return format!("{v}");
    }
    let rounded = format!("{v:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Scalar(v) => write!(f, "{}", compact(*v)),
            CellValue::Vector(channels) => {
                write!(f, "[")?;
                for (i, v) in channels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", compact(*v))?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_matches_requested_arity() {
        assert_eq!(CellValue::zero(Arity::Scalar), CellValue::Scalar(0.0));
        assert_eq!(CellValue::zero(Arity::Vector(3)), CellValue::Vector(vec![0.0; 3]));
    }

    #[test]
    fn accumulate_scales_every_channel() {
        let mut sum = CellValue::zero(Arity::Vector(3));
        sum.accumulate(2.0, &CellValue::Vector(vec![1.0, 2.0, 3.0])).unwrap();
        sum.accumulate(-1.0, &CellValue::Vector(vec![1.0, 1.0, 1.0])).unwrap();
        assert_eq!(sum, CellValue::Vector(vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn accumulate_rejects_mixed_shapes() {
        let mut sum = CellValue::Scalar(0.0);
        let err = sum.accumulate(1.0, &CellValue::Vector(vec![1.0])).unwrap_err();
        assert!(matches!(err, GridError::ArityMismatch { .. }));

        let mut sum = CellValue::zero(Arity::Vector(3));
        assert!(sum.accumulate(1.0, &CellValue::Vector(vec![1.0, 2.0])).is_err());
        // A failed accumulate leaves the running sum untouched.
        assert_eq!(sum, CellValue::zero(Arity::Vector(3)));
    }

    #[test]
    fn display_uses_compact_labels() {
        assert_eq!(CellValue::Scalar(2.0).to_string(), "2");
        assert_eq!(CellValue::Scalar(0.5).to_string(), "0.5");
        assert_eq!(CellValue::Scalar(1.0 / 3.0).to_string(), "0.33");
        assert_eq!(CellValue::Scalar(-0.001).to_string(), "0");
        assert_eq!(CellValue::Vector(vec![10.0, 20.0, 30.5]).to_string(), "[10, 20, 30.5]");
    }

    #[test]
    fn background_colour_per_channel_count() {
        assert_eq!(CellValue::Scalar(300.0).background_rgb(), [255, 255, 255]);
        assert_eq!(CellValue::Scalar(-4.0).background_rgb(), [0, 0, 0]);
        assert_eq!(CellValue::Vector(vec![7.0]).background_rgb(), [7, 7, 7]);
        assert_eq!(CellValue::Vector(vec![1.0, 2.0]).background_rgb(), [1, 2, 0]);
        assert_eq!(CellValue::Vector(vec![1.0, 2.0, 3.0, 4.0]).background_rgb(), [1, 2, 3]);
    }

    #[test]
    fn untagged_serde_reads_numbers_and_arrays() {
        let cells: Vec<CellValue> = serde_json::from_str("[2, [1, 2, 3]]").unwrap();
        assert_eq!(cells[0], CellValue::Scalar(2.0));
        assert_eq!(cells[1], CellValue::Vector(vec![1.0, 2.0, 3.0]));
    }
}
