// THEORY:
// The `Pixel` module is the bridge between bitmap data and cell values. A
// `Pixel` is a "dumb" RGBA container with floating-point channels, wide enough
// to hold the mean of many source pixels without rounding. It knows how to
// summarise itself as one of the two cell shapes the grid stores:
// - `SampleMode::Grayscale` keeps only perceived brightness (Rec. 601 luma),
//   producing `Scalar` cells;
// - `SampleMode::Rgb` keeps the three colour channels, producing `Vector` cells.
// Alpha is carried but never written into a cell.

pub mod pixel {
    use crate::core_modules::cell::CellValue;
    use serde::{Deserialize, Serialize};

    pub type Byte = u8;
    pub type Channel = f64;
    pub type Luminance = f64;

    const CHANNELS: usize = 4;

    /// How image data is reduced to cell values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SampleMode {
        #[default]
        Grayscale,
        Rgb,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        pub fn luminance(&self) -> Luminance {
            0.299 * self.red + 0.587 * self.green + 0.114 * self.blue
        }

        pub fn to_cell(&self, mode: SampleMode) -> CellValue {
            match mode {
                SampleMode::Grayscale => CellValue::Scalar(self.luminance()),
                SampleMode::Rgb => CellValue::Vector(vec![self.red, self.green, self.blue]),
            }
        }
    }

    impl From<&[Byte]> for Pixel {
        /// Reads one RGBA pixel. Shorter slices are padded with zeros (opaque
        /// alpha), longer ones are truncated.
        fn from(bytes: &[Byte]) -> Self {
            let mut rgba = [0.0, 0.0, 0.0, 255.0];
            for (slot, byte) in rgba.iter_mut().zip(bytes.iter().take(CHANNELS)) {
                *slot = *byte as Channel;
            }
            Pixel::new(rgba[0], rgba[1], rgba[2], rgba[3])
        }
    }

    impl From<&image::Rgba<Byte>> for Pixel {
        fn from(rgba: &image::Rgba<Byte>) -> Self {
            Pixel::from(&rgba.0[..])
        }
    }
}
