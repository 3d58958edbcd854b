// THEORY:
// A `Chunk` is the rectangle of source pixels that lands under one grid cell
// when a bitmap is ingested. Its single job is `average_pixel`: pooling the
// block into one representative `Pixel`. Averaging (instead of picking the
// block's centre pixel) keeps single-pixel noise out of the cell values that
// the convolution then operates on.

pub mod chunk {
    use crate::core_modules::pixel::pixel::Pixel;
    use image::RgbaImage;

    pub struct Chunk {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<Pixel>,
    }

    impl Chunk {
        pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Self {
            Self {
                width,
                height,
                pixels,
            }
        }

        /// Copies the `width x height` block at `(x, y)` out of `image`. Parts of
        /// the block that fall outside the image are skipped.
        pub fn from_region(image: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> Self {
            let x_end = (x + width).min(image.width());
            let y_end = (y + height).min(image.height());
            let mut pixels = Vec::with_capacity((width * height) as usize);
            for py in y..y_end {
                for px in x..x_end {
                    pixels.push(Pixel::from(image.get_pixel(px, py)));
                }
            }
            Self::new(width, height, pixels)
        }

        /// The channel-wise mean of the block; a zero pixel for an empty block.
        pub fn average_pixel(&self) -> Pixel {
            let count = self.pixels.len();
            if count == 0 {
                return Pixel::default();
            }
            let sum = self.pixels.iter().fold(Pixel::default(), |acc, p| {
                Pixel::new(
                    acc.red + p.red,
                    acc.green + p.green,
                    acc.blue + p.blue,
                    acc.alpha + p.alpha,
                )
            });
            let n = count as f64;
            Pixel::new(sum.red / n, sum.green / n, sum.blue / n, sum.alpha / n)
        }
    }
}
