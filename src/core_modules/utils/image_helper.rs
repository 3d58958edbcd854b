// Loading source bitmaps and writing rendered frames as PNG.

pub mod image_helper {
    use image::{DynamicImage, ImageEncoder, RgbaImage};
    use std::path::Path;

    pub fn load(path: impl AsRef<Path>) -> Result<DynamicImage, image::error::ImageError> {
        image::open(path)
    }

    pub fn save(path: impl AsRef<Path>, frame: &RgbaImage) -> Result<(), image::error::ImageError> {
        let output = std::io::BufWriter::new(std::fs::File::create(path)?);
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn save_then_load_gradient_file() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("gradient_file.png");
        let (width, height) = (64u32, 32u32);
        let mut frame = RgbaImage::new(width, height);
        for (x, _, pixel) in frame.enumerate_pixels_mut() {
            let intensity = (x * 4) as u8;
            *pixel = Rgba([intensity, intensity, intensity, 255]);
        }

        save(&path, &frame).expect("Error Saving File.");
        let loaded = load(&path).expect("Error Loading File.").to_rgba8();

        assert_eq!(loaded.dimensions(), (width, height));
        assert_eq!(loaded.get_pixel(10, 5), &Rgba([40, 40, 40, 255]));
    }

    #[test]
    fn save_non_square_file_keeps_orientation() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        let path = dir.path().join("wide_file.png");
        let frame = RgbaImage::from_pixel(30, 10, Rgba([255, 255, 255, 255]));

        save(&path, &frame).expect("Error Saving File.");
        assert_eq!(load(&path).expect("Error Loading File.").width(), 30);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().expect("Error creating temp dir.");
        assert!(load(dir.path().join("missing.png")).is_err());
    }
}
