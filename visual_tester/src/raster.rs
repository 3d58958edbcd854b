use grid_convolution::core_modules::cell::Rgb;
use grid_convolution::core_modules::overlay::Font;
use grid_convolution::core_modules::render::{DrawCommand, DrawContext, Rect};
use image::{Rgba, RgbaImage};

/// Rasterizes grid draw calls into an RGBA frame.
///
/// There is no font rasterizer here; labels are kept as `FillText` commands so
/// they can be written next to the PNG.
pub struct RasterCanvas {
    pub image: RgbaImage,
    pub labels: Vec<DrawCommand>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
            labels: Vec::new(),
        }
    }

    /// Pixel bounds of `rect`, clipped to the frame.
    fn span(&self, rect: Rect) -> (u32, u32, u32, u32) {
        let clip = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        (
            clip(rect.x, self.image.width()),
            clip(rect.y, self.image.height()),
            clip(rect.x + rect.width, self.image.width()),
            clip(rect.y + rect.height, self.image.height()),
        )
    }
}

impl DrawContext for RasterCanvas {
    fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        let (x0, y0, x1, y1) = self.span(rect);
        let [r, g, b] = color;
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x, y, Rgba([r, g, b, 255]));
            }
        }
    }

    fn stroke_rect(&mut self, rect: Rect, color: Rgb) {
        let (x0, y0, x1, y1) = self.span(rect);
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let [r, g, b] = color;
        let pixel = Rgba([r, g, b, 255]);
        for x in x0..x1 {
            self.image.put_pixel(x, y0, pixel);
            self.image.put_pixel(x, y1 - 1, pixel);
        }
        for y in y0..y1 {
            self.image.put_pixel(x0, y, pixel);
            self.image.put_pixel(x1 - 1, y, pixel);
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgb, font: &Font) {
        self.labels.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
            font: font.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_is_clipped_to_the_frame() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.fill_rect(Rect::new(2.0, 2.0, 10.0, 10.0), [1, 2, 3]);
        assert_eq!(canvas.image.get_pixel(3, 3), &Rgba([1, 2, 3, 255]));
        assert_eq!(canvas.image.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn stroke_outlines_without_filling() {
        let mut canvas = RasterCanvas::new(5, 5);
        canvas.stroke_rect(Rect::new(0.0, 0.0, 5.0, 5.0), [0, 0, 0]);
        assert_eq!(canvas.image.get_pixel(0, 2), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.image.get_pixel(4, 4), &Rgba([0, 0, 0, 255]));
        assert_eq!(canvas.image.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
    }
}
