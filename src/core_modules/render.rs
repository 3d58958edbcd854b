// THEORY:
// The grid does not draw pixels itself; it describes what to draw to a
// `DrawContext`. Anything that can fill a rectangle, stroke an outline and
// place a label can render a grid: a raster canvas, a terminal, a browser
// bridge, or the `CommandRecorder` used by tests to assert on draw order.

use crate::core_modules::cell::Rgb;
use crate::core_modules::overlay::Font;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// The 2D drawing surface the grid paints onto.
pub trait DrawContext {
    fn fill_rect(&mut self, rect: Rect, color: Rgb);
    fn stroke_rect(&mut self, rect: Rect, color: Rgb);
    /// Draws `text` centred on `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgb, font: &Font);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    FillRect { rect: Rect, color: Rgb },
    StrokeRect { rect: Rect, color: Rgb },
    FillText { text: String, x: f32, y: f32, color: Rgb, font: Font },
}

/// A `DrawContext` that only remembers what it was asked to draw.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandRecorder {
    pub commands: Vec<DrawCommand>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::FillText { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl DrawContext for CommandRecorder {
    fn fill_rect(&mut self, rect: Rect, color: Rgb) {
        self.commands.push(DrawCommand::FillRect { rect, color });
    }

    fn stroke_rect(&mut self, rect: Rect, color: Rgb) {
        self.commands.push(DrawCommand::StrokeRect { rect, color });
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgb, font: &Font) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            color,
            font: font.clone(),
        });
    }
}

/// Black on light backgrounds, white on dark ones.
pub fn contrasting_text(background: Rgb) -> Rgb {
    let [r, g, b] = background.map(f64::from);
    if 0.299 * r + 0.587 * g + 0.114 * b > 127.5 {
        [0, 0, 0]
    } else {
        [255, 255, 255]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_contrasts_with_background() {
        assert_eq!(contrasting_text([255, 255, 255]), [0, 0, 0]);
        assert_eq!(contrasting_text([10, 10, 40]), [255, 255, 255]);
    }

    #[test]
    fn recorder_serializes_tagged_commands() {
        let mut rec = CommandRecorder::new();
        rec.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0), [1, 2, 3]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["commands"][0]["op"], "fill_rect");
        assert_eq!(json["commands"][0]["color"][2], 3);
    }
}
