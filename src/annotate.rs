// Draws face boxes and emotion labels onto a copy of the uploaded image

use crate::models::{FaceBox, FaceResult};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Blank columns between glyphs, before scaling
const GLYPH_SPACING: u32 = 1;

/// Fixed drawing style for annotations.
#[derive(Clone, Debug)]
pub struct Annotator {
    pub color: Rgb<u8>,
    /// Box line width in pixels
    pub thickness: u32,
    /// Each font pixel becomes a `glyph_scale` x `glyph_scale` block
    pub glyph_scale: u32,
    /// Gap between the bottom of the label and the box's top edge
    pub label_offset: i32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
            thickness: 2,
            glyph_scale: 2,
            label_offset: 10,
        }
    }
}

impl Annotator {
    /// Returns an annotated copy of `source`, one box and label per face.
    pub fn annotate(&self, source: &DynamicImage, faces: &[FaceResult]) -> RgbImage {
        let mut canvas = source.to_rgb8();
        for face in faces {
            self.draw_face(&mut canvas, face);
        }
        canvas
    }

    /// Draws one face's box and its label above the box's top-left corner.
    pub fn draw_face(&self, canvas: &mut RgbImage, face: &FaceResult) {
        self.draw_box(canvas, &face.bbox);
        let (x, y) = self.label_origin(&face.bbox);
        self.draw_text(canvas, x, y, &face.emotion);
    }

    /// Top-left corner of the label for `bbox`
    pub fn label_origin(&self, bbox: &FaceBox) -> (i32, i32) {
        let text_height = (GLYPH_HEIGHT * self.glyph_scale) as i32;
        (bbox.x, bbox.y - self.label_offset - text_height)
    }

    /// Rendered width of `text` in pixels
    #[cfg(test)]
    fn text_width(&self, text: &str) -> u32 {
        let count = text.chars().count() as u32;
        if count == 0 {
            return 0;
        }
        (count * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING) * self.glyph_scale
    }

    fn draw_box(&self, canvas: &mut RgbImage, bbox: &FaceBox) {
        let width = bbox.width.max(1) as u32;
        let height = bbox.height.max(1) as u32;
        for t in 0..self.thickness.max(1) {
            let inner_w = width.saturating_sub(2 * t);
            let inner_h = height.saturating_sub(2 * t);
            if inner_w == 0 || inner_h == 0 {
                break;
            }
            let rect = Rect::at(bbox.x + t as i32, bbox.y + t as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(canvas, rect, self.color);
        }
    }

    fn draw_text(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str) {
        let advance = ((GLYPH_WIDTH + GLYPH_SPACING) * self.glyph_scale) as i32;
        let mut cursor_x = x;
        for ch in text.chars() {
            self.draw_char(canvas, cursor_x, y, ch);
            cursor_x += advance;
        }
    }

    fn draw_char(&self, canvas: &mut RgbImage, x: i32, y: i32, ch: char) {
        let scale = self.glyph_scale as i32;
        let (img_w, img_h) = (canvas.width() as i32, canvas.height() as i32);

        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = x + col as i32 * scale + dx;
                        let py = y + row as i32 * scale + dy;
                        if px >= 0 && py >= 0 && px < img_w && py < img_h {
                            canvas.put_pixel(px as u32, py as u32, self.color);
                        }
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap glyphs, one `u8` per row, bit 4 is the leftmost column.
/// Letters render in uppercase.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '%' => [0b11001, 0b11010, 0b00100, 0b01000, 0b10000, 0b01011, 0b10011],
        ' ' => [0; 7],
        // unknown characters render as '?'
        _ => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100],
    }
}
