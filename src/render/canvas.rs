//! Pixel writes into an ARGB8888 buffer, mirrored across the vertical midline

use crate::output::Damage;

/// Borrowed little-endian ARGB8888 pixels, `width * height * 4` bytes
pub struct Canvas<'a> {
    pixels: &'a mut [u8],
    width: i32,
    height: i32,
    /// Rows are written to `height - 1 - y`
    flipped: bool,
}

impl<'a> Canvas<'a> {
    /// Rows past the end of `pixels` are dropped from the canvas
    pub fn new(pixels: &'a mut [u8], width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        let rows = if stride == 0 { 0 } else { pixels.len() / stride };
        Self {
            pixels,
            width: width as i32,
            height: height.min(rows as u32) as i32,
            flipped: false,
        }
    }

    /// Reflect every following write across the horizontal midline
    pub fn set_flipped(&mut self, flipped: bool) {
        self.flipped = flipped;
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn put(&mut self, x: i32, y: i32, color: u32) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let row = if self.flipped { self.height - 1 - y } else { y };
        let offset = (row as usize * self.width as usize + x as usize) * 4;
        self.pixels[offset..offset + 4].copy_from_slice(&color.to_le_bytes());
    }

    /// Write `(x, y)` and its reflection `(width - 1 - x, y)`
    pub fn put_mirrored(&mut self, x: i32, y: i32, color: u32) {
        self.put(x, y, color);
        self.put(self.width - 1 - x, y, color);
    }

    pub fn fill_row_mirrored(&mut self, y: i32, x_start: i32, x_end: i32, color: u32) {
        for x in x_start.max(0)..x_end.min(self.width) {
            self.put_mirrored(x, y, color);
        }
    }

    pub fn fill_column_mirrored(&mut self, x: i32, y_start: i32, y_end: i32, color: u32) {
        for y in y_start.max(0)..y_end.min(self.height) {
            self.put_mirrored(x, y, color);
        }
    }

    pub fn clear(&mut self, rect: &Damage) {
        let x_start = rect.x.max(0);
        let x_end = (rect.x + rect.width).min(self.width);
        for y in rect.y.max(0)..(rect.y + rect.height).min(self.height) {
            for x in x_start..x_end {
                self.put(x, y, 0);
            }
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.pixels[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }
}

/// Pixel boundary for the start of a span; halves round up.
///
/// Paired with [`snap_end`], the span `[size - e, size - s)` covers exactly
/// the reflection of the pixels covered by `[s, e)` on any integer `size`.
pub fn snap_start(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

/// Pixel boundary for the end of a span; halves round down
pub fn snap_end(v: f32) -> i32 {
    (v - 0.5).ceil() as i32
}
