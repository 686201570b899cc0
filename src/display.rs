use bitvec::{BitArr, array::BitArray};

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

#[derive(Clone, Copy)]
pub struct FontSprite([u8; 5]);

impl FontSprite {
    pub const ZERO: FontSprite = FontSprite([0xF0, 0x90, 0x90, 0x90, 0xF0]);
    pub const ONE: FontSprite = FontSprite([0x20, 0x60, 0x20, 0x20, 0x70]);
    pub const TWO: FontSprite = FontSprite([0xF0, 0x10, 0xF0, 0x80, 0xF0]);
    pub const THREE: FontSprite = FontSprite([0xF0, 0x10, 0xF0, 0x10, 0xF0]);
    pub const FOUR: FontSprite = FontSprite([0x90, 0x90, 0xF0, 0x10, 0x10]);
    pub const FIVE: FontSprite = FontSprite([0xF0, 0x80, 0xF0, 0x10, 0xF0]);
    pub const SIX: FontSprite = FontSprite([0xF0, 0x80, 0xF0, 0x90, 0xF0]);
    pub const SEVEN: FontSprite = FontSprite([0xF0, 0x10, 0x20, 0x40, 0x40]);
    pub const EIGHT: FontSprite = FontSprite([0xF0, 0x90, 0xF0, 0x90, 0xF0]);
    pub const NINE: FontSprite = FontSprite([0xF0, 0x90, 0xF0, 0x10, 0xF0]);
    pub const A: FontSprite = FontSprite([0xF0, 0x90, 0xF0, 0x90, 0x90]);
    pub const B: FontSprite = FontSprite([0xE0, 0x90, 0xE0, 0x90, 0xE0]);
    pub const C: FontSprite = FontSprite([0xF0, 0x80, 0x80, 0x80, 0xF0]);
    pub const D: FontSprite = FontSprite([0xE0, 0x90, 0x90, 0x90, 0xE0]);
    pub const E: FontSprite = FontSprite([0xF0, 0x80, 0xF0, 0x80, 0xF0]);
    pub const F: FontSprite = FontSprite([0xF0, 0x80, 0xF0, 0x80, 0x80]);

    pub fn as_bytes(&self) -> &[u8; 5] {
        &self.0
    }
}

/// Hex digit glyphs in the order they are laid out in memory.
pub const FONT_SET: [FontSprite; 16] = [
    FontSprite::ZERO,
    FontSprite::ONE,
    FontSprite::TWO,
    FontSprite::THREE,
    FontSprite::FOUR,
    FontSprite::FIVE,
    FontSprite::SIX,
    FontSprite::SEVEN,
    FontSprite::EIGHT,
    FontSprite::NINE,
    FontSprite::A,
    FontSprite::B,
    FontSprite::C,
    FontSprite::D,
    FontSprite::E,
    FontSprite::F,
];

/// The 64x32 monochrome frame, stored row-major one bit per pixel.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PixelBuffer {
    pixels: BitArr!(for DISPLAY_WIDTH * DISPLAY_HEIGHT),
}

impl PixelBuffer {
    pub fn new() -> Self {
        PixelBuffer {
            pixels: BitArray::ZERO,
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    /// `false` for coordinates outside the frame.
    pub fn get(&self, x: usize, y: usize) -> bool {
        if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
            return false;
        }
        self.pixels[y * DISPLAY_WIDTH + x]
    }

    pub fn rows(&self) -> impl Iterator<Item = impl Iterator<Item = bool> + '_> + '_ {
        (0..DISPLAY_HEIGHT).map(move |y| (0..DISPLAY_WIDTH).map(move |x| self.get(x, y)))
    }

    pub fn lit_count(&self) -> usize {
        self.pixels[..DISPLAY_WIDTH * DISPLAY_HEIGHT].count_ones()
    }

    /// XORs `sprite` onto the frame with its top-left corner at (`x`, `y`).
    ///
    /// Each byte is one 8-pixel row, most significant bit leftmost. Pixels
    /// falling past the right or bottom edge are dropped rather than wrapped.
    /// Returns `true` if any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut collision = false;

        for (row, &byte) in sprite.iter().enumerate() {
            let pixel_y = y + row;
            if pixel_y >= DISPLAY_HEIGHT {
                break;
            }

            for bit in 0..8 {
                let pixel_x = x + bit;
                if pixel_x >= DISPLAY_WIDTH {
                    break;
                }

                let new_pixel = (byte >> (7 - bit)) & 1 == 1;
                if !new_pixel {
                    continue;
                }

                let index = pixel_y * DISPLAY_WIDTH + pixel_x;
                let current_pixel = self.pixels[index];
                if current_pixel {
                    collision = true;
                }
                self.pixels.set(index, !current_pixel);
            }
        }
        collision
    }
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_is_drawn_msb_first() {
        let mut buffer = PixelBuffer::new();
        assert!(!buffer.draw_sprite(0, 0, &[0b1000_0001]));
        assert!(buffer.get(0, 0));
        assert!(!buffer.get(1, 0));
        assert!(buffer.get(7, 0));
        assert_eq!(buffer.lit_count(), 2);
    }

    #[test]
    fn redrawing_erases_and_collides() {
        let mut buffer = PixelBuffer::new();
        let glyph = FontSprite::EIGHT;
        assert!(!buffer.draw_sprite(10, 5, glyph.as_bytes()));
        assert!(buffer.draw_sprite(10, 5, glyph.as_bytes()));
        assert_eq!(buffer.lit_count(), 0);
    }

    #[test]
    fn blank_sprite_bits_never_collide() {
        let mut buffer = PixelBuffer::new();
        buffer.draw_sprite(0, 0, &[0xFF]);
        assert!(!buffer.draw_sprite(0, 0, &[0x00]));
        assert_eq!(buffer.lit_count(), 8);
    }

    #[test]
    fn sprite_is_clipped_at_edges() {
        let mut buffer = PixelBuffer::new();
        buffer.draw_sprite(60, 30, &[0xFF, 0xFF, 0xFF, 0xFF]);
        // 4 columns x 2 rows survive in the bottom-right corner
        assert_eq!(buffer.lit_count(), 8);
        assert!(buffer.get(63, 31));
        assert!(!buffer.get(0, 30));
        assert!(!buffer.get(60, 0));
        assert!(!buffer.get(0, 0));
    }

    #[test]
    fn rows_cover_the_whole_frame() {
        let mut buffer = PixelBuffer::new();
        buffer.draw_sprite(63, 31, &[0x80]);
        let rows: Vec<Vec<bool>> = buffer.rows().map(|row| row.collect()).collect();
        assert_eq!(rows.len(), DISPLAY_HEIGHT);
        assert!(rows.iter().all(|row| row.len() == DISPLAY_WIDTH));
        assert!(rows[31][63]);
        buffer.clear();
        assert_eq!(buffer.lit_count(), 0);
    }
}
