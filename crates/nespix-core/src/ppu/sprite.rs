use bitflags::bitflags;

bitflags! {
    /// Attribute bits stored in sprite byte 2.
    ///
    /// Bit layout:
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// V H P . . . p p
    /// ```
    /// - `V`: Vertical flip
    /// - `H`: Horizontal flip
    /// - `P`: Priority (behind background when set)
    /// - `p`: Sprite palette select (0..=3)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub(crate) struct SpriteAttributes: u8 {
        /// Sprite palette select bits.
        const PALETTE = 0b0000_0011;

        /// When set, sprite is drawn behind opaque background.
        const PRIORITY_BEHIND_BACKGROUND = 0b0010_0000;

        /// Horizontal flip.
        const FLIP_HORIZONTAL = 0b0100_0000;

        /// Vertical flip.
        const FLIP_VERTICAL = 0b1000_0000;
    }
}

impl SpriteAttributes {
    /// Palette number within the sprite half of palette RAM (4..=7).
    pub(crate) fn palette(self) -> u8 {
        (self.bits() & Self::PALETTE.bits()) + 4
    }
}

/// One sprite's four OAM bytes in their hardware order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct OamEntry {
    /// Byte 0: top scanline of the sprite.
    pub(crate) y: u8,
    /// Byte 1: tile index (bit 0 selects the pattern table in 8x16 mode).
    pub(crate) tile: u8,
    /// Byte 2: attribute bits.
    pub(crate) attr: u8,
    /// Byte 3: X coordinate. In the active scanline slots this byte is
    /// repurposed as a countdown toward the sprite's first visible dot.
    pub(crate) x: u8,
}

impl OamEntry {
    /// Writes the byte at OAM offset `m` (0..=3) within the entry.
    pub(crate) fn set_byte(&mut self, m: u8, value: u8) {
        match m & 0b11 {
            0 => self.y = value,
            1 => self.tile = value,
            2 => self.attr = value,
            _ => self.x = value,
        }
    }

    pub(crate) fn attributes(&self) -> SpriteAttributes {
        SpriteAttributes::from_bits_retain(self.attr)
    }
}
