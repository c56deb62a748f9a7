use crate::cartridge::{
    Cartridge,
    mapper::{MirrorControl, Mirroring},
};

/// Temporary view that lets the PPU reach the cartridge without storing a
/// raw pointer.
///
/// The host creates one of these per PPU call, so lifetimes remain explicit
/// and borrow-checked. A bus without a cartridge reads zeros and swallows
/// writes, which keeps register-level tests free of ROM setup.
#[derive(Default)]
pub struct PatternBus<'a> {
    cartridge: Option<&'a mut Cartridge>,
}

impl<'a> PatternBus<'a> {
    pub fn none() -> Self {
        Self { cartridge: None }
    }

    pub fn from_cartridge(cartridge: &'a mut Cartridge) -> Self {
        Self {
            cartridge: Some(cartridge),
        }
    }

    /// CHR space read (`$0000-$1FFF`, already masked by the caller).
    pub(crate) fn read(&mut self, addr: u16) -> u8 {
        self.cartridge
            .as_deref_mut()
            .map(|cart| cart.ppu_read(addr))
            .unwrap_or(0)
    }

    /// CHR space write; only lands on CHR RAM boards.
    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        if let Some(cart) = self.cartridge.as_deref_mut() {
            cart.ppu_write(addr, value);
        }
    }

    /// The cartridge's current nametable wiring.
    pub(crate) fn mirroring(&self) -> MirrorControl {
        self.cartridge
            .as_deref()
            .map(|cart| cart.mirroring())
            .unwrap_or(MirrorControl::Static(Mirroring::Horizontal))
    }

    /// End-of-scanline notification for mappers with scanline counters.
    pub(crate) fn clock_scanline(&mut self) {
        if let Some(cart) = self.cartridge.as_deref_mut() {
            cart.clock_scanline();
        }
    }
}
