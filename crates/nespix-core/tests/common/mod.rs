#![allow(dead_code)]

use anyhow::{Result, bail};
use nespix_core::{Cartridge, PatternBus, Ppu};

/// Flags6 with the vertical-mirroring bit set.
pub const FLAGS6_VERTICAL: u8 = 0b0000_0001;
/// Flags6 with the four-screen bit set.
pub const FLAGS6_FOUR_SCREEN: u8 = 0b0000_1000;

/// Assembles a minimal in-memory iNES 1.0 image.
///
/// PRG banks are filled with zeros; zero CHR banks gives the board 8 KiB of
/// CHR RAM.
pub fn ines_image(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> Vec<u8> {
    let mut image = vec![
        b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, flags7, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    image.extend(vec![0u8; usize::from(prg_banks) * 16 * 1024]);
    image.extend(vec![0u8; usize::from(chr_banks) * 8 * 1024]);
    image
}

/// The default test board: NROM, 16 KiB PRG, 8 KiB CHR RAM, horizontal
/// mirroring unless overridden through `flags6`.
pub fn chr_ram_cartridge(flags6: u8) -> Result<Cartridge> {
    Ok(Cartridge::new(&ines_image(1, 0, flags6, 0))?)
}

/// A reset PPU attached to the given cartridge.
pub fn fresh_ppu(cartridge: &mut Cartridge) -> Ppu {
    let mut ppu = Ppu::new();
    ppu.reset(&mut PatternBus::from_cartridge(cartridge));
    ppu
}

/// Clocks until the PPU sits at exactly (scanline, cycle), i.e. that dot has
/// not been processed yet. Bails if the position is not reached within two
/// frames.
pub fn clock_to(ppu: &mut Ppu, cartridge: &mut Cartridge, scanline: i16, cycle: u16) -> Result<()> {
    for _ in 0..(89_342 * 2) {
        if ppu.scanline() == scanline && ppu.cycle() == cycle {
            return Ok(());
        }
        ppu.clock(&mut PatternBus::from_cartridge(cartridge));
    }
    bail!(
        "PPU never reached ({scanline}, {cycle}); stuck at ({}, {})",
        ppu.scanline(),
        ppu.cycle()
    )
}

/// Runs whole dots until `frame_complete` rises, returning the dot count.
pub fn clock_one_frame(ppu: &mut Ppu, cartridge: &mut Cartridge) -> Result<u64> {
    let mut dots = 0u64;
    while !ppu.frame_complete() {
        ppu.clock(&mut PatternBus::from_cartridge(cartridge));
        dots += 1;
        if dots > 100_000 {
            bail!("frame never completed");
        }
    }
    ppu.clear_frame_complete();
    Ok(dots)
}

/// Points the VRAM address at `addr` via the `$2006` double write.
pub fn set_vram_addr(ppu: &mut Ppu, cartridge: &mut Cartridge, addr: u16) {
    ppu.cpu_write(0x2006, (addr >> 8) as u8, &mut PatternBus::from_cartridge(cartridge));
    ppu.cpu_write(0x2006, addr as u8, &mut PatternBus::from_cartridge(cartridge));
}

/// Writes one byte through `$2007` at `addr`.
pub fn write_vram(ppu: &mut Ppu, cartridge: &mut Cartridge, addr: u16, value: u8) {
    set_vram_addr(ppu, cartridge, addr);
    ppu.cpu_write(0x2007, value, &mut PatternBus::from_cartridge(cartridge));
}

/// Reads one byte through `$2007` at `addr`, issuing the dummy buffered read
/// for non-palette addresses.
pub fn read_vram(ppu: &mut Ppu, cartridge: &mut Cartridge, addr: u16) -> u8 {
    set_vram_addr(ppu, cartridge, addr);
    if addr & 0x3FFF >= 0x3F00 {
        return ppu.cpu_read(0x2007, &mut PatternBus::from_cartridge(cartridge));
    }
    let _ = ppu.cpu_read(0x2007, &mut PatternBus::from_cartridge(cartridge));
    ppu.cpu_read(0x2007, &mut PatternBus::from_cartridge(cartridge))
}

/// Reads `$2002`.
pub fn read_status(ppu: &mut Ppu, cartridge: &mut Cartridge) -> u8 {
    ppu.cpu_read(0x2002, &mut PatternBus::from_cartridge(cartridge))
}
