use std::{fs, path::Path};

use tracing::debug;

use crate::{
    cartridge::{
        header::{Header, NES_HEADER_LEN},
        mapper::{Mapper, MirrorControl},
    },
    error::Error,
};

pub mod header;
pub mod mapper;

const TRAINER_LEN: usize = 512;

/// Parsed NES cartridge: header metadata plus the mapper that owns the ROM
/// and RAM sections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cartridge {
    pub header: Header,
    mapper: Mapper,
}

impl Cartridge {
    /// Parse a cartridge from an in-memory iNES image.
    pub fn new(bytes: &[u8]) -> Result<Self, Error> {
        let header_bytes = bytes.get(..NES_HEADER_LEN).ok_or(Error::TooShort {
            actual: bytes.len(),
        })?;
        let header = Header::parse(header_bytes)?;

        let mut cursor = NES_HEADER_LEN;
        if header.trainer_present {
            // The 512 trainer bytes are validated and skipped; nothing in
            // this core executes from the trainer area.
            section(bytes, &mut cursor, TRAINER_LEN, "trainer")?;
        }

        let prg_rom = section(bytes, &mut cursor, header.prg_rom_size, "PRG ROM")?;
        let chr_rom = section(bytes, &mut cursor, header.chr_rom_size, "CHR ROM")?;

        let mapper = Mapper::build(&header, prg_rom, chr_rom)?;
        debug!(
            mapper_id = header.mapper_id,
            prg_rom = header.prg_rom_size,
            chr_rom = header.chr_rom_size,
            chr_ram = header.has_chr_ram(),
            mirroring = ?header.mirroring,
            "cartridge inserted"
        );

        Ok(Self { header, mapper })
    }

    /// Load and parse a cartridge directly from disk.
    pub fn from_file<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let bytes = fs::read(path)?;
        Self::new(&bytes)
    }

    /// CPU bus read; `None` when the board does not claim the address.
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        self.mapper.cpu_read(addr)
    }

    /// CPU bus write; returns whether the board claimed the address.
    pub fn cpu_write(&mut self, addr: u16, value: u8) -> bool {
        self.mapper.cpu_write(addr, value)
    }

    /// PPU pattern window read (`$0000-$1FFF`).
    pub fn ppu_read(&self, addr: u16) -> u8 {
        self.mapper.ppu_read(addr)
    }

    /// PPU pattern window write.
    pub fn ppu_write(&mut self, addr: u16, value: u8) {
        self.mapper.ppu_write(addr, value);
    }

    /// Current nametable wiring as the mapper drives it.
    pub fn mirroring(&self) -> MirrorControl {
        self.mapper.mirroring()
    }

    /// End-of-scanline notification from the PPU.
    pub fn clock_scanline(&mut self) {
        self.mapper.clock_scanline();
    }

    /// Level of the mapper IRQ line (MMC3 scanline counter).
    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }

    /// Acknowledges the mapper IRQ.
    pub fn clear_irq(&mut self) {
        self.mapper.clear_irq();
    }
}

fn section(
    bytes: &[u8],
    cursor: &mut usize,
    len: usize,
    name: &'static str,
) -> Result<Vec<u8>, Error> {
    if len == 0 {
        return Ok(Vec::new());
    }

    let end = cursor.checked_add(len).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;

    let slice = bytes.get(*cursor..end).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(*cursor),
    })?;

    *cursor = end;
    Ok(slice.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::header::Mirroring;

    fn base_header(prg_banks: u8, chr_banks: u8, flags6: u8) -> [u8; NES_HEADER_LEN] {
        [
            b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]
    }

    #[test]
    fn parses_basic_cartridge() {
        let mut rom = base_header(1, 1, 0).to_vec();
        rom.extend(vec![0xAA; 16 * 1024]);
        rom.extend(vec![0x55; 8 * 1024]);

        let cartridge = Cartridge::new(&rom).expect("parse cartridge");

        assert_eq!(cartridge.header.prg_rom_size, 16 * 1024);
        assert_eq!(cartridge.ppu_read(0x0000), 0x55);
        assert_eq!(
            cartridge.mirroring(),
            MirrorControl::Static(Mirroring::Horizontal)
        );
    }

    #[test]
    fn skips_trainer_when_present() {
        let mut rom = base_header(1, 0, 0b0000_0100).to_vec();
        rom.extend(vec![0xFE; TRAINER_LEN]);
        rom.extend(vec![0xAA; 16 * 1024]);

        let cartridge = Cartridge::new(&rom).expect("parse cartridge");

        assert!(cartridge.header.trainer_present);
        assert_eq!(cartridge.cpu_read(0x8000), Some(0xAA));
    }

    #[test]
    fn chr_ram_boards_accept_ppu_writes() {
        let mut rom = base_header(1, 0, 0).to_vec();
        rom.extend(vec![0x00; 16 * 1024]);

        let mut cartridge = Cartridge::new(&rom).expect("parse cartridge");
        cartridge.ppu_write(0x0FF0, 0x3C);
        assert_eq!(cartridge.ppu_read(0x0FF0), 0x3C);
    }

    #[test]
    fn errors_when_prg_section_missing() {
        let mut rom = base_header(1, 0, 0).to_vec();
        rom.extend(vec![0xAA; 1024]);

        let err = Cartridge::new(&rom).expect_err("should fail");
        assert!(matches!(
            err,
            Error::SectionTooShort {
                section: "PRG ROM",
                ..
            }
        ));
    }

    #[test]
    fn mmc1_reports_dynamic_mirroring() {
        let mut flags6 = base_header(1, 0, 0);
        flags6[6] = 0x10; // mapper 1
        let mut rom = flags6.to_vec();
        rom.extend(vec![0x00; 16 * 1024]);

        let cartridge = Cartridge::new(&rom).expect("parse cartridge");
        assert!(matches!(
            cartridge.mirroring(),
            MirrorControl::Dynamic(Mirroring::SingleScreenLower)
        ));
    }
}
