//! Cycle-accurate NES PPU core.
//!
//! The crate centers on [`ppu::Ppu`], a dot-clocked 2C02 that produces one
//! 256x240 RGB frame per ~89,342 ticks and raises an NMI line at vertical
//! blank. The cartridge side ([`cartridge::Cartridge`] and its mappers)
//! exists to feed the PPU's pattern fetches and nametable wiring; there is
//! no CPU, APU or frontend here.
//!
//! A host drives the core like this:
//!
//! ```
//! use nespix_core::cartridge::Cartridge;
//! use nespix_core::ppu::{Ppu, pattern_bus::PatternBus};
//!
//! // Minimal NROM image: 16 KiB PRG, CHR RAM.
//! let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
//! image.extend(std::iter::repeat(0).take(16 * 1024));
//! let mut cartridge = Cartridge::new(&image).unwrap();
//!
//! let mut ppu = Ppu::new();
//! ppu.reset(&mut PatternBus::from_cartridge(&mut cartridge));
//!
//! while !ppu.frame_complete() {
//!     // A real host interleaves one CPU step per three PPU dots and polls
//!     // ppu.consume_nmi() at instruction boundaries.
//!     ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
//! }
//! let frame: &[u8] = ppu.frame_rgb();
//! assert_eq!(frame.len(), 256 * 240 * 3);
//! ```

pub mod cartridge;
pub mod error;
pub mod memory;
pub mod ppu;
pub mod ram;

pub use cartridge::Cartridge;
pub use error::Error;
pub use ppu::{Ppu, pattern_bus::PatternBus};
