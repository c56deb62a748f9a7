//! NES Picture Processing Unit (PPU) implementation with cycle-level timing.
//!
//! **Quick primer for newcomers**
//! - The PPU draws 262 scanlines per frame. Scanline `-1` is the *prerender*
//!   line, `0..=239` are visible, `240` is post-render, and `241..=260` are
//!   vblank. Each scanline has 341 PPU cycles ("dots").
//! - The CPU sees eight registers at `$2000-$2007` (mirrored). Most of the
//!   PPU state lives in tiny internal latches and shift registers; mirroring
//!   that behavior is what makes the code look odd in places.
//! - The hardware treats "background" (tiles) and "sprites" separately. Each
//!   side has shifters that push out one pixel per dot while fetch units
//!   refill them every 8 dots.
//! - Some features depend on *which* cycle or scanline you are on (the
//!   odd-frame skipped tick, sprite evaluation windows, scroll copies).
//!   Those checks are explicit in `clock()`.
//!
//! **Why some code looks strange**
//! - The odd-frame skip on prerender: real hardware drops one dot on odd
//!   frames when rendering is enabled. Whether it happens is decided by a
//!   latch sampled two dots earlier, so toggling rendering inside that
//!   window follows the latch, not the live register.
//! - `$2002` reads near the vblank edge can suppress the flag and/or the
//!   NMI for the whole frame. The suppression flags are part of
//!   [`nmi::NmiLine`] and consulted at dot (241, 1).
//! - Sprite overflow reproduces the hardware's broken secondary-OAM scan:
//!   see `sprite_state` for the diagonal cursor walk.
//! - Palette RAM has mirroring quirks ($3F10 mirrors $3F00, etc.). Those
//!   rules are handled by `palette::PaletteRam`.

pub mod buffer;
pub mod palette;
pub mod pattern_bus;

mod background_pipeline;
mod nmi;
mod registers;
mod sprite;
mod sprite_pipeline;
mod sprite_state;

use core::fmt;

use tracing::trace;

use crate::{
    cartridge::mapper::{MirrorControl, Mirroring},
    memory::ppu::{self as ppu_mem, Register as PpuRegister},
    ram::ppu::NametablePage,
};

use self::{
    background_pipeline::BgPipeline,
    buffer::FrameBuffer,
    nmi::NmiLine,
    palette::{NES_RGB_PALETTE, PaletteRam},
    pattern_bus::PatternBus,
    registers::{Mask, Registers, Status},
    sprite::SpriteAttributes,
    sprite_pipeline::SpriteLine,
    sprite_state::SpriteEval,
};

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;
const CYCLES_PER_SCANLINE: u16 = 341;
const PRERENDER_SCANLINE: i16 = -1;
const LAST_SCANLINE: i16 = 260;

/// The PPU core: register file, pixel pipelines and frame timing.
#[derive(Clone)]
pub struct Ppu {
    /// Collection of CPU visible registers and their helper latches.
    registers: Registers,
    /// The console's four addressable nametable pages. Which of them are
    /// physically distinct depends on the cartridge mirroring.
    nametables: [NametablePage; ppu_mem::NAMETABLE_COUNT],
    /// Dedicated palette RAM behind `$3F00-$3FFF`.
    palette_ram: PaletteRam,
    /// Whether the mapper re-drives the nametable wiring at runtime.
    dynamic_mirroring: bool,
    /// Most recent wiring answer; also the fixed answer for static boards.
    cached_mirroring: Mirroring,
    /// Current dot (0..=340) within the active scanline.
    cycle: u16,
    /// Current scanline. `-1` is the prerender line, `0..=239` are visible.
    scanline: i16,
    /// Total number of frames produced so far.
    frame: u64,
    /// Tracks frame parity for the skipped-dot logic.
    odd_frame: bool,
    /// Raised when the last vblank scanline completes; the host clears it.
    frame_complete: bool,
    /// Rendering-enabled state sampled at prerender dot 338; the skip at
    /// dot 339 trusts this latch over the live mask register.
    odd_skip_latch: bool,
    /// Background fetch latches and shifters.
    bg_pipeline: BgPipeline,
    /// Sprites being drawn on the current scanline.
    sprite_line: SpriteLine,
    /// Secondary-OAM evaluation for the next scanline.
    sprite_eval: SpriteEval,
    /// NMI edge/delay pipeline and `$2002` suppression state.
    nmi: NmiLine,
    /// Packed RGB output for the frame in progress.
    framebuffer: FrameBuffer,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ppu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ppu")
            .field("cycle", &self.cycle)
            .field("scanline", &self.scanline)
            .field("frame", &self.frame)
            .field("odd_frame", &self.odd_frame)
            .field("mirroring", &self.cached_mirroring)
            .finish()
    }
}

impl Ppu {
    /// Creates a new PPU instance in its pre-reset state.
    pub fn new() -> Self {
        Self {
            registers: Registers::new(),
            nametables: [
                NametablePage::new(),
                NametablePage::new(),
                NametablePage::new(),
                NametablePage::new(),
            ],
            palette_ram: PaletteRam::new(),
            dynamic_mirroring: false,
            cached_mirroring: Mirroring::Horizontal,
            cycle: 0,
            scanline: PRERENDER_SCANLINE,
            frame: 0,
            odd_frame: false,
            frame_complete: false,
            odd_skip_latch: false,
            bg_pipeline: BgPipeline::new(),
            sprite_line: SpriteLine::default(),
            sprite_eval: SpriteEval::default(),
            nmi: NmiLine::default(),
            framebuffer: FrameBuffer::new(),
        }
    }

    /// Restores the device to its power-on state.
    ///
    /// Wipes registers, nametables and pipelines, seeds palette RAM with the
    /// hardware power-up pattern, and interrogates the cartridge to learn
    /// whether the nametable wiring is fixed or mapper-driven.
    pub fn reset(&mut self, pattern: &mut PatternBus<'_>) {
        self.registers.reset();
        for page in &mut self.nametables {
            page.fill(0);
        }
        self.palette_ram = PaletteRam::new();
        self.palette_ram.load_power_up();
        self.cycle = 0;
        self.scanline = PRERENDER_SCANLINE;
        self.frame = 0;
        self.odd_frame = false;
        self.frame_complete = false;
        self.odd_skip_latch = false;
        self.bg_pipeline.clear();
        self.sprite_line.clear();
        self.sprite_eval = SpriteEval::default();
        self.nmi = NmiLine::default();
        self.framebuffer.clear();

        match pattern.mirroring() {
            MirrorControl::Static(mode) => {
                self.dynamic_mirroring = false;
                self.cached_mirroring = mode;
            }
            MirrorControl::Dynamic(mode) => {
                self.dynamic_mirroring = true;
                self.cached_mirroring = mode;
            }
        }
    }

    /// One-shot NMI poll, meant to be called at CPU instruction boundaries.
    pub fn consume_nmi(&mut self) -> bool {
        self.nmi.consume()
    }

    /// Whether a frame finished since the host last cleared the flag.
    pub fn frame_complete(&self) -> bool {
        self.frame_complete
    }

    /// Host acknowledgment after presenting a frame.
    pub fn clear_frame_complete(&mut self) {
        self.frame_complete = false;
    }

    /// The finished frame as packed RGB888, row-major from the top-left.
    pub fn frame_rgb(&self) -> &[u8] {
        self.framebuffer.as_bytes()
    }

    /// Frame counter (increments when scanline wraps from 260 to -1).
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Current scanline (-1 is prerender).
    pub fn scanline(&self) -> i16 {
        self.scanline
    }

    /// Current dot within the scanline.
    pub fn cycle(&self) -> u16 {
        self.cycle
    }

    /// Handles CPU reads from the mirrored PPU register space.
    ///
    /// Only `$2002`, `$2004` and `$2007` are readable; the write-only
    /// registers return zero.
    pub fn cpu_read(&mut self, addr: u16, pattern: &mut PatternBus<'_>) -> u8 {
        match PpuRegister::from_cpu_addr(addr) {
            PpuRegister::Status => self.read_status(),
            PpuRegister::OamData => self.registers.oam[usize::from(self.registers.oam_addr)],
            PpuRegister::Data => self.read_vram_data(pattern),
            _ => 0,
        }
    }

    /// Handles CPU writes to the mirrored PPU register space.
    pub fn cpu_write(&mut self, addr: u16, value: u8, pattern: &mut PatternBus<'_>) {
        match PpuRegister::from_cpu_addr(addr) {
            PpuRegister::Control => {
                self.registers.write_control(value);
                self.nmi.set_output(self.registers.control.nmi_enabled());
            }
            PpuRegister::Mask => self.registers.mask = Mask::from_bits_retain(value),
            PpuRegister::Status => {} // read-only
            PpuRegister::OamAddr => self.registers.oam_addr = value,
            PpuRegister::OamData => {
                self.registers.oam[usize::from(self.registers.oam_addr)] = value;
                self.registers.oam_addr = self.registers.oam_addr.wrapping_add(1);
            }
            PpuRegister::Scroll => self.registers.vram.write_scroll(value),
            PpuRegister::Addr => {
                if let Some(completed) = self.registers.vram.write_addr(value) {
                    self.registers.vram.v = completed;
                }
            }
            PpuRegister::Data => {
                let addr = self.registers.vram.v.raw();
                self.ppu_write(pattern, addr, value);
                let step = self.registers.control.vram_increment();
                self.registers.vram.v.increment(step);
            }
        }
    }

    /// OAM DMA entry point (`$4014`): 256 bytes land at `oam_addr` onward,
    /// wrapping modulo 256. `oam_addr` itself is left untouched.
    pub fn dma_write(&mut self, data: &[u8; ppu_mem::OAM_RAM_SIZE]) {
        for (k, &value) in data.iter().enumerate() {
            let index = self.registers.oam_addr.wrapping_add(k as u8);
            self.registers.oam[usize::from(index)] = value;
        }
    }

    fn read_status(&mut self) -> u8 {
        // The low five bits are not driven; they echo the stale data latch.
        let data = (self.registers.status.bits() & 0xE0) | (self.registers.vram_buffer & 0x1F);

        // Race windows around the vblank edge at (241, 1).
        if self.scanline == 241 && self.cycle == 1 {
            self.nmi.suppress_vblank = true;
            self.nmi.suppress_nmi = true;
        } else if self.scanline == 241 && (self.cycle == 2 || self.cycle == 3) {
            self.nmi.suppress_nmi = true;
            self.nmi.cancel();
        }

        self.set_vblank(false);
        self.registers.vram.reset_latch();
        data
    }

    fn read_vram_data(&mut self, pattern: &mut PatternBus<'_>) -> u8 {
        let addr = self.registers.vram.v.raw() & ppu_mem::VRAM_MIRROR_MASK;
        let data = if addr >= ppu_mem::PALETTE_BASE {
            // Palette reads are unbuffered, but still perform a hidden read
            // that refreshes the buffer from the nametable space underneath.
            let value = self.ppu_read(pattern, addr);
            self.registers.vram_buffer =
                self.ppu_read(pattern, addr.wrapping_sub(0x1000) & ppu_mem::VRAM_MIRROR_MASK);
            value
        } else {
            let buffered = self.registers.vram_buffer;
            self.registers.vram_buffer = self.ppu_read(pattern, addr);
            buffered
        };
        let step = self.registers.control.vram_increment();
        self.registers.vram.v.increment(step);
        data
    }

    /// Reads the 14-bit PPU address space: pattern tables via the cartridge,
    /// nametables through the mirroring resolver, then palette RAM.
    fn ppu_read(&mut self, pattern: &mut PatternBus<'_>, addr: u16) -> u8 {
        let addr = addr & ppu_mem::VRAM_MIRROR_MASK;
        if addr <= ppu_mem::PATTERN_TABLE_END {
            pattern.read(addr)
        } else if addr < ppu_mem::PALETTE_BASE {
            let (table, index) = self.map_nametable(pattern, addr);
            self.nametables[table][index]
        } else {
            self.palette_ram.read(addr)
        }
    }

    fn ppu_write(&mut self, pattern: &mut PatternBus<'_>, addr: u16, value: u8) {
        let addr = addr & ppu_mem::VRAM_MIRROR_MASK;
        if addr <= ppu_mem::PATTERN_TABLE_END {
            pattern.write(addr, value);
        } else if addr < ppu_mem::PALETTE_BASE {
            let (table, index) = self.map_nametable(pattern, addr);
            self.nametables[table][index] = value;
        } else {
            self.palette_ram.write(addr, value);
        }
    }

    /// Applies nametable mirroring for addresses in `$2000-$3EFF`, returning
    /// the physical page and offset.
    fn map_nametable(&mut self, pattern: &PatternBus<'_>, addr: u16) -> (usize, usize) {
        let relative = usize::from(addr - ppu_mem::NAMETABLE_BASE) & 0x0FFF;
        let table = (relative / ppu_mem::NAMETABLE_SIZE) & 0b11;
        let index = relative & 0x03FF;

        let table = match self.resolve_mirroring(pattern) {
            Mirroring::Horizontal => table >> 1,
            Mirroring::Vertical => table & 0b01,
            Mirroring::SingleScreenLower => 0,
            Mirroring::SingleScreenUpper => 1,
            Mirroring::FourScreen => table,
        };
        (table, index)
    }

    /// Static boards answer from the cache; dynamic boards are re-queried on
    /// every access and the cache keeps their latest answer.
    fn resolve_mirroring(&mut self, pattern: &PatternBus<'_>) -> Mirroring {
        if self.dynamic_mirroring {
            if let MirrorControl::Dynamic(mode) = pattern.mirroring() {
                self.cached_mirroring = mode;
            }
        }
        self.cached_mirroring
    }

    fn rendering_enabled(&self) -> bool {
        self.registers.mask.rendering_enabled()
    }

    fn set_vblank(&mut self, active: bool) {
        self.registers.status.set(Status::VERTICAL_BLANK, active);
        self.nmi.set_occurred(active);
    }

    /// Advances the PPU by a single dot.
    ///
    /// Call three times per CPU cycle for NTSC timing. The ordering inside a
    /// dot is load-bearing: NMI counters move first, then scanline work,
    /// then the vblank edge, then the pixel write, then frame advance.
    pub fn clock(&mut self, pattern: &mut PatternBus<'_>) {
        self.nmi.tick();

        if self.scanline == PRERENDER_SCANLINE && self.cycle == 1 {
            self.set_vblank(false);
            self.registers
                .status
                .remove(Status::SPRITE_ZERO_HIT | Status::SPRITE_OVERFLOW);
            self.nmi.suppress_nmi = false;
            self.odd_skip_latch = false;
        }

        if (PRERENDER_SCANLINE..240).contains(&self.scanline) {
            self.run_render_line(pattern);
        }

        if self.scanline == 241 && self.cycle == 1 {
            if self.nmi.suppress_vblank {
                self.set_vblank(false);
            } else {
                self.set_vblank(true);
            }
            if self.nmi.suppress_nmi {
                self.nmi.cancel();
            }
            self.nmi.suppress_vblank = false;
        }

        if (0..240).contains(&self.scanline) && (1..=256).contains(&self.cycle) {
            self.render_pixel();
        }

        if self.rendering_enabled() && self.cycle == 260 && (0..240).contains(&self.scanline) {
            pattern.clock_scanline();
        }

        if self.scanline == PRERENDER_SCANLINE && self.cycle == 338 {
            self.odd_skip_latch = self.rendering_enabled();
        }

        // On odd frames with rendering enabled, the last prerender dot is
        // elided and the frame starts one dot early.
        if self.scanline == PRERENDER_SCANLINE
            && self.cycle == 339
            && self.odd_frame
            && self.odd_skip_latch
        {
            self.cycle = 0;
            self.scanline = 0;
            return;
        }

        self.advance_cycle();
    }

    /// Per-dot work shared by the prerender and visible scanlines: sprite
    /// evaluation, the eight-phase background fetch cadence, scroll copies
    /// and the end-of-line sprite pattern fetch.
    fn run_render_line(&mut self, pattern: &mut PatternBus<'_>) {
        if self.scanline >= 0 && self.cycle == 65 {
            self.sprite_eval.begin();
        }
        if self.scanline >= 0 && (65..=256).contains(&self.cycle) && self.rendering_enabled() {
            self.clock_sprite_evaluation();
        }

        if (2..258).contains(&self.cycle) || (321..338).contains(&self.cycle) {
            self.update_shifters();
            match (self.cycle - 1) % 8 {
                0 => {
                    self.bg_pipeline.reload();
                    let addr = self.registers.vram.v.tile_address();
                    self.bg_pipeline.next_tile_id = self.ppu_read(pattern, addr);
                }
                2 => {
                    let v = self.registers.vram.v;
                    let mut attr = self.ppu_read(pattern, v.attribute_address());
                    // Coarse Y bit 1 picks the vertical half of the quadrant
                    // byte, coarse X bit 1 the horizontal half.
                    if v.raw() & 0x0040 != 0 {
                        attr >>= 4;
                    }
                    if v.raw() & 0x0002 != 0 {
                        attr >>= 2;
                    }
                    self.bg_pipeline.next_tile_attr = attr & 0b11;
                }
                4 => {
                    let addr = self.bg_tile_row_address();
                    self.bg_pipeline.next_tile_lsb = self.ppu_read(pattern, addr);
                }
                6 => {
                    let addr = self.bg_tile_row_address();
                    self.bg_pipeline.next_tile_msb = self.ppu_read(pattern, addr + 8);
                }
                7 => self.increment_scroll_x(),
                _ => {}
            }
        }

        if self.cycle == 256 {
            self.increment_scroll_y();
        }
        if self.cycle == 257 {
            self.bg_pipeline.reload();
            self.transfer_address_x();
        }

        // Dummy nametable fetches; only mappers observe these.
        if self.cycle == 338 || self.cycle == 340 {
            let addr = self.registers.vram.v.tile_address();
            self.bg_pipeline.next_tile_id = self.ppu_read(pattern, addr);
        }

        if self.scanline == PRERENDER_SCANLINE && (280..305).contains(&self.cycle) {
            self.transfer_address_y();
        }

        if self.cycle == 257 && self.scanline >= 0 {
            self.sprite_line.clear();
            if self.rendering_enabled() {
                self.sprite_line.load(&self.sprite_eval);
            }
        }

        if self.cycle == 340 {
            self.fetch_sprite_patterns(pattern);
        }
    }

    /// Address of the current background tile row in the pattern table.
    fn bg_tile_row_address(&self) -> u16 {
        let table = self.registers.control.background_pattern_table();
        let fine_y = u16::from(self.registers.vram.v.fine_y());
        table + u16::from(self.bg_pipeline.next_tile_id) * 16 + fine_y
    }

    /// Two-dot evaluation cadence: odd dots latch an OAM byte, even dots act
    /// on it.
    fn clock_sprite_evaluation(&mut self) {
        if self.cycle & 1 == 1 {
            self.sprite_eval.read_dot(&self.registers.oam);
        } else {
            let height = self.registers.control.sprite_height();
            if self.sprite_eval.decide_dot(self.scanline, height) {
                self.registers.status.insert(Status::SPRITE_OVERFLOW);
            }
        }
    }

    /// Advances the pixel shifters. Background movement follows the
    /// background enable bit; sprite countdowns only run on visible dots.
    fn update_shifters(&mut self) {
        if self.registers.mask.contains(Mask::SHOW_BACKGROUND) {
            self.bg_pipeline.shift();
        }
        if self.registers.mask.contains(Mask::SHOW_SPRITES)
            && (0..240).contains(&self.scanline)
            && (2..=256).contains(&self.cycle)
        {
            self.sprite_line.tick();
        }
    }

    fn increment_scroll_x(&mut self) {
        if self.rendering_enabled() {
            self.registers.vram.v.increment_coarse_x();
        }
    }

    fn increment_scroll_y(&mut self) {
        if self.rendering_enabled() {
            self.registers.vram.v.increment_y();
        }
    }

    fn transfer_address_x(&mut self) {
        if self.rendering_enabled() {
            let t = self.registers.vram.t;
            self.registers.vram.v.copy_horizontal_bits(t);
        }
    }

    fn transfer_address_y(&mut self) {
        if self.rendering_enabled() {
            let t = self.registers.vram.t;
            self.registers.vram.v.copy_vertical_bits(t);
        }
    }

    /// Consolidated sprite pattern fetch for the next scanline (dot 340).
    fn fetch_sprite_patterns(&mut self, pattern: &mut PatternBus<'_>) {
        let height = self.registers.control.sprite_height();
        for i in 0..usize::from(self.sprite_line.count) {
            let entry = self.sprite_line.entry(i);
            let attributes = entry.attributes();

            let mut row = i32::from(self.scanline) - i32::from(entry.y);
            if attributes.contains(SpriteAttributes::FLIP_VERTICAL) {
                row = i32::from(height) - 1 - row;
            }

            let addr = if height == 8 {
                let table = i32::from(self.registers.control.sprite_pattern_table());
                table + i32::from(entry.tile) * 16 + row
            } else {
                let table = i32::from(entry.tile & 0x01) * 0x1000;
                let mut tile = i32::from(entry.tile & 0xFE);
                if row > 7 {
                    tile += 1;
                    row -= 8;
                }
                table + tile * 16 + row
            };
            // Stale slots on the prerender line produce negative rows; the
            // 14-bit bus mask wraps them the same way the address lines do.
            let addr = (addr & i32::from(ppu_mem::VRAM_MIRROR_MASK)) as u16;

            let mut low = self.ppu_read(pattern, addr);
            let mut high = self.ppu_read(pattern, addr.wrapping_add(8));
            if attributes.contains(SpriteAttributes::FLIP_HORIZONTAL) {
                low = low.reverse_bits();
                high = high.reverse_bits();
            }
            self.sprite_line.set_pattern(i, low, high);
        }
    }

    /// Composites one visible dot: background sample, sprite sample,
    /// priority mux, sprite-zero hit and the final palette lookup.
    fn render_pixel(&mut self) {
        let mask = self.registers.mask;

        let (mut bg_pixel, mut bg_palette) = (0u8, 0u8);
        if mask.contains(Mask::SHOW_BACKGROUND)
            && (mask.contains(Mask::SHOW_BACKGROUND_LEFT) || self.cycle > 8)
        {
            let (pixel, palette) = self.bg_pipeline.sample(self.registers.vram.x);
            bg_pixel = pixel;
            bg_palette = palette;
        }

        let sprite = if mask.contains(Mask::SHOW_SPRITES)
            && (mask.contains(Mask::SHOW_SPRITES_LEFT) || self.cycle > 8)
        {
            self.sprite_line.sample()
        } else {
            None
        };

        let (pixel, palette) = match (bg_pixel, sprite) {
            (0, None) => (0, 0),
            (0, Some(fg)) => (fg.pixel, fg.palette),
            (_, None) => (bg_pixel, bg_palette),
            (_, Some(fg)) => {
                if self.sprite_line.sprite_zero_possible
                    && fg.is_sprite_zero
                    && self.rendering_enabled()
                {
                    let clipped_left = self.cycle <= 8
                        && (!mask.contains(Mask::SHOW_BACKGROUND_LEFT)
                            || !mask.contains(Mask::SHOW_SPRITES_LEFT));
                    if !clipped_left {
                        if !self.registers.status.contains(Status::SPRITE_ZERO_HIT) {
                            trace!(
                                scanline = self.scanline,
                                cycle = self.cycle,
                                "sprite zero hit"
                            );
                        }
                        self.registers.status.insert(Status::SPRITE_ZERO_HIT);
                    }
                }
                if fg.in_front {
                    (fg.pixel, fg.palette)
                } else {
                    (bg_pixel, bg_palette)
                }
            }
        };

        let mut palette_addr = ((palette & 0x07) << 2) | (pixel & 0x03);
        if palette_addr & 0x13 == 0x10 {
            palette_addr &= 0x0F;
        }
        let color_index = self.palette_ram.read(u16::from(palette_addr));
        let color = NES_RGB_PALETTE[usize::from(color_index)];

        let x = usize::from(self.cycle - 1);
        let y = self.scanline as usize;
        self.framebuffer.put_pixel(x, y, color);
    }

    /// Advances to the next dot / scanline / frame.
    fn advance_cycle(&mut self) {
        self.cycle += 1;
        if self.cycle >= CYCLES_PER_SCANLINE {
            self.cycle = 0;
            self.scanline += 1;

            if self.scanline > LAST_SCANLINE {
                self.scanline = PRERENDER_SCANLINE;
                self.frame = self.frame.wrapping_add(1);
                self.frame_complete = true;
                self.odd_frame = !self.odd_frame;
            }
        }
    }
}
