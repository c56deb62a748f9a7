mod common;

use anyhow::{Result, bail};
use common::*;
use nespix_core::PatternBus;

const DOTS_PER_FRAME: u64 = 341 * 262;

#[test]
fn scanline_and_cycle_stay_in_range() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2001, 0x18, &mut PatternBus::from_cartridge(&mut cartridge));

    for _ in 0..DOTS_PER_FRAME * 2 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        assert!((-1..=260).contains(&ppu.scanline()), "scanline {}", ppu.scanline());
        assert!((0..=340).contains(&ppu.cycle()), "cycle {}", ppu.cycle());
    }
    Ok(())
}

#[test]
fn frame_complete_rises_once_per_frame() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);

    let mut completions = 0;
    for _ in 0..DOTS_PER_FRAME * 3 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        if ppu.frame_complete() {
            completions += 1;
            ppu.clear_frame_complete();
        }
    }
    assert_eq!(completions, 3);
    assert_eq!(ppu.frame_count(), 3);
    Ok(())
}

#[test]
fn nmi_arrives_a_fixed_delay_after_vblank() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2000, 0x80, &mut PatternBus::from_cartridge(&mut cartridge));

    clock_to(&mut ppu, &mut cartridge, 241, 2)?;
    assert!(!ppu.consume_nmi(), "NMI is not instantaneous");

    let mut dots_until_nmi = 0;
    for _ in 0..20 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        dots_until_nmi += 1;
        if ppu.consume_nmi() {
            break;
        }
    }
    assert_eq!(dots_until_nmi, 14, "propagation delay in PPU dots");
    assert!(!ppu.consume_nmi(), "the line is edge triggered");
    Ok(())
}

#[test]
fn status_read_on_the_vblank_dot_suppresses_flag_and_nmi() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2000, 0x80, &mut PatternBus::from_cartridge(&mut cartridge));

    clock_to(&mut ppu, &mut cartridge, 241, 1)?;
    let status = read_status(&mut ppu, &mut cartridge);
    assert_eq!(status & 0x80, 0, "the flag has not risen yet");

    // Neither the flag nor the interrupt materializes for this frame.
    while !(ppu.scanline() == 250 && ppu.cycle() == 0) {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        assert!(!ppu.consume_nmi(), "NMI suppressed by the racing read");
    }
    assert_eq!(
        read_status(&mut ppu, &mut cartridge) & 0x80,
        0,
        "vblank flag stayed down all frame"
    );
    while ppu.scanline() != -1 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        assert!(!ppu.consume_nmi());
    }

    // The following frame behaves normally again.
    clock_to(&mut ppu, &mut cartridge, 241, 2)?;
    let mut fired = false;
    for _ in 0..20 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        if ppu.consume_nmi() {
            fired = true;
            break;
        }
    }
    assert!(fired, "suppression does not leak into the next frame");
    Ok(())
}

#[test]
fn status_read_just_after_the_edge_cancels_only_the_nmi() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2000, 0x80, &mut PatternBus::from_cartridge(&mut cartridge));

    clock_to(&mut ppu, &mut cartridge, 241, 2)?;
    let status = read_status(&mut ppu, &mut cartridge);
    assert_eq!(status & 0x80, 0x80, "the flag was already up");

    while ppu.scanline() != -1 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        assert!(!ppu.consume_nmi(), "pending NMI was cancelled");
    }
    Ok(())
}

#[test]
fn enabling_nmi_mid_vblank_raises_a_fresh_edge() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);

    clock_to(&mut ppu, &mut cartridge, 245, 100)?;
    assert!(!ppu.consume_nmi());

    ppu.cpu_write(0x2000, 0x80, &mut PatternBus::from_cartridge(&mut cartridge));
    let mut fired = false;
    for _ in 0..20 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
        if ppu.consume_nmi() {
            fired = true;
            break;
        }
    }
    assert!(fired, "ctrl bit 7 write during vblank triggers an edge");
    assert!(!ppu.consume_nmi());
    Ok(())
}

#[test]
fn odd_frames_skip_one_prerender_dot_while_rendering() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2001, 0x08, &mut PatternBus::from_cartridge(&mut cartridge));

    let even = clock_one_frame(&mut ppu, &mut cartridge)?;
    let odd = clock_one_frame(&mut ppu, &mut cartridge)?;
    let next_even = clock_one_frame(&mut ppu, &mut cartridge)?;

    assert_eq!(even, DOTS_PER_FRAME);
    assert_eq!(odd, DOTS_PER_FRAME - 1, "one dot elided on odd frames");
    assert_eq!(next_even, DOTS_PER_FRAME);
    Ok(())
}

#[test]
fn disabled_rendering_never_skips_a_dot() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);

    for _ in 0..3 {
        assert_eq!(clock_one_frame(&mut ppu, &mut cartridge)?, DOTS_PER_FRAME);
    }
    Ok(())
}

#[test]
fn mmc3_counts_scanlines_through_the_ppu_notification() -> Result<()> {
    let image = ines_image(2, 0, 0x40, 0); // mapper 4
    let mut cartridge = nespix_core::Cartridge::new(&image)?;

    // Latch 10 scanlines, request a reload, enable the IRQ.
    cartridge.cpu_write(0xC000, 10);
    cartridge.cpu_write(0xC001, 0);
    cartridge.cpu_write(0xE001, 0);

    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2001, 0x18, &mut PatternBus::from_cartridge(&mut cartridge));

    clock_to(&mut ppu, &mut cartridge, 10, 260)?;
    assert!(!cartridge.irq_pending(), "counter still draining");

    ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
    assert!(cartridge.irq_pending(), "IRQ on the eleventh notification");

    cartridge.clear_irq();
    assert!(!cartridge.irq_pending());
    Ok(())
}

#[test]
fn nmi_edge_survives_until_consumed() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    ppu.cpu_write(0x2000, 0x80, &mut PatternBus::from_cartridge(&mut cartridge));

    clock_to(&mut ppu, &mut cartridge, 242, 0)?;
    for _ in 0..50 {
        ppu.clock(&mut PatternBus::from_cartridge(&mut cartridge));
    }
    assert!(ppu.consume_nmi(), "late poll still observes the one-shot");
    assert!(!ppu.consume_nmi());
    Ok(())
}

#[test]
fn clock_to_helper_rejects_unreachable_positions() -> Result<()> {
    let mut cartridge = chr_ram_cartridge(0)?;
    let mut ppu = fresh_ppu(&mut cartridge);
    if clock_to(&mut ppu, &mut cartridge, 261, 0).is_ok() {
        bail!("scanline 261 must never be observable");
    }
    Ok(())
}
