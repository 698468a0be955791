//! PPU (2C02) implementation
//!
//! Dot-based: one `tick()` is one PPU clock. A frame is 262 scanlines of 341
//! dots.
//! - 0-239: visible scanlines (pixels at dots 1-256)
//! - 240: post-render (idle)
//! - 241-260: vblank, flag and NMI raised at 241/1
//! - 261: pre-render, primes the pipeline for scanline 0
//!
//! All memory access goes through [`PpuBus`]; the NMI output goes to the
//! driver-owned [`InterruptLine`].

use log::warn;

use crate::bus::InterruptLine;
use crate::error::Result;
use crate::palette;
use crate::ppu_bus::PpuBus;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;
pub const DOTS_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
pub const VBLANK_SCANLINE: u16 = 241;
pub const PRE_RENDER_SCANLINE: u16 = 261;

/// Object Attribute Memory: 64 sprites of 4 bytes
pub const OAM_SIZE: usize = 256;

/// Sprites the PPU can draw on one scanline
pub const MAX_SPRITES_PER_LINE: usize = 8;

/// RGB bytes in one frame
pub const FRAME_BYTES: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 3;

/// $2000 PPUCTRL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuCtrl(pub u8);

impl PpuCtrl {
    pub const NMI_ENABLE: u8 = 0b1000_0000;
    pub const SPRITE_SIZE: u8 = 0b0010_0000;
    pub const BG_PATTERN_TABLE: u8 = 0b0001_0000;
    pub const SPR_PATTERN_TABLE: u8 = 0b0000_1000;
    pub const VRAM_INC: u8 = 0b0000_0100;
    pub const NAMETABLE: u8 = 0b0000_0011;

    pub fn nmi_enabled(self) -> bool {
        self.0 & Self::NMI_ENABLE != 0
    }

    /// 8 or 16
    pub fn sprite_height(self) -> u16 {
        if self.0 & Self::SPRITE_SIZE != 0 {
            16
        } else {
            8
        }
    }

    pub fn background_table(self) -> u16 {
        if self.0 & Self::BG_PATTERN_TABLE != 0 {
            0x1000
        } else {
            0
        }
    }

    /// Pattern table for 8x8 sprites
    pub fn sprite_table(self) -> u16 {
        if self.0 & Self::SPR_PATTERN_TABLE != 0 {
            0x1000
        } else {
            0
        }
    }

    pub fn vram_increment(self) -> u16 {
        if self.0 & Self::VRAM_INC != 0 {
            32
        } else {
            1
        }
    }

    pub fn name_table(self) -> u16 {
        0x2000 + u16::from(self.0 & Self::NAMETABLE) * 0x400
    }
}

/// $2001 PPUMASK
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuMask(pub u8);

impl PpuMask {
    pub const GREYSCALE: u8 = 0b0000_0001;
    pub const SHOW_BG_LEFT: u8 = 0b0000_0010;
    pub const SHOW_SPR_LEFT: u8 = 0b0000_0100;
    pub const SHOW_BG: u8 = 0b0000_1000;
    pub const SHOW_SPR: u8 = 0b0001_0000;

    pub fn greyscale(self) -> bool {
        self.0 & Self::GREYSCALE != 0
    }

    pub fn show_background(self) -> bool {
        self.0 & Self::SHOW_BG != 0
    }

    pub fn show_sprites(self) -> bool {
        self.0 & Self::SHOW_SPR != 0
    }

    pub fn show_background_left(self) -> bool {
        self.0 & Self::SHOW_BG_LEFT != 0
    }

    pub fn show_sprites_left(self) -> bool {
        self.0 & Self::SHOW_SPR_LEFT != 0
    }

    pub fn rendering_enabled(self) -> bool {
        self.0 & (Self::SHOW_BG | Self::SHOW_SPR) != 0
    }
}

/// $2002 PPUSTATUS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuStatus(pub u8);

impl PpuStatus {
    pub const VBLANK: u8 = 0b1000_0000;
    pub const SPRITE_ZERO_HIT: u8 = 0b0100_0000;
    pub const SPRITE_OVERFLOW: u8 = 0b0010_0000;

    pub fn vblank(self) -> bool {
        self.0 & Self::VBLANK != 0
    }

    pub fn sprite_zero_hit(self) -> bool {
        self.0 & Self::SPRITE_ZERO_HIT != 0
    }

    pub fn sprite_overflow(self) -> bool {
        self.0 & Self::SPRITE_OVERFLOW != 0
    }

    fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }
}

/// Which layer supplies a composed pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Backdrop,
    Background,
    Sprite,
}

/// Result of combining the background and sprite pixel at one dot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composite {
    pub layer: Layer,
    pub sprite_zero_hit: bool,
}

/// Background/sprite priority.
///
/// | bg opaque | sprite opaque | behind bg | output     |
/// |-----------|---------------|-----------|------------|
/// | no        | no            | any       | backdrop   |
/// | no        | yes           | any       | sprite     |
/// | yes       | no            | any       | background |
/// | yes       | yes           | no        | sprite     |
/// | yes       | yes           | yes       | background |
///
/// A hit is reported whenever sprite 0 and the background are both opaque,
/// regardless of which one is shown. Position and clipping exceptions are
/// the caller's job.
pub fn compose(
    bg_opaque: bool,
    sprite_opaque: bool,
    behind_background: bool,
    sprite_zero: bool,
) -> Composite {
    let layer = match (bg_opaque, sprite_opaque, behind_background) {
        (false, false, _) => Layer::Backdrop,
        (false, true, _) => Layer::Sprite,
        (true, false, _) => Layer::Background,
        (true, true, false) => Layer::Sprite,
        (true, true, true) => Layer::Background,
    };
    Composite {
        layer,
        sprite_zero_hit: bg_opaque && sprite_opaque && sprite_zero,
    }
}

/// A sprite selected for the next scanline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteEntry {
    pub y: u8,
    pub tile: u8,
    pub attributes: u8,
    pub x: u8,
    pub sprite_zero: bool,
    /// Row of the sprite on the evaluated line, before flipping
    pub row: u8,
    /// Sprite height in force at evaluation, 8 or 16
    pub height: u8,
}

/// A sprite with its pattern row fetched, ready to draw
#[derive(Debug, Clone, Copy, Default)]
struct SpriteSlot {
    x: u8,
    pattern_lo: u8,
    pattern_hi: u8,
    attributes: u8,
    sprite_zero: bool,
}

#[derive(Debug, Clone, Copy)]
struct SpritePixel {
    pixel: u8,
    palette: u8,
    behind_background: bool,
    sprite_zero: bool,
}

/// Background lookahead: the current tile in the high byte of the pattern
/// shifters, the next one in the low byte, and the fetch latches behind them.
#[derive(Debug, Clone, Copy, Default)]
struct ShiftPipeline {
    pattern_lo: u16,
    pattern_hi: u16,
    attribute_lo: u8,
    attribute_hi: u8,
    attribute_latch_lo: bool,
    attribute_latch_hi: bool,
    next_tile: u8,
    next_attribute: u8,
    next_lo: u8,
    next_hi: u8,
}

impl ShiftPipeline {
    fn reload(&mut self) {
        self.pattern_lo = (self.pattern_lo & 0xFF00) | u16::from(self.next_lo);
        self.pattern_hi = (self.pattern_hi & 0xFF00) | u16::from(self.next_hi);
        self.attribute_latch_lo = self.next_attribute & 0x01 != 0;
        self.attribute_latch_hi = self.next_attribute & 0x02 != 0;
    }

    fn shift(&mut self) {
        self.pattern_lo <<= 1;
        self.pattern_hi <<= 1;
        self.attribute_lo = (self.attribute_lo << 1) | u8::from(self.attribute_latch_lo);
        self.attribute_hi = (self.attribute_hi << 1) | u8::from(self.attribute_latch_hi);
    }

    /// (pixel, palette) under the fine-X tap
    fn output(&self, fine_x: u8) -> (u8, u8) {
        let pattern_bit = 15 - u16::from(fine_x);
        let attribute_bit = 7 - fine_x;
        let pixel = (((self.pattern_hi >> pattern_bit) & 1) << 1 | ((self.pattern_lo >> pattern_bit) & 1)) as u8;
        let palette = ((self.attribute_hi >> attribute_bit) & 1) << 1 | ((self.attribute_lo >> attribute_bit) & 1);
        (pixel, palette)
    }
}

/// PPU state
#[derive(Debug, Clone)]
pub struct Ppu {
    ctrl: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    oam_addr: u8,
    oam: [u8; OAM_SIZE],

    /// Current VRAM address (15 bits)
    v: u16,
    /// Temporary VRAM address (15 bits)
    t: u16,
    fine_x: u8,
    /// First/second write toggle shared by $2005 and $2006
    w: bool,

    /// $2007 read buffer
    read_buffer: u8,
    /// Last value written to any register
    open_bus: u8,

    scanline: u16,
    dot: u16,
    odd_frame: bool,
    frame_count: u64,

    background: ShiftPipeline,
    secondary_oam: [SpriteEntry; MAX_SPRITES_PER_LINE],
    secondary_count: usize,
    sprites: [SpriteSlot; MAX_SPRITES_PER_LINE],
    sprite_count: usize,

    /// Frame being drawn
    back_buffer: Vec<u8>,
    /// Last completed frame
    front_buffer: Vec<u8>,
    frame_ready: bool,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            ctrl: PpuCtrl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            oam_addr: 0,
            oam: [0; OAM_SIZE],
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            open_bus: 0,
            scanline: 0,
            dot: 0,
            odd_frame: false,
            frame_count: 0,
            background: ShiftPipeline::default(),
            secondary_oam: [SpriteEntry::default(); MAX_SPRITES_PER_LINE],
            secondary_count: 0,
            sprites: [SpriteSlot::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            back_buffer: vec![0; FRAME_BYTES],
            front_buffer: vec![0; FRAME_BYTES],
            frame_ready: false,
        }
    }

    /// Back to the power-on position. OAM and the frame buffers survive.
    pub fn reset(&mut self) {
        self.ctrl = PpuCtrl::default();
        self.mask = PpuMask::default();
        self.status = PpuStatus::default();
        self.oam_addr = 0;
        self.v = 0;
        self.t = 0;
        self.fine_x = 0;
        self.w = false;
        self.read_buffer = 0;
        self.open_bus = 0;
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.background = ShiftPipeline::default();
        self.secondary_count = 0;
        self.sprite_count = 0;
        self.frame_ready = false;
    }

    /// Advance one PPU clock
    pub fn tick(&mut self, vram: &PpuBus, line: &mut InterruptLine) -> Result<()> {
        match self.scanline {
            0..=239 => self.visible_dot(vram)?,
            VBLANK_SCANLINE if self.dot == 1 => {
                self.status.set(PpuStatus::VBLANK);
                if self.ctrl.nmi_enabled() {
                    line.raise_nmi();
                }
            }
            PRE_RENDER_SCANLINE => self.pre_render_dot(vram)?,
            _ => {}
        }
        self.advance();
        Ok(())
    }

    fn visible_dot(&mut self, vram: &PpuBus) -> Result<()> {
        // Cleared with rendering off too: stale entries must not reach the fetch
        if self.dot == 1 {
            self.clear_secondary_oam();
        }
        if self.dot == 65 && self.mask.rendering_enabled() {
            self.evaluate_sprites();
        }
        if (1..=256).contains(&self.dot) {
            self.render_pixel(vram);
        }
        self.pipeline_dot(vram)
    }

    fn pre_render_dot(&mut self, vram: &PpuBus) -> Result<()> {
        if self.dot == 1 {
            self.status
                .clear(PpuStatus::VBLANK | PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW);
            self.clear_secondary_oam();
        }
        self.pipeline_dot(vram)?;
        if self.mask.rendering_enabled() && (280..=304).contains(&self.dot) {
            self.copy_vertical();
        }
        Ok(())
    }

    /// Fetches, shifts and scroll updates shared by visible and pre-render lines
    fn pipeline_dot(&mut self, vram: &PpuBus) -> Result<()> {
        if !self.mask.rendering_enabled() {
            return Ok(());
        }
        if matches!(self.dot, 1..=256 | 321..=336) {
            self.fetch_background(vram)?;
            self.background.shift();
        }
        match self.dot {
            256 => self.increment_y(),
            257 => {
                self.copy_horizontal();
                self.fetch_sprites(vram)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn advance(&mut self) {
        let skip_last_dot = self.scanline == PRE_RENDER_SCANLINE
            && self.dot == 339
            && self.odd_frame
            && self.mask.rendering_enabled();

        self.dot += 1;
        if self.dot == DOTS_PER_SCANLINE || skip_last_dot {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline == SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
                self.complete_frame();
            }
        }
    }

    fn complete_frame(&mut self) {
        std::mem::swap(&mut self.front_buffer, &mut self.back_buffer);
        self.frame_ready = true;
        self.frame_count += 1;
    }

    // === Background ===

    fn fetch_background(&mut self, vram: &PpuBus) -> Result<()> {
        let phase = if self.dot >= 321 { self.dot - 321 } else { self.dot - 1 } & 0x07;
        match phase {
            0 => {
                if self.dot != 321 {
                    self.background.reload();
                }
                self.background.next_tile = vram.read(0x2000 | (self.v & 0x0FFF))?;
            }
            2 => {
                let address =
                    0x23C0 | (self.v & 0x0C00) | ((self.v >> 4) & 0x38) | ((self.v >> 2) & 0x07);
                let shift = ((self.v >> 4) & 0x04) | (self.v & 0x02);
                self.background.next_attribute = (vram.read(address)? >> shift) & 0x03;
            }
            4 => self.background.next_lo = vram.read(self.background_pattern_address())?,
            6 => self.background.next_hi = vram.read(self.background_pattern_address() + 8)?,
            7 => self.increment_x(),
            _ => {}
        }
        Ok(())
    }

    fn background_pattern_address(&self) -> u16 {
        let fine_y = (self.v >> 12) & 0x07;
        self.ctrl.background_table() + u16::from(self.background.next_tile) * 16 + fine_y
    }

    fn background_pixel(&self, x: usize) -> (u8, u8) {
        if !self.mask.show_background() || (x < 8 && !self.mask.show_background_left()) {
            return (0, 0);
        }
        self.background.output(self.fine_x)
    }

    // === Sprites ===

    fn clear_secondary_oam(&mut self) {
        self.secondary_oam = [SpriteEntry::default(); MAX_SPRITES_PER_LINE];
        self.secondary_count = 0;
    }

    /// Select up to eight sprites whose rows cover the current scanline
    fn evaluate_sprites(&mut self) {
        let height = self.ctrl.sprite_height();
        for (n, sprite) in self.oam.chunks_exact(4).enumerate() {
            let y = u16::from(sprite[0]);
            if self.scanline < y || self.scanline - y >= height {
                continue;
            }
            if self.secondary_count == MAX_SPRITES_PER_LINE {
                self.status.set(PpuStatus::SPRITE_OVERFLOW);
                break;
            }
            self.secondary_oam[self.secondary_count] = SpriteEntry {
                y: sprite[0],
                tile: sprite[1],
                attributes: sprite[2],
                x: sprite[3],
                sprite_zero: n == 0,
                row: (self.scanline - y) as u8,
                height: height as u8,
            };
            self.secondary_count += 1;
        }
    }

    /// Fetch pattern rows for the selected sprites, drawn on the next line
    fn fetch_sprites(&mut self, vram: &PpuBus) -> Result<()> {
        for i in 0..self.secondary_count {
            let entry = self.secondary_oam[i];
            let height: u16 = if entry.height == 16 { 16 } else { 8 };
            let mut row = u16::from(entry.row) & (height - 1);
            if entry.attributes & 0x80 != 0 {
                row = height - 1 - row;
            }

            let (table, tile) = if height == 16 {
                let table = u16::from(entry.tile & 0x01) * 0x1000;
                let top = entry.tile & 0xFE;
                if row >= 8 {
                    row -= 8;
                    (table, top.wrapping_add(1))
                } else {
                    (table, top)
                }
            } else {
                (self.ctrl.sprite_table(), entry.tile)
            };

            let address = table + u16::from(tile) * 16 + row;
            let mut lo = vram.read(address)?;
            let mut hi = vram.read(address + 8)?;
            if entry.attributes & 0x40 != 0 {
                lo = lo.reverse_bits();
                hi = hi.reverse_bits();
            }

            self.sprites[i] = SpriteSlot {
                x: entry.x,
                pattern_lo: lo,
                pattern_hi: hi,
                attributes: entry.attributes,
                sprite_zero: entry.sprite_zero,
            };
        }
        self.sprite_count = self.secondary_count;
        Ok(())
    }

    fn sprite_pixel(&self, x: usize) -> Option<SpritePixel> {
        if !self.mask.show_sprites() || (x < 8 && !self.mask.show_sprites_left()) {
            return None;
        }
        self.sprites[..self.sprite_count].iter().find_map(|slot| {
            let offset = x.checked_sub(usize::from(slot.x)).filter(|&o| o < 8)?;
            let shift = 7 - offset;
            let pixel = ((slot.pattern_hi >> shift) & 1) << 1 | ((slot.pattern_lo >> shift) & 1);
            (pixel != 0).then_some(SpritePixel {
                pixel,
                palette: slot.attributes & 0x03,
                behind_background: slot.attributes & 0x20 != 0,
                sprite_zero: slot.sprite_zero,
            })
        })
    }

    // === Output ===

    fn render_pixel(&mut self, vram: &PpuBus) {
        let x = usize::from(self.dot - 1);
        let y = usize::from(self.scanline);

        let (bg_pixel, bg_palette) = self.background_pixel(x);
        let sprite = self.sprite_pixel(x);
        let composite = compose(
            bg_pixel != 0,
            sprite.is_some(),
            sprite.map_or(false, |s| s.behind_background),
            sprite.map_or(false, |s| s.sprite_zero),
        );
        if composite.sprite_zero_hit && x != 255 {
            self.status.set(PpuStatus::SPRITE_ZERO_HIT);
        }

        let entry = match (composite.layer, sprite) {
            (Layer::Sprite, Some(s)) => 0x10 | usize::from(s.palette << 2 | s.pixel),
            (Layer::Background, _) => usize::from(bg_palette << 2 | bg_pixel),
            _ => 0,
        };
        let mut colour = vram.palette(entry);
        if self.mask.greyscale() {
            colour &= 0x30;
        }
        let (r, g, b) = palette::rgb(colour);
        let offset = (y * SCREEN_WIDTH + x) * 3;
        self.back_buffer[offset..offset + 3].copy_from_slice(&[r, g, b]);
    }

    // === Scrolling ===

    fn increment_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }
        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn copy_horizontal(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    fn copy_vertical(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    fn increment_vram_address(&mut self) {
        self.v = self.v.wrapping_add(self.ctrl.vram_increment()) & 0x7FFF;
    }

    // === CPU-facing registers ===

    /// CPU read of $2000-$2007; `address` is already reduced to `& 0x2007`
    pub fn read_register(&mut self, address: u16, vram: &PpuBus) -> Result<u8> {
        let value = match address & 0x07 {
            2 => {
                let value = (self.status.0 & 0xE0) | (self.open_bus & 0x1F);
                self.status.clear(PpuStatus::VBLANK);
                self.w = false;
                value
            }
            4 => self.oam[usize::from(self.oam_addr)],
            7 => {
                let address = self.v & 0x3FFF;
                let value = if address >= 0x3F00 {
                    self.read_buffer = vram.read(address - 0x1000)?;
                    vram.read(address)?
                } else {
                    let buffered = self.read_buffer;
                    self.read_buffer = vram.read(address)?;
                    buffered
                };
                self.increment_vram_address();
                value
            }
            _ => {
                warn!("read of write-only PPU register ${:04X}", address);
                self.open_bus
            }
        };
        Ok(value)
    }

    /// CPU write of $2000-$2007; `address` is already reduced to `& 0x2007`
    pub fn write_register(
        &mut self,
        address: u16,
        value: u8,
        vram: &mut PpuBus,
        line: &mut InterruptLine,
    ) -> Result<()> {
        self.open_bus = value;
        match address & 0x07 {
            0 => {
                let was_enabled = self.ctrl.nmi_enabled();
                self.ctrl = PpuCtrl(value);
                self.t = (self.t & 0xF3FF) | (u16::from(value & 0x03) << 10);
                if !was_enabled && self.ctrl.nmi_enabled() && self.status.vblank() {
                    line.raise_nmi();
                }
            }
            1 => self.mask = PpuMask(value),
            2 => {}
            3 => self.oam_addr = value,
            4 => {
                self.oam[usize::from(self.oam_addr)] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.w {
                    self.t = (self.t & !0x001F) | u16::from(value >> 3);
                    self.fine_x = value & 0x07;
                } else {
                    self.t = (self.t & !0x73E0)
                        | (u16::from(value & 0x07) << 12)
                        | (u16::from(value & 0xF8) << 2);
                }
                self.w = !self.w;
            }
            6 => {
                if !self.w {
                    self.t = (self.t & 0x00FF) | (u16::from(value & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | u16::from(value);
                    self.v = self.t;
                }
                self.w = !self.w;
            }
            _ => {
                vram.write(self.v & 0x3FFF, value)?;
                self.increment_vram_address();
            }
        }
        Ok(())
    }

    /// OAM DMA: 256 bytes written from the current OAM address onward
    pub fn write_oam_dma(&mut self, page: &[u8; OAM_SIZE]) {
        for (i, &byte) in page.iter().enumerate() {
            let index = usize::from(self.oam_addr).wrapping_add(i) & 0xFF;
            self.oam[index] = byte;
        }
    }

    // === Accessors ===

    pub fn ctrl(&self) -> PpuCtrl {
        self.ctrl
    }

    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    pub fn status(&self) -> PpuStatus {
        self.status
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn odd_frame(&self) -> bool {
        self.odd_frame
    }

    pub fn vram_address(&self) -> u16 {
        self.v
    }

    pub fn temp_address(&self) -> u16 {
        self.t
    }

    pub fn fine_x(&self) -> u8 {
        self.fine_x
    }

    pub fn write_toggle(&self) -> bool {
        self.w
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    /// Sprites selected by the most recent evaluation
    pub fn secondary_oam(&self) -> &[SpriteEntry] {
        &self.secondary_oam[..self.secondary_count]
    }

    /// Last completed frame, 256x240 RGB triples
    pub fn frame(&self) -> &[u8] {
        &self.front_buffer
    }

    /// True once per completed frame
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a 4KB pattern table into a 128x128 image of 2-bit pixel values,
/// 16x16 tiles in table order.
pub fn pattern_table_image(table: &[u8]) -> Vec<u8> {
    let mut pixels = vec![0; 128 * 128];
    for (tile, bytes) in table.chunks_exact(16).take(256).enumerate() {
        let (tile_x, tile_y) = (tile % 16 * 8, tile / 16 * 8);
        for row in 0..8 {
            let (lo, hi) = (bytes[row], bytes[row + 8]);
            for col in 0..8 {
                let shift = 7 - col;
                let value = ((hi >> shift) & 1) << 1 | ((lo >> shift) & 1);
                pixels[(tile_y + row) * 128 + tile_x + col] = value;
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;
    use std::rc::Rc;

    fn vram() -> PpuBus {
        vram_with_chr(&[])
    }

    /// All-ones pattern memory with `bytes` patched in at their addresses
    fn vram_with_chr(bytes: &[(usize, u8)]) -> PpuBus {
        let mut chr = vec![0xFF; 8 * 1024];
        for &(address, value) in bytes {
            chr[address] = value;
        }
        let mut rom = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
        rom.resize(16, 0);
        rom.extend(std::iter::repeat(0).take(16 * 1024));
        rom.extend(chr);
        PpuBus::new(Rc::new(Cartridge::from_bytes(&rom).unwrap()))
    }

    /// Low pattern byte fetched for one selected sprite
    fn fetch_low(ppu: &mut Ppu, vram: &PpuBus, entry: SpriteEntry) -> u8 {
        ppu.secondary_oam[0] = entry;
        ppu.secondary_count = 1;
        ppu.fetch_sprites(vram).unwrap();
        ppu.sprites[0].pattern_lo
    }

    fn entry(tile: u8, attributes: u8, row: u8, height: u8) -> SpriteEntry {
        SpriteEntry {
            tile,
            attributes,
            row,
            height,
            ..SpriteEntry::default()
        }
    }

    #[test]
    fn test_priority_table() {
        use Layer::*;
        let cases = [
            // bg, sprite, behind, zero => layer, hit
            (false, false, false, false, Backdrop, false),
            (false, false, false, true, Backdrop, false),
            (false, false, true, false, Backdrop, false),
            (false, false, true, true, Backdrop, false),
            (false, true, false, false, Sprite, false),
            (false, true, false, true, Sprite, false),
            (false, true, true, false, Sprite, false),
            (false, true, true, true, Sprite, false),
            (true, false, false, false, Background, false),
            (true, false, false, true, Background, false),
            (true, false, true, false, Background, false),
            (true, false, true, true, Background, false),
            (true, true, false, false, Sprite, false),
            (true, true, false, true, Sprite, true),
            (true, true, true, false, Background, false),
            (true, true, true, true, Background, true),
        ];
        for (bg, sprite, behind, zero, layer, hit) in cases {
            let composite = compose(bg, sprite, behind, zero);
            assert_eq!(composite.layer, layer, "{bg} {sprite} {behind} {zero}");
            assert_eq!(composite.sprite_zero_hit, hit, "{bg} {sprite} {behind} {zero}");
        }
    }

    #[test]
    fn test_ctrl_bits() {
        let ctrl = PpuCtrl(0b1011_0110);
        assert!(ctrl.nmi_enabled());
        assert_eq!(ctrl.sprite_height(), 16);
        assert_eq!(ctrl.background_table(), 0x1000);
        assert_eq!(ctrl.sprite_table(), 0x0000);
        assert_eq!(ctrl.vram_increment(), 32);
        assert_eq!(ctrl.name_table(), 0x2800);
        assert_eq!(PpuCtrl(0x08).sprite_table(), 0x1000);
        assert_eq!(PpuCtrl(0x08).background_table(), 0x0000);
    }

    #[test]
    fn test_scroll_writes_fill_temp_address() {
        let mut ppu = Ppu::new();
        let mut vram = vram();
        let mut line = InterruptLine::default();
        ppu.write_register(0x2000, 0x03, &mut vram, &mut line).unwrap();
        ppu.write_register(0x2005, 0x7D, &mut vram, &mut line).unwrap();
        assert_eq!(ppu.fine_x(), 0x05);
        assert_eq!(ppu.temp_address() & 0x001F, 0x0F);
        ppu.write_register(0x2005, 0x5E, &mut vram, &mut line).unwrap();
        // fine Y 6, coarse Y 11, name table 3
        assert_eq!(ppu.temp_address(), 0x6000 | 0x0C00 | (11 << 5) | 0x0F);
        assert!(!ppu.write_toggle());
    }

    #[test]
    fn test_address_writes_copy_to_v() {
        let mut ppu = Ppu::new();
        let mut vram = vram();
        let mut line = InterruptLine::default();
        ppu.write_register(0x2006, 0xFF, &mut vram, &mut line).unwrap();
        assert!(ppu.write_toggle());
        assert_eq!(ppu.vram_address(), 0);
        ppu.write_register(0x2006, 0x21, &mut vram, &mut line).unwrap();
        assert_eq!(ppu.vram_address(), 0x3F21);
    }

    #[test]
    fn test_increment_y_wraps_name_table() {
        let mut ppu = Ppu::new();
        ppu.v = 0x7000 | (29 << 5);
        ppu.increment_y();
        assert_eq!(ppu.v, 0x0800);

        ppu.v = 0x7000 | (31 << 5);
        ppu.increment_y();
        assert_eq!(ppu.v, 0x0000);
    }

    #[test]
    fn test_increment_x_wraps_name_table() {
        let mut ppu = Ppu::new();
        ppu.v = 31;
        ppu.increment_x();
        assert_eq!(ppu.v, 0x0400);
    }

    #[test]
    fn test_sprite_evaluation_caps_at_eight() {
        let mut ppu = Ppu::new();
        ppu.scanline = 40;
        for n in 0..10 {
            ppu.oam[n * 4] = 35;
            ppu.oam[n * 4 + 3] = n as u8;
        }
        ppu.evaluate_sprites();
        assert_eq!(ppu.secondary_oam().len(), 8);
        assert!(ppu.status().sprite_overflow());
        assert!(ppu.secondary_oam()[0].sprite_zero);
        assert!(!ppu.secondary_oam()[1].sprite_zero);
        assert_eq!(ppu.secondary_oam()[7].x, 7);
    }

    #[test]
    fn test_sprite_evaluation_respects_height() {
        let mut ppu = Ppu::new();
        ppu.scanline = 20;
        ppu.oam[0] = 12; // rows 12..20, misses line 20 at 8px
        ppu.oam[4] = 13;
        ppu.evaluate_sprites();
        assert_eq!(ppu.secondary_oam().len(), 1);
        assert_eq!(ppu.secondary_oam()[0].y, 13);

        ppu.ctrl = PpuCtrl(PpuCtrl::SPRITE_SIZE);
        ppu.clear_secondary_oam();
        ppu.evaluate_sprites();
        assert_eq!(ppu.secondary_oam().len(), 2);
        assert!(!ppu.status().sprite_overflow());
    }

    #[test]
    fn test_horizontal_flip_on_fetch() {
        let mut ppu = Ppu::new();
        let vram = vram();
        ppu.scanline = 10;
        ppu.secondary_oam[0] = SpriteEntry {
            y: 10,
            tile: 0,
            attributes: 0x40,
            x: 0,
            sprite_zero: false,
            row: 0,
            height: 8,
        };
        ppu.secondary_count = 1;
        ppu.fetch_sprites(&vram).unwrap();
        assert_eq!(ppu.sprite_count, 1);
        assert_eq!(ppu.sprites[0].pattern_lo, 0xFF);
    }

    #[test]
    fn test_evaluation_records_row_and_height() {
        let mut ppu = Ppu::new();
        ppu.scanline = 30;
        ppu.ctrl = PpuCtrl(PpuCtrl::SPRITE_SIZE);
        ppu.oam[0] = 20;
        ppu.evaluate_sprites();
        assert_eq!(ppu.secondary_oam()[0].row, 10);
        assert_eq!(ppu.secondary_oam()[0].height, 16);

        // Switching to 8x8 afterwards leaves the recorded height alone
        ppu.ctrl = PpuCtrl(0);
        assert_eq!(ppu.secondary_oam()[0].height, 16);
    }

    #[test]
    fn test_vertical_flip_on_fetch() {
        let mut ppu = Ppu::new();
        // tile 2, rows 1 and 6
        let vram = vram_with_chr(&[(0x21, 0x11), (0x26, 0x66)]);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x00, 1, 8)), 0x11);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x80, 1, 8)), 0x66);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x80, 6, 8)), 0x11);
    }

    #[test]
    fn test_tall_sprite_halves_and_tables() {
        let mut ppu = Ppu::new();
        // PPUCTRL's sprite table is ignored at 8x16
        ppu.ctrl = PpuCtrl(PpuCtrl::SPRITE_SIZE | 0x08);
        let vram = vram_with_chr(&[
            (0x0043, 0x01), // table 0, tile 4 row 3
            (0x0053, 0x02), // table 0, tile 5 row 3
            (0x0057, 0x03), // table 0, tile 5 row 7
            (0x1043, 0x04), // table 1, tile 4 row 3
            (0x1053, 0x05), // table 1, tile 5 row 3
            (0x1040, 0x06), // table 1, tile 4 row 0
        ]);
        // even tile: table $0000, top is the tile, bottom is tile | 1
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x04, 0x00, 3, 16)), 0x01);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x04, 0x00, 11, 16)), 0x02);
        // odd tile: table $1000, top is tile & !1
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x05, 0x00, 3, 16)), 0x04);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x05, 0x00, 11, 16)), 0x05);
        // flipped: row 0 reads the bottom tile's last row and vice versa
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x04, 0x80, 0, 16)), 0x03);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(0x05, 0x80, 15, 16)), 0x06);
    }

    #[test]
    fn test_fetch_masks_out_of_range_row() {
        let mut ppu = Ppu::new();
        let vram = vram_with_chr(&[(0x26, 0x5A)]);
        // Row 14 left over from an 8x16 evaluation, fetched as 8x8
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x00, 14, 8)), 0x5A);
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x80, 0xFF, 8)), 0xFF);
        // A zeroed entry still fetches as 8x8
        assert_eq!(fetch_low(&mut ppu, &vram, entry(2, 0x80, 1, 0)), 0x5A);
    }

    #[test]
    fn test_pattern_table_image() {
        let mut table = vec![0u8; 4096];
        table[0] = 0b1000_0001; // tile 0 row 0 low plane
        table[8] = 0b1000_0000; // tile 0 row 0 high plane
        table[16 + 8 + 1] = 0b0000_0001; // tile 1 row 1 high plane
        let pixels = pattern_table_image(&table);
        assert_eq!(pixels.len(), 128 * 128);
        assert_eq!(pixels[0], 3);
        assert_eq!(pixels[7], 1);
        assert_eq!(pixels[128 + 15], 2);
    }
}
