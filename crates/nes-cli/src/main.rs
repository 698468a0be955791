//! NES CLI - headless runner for the NES emulator
//!
//! Runs a ROM for a number of frames or instructions, optionally printing a
//! nestest-style trace, dumping CPU/PPU state and writing PNG captures.

use std::error::Error;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use env_logger::Env;
use log::{error, info, LevelFilter};
use nes_core::ppu::{self, SCREEN_HEIGHT, SCREEN_WIDTH};
use nes_core::system::NesSystem;

/// NES Emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "A headless NES emulator runner", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Run this many instructions instead of whole frames
    #[arg(short, long)]
    instructions: Option<u64>,

    /// Start execution here (hex) instead of at the reset vector
    #[arg(long, value_parser = parse_hex_address)]
    start_pc: Option<u16>,

    /// Print a trace line before every instruction
    #[arg(short, long)]
    trace: bool,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,

    /// Save the last frame as PNG
    #[arg(short, long)]
    screenshot: Option<PathBuf>,

    /// Save both pattern tables as a greyscale PNG
    #[arg(long)]
    pattern_png: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_hex_address(text: &str) -> Result<u16, String> {
    let digits = text.trim_start_matches('$').trim_start_matches("0x");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {text:?}: {e}"))
}

/// Level forced by `-v`; without it RUST_LOG decides, defaulting to info
fn log_filter(verbose: u8) -> Option<LevelFilter> {
    match verbose {
        0 => None,
        1 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(level) = log_filter(args.verbose) {
        logger.filter_level(level);
    }
    logger.init();

    if let Err(e) = run(&args) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let mut system = NesSystem::open(&args.rom)?;
    if let Some(pc) = args.start_pc {
        info!("starting at ${pc:04X}");
        system.cpu_mut().registers_mut().pc = pc;
    }

    // A failed run still gets its dumps, then reports the error
    let outcome = execute(&mut system, args);

    if args.dump_cpu {
        dump_cpu_state(&system);
    }
    if args.dump_ppu {
        dump_ppu_state(&system);
    }
    let captured = save_captures(&system, args);

    first_error(outcome, captured)
}

/// The emulation error wins; a capture failure behind it is only logged
fn first_error(
    outcome: Result<(), Box<dyn Error>>,
    captured: Result<(), Box<dyn Error>>,
) -> Result<(), Box<dyn Error>> {
    match (outcome, captured) {
        (Err(e), Err(capture)) => {
            error!("capture failed: {capture}");
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn save_captures(system: &NesSystem, args: &Args) -> Result<(), Box<dyn Error>> {
    if let Some(path) = &args.screenshot {
        save_screenshot(system, path)?;
        info!("saved screenshot to {}", path.display());
    }
    if let Some(path) = &args.pattern_png {
        save_pattern_tables(system, path)?;
        info!("saved pattern tables to {}", path.display());
    }
    Ok(())
}

fn execute(system: &mut NesSystem, args: &Args) -> Result<(), Box<dyn Error>> {
    match args.instructions {
        Some(count) => {
            for _ in 0..count {
                if args.trace {
                    println!("{}", system.trace_line());
                }
                system.step()?;
            }
            info!("ran {count} instructions, {} cycles", system.cpu().total_cycles());
        }
        None if args.trace => {
            let target = system.frame_count() + args.frames;
            while system.frame_count() < target {
                println!("{}", system.trace_line());
                system.step()?;
            }
            info!("completed {} frames", system.frame_count());
        }
        None => {
            system.run_frames(args.frames)?;
            info!("completed {} frames", system.frame_count());
        }
    }
    Ok(())
}

fn dump_cpu_state(system: &NesSystem) {
    let cpu = system.cpu();
    let regs = cpu.registers();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    ${:02X} ({})", cpu.p_register(), cpu.status());
    println!("  Cycles: {}", cpu.total_cycles());
}

fn dump_ppu_state(system: &NesSystem) {
    let ppu = system.ppu();

    println!("\nPPU State:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot: {}", ppu.dot());
    println!(
        "  Frame: {} ({})",
        ppu.frame_count(),
        if ppu.odd_frame() { "odd" } else { "even" }
    );
    println!(
        "  CTRL: ${:02X}  MASK: ${:02X}  STATUS: ${:02X}",
        ppu.ctrl().0,
        ppu.mask().0,
        ppu.status().0
    );
    println!(
        "  v: ${:04X}  t: ${:04X}  x: {}  w: {}",
        ppu.vram_address(),
        ppu.temp_address(),
        ppu.fine_x(),
        ppu.write_toggle() as u8
    );

    let base = ppu.ctrl().name_table();
    println!("\nName table ${base:04X}:");
    let table = system.vram().read_name_table(base);
    for row in table[..960].chunks(32) {
        let line: Vec<String> = row.iter().map(|b| format!("{b:02X}")).collect();
        println!("  {}", line.join(" "));
    }

    println!("\nPalette:");
    let entries: Vec<String> = (0..32)
        .map(|i| format!("{:02X}", system.vram().palette(i)))
        .collect();
    for row in entries.chunks(16) {
        println!("  {}", row.join(" "));
    }
}

fn write_png(
    path: &Path,
    width: u32,
    height: u32,
    colour: png::ColorType,
    data: &[u8],
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(colour);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(data)?;
    Ok(())
}

fn save_screenshot(system: &NesSystem, path: &Path) -> Result<(), Box<dyn Error>> {
    write_png(
        path,
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
        png::ColorType::Rgb,
        system.frame(),
    )
}

/// Tables $0000 and $1000 side by side, 256x128
fn save_pattern_tables(system: &NesSystem, path: &Path) -> Result<(), Box<dyn Error>> {
    let left = ppu::pattern_table_image(system.vram().read_pattern_table(0x0000)?);
    let right = ppu::pattern_table_image(system.vram().read_pattern_table(0x1000)?);

    let mut grey = Vec::with_capacity(256 * 128);
    for row in 0..128 {
        for half in [&left, &right] {
            grey.extend(half[row * 128..(row + 1) * 128].iter().map(|&v| v * 85));
        }
    }
    write_png(path, 256, 128, png::ColorType::Grayscale, &grey)
}
