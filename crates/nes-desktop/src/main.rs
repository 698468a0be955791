//! NES Desktop - Desktop NES emulator with minifb rendering
//!
//! One emulated frame per window refresh, with keyboard input mapped onto
//! controller 1.

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger::Env;
use log::{error, info, LevelFilter};
use minifb::{Key, Window, WindowOptions};
use nes_core::controller::Button;
use nes_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use nes_core::system::NesSystem;

/// Keyboard layout for controller 1
const KEY_MAP: [(Button, &[Key]); 8] = [
    (Button::A, &[Key::Z]),
    (Button::B, &[Key::X]),
    (Button::Select, &[Key::RightShift, Key::Backspace]),
    (Button::Start, &[Key::Enter]),
    (Button::Up, &[Key::Up]),
    (Button::Down, &[Key::Down]),
    (Button::Left, &[Key::Left]),
    (Button::Right, &[Key::Right]),
];

/// NES Emulator Desktop App
#[derive(Parser, Debug)]
#[command(name = "nes-desktop")]
#[command(about = "A NES emulator desktop app", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Screen scale factor
    #[arg(short, long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=4))]
    scale: u8,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
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

    let scale = usize::from(args.scale);
    let mut window = Window::new(
        "NES Emulator",
        SCREEN_WIDTH * scale,
        SCREEN_HEIGHT * scale,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )?;
    window.set_target_fps(60);

    let mut pixels = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];

    info!("press ESC or close the window to exit");
    while window.is_open() && !window.is_key_down(Key::Escape) {
        for (button, keys) in KEY_MAP {
            if keys.iter().any(|&key| window.is_key_down(key)) {
                system.press(button);
            } else {
                system.release(button);
            }
        }

        system.run_frame()?;
        if system.take_frame_ready() {
            convert_frame(system.frame(), &mut pixels);
        }
        window.update_with_buffer(&pixels, SCREEN_WIDTH, SCREEN_HEIGHT)?;
    }

    info!("emulator closed after {} frames", system.frame_count());
    Ok(())
}

/// Packed RGB bytes to minifb's 0RGB words
fn convert_frame(rgb: &[u8], pixels: &mut [u32]) {
    for (pixel, bytes) in pixels.iter_mut().zip(rgb.chunks_exact(3)) {
        *pixel = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_frame() {
        let rgb = [0x12, 0x34, 0x56, 0xFF, 0x00, 0x80];
        let mut pixels = [0u32; 2];
        convert_frame(&rgb, &mut pixels);
        assert_eq!(pixels, [0x0012_3456, 0x00FF_0080]);
    }

    #[test]
    fn test_every_button_mapped_once() {
        for button in Button::ALL {
            assert_eq!(KEY_MAP.iter().filter(|(b, _)| *b == button).count(), 1);
        }
    }

    #[test]
    fn test_log_filter_only_with_verbose() {
        assert_eq!(log_filter(0), None);
        assert_eq!(log_filter(1), Some(LevelFilter::Debug));
        assert_eq!(log_filter(2), Some(LevelFilter::Trace));
    }

    #[test]
    fn test_scale_range() {
        assert!(Args::try_parse_from(["nes-desktop", "-r", "a.nes", "-s", "5"]).is_err());
        let args = Args::parse_from(["nes-desktop", "-r", "a.nes"]);
        assert_eq!(args.scale, 2);
    }
}
