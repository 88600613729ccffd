mod gb;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::gb::{DISPLAY_REFRESH_RATE, GameBoy};

/// Headless DMG core runner: loads a ROM and drives the emulator frame by
/// frame. Presentation and input are the host's job (spec.md §1); this
/// binary only exists to smoke-test the core and print its stats.
#[derive(Parser, Debug)]
#[command(author, version, about = "Game Boy (DMG) core runner")]
struct Args {
    /// Path of the ROM to load.
    rom: PathBuf,

    /// Run exactly this many frames, then exit, instead of running forever.
    #[arg(long, value_name = "N")]
    frames: Option<u32>,

    /// Run as fast as possible instead of pacing to the real LCD refresh rate.
    #[arg(long)]
    no_fps_limit: bool,

    /// Print stats every this-many frames instead of every frame.
    #[arg(long, default_value_t = 60)]
    stats_every: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    println!("Loading cartridge {}...", args.rom.display());
    let bytes = fs::read(&args.rom)?;

    let mut gb = GameBoy::new();
    gb.load_rom(&bytes)?;

    let frame_budget = if args.no_fps_limit {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / f64::from(DISPLAY_REFRESH_RATE))
    };

    let mut frame: u32 = 0;
    loop {
        if let Some(limit) = args.frames {
            if frame >= limit {
                break;
            }
        }

        let frame_start = std::time::Instant::now();

        gb.run_frame()?;

        if frame % args.stats_every == 0 {
            let stats = gb.stats();
            println!(
                "frame {frame}: total_cycles={} ly={} mode={}",
                stats.total_cycles, stats.ly, stats.ppu_mode
            );
        }

        if !frame_budget.is_zero() {
            let elapsed = frame_start.elapsed();
            if let Some(remaining) = frame_budget.checked_sub(elapsed) {
                spin_sleep::sleep(remaining);
            }
        }

        frame += 1;
    }

    Ok(())
}
