use std::path::PathBuf;

use anyhow::ensure;
use clap::Parser;

pub const DEFAULT_FRAME_RATE: u64 = 60;
pub const DEFAULT_INSTRUCTIONS_PER_SECOND: u64 = 700;
pub const DEFAULT_FREQUENCY: f32 = 440.0;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Settings {
    /// Path to a raw CHIP-8 ROM
    pub rom: PathBuf,

    /// Frames per second; timers tick once per frame
    #[arg(short, long, default_value_t = DEFAULT_FRAME_RATE)]
    pub frame_rate: u64,

    /// Instructions executed per second
    #[arg(short, long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND)]
    pub ips: u64,

    /// Stop on the first fault instead of skipping the instruction
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Seed for the random number opcode
    #[arg(long)]
    pub seed: Option<u64>,

    /// Buzzer frequency in Hz
    #[arg(long, default_value_t = DEFAULT_FREQUENCY)]
    pub tone: f32,
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.frame_rate > 0, "frame rate must be greater than zero");
        ensure!(self.ips > 0, "instructions per second must be greater than zero");
        ensure!(self.tone > 0.0, "tone frequency must be positive");
        Ok(())
    }

    /// At least one, so a slow IPS still makes progress.
    pub fn instructions_per_frame(&self) -> u64 {
        (self.ips / self.frame_rate).max(1)
    }

    pub fn rom_name(&self) -> String {
        self.rom
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown ROM".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::try_parse_from(["chip8", "roms/ibm-logo.ch8"]).unwrap();
        assert_eq!(settings.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(settings.ips, DEFAULT_INSTRUCTIONS_PER_SECOND);
        assert!(!settings.strict);
        assert_eq!(settings.seed, None);
        assert_eq!(settings.instructions_per_frame(), 11);
        assert_eq!(settings.rom_name(), "ibm-logo");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn overrides() {
        let settings = Settings::try_parse_from([
            "chip8", "-f", "30", "-i", "10", "--strict", "--seed", "9", "game.ch8",
        ])
        .unwrap();
        assert_eq!(settings.frame_rate, 30);
        assert!(settings.strict);
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.instructions_per_frame(), 1);
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let settings = Settings::try_parse_from(["chip8", "-f", "0", "game.ch8"]).unwrap();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rom_is_required() {
        assert!(Settings::try_parse_from(["chip8"]).is_err());
    }
}
