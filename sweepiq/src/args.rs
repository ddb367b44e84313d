//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use sweepiq_engine::Tone;
use sweepiq_messages::{Decibels, Hertz, SweepRequest};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wideband sweep spectrum analyzer", long_about = None)]
pub struct Args {
    /// Start frequency in MHz
    #[arg(long, default_value_t = 2400.0)]
    pub fstart: f64,
    /// Stop frequency in MHz
    #[arg(long, default_value_t = 2500.0)]
    pub fstop: f64,
    /// Resolution bandwidth in kHz
    #[arg(long, default_value_t = 100.0)]
    pub rbw: f64,
    /// Smallest capture size
    #[arg(long, default_value_t = SweepRequest::DEFAULT_MIN_POINTS)]
    pub min_points: u32,
    /// Largest capture size before decimation is used
    #[arg(long, default_value_t = SweepRequest::DEFAULT_MAX_POINTS)]
    pub max_points: u32,
    /// Receiver capability descriptor (TOML); built-in default when omitted
    #[arg(short, long)]
    pub device: Option<PathBuf>,
    /// Simulated signal as FREQ_MHZ:LEVEL_DB, may be repeated
    #[arg(short, long = "tone", value_parser = parse_tone)]
    pub tones: Vec<Tone>,
    /// Peak amplitude of simulated noise
    #[arg(long, default_value_t = 1e-4)]
    pub noise: f32,
    /// Number of spectra; more than one runs a continuous sweep
    #[arg(short, long, default_value_t = 1)]
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub sweeps: u32,
    /// Write the last spectrum as CSV
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Args {
    pub fn request(&self) -> SweepRequest {
        SweepRequest::new(
            Hertz::mhz(self.fstart),
            Hertz::mhz(self.fstop),
            Hertz::khz(self.rbw),
        )
        .with_points(self.min_points, self.max_points)
    }
}

fn parse_tone(s: &str) -> Result<Tone, String> {
    let (freq, level) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FREQ_MHZ:LEVEL_DB, got `{s}`"))?;
    let freq: f64 = freq
        .trim()
        .parse()
        .map_err(|_| format!("invalid frequency `{freq}`"))?;
    let level: f32 = level
        .trim()
        .parse()
        .map_err(|_| format!("invalid level `{level}`"))?;
    Ok(Tone::new(Hertz::mhz(freq), Decibels(level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tone() {
        let tone = parse_tone("2437.5:-30").unwrap();
        assert_eq!(tone.frequency, Hertz::mhz(2437.5));
        assert!((tone.amplitude - 10f32.powf(-1.5)).abs() < 1e-6);
        assert!(parse_tone("2437.5").is_err());
        assert!(parse_tone("abc:-3").is_err());
    }

    #[test]
    fn test_args_build_request() {
        let args = Args::parse_from(["sweepiq", "--fstart", "100", "--fstop", "200", "--rbw", "50"]);
        let request = args.request();
        assert_eq!(request.fstart, Hertz::mhz(100.0));
        assert_eq!(request.fstop, Hertz::mhz(200.0));
        assert_eq!(request.rbw, Hertz::khz(50.0));
        assert_eq!(request.max_points, SweepRequest::DEFAULT_MAX_POINTS);
        assert_eq!(args.sweeps, 1);
    }
}
