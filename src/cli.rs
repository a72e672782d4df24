//! Command-line argument parsing.

use anyhow::Context;
use clap::Parser;
use live_spectrogram::{BackendKind, LogContext, SpectrogramConfig, WindowType};
use std::path::PathBuf;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "live-spectrogram")]
#[command(about = "Capture live audio and analyse it into a scrolling spectrogram", long_about = None)]
pub struct Args {
    /// Settings file of key=value lines, applied before the flags below
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Requested capture rate
    #[arg(short = 'r', long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Transform length as a power of two exponent (12 = 4096 samples)
    #[arg(short = 'n', long, value_name = "EXP")]
    pub fft_exponent: Option<u32>,

    /// Window: rect, hann, gaussian, blackman (or 0-3)
    #[arg(short, long, value_name = "TYPE")]
    pub window: Option<WindowType>,

    /// Frequency bins kept per slice (at most half the transform length)
    #[arg(long, value_name = "COUNT")]
    pub bins: Option<usize>,

    /// History length in columns
    #[arg(long, value_name = "COUNT")]
    pub columns: Option<usize>,

    /// Display ticks per history column (1-50)
    #[arg(short, long, value_name = "TICKS")]
    pub scroll_factor: Option<u32>,

    /// Seconds of audio kept in the sample ring
    #[arg(long, value_name = "SECONDS")]
    pub buffer_seconds: Option<f32>,

    /// Display refresh rate driving the analysis
    #[arg(long, value_name = "HZ")]
    pub tick_rate: Option<f32>,

    /// Channels requested from the device (channel 0 is analysed)
    #[arg(short, long, value_name = "COUNT")]
    pub channels: Option<u16>,

    /// Capture backend: callback (cpal) or polling (arecord)
    #[arg(short, long, value_name = "KIND")]
    pub backend: Option<BackendKind>,

    /// Capture device name (cpal input name or ALSA device such as plughw:0,0)
    #[arg(short, long, value_name = "NAME")]
    pub device: Option<String>,

    /// Stop after this many seconds instead of running until killed
    #[arg(long, value_name = "SECONDS")]
    pub seconds: Option<f32>,

    /// Print the available input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Default log filter for env_logger; RUST_LOG still wins
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// `--seconds` as a run length; negative values mean stop at once
    pub fn run_duration(&self) -> anyhow::Result<Option<Duration>> {
        self.seconds
            .map(|seconds| {
                Duration::try_from_secs_f32(seconds.max(0.0))
                    .with_context(|| format!("--seconds {} is not a usable duration", seconds))
            })
            .transpose()
    }

    /// Defaults, then the settings file, then flags
    pub fn build_config(&self, log: &LogContext) -> live_spectrogram::Result<SpectrogramConfig> {
        let mut config = match &self.config {
            Some(path) => SpectrogramConfig::load(path, log)?,
            None => SpectrogramConfig::default(),
        };

        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(exponent) = self.fft_exponent {
            config.fft_length = 1usize.checked_shl(exponent).unwrap_or(0);
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(bins) = self.bins {
            config.frequency_bins = bins;
        }
        if let Some(columns) = self.columns {
            config.time_columns = columns;
        }
        if let Some(scroll_factor) = self.scroll_factor {
            config.scroll_factor = scroll_factor;
        }
        if let Some(seconds) = self.buffer_seconds {
            config.buffer_seconds = seconds;
        }
        if let Some(rate) = self.tick_rate {
            config.tick_rate_hz = rate;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if self.device.is_some() {
            config.backend = config.backend.with_device(self.device.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("live-spectrogram").chain(args.iter().copied()))
    }

    #[test]
    fn test_run_duration() {
        assert_eq!(parse(&[]).run_duration().unwrap(), None);
        assert_eq!(
            parse(&["--seconds", "1.5"]).run_duration().unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            parse(&["--seconds=-3"]).run_duration().unwrap(),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_unrepresentable_run_duration_is_an_error() {
        assert!(parse(&["--seconds", "inf"]).run_duration().is_err());
        assert!(parse(&["--seconds", "1e30"]).run_duration().is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&["-r", "48000", "-n", "10", "--bins", "256", "-w", "hann"]);
        let config = args.build_config(&LogContext::default()).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.fft_length, 1024);
        assert_eq!(config.frequency_bins, 256);
        assert_eq!(config.window, WindowType::Hann);
    }

    #[test]
    fn test_invalid_tick_rate_is_rejected() {
        let args = parse(&["--tick-rate", "0"]);
        assert!(args
            .build_config(&LogContext::default())
            .unwrap_err()
            .is_configuration());
    }
}
