//! Pipeline configuration: defaults, validation and an optional
//! `key=value` settings file.

use crate::audio::audio_engine::BackendKind;
use crate::audio::constants::{
    ring_capacity, DEFAULT_BUFFER_SECONDS, DEFAULT_CHANNELS, DEFAULT_FREQUENCY_BINS,
    DEFAULT_FFT_LENGTH, DEFAULT_SAMPLE_RATE, DEFAULT_SCROLL_FACTOR, DEFAULT_TICK_RATE_HZ,
    DEFAULT_TIME_COLUMNS,
};
use crate::audio::spectrum_engine::ScrollControl;
use crate::audio::window_functions::WindowType;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramConfig {
    /// Requested capture rate in Hz
    pub sample_rate: u32,
    /// Transform length N, a power of two
    pub fft_length: usize,
    pub window: WindowType,
    /// Retained frequency bins nf, at most N/2
    pub frequency_bins: usize,
    /// History columns T
    pub time_columns: usize,
    /// Display ticks per history column
    pub scroll_factor: u32,
    /// Seconds of audio kept in the sample ring
    pub buffer_seconds: f32,
    /// Display refresh rate driving `on_display_tick`
    pub tick_rate_hz: f32,
    /// Interleaved channels requested from the device
    pub channels: u16,
    pub backend: BackendKind,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_length: DEFAULT_FFT_LENGTH,
            window: WindowType::TruncatedGaussian,
            frequency_bins: DEFAULT_FREQUENCY_BINS,
            time_columns: DEFAULT_TIME_COLUMNS,
            scroll_factor: DEFAULT_SCROLL_FACTOR,
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            channels: DEFAULT_CHANNELS,
            backend: BackendKind::default(),
        }
    }
}

impl SpectrogramConfig {
    /// Sample ring capacity at the requested rate
    pub fn ring_capacity(&self) -> usize {
        ring_capacity(self.sample_rate, self.buffer_seconds)
    }

    /// Frequency resolution in Hz per bin at the requested rate
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate as f32 / self.fft_length as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SpectrogramError::config("sample rate must be positive"));
        }
        if self.channels == 0 {
            return Err(SpectrogramError::config("at least one channel is required"));
        }
        if self.fft_length < 2 || !self.fft_length.is_power_of_two() {
            return Err(SpectrogramError::config(format!(
                "transform length must be a power of two, got {}",
                self.fft_length
            )));
        }
        if self.frequency_bins == 0 || self.frequency_bins > self.fft_length / 2 {
            return Err(SpectrogramError::config(format!(
                "frequency bins must be in 1..={}, got {}",
                self.fft_length / 2,
                self.frequency_bins
            )));
        }
        if self.time_columns == 0 {
            return Err(SpectrogramError::config("history needs at least one column"));
        }
        ScrollControl::new(self.scroll_factor)?;
        if !(self.buffer_seconds.is_finite() && self.buffer_seconds > 0.0) {
            return Err(SpectrogramError::config(format!(
                "buffer length must be positive, got {} s",
                self.buffer_seconds
            )));
        }
        if !(self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0) {
            return Err(SpectrogramError::config(format!(
                "tick rate must be positive, got {} Hz",
                self.tick_rate_hz
            )));
        }

        let capacity = self.ring_capacity();
        if capacity <= self.fft_length {
            return Err(SpectrogramError::config(format!(
                "sample ring of {} samples ({} s at {} Hz) must exceed transform length {}",
                capacity, self.buffer_seconds, self.sample_rate, self.fft_length
            )));
        }
        Ok(())
    }

    /// Defaults overlaid with the settings in `path`
    pub fn load(path: &Path, log: &LogContext) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            SpectrogramError::config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let mut config = Self::default();
        config.apply_settings(&raw, log);
        Ok(config)
    }

    /// Apply `key=value` lines. Blank lines and `#` comments are skipped,
    /// unknown keys and unparsable values are ignored with a warning.
    pub fn apply_settings(&mut self, raw: &str, log: &LogContext) {
        for (number, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    if let Err(reason) = self.apply_kv(key.trim(), value.trim()) {
                        log::warn!(
                            target: log.target(),
                            "settings line {}: ignoring '{}': {}",
                            number + 1,
                            line,
                            reason
                        );
                    }
                }
                None => log::warn!(
                    target: log.target(),
                    "settings line {}: expected key=value, got '{}'",
                    number + 1,
                    line
                ),
            }
        }
    }

    fn apply_kv(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "sample_rate" => parse_into(value, &mut self.sample_rate),
            "fft_length" => parse_into(value, &mut self.fft_length),
            "fft_exponent" => {
                let exponent: u32 = parse(value)?;
                self.fft_length = 1usize
                    .checked_shl(exponent)
                    .ok_or_else(|| format!("exponent {} too large", exponent))?;
                Ok(())
            }
            "window" => parse_into(value, &mut self.window),
            "frequency_bins" | "bins" => parse_into(value, &mut self.frequency_bins),
            "time_columns" | "columns" => parse_into(value, &mut self.time_columns),
            "scroll_factor" => parse_into(value, &mut self.scroll_factor),
            "buffer_seconds" => parse_into(value, &mut self.buffer_seconds),
            "tick_rate_hz" | "tick_rate" => parse_into(value, &mut self.tick_rate_hz),
            "channels" => parse_into(value, &mut self.channels),
            // resets the device name, so `device` must come after it
            "backend" => parse_into(value, &mut self.backend),
            "device" => {
                let name = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
                self.backend = self.backend.clone().with_device(name);
                Ok(())
            }
            _ => Err("unknown key".to_string()),
        }
    }
}

fn parse<T>(value: &str) -> std::result::Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|err| err.to_string())
}

fn parse_into<T>(value: &str, target: &mut T) -> std::result::Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    *target = parse(value)?;
    Ok(())
}
