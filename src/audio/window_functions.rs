//! Window functions applied to each analysis frame before the transform
//!
//! A finite frame cut out of a continuous signal has hard edges, which smear
//! a pure tone across many bins (spectral leakage). Tapering the frame with a
//! window trades a wider main lobe for much lower leakage.
use crate::error::{Result, SpectrogramError};
use apodize::blackman_iter;
use core::f32::consts::PI;
use libm::{cosf, expf};
use std::fmt;
use std::str::FromStr;

/// Window function types for spectral analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    /// Rectangular: no tapering, maximum leakage
    Rectangular,
    /// Hann: raised cosine, C^1 continuous so third-order tails
    Hann,
    /// Gaussian with sigma = N/5, truncated at the frame edges
    TruncatedGaussian,
    /// Blackman: very low sidelobes, widest main lobe
    Blackman,
}

impl WindowType {
    /// Generate window coefficients for this window type
    pub fn generate(self, window_size: usize) -> Vec<f32> {
        match self {
            Self::Rectangular => vec![1.0; window_size],
            Self::Hann => generate_hann_window(window_size),
            Self::TruncatedGaussian => generate_truncated_gaussian_window(window_size),
            Self::Blackman => blackman_iter(window_size).map(|w| w as f32).collect(),
        }
    }

    /// Numeric codes used on the command line: 0 rect, 1 Hann, 2 Gaussian, 3 Blackman
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Self::Rectangular),
            1 => Ok(Self::Hann),
            2 => Ok(Self::TruncatedGaussian),
            3 => Ok(Self::Blackman),
            other => Err(SpectrogramError::config(format!(
                "unknown window type code {}",
                other
            ))),
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Rectangular => "rectangular",
            Self::Hann => "hann",
            Self::TruncatedGaussian => "gaussian",
            Self::Blackman => "blackman",
        }
    }
}

impl FromStr for WindowType {
    type Err = SpectrogramError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase();
        if let Ok(code) = key.parse::<u32>() {
            return Self::from_code(code);
        }
        match key.as_str() {
            "rect" | "rectangular" | "none" => Ok(Self::Rectangular),
            "hann" | "hanning" => Ok(Self::Hann),
            "gauss" | "gaussian" | "truncated-gaussian" | "truncated_gaussian" => {
                Ok(Self::TruncatedGaussian)
            }
            "blackman" => Ok(Self::Blackman),
            _ => Err(SpectrogramError::config(format!(
                "unknown window type '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// Generates Hann window coefficients
///
/// `w[i] = (1 + cos(π(i − W)/W)) / 2` with `W = N/2`. This is the periodic
/// form: zero at `i = 0`, one at the center `i = W`, symmetric about `W`.
pub fn generate_hann_window(window_size: usize) -> Vec<f32> {
    let half_width = window_size as f32 / 2.0;

    (0..window_size)
        .map(|i| (1.0 + cosf(PI * (i as f32 - half_width) / half_width)) / 2.0)
        .collect()
}

/// Generates truncated Gaussian window coefficients
///
/// `w[i] = exp(−(i − N/2)² / (2σ²))` with `σ = N/5`. The frame edges sit at
/// ±2.5σ, so the edge value is about 0.044 rather than the ±4σ cutoff one
/// might expect. The truncation radius scales with `N`; it is an
/// approximation, not a fixed number of standard deviations.
pub fn generate_truncated_gaussian_window(window_size: usize) -> Vec<f32> {
    let sigma = window_size as f32 / 5.0;
    let center = (window_size / 2) as i64;

    (0..window_size)
        .map(|i| {
            let offset = (i as i64 - center) as f32;
            expf(-(offset * offset) / (2.0 * sigma * sigma))
        })
        .collect()
}

/// Pre-computed window coefficients, immutable once built
#[derive(Debug, Clone)]
pub struct WindowTable {
    window_type: WindowType,
    coefficients: Box<[f32]>,
}

impl WindowTable {
    pub fn build(window_type: WindowType, length: usize) -> Self {
        Self {
            window_type,
            coefficients: window_type.generate(length).into_boxed_slice(),
        }
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Average coefficient; divide amplitudes by this to undo the window's
    /// energy loss (Rectangular 1.0, Hann 0.5, Blackman ~0.42)
    pub fn coherent_gain(&self) -> f32 {
        if self.coefficients.is_empty() {
            return 0.0;
        }
        self.coefficients.iter().sum::<f32>() / self.coefficients.len() as f32
    }

    /// Multiply `frame` element-wise by the coefficients
    pub fn apply(&self, frame: &mut [f32]) {
        for (sample, &coeff) in frame.iter_mut().zip(self.coefficients.iter()) {
            *sample *= coeff;
        }
    }
}
