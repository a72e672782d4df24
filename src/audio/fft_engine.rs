use crate::audio::sample_buffer_engine::SampleRingBuffer;
use crate::audio::window_functions::WindowTable;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use std::ops::Deref;
use std::sync::Arc;

/// One column of the spectrogram: unnormalised power per retained bin
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSlice {
    power: Box<[f32]>,
}

impl SpectralSlice {
    pub fn zeros(bins: usize) -> Self {
        Self {
            power: vec![0.0; bins].into_boxed_slice(),
        }
    }

    pub fn from_power(power: Vec<f32>) -> Self {
        Self {
            power: power.into_boxed_slice(),
        }
    }

    pub fn bins(&self) -> usize {
        self.power.len()
    }

    /// Overwrite with `other`, reusing the allocation when the bin counts match
    pub fn copy_from(&mut self, other: &SpectralSlice) {
        if self.power.len() == other.power.len() {
            self.power.copy_from_slice(&other.power);
        } else {
            self.power = other.power.clone();
        }
    }

    pub fn power(&self) -> &[f32] {
        &self.power
    }

    /// Index and value of the strongest bin
    pub fn peak(&self) -> Option<(usize, f32)> {
        self.power
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((i, p)),
            })
    }
}

impl Deref for SpectralSlice {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.power
    }
}

/// Repack a real FFT's `N/2 + 1` complex bins into half-complex order.
///
/// `hc[k]` holds Re X[k] for `k` in `0..=N/2`, and `hc[N - k]` holds Im X[k]
/// for `k` in `1..N/2`. DC and Nyquist carry no imaginary part.
pub fn pack_halfcomplex(spectrum: &[Complex32], hc: &mut [f32]) {
    let n = hc.len();
    debug_assert_eq!(spectrum.len(), n / 2 + 1);

    for k in 0..=n / 2 {
        hc[k] = spectrum[k].re;
    }
    for k in 1..(n + 1) / 2 {
        hc[n - k] = spectrum[k].im;
    }
}

/// Decode power from a half-complex array into `power` (one value per bin).
/// Requires `power.len() <= hc.len() / 2`.
pub fn halfcomplex_power(hc: &[f32], power: &mut [f32]) {
    let n = hc.len();
    if power.is_empty() {
        return;
    }

    // zero-frequency has no imaginary part
    power[0] = hc[0] * hc[0];
    for i in 1..power.len() {
        power[i] = hc[i] * hc[i] + hc[n - i] * hc[n - i];
    }
}

/// Windowed real FFT of the newest `N` ring samples, decoded to power
pub struct SpectralAnalyzer {
    // Planned forward transform of length N
    fft: Arc<dyn RealToComplex<f32>>,

    // Window coefficients, length N
    window: WindowTable,

    //Buffers
    frame: Vec<f32>,           // Windowed samples, N
    spectrum: Vec<Complex32>,  // FFT output, N/2 + 1
    scratch: Vec<Complex32>,   // FFT scratch space
    halfcomplex: Vec<f32>,     // Packed output, N

    // Retained bins nf
    bins: usize,

    log: LogContext,
}

impl SpectralAnalyzer {
    pub fn new(window: WindowTable, bins: usize, log: LogContext) -> Result<Self> {
        let fft_length = window.len();

        if fft_length == 0 || !fft_length.is_power_of_two() {
            return Err(SpectrogramError::config(format!(
                "transform length must be a power of two, got {}",
                fft_length
            )));
        }
        if bins == 0 {
            return Err(SpectrogramError::config("at least one frequency bin is required"));
        }
        if bins > fft_length / 2 {
            return Err(SpectrogramError::config(format!(
                "window too short for {} frequency bins (transform length {}, at most {} bins)",
                bins,
                fft_length,
                fft_length / 2
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_length);

        let frame = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        log::debug!(
            target: log.target(),
            "planned {}-point real FFT, {} window, {} bins",
            fft_length,
            window.window_type(),
            bins
        );

        Ok(Self {
            fft,
            window,
            frame,
            spectrum,
            scratch,
            halfcomplex: vec![0.0; fft_length],
            bins,
            log,
        })
    }

    pub fn fft_length(&self) -> usize {
        self.window.len()
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn window(&self) -> &WindowTable {
        &self.window
    }

    /// Packed transform output of the last `compute`
    pub fn halfcomplex(&self) -> &[f32] {
        &self.halfcomplex
    }

    /// Analyse the newest `N` samples of `ring` into `slice`.
    /// On error `slice` is left untouched.
    pub fn compute(&mut self, ring: &SampleRingBuffer, slice: &mut SpectralSlice) -> Result<()> {
        if slice.bins() != self.bins {
            return Err(SpectrogramError::config(format!(
                "slice has {} bins, analyzer produces {}",
                slice.bins(),
                self.bins
            )));
        }

        // Step 1: copy the N most recent samples
        ring.read_window_into(&mut self.frame)?;

        // Step 2: apply the window
        self.window.apply(&mut self.frame);

        // Step 3: real FFT, repacked to half-complex order
        self.fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum, &mut self.scratch)
            .map_err(|err| {
                log::error!(target: self.log.target(), "FFT processing failed: {}", err);
                SpectrogramError::config(format!("FFT processing failed: {}", err))
            })?;
        pack_halfcomplex(&self.spectrum, &mut self.halfcomplex);

        // Step 4: power spectrum from hc dft
        halfcomplex_power(&self.halfcomplex, &mut slice.power);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::window_functions::WindowType;
    use std::f32::consts::PI;

    const SAMPLE_RATE: f32 = 44_100.0;
    const N: usize = 1024;

    fn analyzer(window_type: WindowType, bins: usize) -> SpectralAnalyzer {
        SpectralAnalyzer::new(
            WindowTable::build(window_type, N),
            bins,
            LogContext::default(),
        )
        .unwrap()
    }

    fn ring_with(samples: &[f32]) -> SampleRingBuffer {
        let ring = SampleRingBuffer::new(samples.len() * 2).unwrap();
        ring.write(samples);
        ring
    }

    fn sine(frequency: f32, length: usize) -> Vec<f32> {
        (0..length)
            .map(|i| (2.0 * PI * frequency * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    #[test]
    fn test_copy_from_reuses_allocation() {
        let mut target = SpectralSlice::zeros(4);
        let before = target.power().as_ptr();
        target.copy_from(&SpectralSlice::from_power(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(target.power(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(target.power().as_ptr(), before);

        target.copy_from(&SpectralSlice::from_power(vec![5.0]));
        assert_eq!(target.bins(), 1);
    }

    #[test]
    fn test_pure_tone_peaks_at_expected_bin() {
        let windows = [
            WindowType::Rectangular,
            WindowType::Hann,
            WindowType::TruncatedGaussian,
        ];
        // Bin-centred tones
        let bins_under_test = [20usize, 93, 301];

        for &window_type in &windows {
            let mut analyzer = analyzer(window_type, N / 2);
            for &k0 in &bins_under_test {
                let frequency = k0 as f32 * SAMPLE_RATE / N as f32;
                let ring = ring_with(&sine(frequency, 2 * N));
                let mut slice = SpectralSlice::zeros(N / 2);
                analyzer.compute(&ring, &mut slice).unwrap();

                let expected = (frequency * N as f32 / SAMPLE_RATE).round() as usize;
                let (peak_bin, peak) = slice.peak().unwrap();
                assert!(
                    peak_bin.abs_diff(expected) <= 1,
                    "{:?}: peak at {} expected {}",
                    window_type,
                    peak_bin,
                    expected
                );
                for (bin, &p) in slice.iter().enumerate() {
                    if bin.abs_diff(expected) > 1 {
                        assert!(
                            p < 0.1 * peak,
                            "{:?} tone {}: bin {} has {} vs peak {}",
                            window_type,
                            k0,
                            bin,
                            p,
                            peak
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_dc_input_concentrates_in_bin_zero() {
        let mut analyzer = analyzer(WindowType::Rectangular, 64);
        let ring = ring_with(&vec![0.5; N]);
        let mut slice = SpectralSlice::zeros(64);
        analyzer.compute(&ring, &mut slice).unwrap();

        // Unnormalised: (0.5 * N)^2
        let expected = (0.5 * N as f32).powi(2);
        assert!((slice[0] - expected).abs() / expected < 1e-4);
        assert!(slice[1..].iter().all(|&p| p < expected * 1e-8));
    }

    #[test]
    fn test_zero_input_gives_zero_power() {
        let mut analyzer = analyzer(WindowType::Hann, N / 2);
        let ring = SampleRingBuffer::new(2 * N).unwrap();
        let mut slice = SpectralSlice::from_power(vec![7.0; N / 2]);
        analyzer.compute(&ring, &mut slice).unwrap();
        assert!(slice.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_too_many_bins_is_rejected() {
        let result = SpectralAnalyzer::new(
            WindowTable::build(WindowType::Hann, N),
            N / 2 + 1,
            LogContext::default(),
        );
        assert!(result.err().unwrap().is_configuration());
    }

    #[test]
    fn test_non_power_of_two_is_rejected() {
        let result = SpectralAnalyzer::new(
            WindowTable::build(WindowType::Hann, 1000),
            100,
            LogContext::default(),
        );
        assert!(result.err().unwrap().is_configuration());
    }

    #[test]
    fn test_wrong_slice_length_leaves_slice_untouched() {
        let mut analyzer = analyzer(WindowType::Hann, 16);
        let ring = ring_with(&sine(1000.0, N));
        let mut slice = SpectralSlice::from_power(vec![3.0; 8]);
        assert!(analyzer.compute(&ring, &mut slice).unwrap_err().is_configuration());
        assert!(slice.iter().all(|&p| p == 3.0));
    }

    #[test]
    fn test_halfcomplex_layout() {
        let spectrum = vec![
            Complex32::new(1.0, 0.0),
            Complex32::new(2.0, -2.5),
            Complex32::new(3.0, -3.5),
            Complex32::new(4.0, -4.5),
            Complex32::new(5.0, 0.0),
        ];
        let mut hc = vec![0.0; 8];
        pack_halfcomplex(&spectrum, &mut hc);
        assert_eq!(hc, vec![1.0, 2.0, 3.0, 4.0, 5.0, -4.5, -3.5, -2.5]);

        let mut power = vec![0.0; 4];
        halfcomplex_power(&hc, &mut power);
        assert_eq!(power[0], 1.0);
        assert_eq!(power[1], 4.0 + 6.25);
        assert_eq!(power[3], 16.0 + 20.25);
    }
}
