/// Capture and analysis defaults
/// Values follow a 44.1kHz capture refreshed by a 60Hz display

/// Requested capture rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Interleaved channels requested from the device (only channel 0 is analysed)
pub const DEFAULT_CHANNELS: u16 = 2;

/// Transform length exponent, N = 2^12 = 4096
pub const DEFAULT_FFT_EXPONENT: u32 = 12;
pub const DEFAULT_FFT_LENGTH: usize = 1 << DEFAULT_FFT_EXPONENT;

/// Retained frequency bins (N/2 keeps everything below Nyquist)
pub const DEFAULT_FREQUENCY_BINS: usize = DEFAULT_FFT_LENGTH / 2;

/// History columns; a multiple of 4 keeps rows aligned for texture uploads
pub const DEFAULT_TIME_COLUMNS: usize = 1024;

/// Display ticks per history shift
pub const DEFAULT_SCROLL_FACTOR: u32 = 2;

/// Scroll factor bounds for interactive speed changes
pub const MIN_SCROLL_FACTOR: u32 = 1;
pub const MAX_SCROLL_FACTOR: u32 = 50;

/// Seconds of audio kept in the sample ring
pub const DEFAULT_BUFFER_SECONDS: f32 = 5.0;

/// Display refresh cadence driving the analyzer
pub const DEFAULT_TICK_RATE_HZ: f32 = 60.0;

/// Oscilloscope lookback for the time-domain view
pub const DEFAULT_SCOPE_SECONDS: f32 = 0.1;

/// Frames converted per ring write inside a driver callback
pub const CALLBACK_CHUNK_FRAMES: usize = 1024;

/// Sleep per iteration while a polling capture is paused
pub const PAUSE_BACKOFF_MS: u64 = 10;

/// Full-scale divisor for signed 16-bit PCM
pub const PCM16_SCALE: f32 = 1.0 / 32768.0;

/// Bytes per signed 16-bit sample
pub const PCM16_BYTES: usize = 2;

/// Default ALSA capture device for the polling backend
pub const DEFAULT_ALSA_DEVICE: &str = "plughw:0,0";

/// Reference pitch for note read-off (middle C)
pub const MIDDLE_C_FREQUENCY: f32 = 261.626;
pub const SEMITONES_PER_OCTAVE: i32 = 12;

/// Harmonic read-off lines drawn for a selected frequency
pub const READOFF_HARMONICS: usize = 10;

/// Frames per polling period: one display refresh worth of audio
pub fn frames_per_period(sample_rate: u32) -> usize {
    ((sample_rate as f32 / DEFAULT_TICK_RATE_HZ) as usize).max(1)
}

/// Ring capacity for a buffer duration at a sample rate
pub fn ring_capacity(sample_rate: u32, buffer_seconds: f32) -> usize {
    (buffer_seconds * sample_rate as f32).round().max(0.0) as usize
}
