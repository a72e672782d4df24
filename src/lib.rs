//! Live audio capture feeding a scrolling spectrogram.
//!
//! A capture source writes samples into a lock-free ring. On each display
//! refresh the pipeline windows the newest `N` samples, runs a real FFT,
//! decodes it to a power spectrum and appends it to a time × frequency
//! history that a renderer can read directly.

pub mod audio;
pub mod config;
pub mod error;
pub mod logging;

pub use audio::audio_engine::{AudioSource, BackendKind, CaptureBackend, StreamFormat};
pub use audio::callback_source::list_input_devices;
pub use audio::fft_engine::{SpectralAnalyzer, SpectralSlice};
pub use audio::pcm::pcm16_to_float;
pub use audio::polling_source::{ArecordDevice, PcmDevice, PcmReadError, PollingSource};
pub use audio::readoff::{Note, ReadoffLine};
pub use audio::sample_buffer_engine::{euclid_mod, SampleRingBuffer, SampleWriter};
pub use audio::spectrum_analyzer::{SpectrogramPipeline, SpectrumOutput};
pub use audio::spectrum_engine::{HistoryView, ScrollControl, SpectrogramHistory};
pub use audio::window_functions::{WindowTable, WindowType};
pub use config::SpectrogramConfig;
pub use error::{Result, SpectrogramError};
pub use logging::LogContext;
