pub mod audio_engine;
pub mod callback_source;
pub mod constants;
pub mod fft_engine;
pub mod pcm;
pub mod polling_source;
pub mod readoff;
pub mod sample_buffer_engine;
pub mod spectrum_analyzer;
pub mod spectrum_engine;
pub mod window_functions;
