use crate::audio::audio_engine::{AudioSource, CaptureBackend, StreamFormat};
use crate::audio::fft_engine::{SpectralAnalyzer, SpectralSlice};
use crate::audio::readoff::peak_frequency;
use crate::audio::sample_buffer_engine::{SampleRingBuffer, SampleWriter};
use crate::audio::spectrum_engine::{HistoryView, ScrollControl, SpectrogramHistory};
use crate::audio::window_functions::WindowTable;
use crate::config::SpectrogramConfig;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use std::sync::{Arc, Mutex};
use triple_buffer::TripleBuffer;

/// Cloneable reader of the newest published slice (render thread side)
/// Uses Arc<Mutex<>> so several views can share one triple buffer output
#[derive(Clone)]
pub struct SpectrumOutput {
    output: Arc<Mutex<triple_buffer::Output<SpectralSlice>>>,
    bins: usize,
}

impl SpectrumOutput {
    fn new(output: triple_buffer::Output<SpectralSlice>, bins: usize) -> Self {
        Self {
            output: Arc::new(Mutex::new(output)),
            bins,
        }
    }

    /// Latest slice published by `on_display_tick`
    pub fn read(&self) -> SpectralSlice {
        if let Ok(mut output) = self.output.try_lock() {
            output.read().clone()
        } else {
            // Another clone is mid-read; silence for this frame
            SpectralSlice::zeros(self.bins)
        }
    }

    /// Whether a slice was published since the last `read`
    pub fn updated(&self) -> bool {
        self.output
            .try_lock()
            .map(|output| output.updated())
            .unwrap_or(false)
    }
}

/// Ring buffer, analyzer and history wired to a capture source
///
/// The capture side writes into the ring on its own thread. Everything
/// else runs on the display thread, which calls [`Self::on_display_tick`]
/// once per refresh and then pulls the history or latest slice to draw.
pub struct SpectrogramPipeline {
    config: SpectrogramConfig,

    ring: Arc<SampleRingBuffer>,
    analyzer: SpectralAnalyzer,
    history: SpectrogramHistory,
    latest: SpectralSlice,
    scroll: ScrollControl,

    // Handed to the source on start, or taken for manual feeding
    writer: Option<SampleWriter>,
    source: Option<Box<dyn AudioSource>>,
    format: Option<StreamFormat>,
    paused: bool,

    publisher: triple_buffer::Input<SpectralSlice>,
    spectrum_output: Option<SpectrumOutput>,

    log: LogContext,
}

impl SpectrogramPipeline {
    pub fn new(config: SpectrogramConfig, log: LogContext) -> Result<Self> {
        config.validate()?;

        let ring = Arc::new(SampleRingBuffer::new(config.ring_capacity())?);
        ring.check_window(config.fft_length)?;

        let window = WindowTable::build(config.window, config.fft_length);
        let analyzer = SpectralAnalyzer::new(window, config.frequency_bins, log.child("analyzer"))?;
        let history = SpectrogramHistory::new(config.time_columns, config.frequency_bins)?;
        let scroll = ScrollControl::new(config.scroll_factor)?;

        let latest = SpectralSlice::zeros(config.frequency_bins);
        let (publisher, consumer) = TripleBuffer::new(&latest).split();

        log::info!(
            target: log.target(),
            "pipeline: {} Hz, N={}, {} window, {} bins x {} columns, ring {} samples",
            config.sample_rate,
            config.fft_length,
            config.window,
            config.frequency_bins,
            config.time_columns,
            ring.capacity()
        );

        Ok(Self {
            writer: Some(SampleWriter::new(Arc::clone(&ring))),
            spectrum_output: Some(SpectrumOutput::new(consumer, config.frequency_bins)),
            config,
            ring,
            analyzer,
            history,
            latest,
            scroll,
            source: None,
            format: None,
            paused: false,
            publisher,
            log,
        })
    }

    /// Start capture with the backend named in the configuration
    pub fn start(&mut self) -> Result<StreamFormat> {
        let kind = self.config.backend.clone();
        self.start_with(|writer, log| CaptureBackend::new(&kind, writer, log))
    }

    /// Start capture with a caller-built source. The closure receives the
    /// pipeline's only sample writer. A failed start keeps the source, so
    /// calling `start` again retries it.
    pub fn start_with<S, F>(&mut self, make_source: F) -> Result<StreamFormat>
    where
        S: AudioSource + 'static,
        F: FnOnce(SampleWriter, &LogContext) -> S,
    {
        if self.format.is_some() {
            return Err(SpectrogramError::config("capture already started"));
        }

        if self.source.is_none() {
            let writer = self.writer.take().ok_or_else(|| {
                SpectrogramError::config("sample writer was taken for manual feeding")
            })?;
            let source: Box<dyn AudioSource> = Box::new(make_source(writer, &self.log));
            self.source = Some(source);
        }
        let Some(source) = self.source.as_mut() else {
            return Err(SpectrogramError::config("no capture source"));
        };

        source.set_paused(self.paused);
        let format = source.start(self.config.sample_rate, self.config.channels)?;

        if format.sample_rate != self.config.sample_rate {
            log::warn!(
                target: self.log.target(),
                "device runs at {} Hz instead of {} Hz; ring holds {:.2} s",
                format.sample_rate,
                self.config.sample_rate,
                self.ring.capacity() as f32 / format.sample_rate as f32
            );
        }
        if format.channels != self.config.channels {
            log::info!(
                target: self.log.target(),
                "device delivers {} channels, analysing channel 0",
                format.channels
            );
        }

        self.format = Some(format);
        Ok(format)
    }

    /// Stop capture. Idempotent; no sample is written after this returns.
    pub fn stop(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        self.format = None;
    }

    /// The sample writer, for feeding audio without a capture source.
    /// Returns `None` once capture has started or the writer was taken.
    pub fn take_writer(&mut self) -> Option<SampleWriter> {
        self.writer.take()
    }

    /// Analyse the newest window, publish it and advance the history.
    /// Does nothing while paused. Returns whether the history shifted.
    pub fn on_display_tick(&mut self) -> Result<bool> {
        if self.paused {
            return Ok(false);
        }

        self.analyzer.compute(&self.ring, &mut self.latest)?;
        self.publisher.input_buffer_mut().copy_from(&self.latest);
        self.publisher.publish();

        if self.log.enabled(log::Level::Trace) {
            if let Some((bin, power)) = self.latest.peak() {
                log::trace!(target: self.log.target(), "peak bin {} power {:.3e}", bin, power);
            }
        }
        self.history.tick(&self.latest, self.scroll.scroll_factor())
    }

    pub fn latest_slice(&self) -> &SpectralSlice {
        &self.latest
    }

    pub fn history_view(&self) -> HistoryView<'_> {
        self.history.view()
    }

    /// Last `lookback_seconds` of raw samples for the oscilloscope view
    pub fn recent_samples(&self, lookback_seconds: f32) -> Vec<f32> {
        let lookback = (lookback_seconds.max(0.0) * self.sample_rate() as f32).round() as usize;
        self.ring.recent(lookback)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if let Some(source) = self.source.as_ref() {
            source.set_paused(paused);
        }
        log::debug!(target: self.log.target(), "paused: {}", paused);
    }

    /// Flip pause; returns the new state
    pub fn toggle_pause(&mut self) -> bool {
        self.set_paused(!self.paused);
        self.paused
    }

    /// Reader for another thread; available once
    pub fn take_spectrum_output(&mut self) -> Option<SpectrumOutput> {
        self.spectrum_output.take()
    }

    /// Negotiated rate while capturing, the requested rate otherwise
    pub fn sample_rate(&self) -> u32 {
        self.format
            .map(|format| format.sample_rate)
            .unwrap_or(self.config.sample_rate)
    }

    pub fn stream_format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn scroll_factor(&self) -> u32 {
        self.scroll.scroll_factor()
    }

    /// Scroll faster (fewer ticks per column); restarts the tick count
    pub fn faster(&mut self) -> u32 {
        if self.scroll.faster() {
            self.history.reset_scroll_count();
        }
        self.scroll.scroll_factor()
    }

    /// Scroll slower (more ticks per column)
    pub fn slower(&mut self) -> u32 {
        self.scroll.slower();
        self.scroll.scroll_factor()
    }

    /// Seconds covered by the whole history at the configured tick rate
    pub fn history_span_seconds(&self) -> f32 {
        self.scroll
            .span_seconds(self.config.tick_rate_hz, self.config.time_columns)
    }

    /// Frequency of the strongest bin in the latest slice
    pub fn peak_frequency(&self) -> Option<f32> {
        peak_frequency(&self.latest, self.sample_rate(), self.config.fft_length)
    }

    /// Highest frequency represented by the retained bins
    pub fn highest_frequency(&self) -> f32 {
        self.config.frequency_bins as f32 * self.sample_rate() as f32
            / self.config.fft_length as f32
    }

    pub fn ring(&self) -> &SampleRingBuffer {
        &self.ring
    }

    pub fn config(&self) -> &SpectrogramConfig {
        &self.config
    }
}

impl Drop for SpectrogramPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::window_functions::WindowType;
    use std::cell::Cell;
    use std::f32::consts::PI;
    use std::rc::Rc;

    fn small_config() -> SpectrogramConfig {
        SpectrogramConfig {
            sample_rate: 8192,
            fft_length: 256,
            window: WindowType::Hann,
            frequency_bins: 128,
            time_columns: 8,
            scroll_factor: 2,
            buffer_seconds: 0.5,
            ..Default::default()
        }
    }

    fn tone(frequency: f32, sample_rate: u32, length: usize) -> Vec<f32> {
        (0..length)
            .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Source that records calls and writes nothing
    struct RecordingSource {
        _writer: SampleWriter,
        started: Rc<Cell<u32>>,
        paused: Cell<bool>,
        rate: u32,
    }

    impl AudioSource for RecordingSource {
        fn start(&mut self, _sample_rate: u32, channels: u16) -> Result<StreamFormat> {
            self.started.set(self.started.get() + 1);
            Ok(StreamFormat {
                sample_rate: self.rate,
                channels,
            })
        }

        fn stop(&mut self) {}

        fn set_paused(&self, paused: bool) {
            self.paused.set(paused);
        }

        fn is_paused(&self) -> bool {
            self.paused.get()
        }
    }

    #[test]
    fn test_tick_tracks_tone_and_scrolls() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let writer = pipeline.take_writer().unwrap();
        // bin 16 at 8192 Hz / 256
        writer.write(&tone(512.0, 8192, 1024));

        assert!(!pipeline.on_display_tick().unwrap());
        assert!(pipeline.on_display_tick().unwrap());

        let (bin, _) = pipeline.latest_slice().peak().unwrap();
        assert_eq!(bin, 16);
        assert_eq!(pipeline.history_view().newest(), pipeline.latest_slice().power());
        assert_eq!(pipeline.peak_frequency(), Some(512.0));
    }

    #[test]
    fn test_pause_suppresses_ticks() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let writer = pipeline.take_writer().unwrap();
        writer.write(&tone(512.0, 8192, 1024));

        assert!(pipeline.toggle_pause());
        for _ in 0..10 {
            assert!(!pipeline.on_display_tick().unwrap());
        }
        assert!(pipeline.latest_slice().iter().all(|&p| p == 0.0));
        assert!(pipeline.history_view().as_slice().iter().all(|&p| p == 0.0));

        assert!(!pipeline.toggle_pause());
        pipeline.on_display_tick().unwrap();
        assert!(pipeline.latest_slice().peak().unwrap().1 > 0.0);
    }

    #[test]
    fn test_published_slice_reaches_output() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let output = pipeline.take_spectrum_output().unwrap();
        assert!(pipeline.take_spectrum_output().is_none());

        let writer = pipeline.take_writer().unwrap();
        writer.write(&tone(1024.0, 8192, 512));
        pipeline.on_display_tick().unwrap();

        assert!(output.updated());
        let slice = output.read();
        assert_eq!(&slice, pipeline.latest_slice());
        assert_eq!(slice.peak().unwrap().0, 32);
    }

    #[test]
    fn test_every_tick_publishes_the_latest_slice() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let output = pipeline.take_spectrum_output().unwrap();
        let writer = pipeline.take_writer().unwrap();

        // Cycle through more tones than the triple buffer has slots
        for bin in [8usize, 24, 40, 56, 72, 88] {
            let frequency = bin as f32 * 8192.0 / 256.0;
            writer.write(&tone(frequency, 8192, 256));
            pipeline.on_display_tick().unwrap();

            assert!(output.updated());
            let slice = output.read();
            assert_eq!(&slice, pipeline.latest_slice());
            assert_eq!(slice.peak().unwrap().0, bin);
        }
    }

    #[test]
    fn test_capacity_not_exceeding_window_is_rejected() {
        let config = SpectrogramConfig {
            buffer_seconds: 256.0 / 8192.0,
            ..small_config()
        };
        let result = SpectrogramPipeline::new(config, LogContext::default());
        assert!(result.err().unwrap().is_configuration());
    }

    #[test]
    fn test_start_with_reports_negotiated_rate() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let started = Rc::new(Cell::new(0));
        let counter = Rc::clone(&started);

        pipeline.set_paused(true);
        let format = pipeline
            .start_with(move |writer, _| RecordingSource {
                _writer: writer,
                started: counter,
                paused: Cell::new(false),
                rate: 8000,
            })
            .unwrap();

        assert_eq!(format.sample_rate, 8000);
        assert_eq!(pipeline.sample_rate(), 8000);
        assert_eq!(started.get(), 1);
        assert!(pipeline.take_writer().is_none());

        // second start without stop is refused
        assert!(pipeline.start().unwrap_err().is_configuration());

        pipeline.stop();
        assert_eq!(pipeline.stream_format(), None);
        assert_eq!(pipeline.sample_rate(), 8192);
    }

    #[test]
    fn test_scroll_speed_controls() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        assert_eq!(pipeline.faster(), 1);
        assert_eq!(pipeline.faster(), 1);
        assert_eq!(pipeline.slower(), 2);
        assert!((pipeline.history_span_seconds() - 8.0 * 2.0 / 60.0).abs() < 1e-6);
        assert!((pipeline.highest_frequency() - 4096.0).abs() < 1e-3);
    }

    #[test]
    fn test_recent_samples_uses_sample_rate() {
        let mut pipeline = SpectrogramPipeline::new(small_config(), LogContext::default()).unwrap();
        let writer = pipeline.take_writer().unwrap();
        let ramp: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        writer.write(&ramp);

        let recent = pipeline.recent_samples(0.01);
        // round(0.01 * 8192) = 82
        assert_eq!(recent.len(), 82);
        assert_eq!(recent.last(), Some(&999.0));
        assert_eq!(recent[0], 918.0);
    }
}
