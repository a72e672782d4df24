use crate::audio::audio_engine::{AudioSource, StreamFormat};
use crate::audio::constants::CALLBACK_CHUNK_FRAMES;
use crate::audio::sample_buffer_engine::SampleWriter;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use dasp::sample::{FromSample, Sample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capture driven by the audio driver's callback thread
///
/// The callback keeps channel 0 of each interleaved frame and writes the
/// batch straight into the ring. Pause and stop are flags read by the
/// callback; dropping the stream on `stop` waits out an in-flight callback.
pub struct CallbackSource {
    device_name: Option<String>,
    writer: Arc<SampleWriter>,
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    stream: Option<Stream>,
    log: LogContext,
}

impl CallbackSource {
    pub fn new(device_name: Option<String>, writer: SampleWriter, log: LogContext) -> Self {
        Self {
            device_name,
            writer: Arc::new(writer),
            paused: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(true)),
            stream: None,
            log,
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl AudioSource for CallbackSource {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat> {
        if self.stream.is_some() {
            return Err(SpectrogramError::config("capture already started"));
        }

        let host = cpal::default_host();
        let device = select_input_device(&host, self.device_name.as_deref())?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "<unknown input>".to_string());

        let (config, sample_format) = select_stream_config(&device, sample_rate, channels)?;
        let format = StreamFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        self.stopped.store(false, Ordering::Relaxed);
        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&device, &config),
            SampleFormat::I16 => self.build_stream::<i16>(&device, &config),
            SampleFormat::U16 => self.build_stream::<u16>(&device, &config),
            other => Err(SpectrogramError::device(format!(
                "unsupported input sample format: {:?}",
                other
            ))),
        };
        let stream = match stream.and_then(|stream| {
            stream
                .play()
                .map_err(|err| SpectrogramError::device(format!("failed to start stream: {}", err)))
                .map(|_| stream)
        }) {
            Ok(stream) => stream,
            Err(err) => {
                self.stopped.store(true, Ordering::Relaxed);
                return Err(err);
            }
        };

        log::info!(
            target: self.log.target(),
            "capturing from '{}' ({} ch @ {} Hz, {:?})",
            device_name,
            format.channels,
            format.sample_rate,
            sample_format
        );

        self.stream = Some(stream);
        Ok(format)
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::debug!(target: self.log.target(), "pausing stream on stop: {}", err);
            }
            drop(stream);
            log::info!(target: self.log.target(), "capture stopped");
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl CallbackSource {
    fn build_stream<T>(&self, device: &cpal::Device, config: &StreamConfig) -> Result<Stream>
    where
        T: SizedSample + Sample,
        f32: FromSample<T>,
    {
        let writer = Arc::clone(&self.writer);
        let paused = Arc::clone(&self.paused);
        let stopped = Arc::clone(&self.stopped);
        let channels = config.channels.max(1) as usize;
        let mut mono: Vec<f32> = Vec::with_capacity(CALLBACK_CHUNK_FRAMES);

        let err_log = self.log.clone();
        let err_fn = move |err: cpal::StreamError| {
            log::warn!(target: err_log.target(), "audio stream error: {}", err);
        };

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if stopped.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
                        return;
                    }
                    write_first_channel(data, channels, &mut mono, &writer);
                },
                err_fn,
                None,
            )
            .map_err(|err| SpectrogramError::device(format!("failed to build input stream: {}", err)))
    }
}

/// Convert channel 0 of interleaved `data` and write it to the ring, at most
/// `scratch.capacity()` frames at a time. Never grows `scratch`.
fn write_first_channel<T>(
    data: &[T],
    channels: usize,
    scratch: &mut Vec<f32>,
    writer: &SampleWriter,
) where
    T: Sample,
    f32: FromSample<T>,
{
    let chunk_frames = scratch.capacity().max(1);
    for chunk in data.chunks(chunk_frames * channels) {
        scratch.clear();
        scratch.extend(
            chunk
                .chunks_exact(channels)
                .map(|frame| frame[0].to_sample::<f32>()),
        );
        writer.write(scratch.as_slice());
    }
}

impl Drop for CallbackSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn select_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(target) = name {
        let devices = host
            .input_devices()
            .map_err(|err| SpectrogramError::device(format!("cannot enumerate inputs: {}", err)))?;
        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name == target {
                    return Ok(device);
                }
            }
        }
        return Err(SpectrogramError::device(format!(
            "input device '{}' not found",
            target
        )));
    }

    host.default_input_device()
        .ok_or_else(|| SpectrogramError::device("no default input device"))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
    )
}

/// Pick a config at the requested rate, preferring the requested channel
/// count and float samples. Falls back to the device default, whose rate
/// may differ from the request.
fn select_stream_config(
    device: &cpal::Device,
    sample_rate: u32,
    channels: u16,
) -> Result<(StreamConfig, SampleFormat)> {
    let supported_configs = device
        .supported_input_configs()
        .map(|configs| configs.collect::<Vec<_>>())
        .unwrap_or_default();

    let at_rate = supported_configs.iter().filter(|range| {
        is_supported_format(range.sample_format())
            && range.min_sample_rate().0 <= sample_rate
            && range.max_sample_rate().0 >= sample_rate
    });

    // Lower score wins: channel match first, then float samples
    let best = at_rate.min_by_key(|range| {
        (
            range.channels() != channels,
            range.sample_format() != SampleFormat::F32,
        )
    });

    if let Some(range) = best {
        let sample_format = range.sample_format();
        let config = range.clone().with_sample_rate(SampleRate(sample_rate));
        return Ok((config.config(), sample_format));
    }

    let default_config = device
        .default_input_config()
        .map_err(|err| SpectrogramError::device(format!("no usable input format: {}", err)))?;
    Ok((default_config.config(), default_config.sample_format()))
}

/// Names of the input devices the default host can open
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|err| SpectrogramError::device(format!("cannot enumerate inputs: {}", err)))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sample_buffer_engine::SampleRingBuffer;

    #[test]
    fn test_large_callback_batch_does_not_grow_scratch() {
        let ring = Arc::new(SampleRingBuffer::new(8192).unwrap());
        let writer = SampleWriter::new(Arc::clone(&ring));
        let mut scratch = Vec::with_capacity(CALLBACK_CHUNK_FRAMES);
        let capacity = scratch.capacity();

        // 5000 stereo frames: left counts up, right is noise to be dropped
        let data: Vec<i16> = (0..5000i16).flat_map(|left| [left, -1]).collect();
        write_first_channel(&data, 2, &mut scratch, &writer);

        assert_eq!(scratch.capacity(), capacity);
        assert_eq!(ring.total_written(), 5000);
        let window = ring.read_window(5000).unwrap();
        for (i, &sample) in window.iter().enumerate() {
            assert_eq!(sample, (i as i16).to_sample::<f32>());
        }
    }

    #[test]
    fn test_partial_trailing_frame_is_dropped() {
        let ring = Arc::new(SampleRingBuffer::new(64).unwrap());
        let writer = SampleWriter::new(Arc::clone(&ring));
        let mut scratch = Vec::with_capacity(4);

        let data = [0.5f32, 0.0, -0.25, 0.0, 0.75];
        write_first_channel(&data, 2, &mut scratch, &writer);

        assert_eq!(ring.read_window(2).unwrap(), vec![0.5, -0.25]);
    }
}
