use crate::audio::audio_engine::{AudioSource, StreamFormat};
use crate::audio::constants::{frames_per_period, PAUSE_BACKOFF_MS, PCM16_BYTES};
use crate::audio::pcm::decode_channel;
use crate::audio::sample_buffer_engine::SampleWriter;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// Transient errors tolerated before the first period arrives
const STARTUP_READ_ATTEMPTS: usize = 3;

/// Why a period read returned no data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcmReadError {
    /// Overrun or similar hiccup; the device can be recovered and read again
    Transient(String),
    /// The device is gone or was closed by `stop`
    Closed,
}

/// Unblocks a pending `read_period` from another thread
pub type PcmCloser = Box<dyn FnOnce() + Send>;

/// Blocking interleaved S16_LE capture device
pub trait PcmDevice: Send + 'static {
    /// Open the device at the requested format and report what was negotiated
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat>;

    /// Block until up to `buf.len()` bytes are read; returns the count
    fn read_period(&mut self, buf: &mut [u8]) -> std::result::Result<usize, PcmReadError>;

    /// Bring the device back after a transient error
    fn recover(&mut self) -> Result<()>;

    /// Handle that makes a blocked `read_period` return `Closed`
    fn closer(&mut self) -> PcmCloser;
}

/// ALSA capture through an `arecord` child process writing raw PCM to a pipe
pub struct ArecordDevice {
    name: String,
    format: Option<StreamFormat>,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
}

impl ArecordDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: None,
            child: Arc::new(Mutex::new(None)),
            stdout: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&mut self, format: StreamFormat) -> Result<()> {
        self.kill();

        let mut child = Command::new("arecord")
            .args(["-q", "-t", "raw", "-f", "S16_LE"])
            .arg("-r")
            .arg(format.sample_rate.to_string())
            .arg("-c")
            .arg(format.channels.to_string())
            .arg("-D")
            .arg(&self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                SpectrogramError::device(format!("cannot run arecord on '{}': {}", self.name, err))
            })?;

        self.stdout = child.stdout.take();
        if self.stdout.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SpectrogramError::device("arecord stdout was not captured"));
        }
        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }
        Ok(())
    }

    fn kill(&mut self) {
        self.stdout = None;
        if let Ok(mut slot) = self.child.lock() {
            if let Some(mut child) = slot.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }

    fn has_exited(&self) -> bool {
        match self.child.lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(child) => !matches!(child.try_wait(), Ok(None)),
                None => true,
            },
            Err(_) => true,
        }
    }
}

impl PcmDevice for ArecordDevice {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat> {
        // plughw converts rate and channel count, so the request is what we get
        let format = StreamFormat {
            sample_rate,
            channels,
        };
        self.spawn(format)?;
        self.format = Some(format);
        Ok(format)
    }

    fn read_period(&mut self, buf: &mut [u8]) -> std::result::Result<usize, PcmReadError> {
        let stdout = self.stdout.as_mut().ok_or(PcmReadError::Closed)?;

        let mut filled = 0;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PcmReadError::Transient(err.to_string())),
            }
        }

        if filled == 0 {
            // arecord exited, most often because the device failed to open
            self.kill();
            return Err(PcmReadError::Closed);
        }
        Ok(filled)
    }

    fn recover(&mut self) -> Result<()> {
        if !self.has_exited() {
            return Ok(());
        }
        let format = self
            .format
            .ok_or_else(|| SpectrogramError::device("recover before configure"))?;
        self.spawn(format)
    }

    fn closer(&mut self) -> PcmCloser {
        let child = Arc::clone(&self.child);
        Box::new(move || {
            if let Ok(mut slot) = child.lock() {
                if let Some(child) = slot.as_mut() {
                    // EOF on the pipe wakes the reader
                    let _ = child.kill();
                }
            }
        })
    }
}

impl Drop for ArecordDevice {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Capture on a dedicated thread doing blocking period reads
///
/// Each period is one display refresh worth of frames. Only channel 0 is
/// kept. While paused the thread sleeps in short steps instead of reading.
pub struct PollingSource<D: PcmDevice> {
    device: Option<D>,
    writer: Arc<SampleWriter>,
    paused: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
    closer: Option<PcmCloser>,
    thread: Option<JoinHandle<D>>,
    log: LogContext,
}

impl<D: PcmDevice> PollingSource<D> {
    pub fn new(device: D, writer: SampleWriter, log: LogContext) -> Self {
        Self {
            device: Some(device),
            writer: Arc::new(writer),
            paused: Arc::new(AtomicBool::new(false)),
            quit: Arc::new(AtomicBool::new(false)),
            closer: None,
            thread: None,
            log,
        }
    }

    /// Whether the capture thread is alive. Turns false on its own when the
    /// device goes away mid-stream.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Block for the first period so that a device which fails to open is
/// reported from `start` instead of by a thread that exits at once.
fn read_first_period<D: PcmDevice>(
    device: &mut D,
    raw: &mut [u8],
    log: &LogContext,
) -> Result<usize> {
    for _ in 0..STARTUP_READ_ATTEMPTS {
        match device.read_period(raw) {
            Ok(len) => return Ok(len),
            Err(PcmReadError::Transient(reason)) => {
                log::warn!(target: log.target(), "first capture read failed: {}", reason);
                if let Err(err) = device.recover() {
                    (device.closer())();
                    return Err(err);
                }
            }
            Err(PcmReadError::Closed) => {
                return Err(SpectrogramError::device(
                    "capture device closed before delivering audio",
                ))
            }
        }
    }
    (device.closer())();
    Err(SpectrogramError::device(format!(
        "no audio after {} read attempts",
        STARTUP_READ_ATTEMPTS
    )))
}

impl<D: PcmDevice> AudioSource for PollingSource<D> {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat> {
        // A thread that ended on its own still holds the device
        if self.thread.as_ref().is_some_and(|handle| handle.is_finished()) {
            self.closer = None;
            self.stop();
        }
        if self.thread.is_some() {
            return Err(SpectrogramError::config("capture already started"));
        }
        let mut device = self
            .device
            .take()
            .ok_or_else(|| SpectrogramError::device("capture device was lost"))?;

        let format = match device.configure(sample_rate, channels) {
            Ok(format) => format,
            Err(err) => {
                self.device = Some(device);
                return Err(err);
            }
        };
        if format.channels == 0 {
            self.device = Some(device);
            return Err(SpectrogramError::device("device negotiated zero channels"));
        }

        let frames = frames_per_period(format.sample_rate);
        let mut raw = vec![0u8; frames * format.channels as usize * PCM16_BYTES];
        let first_len = match read_first_period(&mut device, &mut raw, &self.log) {
            Ok(len) => len,
            Err(err) => {
                self.device = Some(device);
                log::error!(target: self.log.target(), "polling capture failed to start: {}", err);
                return Err(err);
            }
        };

        self.quit.store(false, Ordering::Relaxed);
        self.closer = Some(device.closer());

        let capture = CaptureLoop {
            writer: Arc::clone(&self.writer),
            paused: Arc::clone(&self.paused),
            quit: Arc::clone(&self.quit),
            format,
            log: self.log.clone(),
        };
        let handle = thread::Builder::new()
            .name("pcm-capture".into())
            .spawn(move || capture.run(device, raw, first_len))
            .map_err(|err| {
                SpectrogramError::device(format!("cannot spawn capture thread: {}", err))
            });

        match handle {
            Ok(handle) => {
                self.thread = Some(handle);
                log::info!(
                    target: self.log.target(),
                    "polling capture started ({} ch @ {} Hz, {} frames per period)",
                    format.channels,
                    format.sample_rate,
                    frames
                );
                Ok(format)
            }
            Err(err) => {
                if let Some(close) = self.closer.take() {
                    close();
                }
                Err(err)
            }
        }
    }

    fn stop(&mut self) {
        self.quit.store(true, Ordering::Relaxed);
        if let Some(close) = self.closer.take() {
            close();
        }
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(device) => self.device = Some(device),
                Err(_) => log::error!(target: self.log.target(), "capture thread panicked"),
            }
            log::info!(target: self.log.target(), "polling capture stopped");
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

impl<D: PcmDevice> Drop for PollingSource<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureLoop {
    writer: Arc<SampleWriter>,
    paused: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
    format: StreamFormat,
    log: LogContext,
}

impl CaptureLoop {
    /// `raw[..first_len]` holds the period read during startup; it is
    /// written before the next read.
    fn run<D: PcmDevice>(self, mut device: D, mut raw: Vec<u8>, first_len: usize) -> D {
        let channels = self.format.channels as usize;
        let mut samples = Vec::with_capacity(raw.len() / (channels * PCM16_BYTES));
        let mut pending = Some(first_len);

        while !self.quit.load(Ordering::Relaxed) {
            if self.paused.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(PAUSE_BACKOFF_MS));
                continue;
            }

            let len = match pending.take() {
                Some(len) => len,
                None => match device.read_period(&mut raw) {
                    Ok(len) => len,
                    Err(PcmReadError::Transient(reason)) => {
                        log::warn!(target: self.log.target(), "capture read failed: {}", reason);
                        if let Err(err) = device.recover() {
                            log::error!(target: self.log.target(), "capture recovery failed: {}", err);
                            break;
                        }
                        continue;
                    }
                    Err(PcmReadError::Closed) => {
                        if !self.quit.load(Ordering::Relaxed) {
                            log::warn!(target: self.log.target(), "capture device closed");
                        }
                        break;
                    }
                },
            };

            samples.clear();
            decode_channel(&raw[..len], channels, 0, &mut samples);
            if self.quit.load(Ordering::Relaxed) {
                break;
            }
            self.writer.write(&samples);
        }

        device
    }
}
