use crate::audio::callback_source::CallbackSource;
use crate::audio::polling_source::{ArecordDevice, PollingSource};
use crate::audio::sample_buffer_engine::SampleWriter;
use crate::error::{Result, SpectrogramError};
use crate::logging::LogContext;
use std::fmt;
use std::str::FromStr;

/// Format actually negotiated with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Anything that can push captured audio into the sample ring
///
/// `start` either succeeds with a running delivery thread/callback or fails
/// with nothing left running. `stop` is idempotent and guarantees no write
/// happens after it returns. While paused the source keeps the device open
/// but stops advancing the ring.
pub trait AudioSource {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat>;

    fn stop(&mut self);

    fn set_paused(&self, paused: bool);

    fn is_paused(&self) -> bool;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat> {
        (**self).start(sample_rate, channels)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn set_paused(&self, paused: bool) {
        (**self).set_paused(paused)
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }
}

/// Which capture backend to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Driver callback through cpal, optionally on a named input device
    Callback { device: Option<String> },
    /// Dedicated thread doing blocking reads from `arecord`
    Polling { device: String },
}

impl BackendKind {
    pub fn device(&self) -> Option<&str> {
        match self {
            BackendKind::Callback { device } => device.as_deref(),
            BackendKind::Polling { device } => Some(device),
        }
    }

    pub fn with_device(self, name: Option<String>) -> Self {
        match (self, name) {
            (BackendKind::Callback { .. }, device) => BackendKind::Callback { device },
            (BackendKind::Polling { .. }, Some(device)) => BackendKind::Polling { device },
            (kind, None) => kind,
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Callback { device: None }
    }
}

impl FromStr for BackendKind {
    type Err = SpectrogramError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "callback" | "cpal" => Ok(BackendKind::Callback { device: None }),
            "polling" | "alsa" | "arecord" => Ok(BackendKind::Polling {
                device: crate::audio::constants::DEFAULT_ALSA_DEVICE.to_string(),
            }),
            other => Err(SpectrogramError::config(format!(
                "unknown capture backend '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Callback { device: Some(name) } => write!(f, "callback ({})", name),
            BackendKind::Callback { device: None } => f.write_str("callback (default input)"),
            BackendKind::Polling { device } => write!(f, "polling ({})", device),
        }
    }
}

/// The stock capture backends, chosen at construction from [`BackendKind`]
pub enum CaptureBackend {
    Callback(CallbackSource),
    Polling(PollingSource<ArecordDevice>),
}

impl CaptureBackend {
    pub fn new(kind: &BackendKind, writer: SampleWriter, log: &LogContext) -> Self {
        let log = log.child("capture");
        match kind {
            BackendKind::Callback { device } => {
                CaptureBackend::Callback(CallbackSource::new(device.clone(), writer, log))
            }
            BackendKind::Polling { device } => CaptureBackend::Polling(PollingSource::new(
                ArecordDevice::new(device.clone()),
                writer,
                log,
            )),
        }
    }
}

impl AudioSource for CaptureBackend {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<StreamFormat> {
        match self {
            CaptureBackend::Callback(source) => source.start(sample_rate, channels),
            CaptureBackend::Polling(source) => source.start(sample_rate, channels),
        }
    }

    fn stop(&mut self) {
        match self {
            CaptureBackend::Callback(source) => source.stop(),
            CaptureBackend::Polling(source) => source.stop(),
        }
    }

    fn set_paused(&self, paused: bool) {
        match self {
            CaptureBackend::Callback(source) => source.set_paused(paused),
            CaptureBackend::Polling(source) => source.set_paused(paused),
        }
    }

    fn is_paused(&self) -> bool {
        match self {
            CaptureBackend::Callback(source) => source.is_paused(),
            CaptureBackend::Polling(source) => source.is_paused(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!(
            "cpal".parse::<BackendKind>().unwrap(),
            BackendKind::Callback { device: None }
        );
        assert_eq!(
            "alsa".parse::<BackendKind>().unwrap(),
            BackendKind::Polling {
                device: "plughw:0,0".to_string()
            }
        );
        assert!("jack".parse::<BackendKind>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_with_device_overrides_name() {
        let kind = BackendKind::Polling {
            device: "plughw:0,0".into(),
        }
        .with_device(Some("hw:1,0".into()));
        assert_eq!(kind.device(), Some("hw:1,0"));

        let kind = BackendKind::default().with_device(Some("USB Mic".into()));
        assert_eq!(kind.device(), Some("USB Mic"));
    }
}
