//! Audio capture: device acquisition, fixed-size framing, signal stats.

pub mod extractor;
pub mod signal;
pub mod source;

pub use extractor::FrameExtractor;
pub use signal::{analyze, SignalStats};
pub use source::{AudioSource, CaptureHandle, MicSource};

use tokio::sync::mpsc;

/// One fixed-length slice of consecutive mono samples captured together.
///
/// Samples are floating point in roughly [-1, 1]. Every frame produced
/// during a single session has the same length and sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Events produced on the capture side: completed frames in strict capture
/// order, or a fatal device failure that ends the stream.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Frame(AudioFrame),
    DeviceError(DeviceError),
}

/// Receiving end of the capture hand-off. Unbounded so the real-time
/// callback never blocks on a slow consumer.
pub type CaptureReceiver = mpsc::UnboundedReceiver<CaptureEvent>;

/// Sending end of the capture hand-off.
pub type CaptureSender = mpsc::UnboundedSender<CaptureEvent>;

/// Errors that can occur while acquiring the input device.
///
/// Acquisition failures are surfaced to the user; the caller must not
/// retry automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// The user (or the platform) denied access to the microphone.
    PermissionDenied,
    /// No usable input device, or the device is already in use.
    DeviceUnavailable(String),
}

impl std::fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionError::PermissionDenied => {
                write!(f, "Access to the audio input device was denied")
            }
            AcquisitionError::DeviceUnavailable(e) => {
                write!(f, "No usable audio input device: {}", e)
            }
        }
    }
}

impl std::error::Error for AcquisitionError {}

/// A fatal device failure in the middle of a session. The session is
/// aborted and resources released; the user must restart capture.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceError(pub String);

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Audio device failed: {}", self.0)
    }
}

impl std::error::Error for DeviceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(vec![0.0; 8192], 44100);
        // 8192 / 44100 Hz = 185.7ms
        assert_eq!(frame.duration_ms(), 185);
    }

    #[test]
    fn acquisition_error_display() {
        let err = AcquisitionError::PermissionDenied;
        assert!(err.to_string().contains("denied"));

        let err = AcquisitionError::DeviceUnavailable("no input device".to_string());
        assert!(err.to_string().contains("no input device"));
    }
}
