//! Input device acquisition via CPAL
//!
//! `MicSource` wraps the default input device. Acquiring opens a live
//! stream on a dedicated capture thread (CPAL streams are not `Send`, so
//! the stream must live and die on one thread); releasing the returned
//! handle stops it. At most one acquisition may be live at a time, which
//! the source enforces itself even though the session state machine is
//! expected to prevent a second attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use tokio::sync::mpsc;

use super::{AcquisitionError, CaptureReceiver, CaptureSender, DeviceError, FrameExtractor};

/// A live audio input, acquired from an [`AudioSource`].
///
/// Dropping the handle stops the hardware stream and joins the capture
/// thread; `release` does the same explicitly. Release happens exactly
/// once either way.
pub trait CaptureHandle: Send {
    /// Sample rate fixed at acquisition time, in Hz.
    fn sample_rate(&self) -> u32;
}

/// Acquisition seam for the capture session, so tests can substitute a
/// scripted source for real hardware.
pub trait AudioSource: Send {
    /// Open a live stream delivering frames of exactly `buffer_size`
    /// samples. Fails without retrying if the device is denied, missing,
    /// or already live.
    fn acquire(
        &mut self,
        buffer_size: usize,
    ) -> Result<(Box<dyn CaptureHandle>, CaptureReceiver), AcquisitionError>;
}

/// The default microphone, via CPAL.
pub struct MicSource {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    live: Arc<AtomicBool>,
}

impl MicSource {
    /// Bind to the default input device and its default configuration.
    pub fn new() -> Result<Self, AcquisitionError> {
        let host = cpal::default_host();

        let device = host.default_input_device().ok_or_else(|| {
            AcquisitionError::DeviceUnavailable("no input device found".to_string())
        })?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported_config = device
            .default_input_config()
            .map_err(|e| classify_cpal_error(&e.to_string()))?;

        log::info!(
            "Audio config: {} Hz, {} channels, {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        Ok(Self {
            device,
            config,
            sample_format,
            live: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl AudioSource for MicSource {
    fn acquire(
        &mut self,
        buffer_size: usize,
    ) -> Result<(Box<dyn CaptureHandle>, CaptureReceiver), AcquisitionError> {
        if self.live.swap(true, Ordering::SeqCst) {
            return Err(AcquisitionError::DeviceUnavailable(
                "input stream already live".to_string(),
            ));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AcquisitionError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device = self.device.clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream =
                    match build_capture_stream(&device, &config, sample_format, buffer_size, event_tx)
                    {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(classify_cpal_error(&e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Hold the stream alive until release; dropping it stops capture.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| AcquisitionError::DeviceUnavailable(e.to_string()))?;

        let outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(AcquisitionError::DeviceUnavailable(
                "capture thread exited during startup".to_string(),
            ))
        });

        if let Err(e) = outcome {
            self.live.store(false, Ordering::SeqCst);
            let _ = thread.join();
            return Err(e);
        }

        let sample_rate = self.config.sample_rate.0;
        log::info!("Capture started: {} Hz, {} samples/frame", sample_rate, buffer_size);

        let handle = MicHandle {
            live: self.live.clone(),
            sample_rate,
            stop: stop_tx,
            thread: Some(thread),
        };
        Ok((Box::new(handle), event_rx))
    }
}

/// Handle to a live microphone stream.
pub struct MicHandle {
    live: Arc<AtomicBool>,
    sample_rate: u32,
    stop: std_mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureHandle for MicHandle {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MicHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.live.store(false, Ordering::SeqCst);
        log::info!("Capture stopped, input device released");
    }
}

fn build_capture_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    buffer_size: usize,
    tx: CaptureSender,
) -> Result<cpal::Stream, AcquisitionError> {
    match sample_format {
        SampleFormat::I16 => build_capture_stream_typed::<i16>(device, config, buffer_size, tx),
        SampleFormat::U16 => build_capture_stream_typed::<u16>(device, config, buffer_size, tx),
        SampleFormat::F32 => build_capture_stream_typed::<f32>(device, config, buffer_size, tx),
        other => Err(AcquisitionError::DeviceUnavailable(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }
}

fn build_capture_stream_typed<T>(
    device: &Device,
    config: &StreamConfig,
    buffer_size: usize,
    tx: CaptureSender,
) -> Result<cpal::Stream, AcquisitionError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let mut extractor =
        FrameExtractor::new(buffer_size, config.sample_rate.0, config.channels, tx.clone());
    let err_tx = tx;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data
                    .iter()
                    .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                    .collect();
                extractor.push_interleaved(&converted);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
                let _ = err_tx.send(super::CaptureEvent::DeviceError(DeviceError(
                    err.to_string(),
                )));
            },
            None,
        )
        .map_err(|e| classify_cpal_error(&e.to_string()))?;

    Ok(stream)
}

fn classify_cpal_error(message: &str) -> AcquisitionError {
    if message.to_ascii_lowercase().contains("permission") {
        AcquisitionError::PermissionDenied
    } else {
        AcquisitionError::DeviceUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_messages_classify_as_denied() {
        assert_eq!(
            classify_cpal_error("Permission denied by the host"),
            AcquisitionError::PermissionDenied
        );
        assert!(matches!(
            classify_cpal_error("device disconnected"),
            AcquisitionError::DeviceUnavailable(_)
        ));
    }
}
