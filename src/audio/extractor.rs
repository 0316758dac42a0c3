//! Fixed-size framing of the raw capture stream
//!
//! The capture callback hands over whatever slice sizes the device driver
//! chooses; the extractor re-slices them into frames of exactly
//! `buffer_size` samples, in strict capture order, and forwards each
//! completed frame over an unbounded channel. Nothing here blocks: if the
//! network or the renderer is slow, frames keep flowing at device cadence
//! and queue up in the transport layer.

use super::{AudioFrame, CaptureEvent, CaptureSender};

/// Re-slices raw capture input into fixed-length mono frames.
///
/// Owned by the capture callback; the receiving end of `tx` is consumed by
/// the session's frame pump.
pub struct FrameExtractor {
    buffer_size: usize,
    sample_rate: u32,
    channels: u16,
    pending: Vec<f32>,
    frames_emitted: u64,
    tx: CaptureSender,
}

impl FrameExtractor {
    /// # Arguments
    /// * `buffer_size` - Samples per frame (must be nonzero)
    /// * `sample_rate` - Device sample rate in Hz, fixed for the session
    /// * `channels` - Interleaved channel count of the raw input
    pub fn new(buffer_size: usize, sample_rate: u32, channels: u16, tx: CaptureSender) -> Self {
        assert!(buffer_size > 0, "frame buffer size must be nonzero");
        Self {
            buffer_size,
            sample_rate,
            channels,
            pending: Vec::with_capacity(buffer_size * 2),
            frames_emitted: 0,
            tx,
        }
    }

    /// Fold an interleaved input slice to mono and emit any completed
    /// frames. Called from the capture callback; never blocks.
    pub fn push_interleaved(&mut self, data: &[f32]) {
        if self.channels <= 1 {
            self.pending.extend_from_slice(data);
        } else {
            for group in data.chunks(self.channels as usize) {
                let sum: f32 = group.iter().sum();
                self.pending.push(sum / group.len() as f32);
            }
        }
        self.emit_completed();
    }

    fn emit_completed(&mut self) {
        while self.pending.len() >= self.buffer_size {
            let samples: Vec<f32> = self.pending.drain(..self.buffer_size).collect();
            let frame = AudioFrame::new(samples, self.sample_rate);
            self.frames_emitted += 1;
            if self.tx.send(CaptureEvent::Frame(frame)).is_err() {
                // Consumer is gone (session stopped); keep draining so the
                // pending buffer stays bounded until the stream is torn down.
                log::debug!("FrameExtractor: frame receiver closed, dropping frame");
            }
        }
    }

    /// Count of complete frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Samples currently buffered below one full frame. A trailing partial
    /// frame at stop time is discarded, never sent short.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::CaptureReceiver;
    use super::*;
    use tokio::sync::mpsc;

    fn extractor(buffer_size: usize, channels: u16) -> (FrameExtractor, CaptureReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FrameExtractor::new(buffer_size, 44100, channels, tx), rx)
    }

    fn collect_frames(rx: &mut CaptureReceiver) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CaptureEvent::Frame(frame) = event {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn emits_fixed_length_frames_in_order() {
        let (mut ex, mut rx) = extractor(4, 1);

        ex.push_interleaved(&[0.0, 0.1, 0.2]);
        assert_eq!(ex.frames_emitted(), 0);

        ex.push_interleaved(&[0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        let frames = collect_frames(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(frames[1].samples, vec![0.4, 0.5, 0.6, 0.7]);
        assert_eq!(ex.pending_samples(), 1);
    }

    #[test]
    fn folds_stereo_to_mono() {
        let (mut ex, mut rx) = extractor(2, 2);

        ex.push_interleaved(&[0.2, 0.4, -0.5, 0.5]);
        let frames = collect_frames(&mut rx);
        assert_eq!(frames.len(), 1);
        let samples = &frames[0].samples;
        assert!((samples[0] - 0.3).abs() < 1e-6);
        assert!(samples[1].abs() < 1e-6);
    }

    #[test]
    fn ten_seconds_at_44100_yields_53_complete_frames() {
        // 441_000 samples / 8192 per frame = 53 complete frames with a
        // partial remainder, at a cadence of ~185.8ms per frame.
        let (mut ex, mut rx) = extractor(8192, 1);

        let batch = vec![0.0f32; 441];
        for _ in 0..1000 {
            ex.push_interleaved(&batch);
        }

        let frames = collect_frames(&mut rx);
        assert_eq!(frames.len(), 53);
        assert!(frames.iter().all(|f| f.len() == 8192));
        assert_eq!(ex.pending_samples(), 441_000 - 53 * 8192);
    }

    #[test]
    fn frame_cadence_is_under_network_budget() {
        let frame = AudioFrame::new(vec![0.0; 8192], 44100);
        let cadence = frame.duration_ms();
        assert!((180..=190).contains(&cadence));
    }

    #[test]
    fn closed_receiver_does_not_panic() {
        let (mut ex, rx) = extractor(2, 1);
        drop(rx);

        ex.push_interleaved(&[0.0, 0.1, 0.2, 0.3]);
        assert_eq!(ex.frames_emitted(), 2);
        assert!(ex.pending_samples() < 2);
    }
}
