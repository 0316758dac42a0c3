//! Per-frame signal statistics for the visualization feed
//!
//! Pure and allocation-free; computed independently of encoding so a slow
//! transport never delays the display, and vice versa.

use super::AudioFrame;

/// Ephemeral amplitude statistics for one frame. Never transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalStats {
    /// max |sample| over the frame, >= 0
    pub peak_amplitude: f32,
    /// mean |sample| over the frame, >= 0
    pub mean_amplitude: f32,
}

/// Compute amplitude statistics for a frame.
pub fn analyze(frame: &AudioFrame) -> SignalStats {
    if frame.is_empty() {
        return SignalStats::default();
    }

    let mut peak = 0.0f32;
    let mut sum = 0.0f64;
    for &sample in &frame.samples {
        let abs = sample.abs();
        if abs > peak {
            peak = abs;
        }
        sum += abs as f64;
    }

    SignalStats {
        peak_amplitude: peak,
        mean_amplitude: (sum / frame.samples.len() as f64) as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<f32>) -> AudioFrame {
        AudioFrame::new(samples, 44100)
    }

    #[test]
    fn peak_and_mean_over_absolute_values() {
        let stats = analyze(&frame(vec![0.5, -1.0, 0.0, 0.5]));
        assert_eq!(stats.peak_amplitude, 1.0);
        assert_eq!(stats.mean_amplitude, 0.5);
    }

    #[test]
    fn silence_is_zero() {
        let stats = analyze(&frame(vec![0.0; 8192]));
        assert_eq!(stats.peak_amplitude, 0.0);
        assert_eq!(stats.mean_amplitude, 0.0);
    }

    #[test]
    fn analyze_is_pure() {
        let f = frame(vec![0.25, -0.75, 0.5, -0.125]);
        assert_eq!(analyze(&f), analyze(&f));
    }

    #[test]
    fn stats_are_nonnegative() {
        let stats = analyze(&frame(vec![-0.9, -0.1, -0.4]));
        assert!(stats.peak_amplitude >= 0.0);
        assert!(stats.mean_amplitude >= 0.0);
        assert!(stats.peak_amplitude >= stats.mean_amplitude);
    }
}
