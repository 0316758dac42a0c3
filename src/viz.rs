//! Terminal status line
//!
//! Renders a single carriage-return status line combining the live level
//! meter, the server-driven timer and transcript, and the latest session
//! error. Rendering is sampled at its own cadence and never blocks or
//! fails the capture path.

use std::io::Write;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::audio::SignalStats;
use crate::channel::ServerEvent;
use crate::session::SessionError;

/// Redraw interval, roughly 30 fps.
const REDRAW_INTERVAL: Duration = Duration::from_millis(33);

/// Longest transcript tail shown on the status line, in characters.
const TRANSCRIPT_TAIL: usize = 60;

/// Map per-frame statistics onto three meter bars: one peak bar flanked
/// by two mean bars. Heights are ceiled so any non-silent frame shows a
/// visible bar, and clamped to `display_height`.
pub fn bar_heights(stats: &SignalStats, display_height: u32) -> [u32; 3] {
    let scale = |value: f32| -> u32 {
        let h = (value.clamp(0.0, 1.0) * display_height as f32).ceil() as u32;
        h.min(display_height)
    };

    let mean = scale(stats.mean_amplitude);
    [mean, scale(stats.peak_amplitude), mean]
}

/// Accumulated display state for the status line.
pub struct VisualizationFeed {
    display_height: u32,
    bars: [u32; 3],
    timer: String,
    transcript: String,
    wpm: Option<f64>,
    artifact: Option<String>,
    last_error: Option<String>,
}

impl VisualizationFeed {
    pub fn new(display_height: u32) -> Self {
        Self {
            display_height: display_height.max(1),
            bars: [0; 3],
            timer: "00:00".to_string(),
            transcript: String::new(),
            wpm: None,
            artifact: None,
            last_error: None,
        }
    }

    pub fn on_stats(&mut self, stats: &SignalStats) {
        self.bars = bar_heights(stats, self.display_height);
    }

    pub fn on_server_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::TranscriptUpdate { transcript } => {
                self.transcript = transcript.clone();
            }
            ServerEvent::WordsPerMinute { value } => {
                self.wpm = Some(*value);
            }
            ServerEvent::ElapsedTime { display } => {
                self.timer = display.clone();
            }
            ServerEvent::ArtifactReady { reference } => {
                log::info!("Session artifact ready: {}", reference);
                self.artifact = Some(reference.clone());
            }
            ServerEvent::SessionReady => {
                self.bars = [0; 3];
                self.timer = "00:00".to_string();
                self.transcript.clear();
                self.wpm = None;
                self.artifact = None;
            }
            ServerEvent::Connected => {
                self.last_error = None;
            }
            ServerEvent::ConnectionLost => {
                self.last_error = Some("connection lost".to_string());
            }
            ServerEvent::Unknown => {
                log::debug!("Ignoring unrecognized server event");
            }
        }
    }

    pub fn on_error(&mut self, error: &SessionError) {
        // Sticky until the next successful connect or session.
        self.last_error = Some(error.to_string());
    }

    /// Draw the status line. I/O errors are the caller's to log; they
    /// never reach the capture path.
    pub fn render<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let meter: String = self
            .bars
            .iter()
            .map(|&h| level_glyph(h, self.display_height))
            .collect();

        write!(out, "\r\x1b[2K[{}] {}", meter, self.timer)?;
        if let Some(wpm) = self.wpm {
            write!(out, " | {:.0} wpm", wpm)?;
        }
        if !self.transcript.is_empty() {
            write!(out, " | {}", tail(&self.transcript, TRANSCRIPT_TAIL))?;
        }
        if let Some(reference) = &self.artifact {
            write!(out, " | saved: {}", reference)?;
        }
        if let Some(error) = &self.last_error {
            write!(out, " | !! {}", error)?;
        }
        out.flush()
    }

    /// Drive the feed until the remote event stream closes.
    pub async fn run<W: Write + Send>(
        mut self,
        mut stats: watch::Receiver<Option<SignalStats>>,
        mut remote: broadcast::Receiver<ServerEvent>,
        mut errors: broadcast::Receiver<SessionError>,
        mut out: W,
    ) {
        let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
        let mut errors_open = true;

        loop {
            tokio::select! {
                _ = redraw.tick() => {
                    if stats.has_changed().unwrap_or(false) {
                        if let Some(latest) = *stats.borrow_and_update() {
                            self.on_stats(&latest);
                        }
                    }
                    if let Err(e) = self.render(&mut out) {
                        log::warn!("Status line render failed: {}", e);
                    }
                }
                event = remote.recv() => {
                    match event {
                        Ok(event) => self.on_server_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::debug!("Status line lagged {} remote events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                error = errors.recv(), if errors_open => {
                    match error {
                        Ok(error) => self.on_error(&error),
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => errors_open = false,
                    }
                }
            }
        }
    }
}

fn level_glyph(height: u32, max: u32) -> char {
    const LEVELS: [char; 9] = [' ', '\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}'];
    let idx = (height as usize * (LEVELS.len() - 1) + max as usize - 1) / max as usize;
    LEVELS[idx.min(LEVELS.len() - 1)]
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        let skipped: String = s.chars().skip(count - max_chars).collect();
        format!("\u{2026}{}", skipped)
    }
}
