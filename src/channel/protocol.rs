//! Wire vocabulary for the session channel
//!
//! Defines the JSON event types exchanged with the remote transcription
//! endpoint, plus the frame encoding. Outbound events carry session
//! control and raw audio frames; inbound events carry transcripts, timer
//! text, words-per-minute readings and the playable-artifact notice for a
//! completed session.
//!
//! # Session protocol
//!
//! 1. `session.start` with the sample rate fixed at acquisition time
//! 2. Any number of `frame` events, in strict capture order
//! 3. `session.stop` after the last frame
//!
//! `language.changed` may be sent at any point; it applies to the next
//! session the remote opens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::audio::AudioFrame;

/// The wire-ready form of one audio frame: the sample sequence, in order,
/// nothing else. Session identity is implied by the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportFrame(pub Vec<f32>);

impl TransportFrame {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.0
    }
}

/// Encode a frame for transport. Deterministic, total, lossless: no
/// resampling, no compression, no clipping. serde_json prints floats in
/// shortest-roundtrip form, so the remote decode reproduces the samples
/// bit for bit.
pub fn encode(frame: &AudioFrame) -> TransportFrame {
    TransportFrame(frame.samples.clone())
}

/// Session control events, as issued by the capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    SessionStart { sample_rate: u32 },
    SessionStop,
    LanguageChanged { code: LanguageCode },
}

/// Messages sent to the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.start")]
    SessionStart { sample_rate: u32 },

    /// One encoded audio frame.
    #[serde(rename = "frame")]
    Frame { samples: TransportFrame },

    #[serde(rename = "session.stop")]
    SessionStop,

    #[serde(rename = "language.changed")]
    LanguageChanged { code: LanguageCode },
}

impl From<ControlEvent> for ClientEvent {
    fn from(event: ControlEvent) -> Self {
        match event {
            ControlEvent::SessionStart { sample_rate } => ClientEvent::SessionStart { sample_rate },
            ControlEvent::SessionStop => ClientEvent::SessionStop,
            ControlEvent::LanguageChanged { code } => ClientEvent::LanguageChanged { code },
        }
    }
}

/// Messages received from the remote endpoint, plus locally synthesized
/// connection lifecycle notices (`Connected`, `ConnectionLost` never come
/// off the wire).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Current transcript text, sent whenever the remote has new words.
    #[serde(rename = "transcript.update")]
    TranscriptUpdate { transcript: String },

    /// Current speaking pace.
    #[serde(rename = "wpm")]
    WordsPerMinute { value: f64 },

    /// Pre-formatted elapsed time, e.g. "01:42".
    #[serde(rename = "timer.update")]
    ElapsedTime { display: String },

    /// Playable-audio reference for the session that just completed.
    #[serde(rename = "artifact.ready")]
    ArtifactReady { reference: String },

    /// The remote is ready to accept frames for a new session.
    #[serde(rename = "session.ready")]
    SessionReady,

    #[serde(skip)]
    Connected,

    #[serde(skip)]
    ConnectionLost,

    /// Catch-all so unknown message types never kill the reader.
    #[serde(other)]
    Unknown,
}

/// Spoken-language locale tags accepted by the remote recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LanguageCode {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "en-AU")]
    EnAu,
    #[serde(rename = "en-CA")]
    EnCa,
    #[serde(rename = "en-GH")]
    EnGh,
    #[serde(rename = "en-GB")]
    EnGb,
    #[serde(rename = "en-IN")]
    EnIn,
    #[serde(rename = "en-IE")]
    EnIe,
    #[serde(rename = "en-KE")]
    EnKe,
    #[serde(rename = "en-NZ")]
    EnNz,
    #[serde(rename = "en-NG")]
    EnNg,
    #[serde(rename = "en-PH")]
    EnPh,
    #[serde(rename = "en-SG")]
    EnSg,
    #[serde(rename = "en-ZA")]
    EnZa,
    #[serde(rename = "en-TZ")]
    EnTz,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 14] = [
        LanguageCode::EnUs,
        LanguageCode::EnAu,
        LanguageCode::EnCa,
        LanguageCode::EnGh,
        LanguageCode::EnGb,
        LanguageCode::EnIn,
        LanguageCode::EnIe,
        LanguageCode::EnKe,
        LanguageCode::EnNz,
        LanguageCode::EnNg,
        LanguageCode::EnPh,
        LanguageCode::EnSg,
        LanguageCode::EnZa,
        LanguageCode::EnTz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::EnUs => "en-US",
            LanguageCode::EnAu => "en-AU",
            LanguageCode::EnCa => "en-CA",
            LanguageCode::EnGh => "en-GH",
            LanguageCode::EnGb => "en-GB",
            LanguageCode::EnIn => "en-IN",
            LanguageCode::EnIe => "en-IE",
            LanguageCode::EnKe => "en-KE",
            LanguageCode::EnNz => "en-NZ",
            LanguageCode::EnNg => "en-NG",
            LanguageCode::EnPh => "en-PH",
            LanguageCode::EnSg => "en-SG",
            LanguageCode::EnZa => "en-ZA",
            LanguageCode::EnTz => "en-TZ",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a locale tag outside the supported set.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported language code: {}", self.0)
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for LanguageCode {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageCode::ALL
            .iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_start_serialization() {
        let msg: ClientEvent = ControlEvent::SessionStart { sample_rate: 44100 }.into();
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"session.start\""));
        assert!(json.contains("\"sample_rate\":44100"));
    }

    #[test]
    fn session_stop_serialization() {
        let json = serde_json::to_string(&ClientEvent::SessionStop).unwrap();
        assert_eq!(json, "{\"type\":\"session.stop\"}");
    }

    #[test]
    fn language_changed_uses_locale_tag() {
        let msg: ClientEvent = ControlEvent::LanguageChanged {
            code: LanguageCode::EnGb,
        }
        .into();
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"language.changed\""));
        assert!(json.contains("\"code\":\"en-GB\""));
    }

    #[test]
    fn frame_serializes_samples_as_plain_array() {
        let frame = AudioFrame::new(vec![0.5, -0.25], 44100);
        let msg = ClientEvent::Frame {
            samples: encode(&frame),
        };
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"type\":\"frame\""));
        assert!(json.contains("\"samples\":[0.5,-0.25]"));
    }

    #[test]
    fn encode_round_trips_bit_for_bit() {
        let samples = vec![0.0f32, 1.0, -1.0, 0.123456789, f32::MIN_POSITIVE, 0.999999];
        let frame = AudioFrame::new(samples.clone(), 44100);

        let json = serde_json::to_string(&encode(&frame)).unwrap();
        let decoded: TransportFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.0.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn encode_is_deterministic() {
        let frame = AudioFrame::new(vec![0.1, 0.2, 0.3], 48000);
        assert_eq!(encode(&frame), encode(&frame));
    }

    #[test]
    fn transcript_update_deserialization() {
        let json = r#"{"type": "transcript.update", "transcript": "hello world"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::TranscriptUpdate {
                transcript: "hello world".to_string()
            }
        );
    }

    #[test]
    fn timer_update_deserialization() {
        let json = r#"{"type": "timer.update", "display": "01:42"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ServerEvent::ElapsedTime {
                display: "01:42".to_string()
            }
        );
    }

    #[test]
    fn unknown_server_event_does_not_fail() {
        let json = r#"{"type": "some.future.event", "data": "whatever"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn language_code_parsing() {
        assert_eq!("en-US".parse::<LanguageCode>(), Ok(LanguageCode::EnUs));
        assert_eq!("en-nz".parse::<LanguageCode>(), Ok(LanguageCode::EnNz));
        assert!("fr-FR".parse::<LanguageCode>().is_err());
    }

    #[test]
    fn language_code_round_trips_through_str() {
        for code in LanguageCode::ALL {
            assert_eq!(code.as_str().parse::<LanguageCode>(), Ok(code));
        }
    }
}
