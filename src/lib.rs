//! Live microphone capture streamed to a transcription server.
//!
//! The pipeline: an [`audio::AudioSource`] feeds fixed-length frames
//! through a [`audio::FrameExtractor`]; the [`session::CaptureSession`]
//! driver analyzes each frame for the local level meter and forwards it
//! over a [`channel::SessionChannel`] to the server, which streams back
//! transcripts and timing events rendered by [`viz::VisualizationFeed`].

pub mod audio;
pub mod channel;
pub mod cli;
pub mod config;
pub mod session;
pub mod viz;

pub use audio::{
    AcquisitionError, AudioFrame, AudioSource, CaptureEvent, CaptureHandle, DeviceError,
    FrameExtractor, MicSource, SignalStats,
};
pub use channel::{
    ChannelError, ControlEvent, LanguageCode, ServerEvent, SessionChannel, SocketChannel,
    TransportFrame,
};
pub use config::Settings;
pub use session::{CaptureSession, SessionCommand, SessionError, SessionHandle, State};
pub use viz::VisualizationFeed;
