//! Capture session state machine
//!
//! The single-writer pattern: every lifecycle transition goes through the
//! pure `reduce()` function, which returns the next state and a list of
//! effects for the driver to execute. The driver owns the audio source
//! and the session channel; a per-session frame pump routes each captured
//! frame to the analyzer path (visualization) and the encoder path
//! (transport) independently.
//!
//! ```text
//! Capture thread (device clock)        Tokio runtime
//! ┌──────────────────┐                 ┌──────────────────────────┐
//! │ FrameExtractor   │──unbounded────▶ │ frame pump               │
//! │ (never blocks)   │                 │   ├─ analyze → stats     │
//! └──────────────────┘                 │   └─ encode  → channel   │
//!                                      └──────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

use crate::audio::{
    analyze, AcquisitionError, AudioSource, CaptureEvent, CaptureHandle, CaptureReceiver,
    DeviceError, SignalStats,
};
use crate::channel::{encode, ChannelError, ControlEvent, LanguageCode, ServerEvent, SessionChannel};

/// Session lifecycle state. Exactly one live capture session per client:
/// `Streaming` owns the acquired device for its duration.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Idle,
    Streaming { session_id: Uuid, sample_rate: u32 },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Inputs to the reducer: user requests, acquisition outcomes, and
/// failures reported by the capture or transport side.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start capturing.
    StartRequested,
    /// User asked to stop capturing.
    StopRequested,
    /// The audio source was acquired; sample rate is now fixed.
    AcquireOk { id: Uuid, sample_rate: u32 },
    /// The audio source could not be acquired.
    AcquireFailed { error: AcquisitionError },
    /// The device failed mid-session (includes id to drop stale reports).
    DeviceFailed { id: Uuid, error: DeviceError },
    /// The channel connection dropped; an in-flight session is aborted.
    ConnectionLost,
    /// User picked a different recognition language.
    LanguageSelected { code: LanguageCode },
}

/// Effects to be executed after a transition, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Acquire the audio source; feeds `AcquireOk`/`AcquireFailed` back in.
    Acquire,
    /// Start the frame pump for the session that just went streaming.
    BeginPump { id: Uuid },
    /// Stop consuming frames and release the audio source.
    Release { id: Uuid },
    /// Queue a control event on the session channel.
    SendControl(ControlEvent),
    /// Report a failure on the reactive status path.
    SurfaceError(SessionError),
}

/// Session-level error taxonomy. Every one is observable by at least one
/// subscriber; none crashes the process.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The session never started.
    Acquisition(AcquisitionError),
    /// The session was aborted mid-stream.
    Device(DeviceError),
    /// The transport dropped; the session is aborted, sent frames are not
    /// retransmitted.
    Channel(ChannelError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Acquisition(e) => write!(f, "{}", e),
            SessionError::Device(e) => write!(f, "{}", e),
            SessionError::Channel(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - A start while `Streaming` or a stop while `Idle` is a no-op, not an
///   error, and produces zero effects.
/// - Exactly one `SessionStart` precedes the pump, exactly one
///   `SessionStop` follows release on the ordinary stop path.
/// - Events carrying a stale session id are dropped silently.
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    match (state, event) {
        // -----------------
        // Idle
        // -----------------
        (Idle, StartRequested) => (Idle, vec![Acquire]),
        (Idle, StopRequested) => (Idle, vec![]),
        (Idle, AcquireOk { id, sample_rate }) => (
            Streaming {
                session_id: id,
                sample_rate,
            },
            vec![
                SendControl(ControlEvent::SessionStart { sample_rate }),
                BeginPump { id },
            ],
        ),
        (Idle, AcquireFailed { error }) => (
            Idle,
            vec![SurfaceError(SessionError::Acquisition(error))],
        ),

        // -----------------
        // Streaming
        // -----------------
        (Streaming { .. }, StartRequested) => (state.clone(), vec![]),
        (Streaming { session_id, .. }, StopRequested) => (
            Idle,
            vec![
                Release { id: *session_id },
                SendControl(ControlEvent::SessionStop),
            ],
        ),
        (Streaming { session_id, .. }, DeviceFailed { id, error }) if *session_id == id => (
            Idle,
            vec![
                Release { id },
                // Best-effort stop notice; delivery is not guaranteed on
                // this path.
                SendControl(ControlEvent::SessionStop),
                SurfaceError(SessionError::Device(error)),
            ],
        ),
        (Streaming { session_id, .. }, ConnectionLost) => (
            Idle,
            vec![
                Release { id: *session_id },
                SurfaceError(SessionError::Channel(ChannelError::ConnectionLost)),
            ],
        ),

        // -----------------
        // Any state
        // -----------------
        (_, LanguageSelected { code }) => (
            state.clone(),
            vec![SendControl(ControlEvent::LanguageChanged { code })],
        ),

        // Stale or out-of-order events (drop silently)
        _ => (state.clone(), vec![]),
    }
}

/// Requests accepted by the running session driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Start when idle, stop when streaming (the record button).
    Toggle,
    Start,
    Stop,
    SetLanguage(LanguageCode),
    /// Stop any live session and end the driver loop.
    Shutdown,
}

/// Cloneable handle for dispatching commands to a running session and
/// observing its outputs.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    stats: watch::Receiver<Option<SignalStats>>,
    state: watch::Receiver<State>,
    errors: broadcast::Sender<SessionError>,
}

impl SessionHandle {
    /// Send a command to the session driver.
    pub async fn send(
        &self,
        command: SessionCommand,
    ) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.commands.send(command).await
    }

    pub async fn toggle(&self) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.send(SessionCommand::Toggle).await
    }

    pub async fn start(&self) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn set_language(
        &self,
        code: LanguageCode,
    ) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.send(SessionCommand::SetLanguage(code)).await
    }

    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<SessionCommand>> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest per-frame signal statistics, `None` until the first frame.
    pub fn stats(&self) -> watch::Receiver<Option<SignalStats>> {
        self.stats.clone()
    }

    /// Observable session state.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// Subscribe to session failures.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<SessionError> {
        self.errors.subscribe()
    }
}

/// Orchestrator owning the audio source and the session channel.
///
/// Construct with [`CaptureSession::new`], then hand the returned driver
/// to a task via [`CaptureSession::run`] and keep the [`SessionHandle`].
pub struct CaptureSession {
    state: State,
    source: Box<dyn AudioSource>,
    channel: Arc<dyn SessionChannel>,
    buffer_size: usize,

    commands: mpsc::Receiver<SessionCommand>,
    internal_tx: mpsc::UnboundedSender<Event>,
    internal_rx: mpsc::UnboundedReceiver<Event>,
    stats_tx: Arc<watch::Sender<Option<SignalStats>>>,
    state_tx: watch::Sender<State>,
    errors: broadcast::Sender<SessionError>,

    handle: Option<Box<dyn CaptureHandle>>,
    pending_frames: Option<CaptureReceiver>,
    pump: Option<tokio::task::JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl CaptureSession {
    pub fn new(
        source: Box<dyn AudioSource>,
        channel: Arc<dyn SessionChannel>,
        buffer_size: usize,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(State::Idle);
        let (errors_tx, _) = broadcast::channel(16);

        let handle = SessionHandle {
            commands: commands_tx,
            stats: stats_rx,
            state: state_rx,
            errors: errors_tx.clone(),
        };

        let session = Self {
            state: State::Idle,
            source,
            channel,
            buffer_size,
            commands: commands_rx,
            internal_tx,
            internal_rx,
            stats_tx: Arc::new(stats_tx),
            state_tx,
            errors: errors_tx,
            handle: None,
            pending_frames: None,
            pump: None,
            started_at: None,
        };
        (session, handle)
    }

    /// Run the driver loop until shutdown or all handles are dropped.
    pub async fn run(mut self) {
        let mut remote_events = self.channel.subscribe();
        let mut remote_open = true;

        log::info!("Capture session loop started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(SessionCommand::Shutdown) => {
                            self.dispatch(Event::StopRequested);
                            break;
                        }
                        Some(SessionCommand::Toggle) => {
                            let event = if matches!(self.state, State::Idle) {
                                Event::StartRequested
                            } else {
                                Event::StopRequested
                            };
                            self.dispatch(event);
                        }
                        Some(SessionCommand::Start) => self.dispatch(Event::StartRequested),
                        Some(SessionCommand::Stop) => self.dispatch(Event::StopRequested),
                        Some(SessionCommand::SetLanguage(code)) => {
                            self.dispatch(Event::LanguageSelected { code });
                        }
                    }
                }
                Some(event) = self.internal_rx.recv() => {
                    self.dispatch(event);
                }
                result = remote_events.recv(), if remote_open => {
                    match result {
                        Ok(ServerEvent::ConnectionLost) => self.dispatch(Event::ConnectionLost),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            log::warn!("Session driver lagged {} remote events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => remote_open = false,
                    }
                }
            }
        }

        log::info!("Capture session loop ended");
    }

    fn dispatch(&mut self, event: Event) {
        let (next, effects) = reduce(&self.state, event);

        if std::mem::discriminant(&next) != std::mem::discriminant(&self.state) {
            log::info!("Session state: {:?} -> {:?}", self.state, next);
        }

        self.state = next;
        let _ = self.state_tx.send(self.state.clone());

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Acquire => {
                let id = Uuid::new_v4();
                match self.source.acquire(self.buffer_size) {
                    Ok((handle, frames)) => {
                        let sample_rate = handle.sample_rate();
                        self.handle = Some(handle);
                        self.pending_frames = Some(frames);
                        self.started_at = Some(Instant::now());
                        self.dispatch(Event::AcquireOk { id, sample_rate });
                    }
                    Err(error) => {
                        self.dispatch(Event::AcquireFailed { error });
                    }
                }
            }

            Effect::BeginPump { id } => {
                if let Some(frames) = self.pending_frames.take() {
                    self.spawn_pump(id, frames);
                }
            }

            Effect::Release { id } => {
                if let Some(pump) = self.pump.take() {
                    pump.abort();
                }
                if let Some(handle) = self.handle.take() {
                    drop(handle);
                    log::debug!("Session {}: audio source released", id);
                }
                if let Some(started_at) = self.started_at.take() {
                    log::info!("Session {} ended after {:?}", id, started_at.elapsed());
                }
            }

            Effect::SendControl(event) => {
                if let Err(e) = self.channel.send_control(event.clone()) {
                    log::warn!("Control event {:?} not sent: {}", event, e);
                    let _ = self.errors.send(SessionError::Channel(e));
                }
            }

            Effect::SurfaceError(error) => {
                log::error!("{}", error);
                let _ = self.errors.send(error);
            }
        }
    }

    /// One pump per session: forwards frames to the analyzer and encoder
    /// paths in capture order until the capture side closes or fails.
    fn spawn_pump(&mut self, id: Uuid, mut frames: CaptureReceiver) {
        let channel = Arc::clone(&self.channel);
        let stats_tx = Arc::clone(&self.stats_tx);
        let internal_tx = self.internal_tx.clone();

        self.pump = Some(tokio::spawn(async move {
            let mut frames_sent: u64 = 0;

            while let Some(event) = frames.recv().await {
                match event {
                    CaptureEvent::Frame(frame) => {
                        // Analysis and transport are independent consumers
                        // of the same frame; neither path waits on the
                        // other.
                        let stats = analyze(&frame);
                        let _ = stats_tx.send(Some(stats));

                        if let Err(e) = channel.send_data(encode(&frame)) {
                            log::warn!("Session {}: frame not sent: {}", id, e);
                            break;
                        }
                        frames_sent += 1;

                        // Periodic logging (~every 9s at the default cadence)
                        if frames_sent % 50 == 0 {
                            log::debug!("Session {}: {} frames sent", id, frames_sent);
                        }
                    }
                    CaptureEvent::DeviceError(error) => {
                        let _ = internal_tx.send(Event::DeviceFailed { id, error });
                        break;
                    }
                }
            }

            log::debug!("Session {}: pump finished, {} frames sent", id, frames_sent);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming_state() -> (State, Uuid) {
        let id = Uuid::new_v4();
        (
            State::Streaming {
                session_id: id,
                sample_rate: 44100,
            },
            id,
        )
    }

    #[test]
    fn idle_start_requests_acquisition() {
        let (next, effects) = reduce(&State::Idle, Event::StartRequested);
        assert_eq!(next, State::Idle);
        assert_eq!(effects, vec![Effect::Acquire]);
    }

    #[test]
    fn acquire_ok_starts_session_before_pump() {
        let id = Uuid::new_v4();
        let (next, effects) = reduce(
            &State::Idle,
            Event::AcquireOk {
                id,
                sample_rate: 44100,
            },
        );

        assert_eq!(
            next,
            State::Streaming {
                session_id: id,
                sample_rate: 44100
            }
        );
        // SessionStart must be queued before any frame can flow.
        assert_eq!(
            effects,
            vec![
                Effect::SendControl(ControlEvent::SessionStart { sample_rate: 44100 }),
                Effect::BeginPump { id },
            ]
        );
    }

    #[test]
    fn acquire_failure_stays_idle_and_surfaces() {
        let (next, effects) = reduce(
            &State::Idle,
            Event::AcquireFailed {
                error: AcquisitionError::PermissionDenied,
            },
        );

        assert_eq!(next, State::Idle);
        assert_eq!(
            effects,
            vec![Effect::SurfaceError(SessionError::Acquisition(
                AcquisitionError::PermissionDenied
            ))]
        );
    }

    #[test]
    fn start_while_streaming_is_a_noop() {
        let (state, _) = streaming_state();
        let (next, effects) = reduce(&state, Event::StartRequested);
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_while_idle_is_a_noop() {
        let (next, effects) = reduce(&State::Idle, Event::StopRequested);
        assert_eq!(next, State::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn stop_releases_before_session_stop() {
        let (state, id) = streaming_state();
        let (next, effects) = reduce(&state, Event::StopRequested);

        assert_eq!(next, State::Idle);
        assert_eq!(
            effects,
            vec![
                Effect::Release { id },
                Effect::SendControl(ControlEvent::SessionStop),
            ]
        );
    }

    #[test]
    fn device_failure_releases_once_and_surfaces() {
        let (state, id) = streaming_state();
        let error = DeviceError("stream died".to_string());
        let (next, effects) = reduce(
            &state,
            Event::DeviceFailed {
                id,
                error: error.clone(),
            },
        );

        assert_eq!(next, State::Idle);
        let releases = effects
            .iter()
            .filter(|e| matches!(e, Effect::Release { .. }))
            .count();
        assert_eq!(releases, 1);
        assert!(effects.contains(&Effect::SurfaceError(SessionError::Device(error))));
    }

    #[test]
    fn stale_device_failure_is_ignored() {
        let (state, _) = streaming_state();
        let (next, effects) = reduce(
            &state,
            Event::DeviceFailed {
                id: Uuid::new_v4(),
                error: DeviceError("stale".to_string()),
            },
        );

        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn connection_lost_aborts_streaming_session() {
        let (state, id) = streaming_state();
        let (next, effects) = reduce(&state, Event::ConnectionLost);

        assert_eq!(next, State::Idle);
        assert_eq!(
            effects,
            vec![
                Effect::Release { id },
                Effect::SurfaceError(SessionError::Channel(ChannelError::ConnectionLost)),
            ]
        );
        // No SessionStop on this path: the transport is gone.
    }

    #[test]
    fn connection_lost_while_idle_is_a_noop() {
        let (next, effects) = reduce(&State::Idle, Event::ConnectionLost);
        assert_eq!(next, State::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn language_change_forwards_from_any_state() {
        for state in [State::Idle, streaming_state().0] {
            let (next, effects) = reduce(
                &state,
                Event::LanguageSelected {
                    code: LanguageCode::EnIe,
                },
            );
            assert_eq!(next, state);
            assert_eq!(
                effects,
                vec![Effect::SendControl(ControlEvent::LanguageChanged {
                    code: LanguageCode::EnIe
                })]
            );
        }
    }
}
